//! Command execution for steps, plain or through sudo
//!
//! Steps run as the invoking user. Commands that need root go through
//! `sudo -E`, which relies on the sudo timestamp kept fresh by the
//! [`CredentialRefresher`].

use crate::ui;
use std::io;
use std::process::{Command, Stdio};
use std::thread;
use std::time::Duration;
use stepkit::{CommandOutput, CommandRunner, command_line};

/// How often the sudo timestamp is renewed
pub const REFRESH_INTERVAL: Duration = Duration::from_secs(60);

/// Runs step commands on the host
#[derive(Debug, Default)]
pub struct SystemRunner {
    /// Echo command lines and their output
    pub verbose: bool,
}

impl SystemRunner {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    fn build(program: &str, args: &[&str], env: &[(&str, &str)], elevated: bool) -> Command {
        let mut cmd = if elevated {
            let mut cmd = Command::new("sudo");
            cmd.arg("-E").arg(program);
            cmd
        } else {
            Command::new(program)
        };
        cmd.args(args)
            .envs(env.iter().copied())
            .stdin(Stdio::inherit());
        cmd
    }
}

impl CommandRunner for SystemRunner {
    fn execute(
        &self,
        program: &str,
        args: &[&str],
        env: &[(&str, &str)],
        elevated: bool,
    ) -> stepkit::Result<CommandOutput> {
        let line = command_line(program, args, elevated);
        log::debug!("Running: {line}");

        let output = Self::build(program, args, env, elevated)
            .output()
            .map_err(|source| stepkit::Error::Spawn {
                command: line.clone(),
                source,
            })?;
        let output = CommandOutput::from(output);

        if self.verbose {
            ui::dim(&format!("$ {line}"));
            for text in [output.stdout_str(), output.stderr_str()] {
                for l in text.lines() {
                    ui::dim(l);
                }
            }
        }
        log::trace!("{line} exited with {:?}", output.code);

        Ok(output)
    }
}

/// Background renewal of the sudo timestamp
///
/// The refresher thread is detached: it is never joined, its failures are
/// only logged at debug level, and it ends with the process.
#[derive(Debug, Clone, Copy)]
pub struct CredentialRefresher {
    interval: Duration,
}

impl Default for CredentialRefresher {
    fn default() -> Self {
        Self {
            interval: REFRESH_INTERVAL,
        }
    }
}

impl CredentialRefresher {
    #[cfg(test)]
    pub fn with_interval(interval: Duration) -> Self {
        Self { interval }
    }

    /// Start renewing with `sudo -v`, first immediately, then every interval
    pub fn start(self) -> io::Result<()> {
        self.start_with(renew)
    }

    /// Start calling `tick` on the refresh schedule
    pub fn start_with<F>(self, mut tick: F) -> io::Result<()>
    where
        F: FnMut() -> io::Result<()> + Send + 'static,
    {
        let interval = self.interval;
        thread::Builder::new()
            .name("sudo-refresh".into())
            .spawn(move || {
                loop {
                    if let Err(e) = tick() {
                        log::debug!("Credential refresh failed: {e}");
                    }
                    thread::sleep(interval);
                }
            })?;
        Ok(())
    }
}

fn renew() -> io::Result<()> {
    let status = Command::new("sudo")
        .arg("-v")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()?;
    if !status.success() {
        return Err(io::Error::other(format!("sudo -v exited with {status}")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    #[test]
    fn test_refresher_ticks_repeatedly_and_swallows_errors() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ticks);

        CredentialRefresher::with_interval(Duration::from_millis(5))
            .start_with(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(io::Error::other("no tty"))
            })
            .unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while ticks.load(Ordering::SeqCst) < 3 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(ticks.load(Ordering::SeqCst) >= 3);
    }

    #[test]
    fn test_default_interval() {
        assert_eq!(CredentialRefresher::default().interval, REFRESH_INTERVAL);
    }

    #[test]
    fn test_runner_captures_output_and_env() {
        let runner = SystemRunner::new(false);
        let output = runner
            .execute("sh", &["-c", "echo $UBUP_T"], &[("UBUP_T", "hi")], false)
            .unwrap();
        assert!(output.success);
        assert_eq!(output.stdout_str(), "hi\n");
    }

    #[test]
    fn test_runner_failure_keeps_exit_code() {
        let runner = SystemRunner::new(false);
        let err = runner
            .run_capture("sh", &["-c", "echo nope >&2; exit 3"], false)
            .unwrap_err();
        match err {
            stepkit::Error::CommandFailed { code, stderr, .. } => {
                assert_eq!(code, Some(3));
                assert_eq!(stderr.trim(), "nope");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_runner_missing_program() {
        let runner = SystemRunner::new(false);
        let err = runner
            .execute("ubup-no-such-program", &[], &[], false)
            .unwrap_err();
        assert!(matches!(err, stepkit::Error::Spawn { .. }));
    }
}
