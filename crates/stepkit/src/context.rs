//! Step context and provider traits
//!
//! These traits let the engine run without depending on a specific
//! process launcher or terminal UI.

use crate::error::{Error, Result};
use crate::glob;
use crate::manifest::BoundStep;
use crate::types::CommandOutput;
use std::path::{Path, PathBuf};

/// Provider for command execution
///
/// Implement this trait to launch processes, optionally through the
/// elevated path. The engine never spawns processes on its own.
pub trait CommandRunner: Send + Sync {
    /// Run a command to completion and capture its output
    ///
    /// # Arguments
    /// * `program` - Executable name or path
    /// * `args` - Arguments passed verbatim
    /// * `env` - Extra environment variables for the child
    /// * `elevated` - Run through the privilege-escalated path
    fn execute(
        &self,
        program: &str,
        args: &[&str],
        env: &[(&str, &str)],
        elevated: bool,
    ) -> Result<CommandOutput>;

    /// Run a command and return stdout, failing on a non-zero exit
    fn run_capture(&self, program: &str, args: &[&str], elevated: bool) -> Result<String> {
        let output = self.execute(program, args, &[], elevated)?;
        into_stdout(program, args, elevated, output)
    }
}

/// Render a command line for diagnostics
pub fn command_line(program: &str, args: &[&str], elevated: bool) -> String {
    let mut line = String::new();
    if elevated {
        line.push_str("sudo ");
    }
    line.push_str(program);
    for arg in args {
        line.push(' ');
        line.push_str(arg);
    }
    line
}

fn into_stdout(
    program: &str,
    args: &[&str],
    elevated: bool,
    output: CommandOutput,
) -> Result<String> {
    if !output.success {
        return Err(Error::CommandFailed {
            command: command_line(program, args, elevated),
            code: output.code,
            stderr: output.stderr_str(),
        });
    }
    Ok(output.stdout_str())
}

/// Context handed to a plugin while it performs its step
pub struct StepContext<'a> {
    /// Directory containing the manifest; relative paths resolve against it
    pub manifest_dir: &'a Path,
    /// Whether the user asked for verbose output
    pub verbose: bool,
    runner: &'a dyn CommandRunner,
}

impl<'a> StepContext<'a> {
    /// Create a new step context
    pub fn new(manifest_dir: &'a Path, verbose: bool, runner: &'a dyn CommandRunner) -> Self {
        Self {
            manifest_dir,
            verbose,
            runner,
        }
    }

    /// Expand `~` and environment variables, resolving relative paths
    /// against the manifest directory
    pub fn expand_path(&self, path: &str) -> PathBuf {
        let expanded = shellexpand::full(path)
            .unwrap_or_else(|_| shellexpand::tilde(path));
        let expanded = Path::new(expanded.as_ref());
        if expanded.is_absolute() {
            expanded.to_path_buf()
        } else {
            self.manifest_dir.join(expanded)
        }
    }

    /// Expand a path and its wildcards, returning every existing match
    pub fn expand_glob(&self, pattern: &str) -> Result<Vec<PathBuf>> {
        glob::expand(&self.expand_path(pattern))
    }

    /// Run an unelevated command, returning its stdout
    pub fn run_command(&self, program: &str, args: &[&str]) -> Result<String> {
        self.runner.run_capture(program, args, false)
    }

    /// Run a command through the elevated path, returning its stdout
    pub fn run_command_sudo(&self, program: &str, args: &[&str]) -> Result<String> {
        self.runner.run_capture(program, args, true)
    }

    /// Run a command with extra environment variables
    pub fn run_command_with_env(
        &self,
        program: &str,
        args: &[&str],
        env: &[(&str, &str)],
        elevated: bool,
    ) -> Result<String> {
        let output = self.runner.execute(program, args, env, elevated)?;
        into_stdout(program, args, elevated, output)
    }
}

/// Progress callback for setup runs
///
/// Implement this trait to receive progress updates during a run.
pub trait ProgressCallback {
    /// Called before a step is performed
    fn on_step_start(&mut self, step: &BoundStep, total: usize);

    /// Called when a step is skipped because it already ran
    fn on_step_skipped(&mut self, step: &BoundStep, total: usize);

    /// Called after a step was performed and recorded
    fn on_step_complete(&mut self, step: &BoundStep, total: usize);

    /// Called when a step fails; the run stops afterwards
    fn on_step_failed(&mut self, step: &BoundStep, total: usize, error: &str);
}

/// No-op progress callback
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_step_start(&mut self, _step: &BoundStep, _total: usize) {}
    fn on_step_skipped(&mut self, _step: &BoundStep, _total: usize) {}
    fn on_step_complete(&mut self, _step: &BoundStep, _total: usize) {}
    fn on_step_failed(&mut self, _step: &BoundStep, _total: usize, _error: &str) {}
}
