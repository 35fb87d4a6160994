//! Builtin step types
//!
//! | step type          | configuration                         |
//! |--------------------|---------------------------------------|
//! | `apt-packages`     | list of package names                 |
//! | `copy`             | map of source glob to destination     |
//! | `folders`          | list of directories                   |
//! | `flatpak-packages` | list of bundles, refs or detailed specs |
//! | `ppas`             | list of `owner/name` PPAs             |
//! | `scriptlet`        | inline bash script                    |
//! | `scripts`          | list of bash script paths             |
//! | `snap-packages`    | list of snaps, optionally with flags  |

mod apt;
mod copy;
mod flatpak;
mod folders;
mod ppas;
mod scriptlet;
mod scripts;
mod snap;

use stepkit::{PluginDescriptor, Registry};

/// Descriptors for every builtin step type
pub fn builtin_plugins() -> Vec<PluginDescriptor> {
    vec![
        apt::descriptor(),
        copy::descriptor(),
        folders::descriptor(),
        flatpak::descriptor(),
        ppas::descriptor(),
        scriptlet::descriptor(),
        scripts::descriptor(),
        snap::descriptor(),
    ]
}

/// A registry holding the builtin step types
pub fn builtin_registry() -> stepkit::Result<Registry> {
    Registry::with_plugins(builtin_plugins())
}

#[cfg(test)]
pub(crate) mod testing {
    use std::io;
    use std::sync::Mutex;
    use stepkit::{CommandOutput, CommandRunner, command_line};

    /// One recorded invocation
    #[derive(Debug, Clone)]
    pub struct Call {
        /// Command line, prefixed with `sudo ` when elevated
        pub line: String,
        pub env: Vec<(String, String)>,
    }

    /// Records commands and answers with canned output
    ///
    /// Responses match on a command line prefix (without `sudo`). `None`
    /// simulates a program that is not installed.
    #[derive(Default)]
    pub struct RecordingRunner {
        calls: Mutex<Vec<Call>>,
        responses: Vec<(String, Option<CommandOutput>)>,
    }

    impl RecordingRunner {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn respond(mut self, prefix: &str, output: CommandOutput) -> Self {
            self.responses.push((prefix.to_string(), Some(output)));
            self
        }

        pub fn missing(mut self, prefix: &str) -> Self {
            self.responses.push((prefix.to_string(), None));
            self
        }

        pub fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        pub fn lines(&self) -> Vec<String> {
            self.calls().into_iter().map(|c| c.line).collect()
        }
    }

    impl CommandRunner for RecordingRunner {
        fn execute(
            &self,
            program: &str,
            args: &[&str],
            env: &[(&str, &str)],
            elevated: bool,
        ) -> stepkit::Result<CommandOutput> {
            let plain = command_line(program, args, false);
            self.calls.lock().unwrap().push(Call {
                line: command_line(program, args, elevated),
                env: env
                    .iter()
                    .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                    .collect(),
            });

            match self
                .responses
                .iter()
                .find(|(prefix, _)| plain.starts_with(prefix.as_str()))
            {
                Some((_, Some(output))) => Ok(output.clone()),
                Some((_, None)) => Err(stepkit::Error::Spawn {
                    command: plain,
                    source: io::Error::from(io::ErrorKind::NotFound),
                }),
                None => Ok(CommandOutput::ok("")),
            }
        }
    }
}
