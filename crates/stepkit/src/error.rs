//! Error types for the stepkit crate

use std::path::PathBuf;
use thiserror::Error;

/// Boxed cause preserved from plugin and command failures
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur while loading or running a manifest
#[derive(Error, Debug)]
pub enum Error {
    /// Manifest file does not exist
    #[error("the file {} does not exist", .0.display())]
    ManifestNotFound(PathBuf),

    /// Manifest path has an extension other than yaml/yml
    #[error(
        "the file {} has an unsupported extension; supported extensions are *.yaml and *.yml",
        .0.display()
    )]
    UnsupportedExtension(PathBuf),

    /// Manifest or descriptor is not valid YAML
    #[error("failed to parse {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// Manifest top level has the wrong structure
    #[error("invalid manifest {}: {reason}", .path.display())]
    InvalidManifest { path: PathBuf, reason: String },

    /// Step type is not known to the registry
    #[error("unknown step type '{0}'")]
    UnknownStepType(String),

    /// Two plugins claim the same step type
    #[error("a plugin for step type '{0}' is already registered")]
    DuplicatePlugin(String),

    /// Plugin descriptor file is malformed
    #[error("invalid plugin descriptor {}: {reason}", .path.display())]
    InvalidPlugin { path: PathBuf, reason: String },

    /// Step configuration does not match the declared shape
    #[error("invalid configuration for step '{step_type}' at {location}: {reason} (expected {expected})")]
    InvalidConfig {
        step_type: String,
        location: String,
        expected: String,
        reason: String,
    },

    /// Path pattern could not be compiled
    #[error("invalid path pattern '{pattern}': {reason}")]
    Pattern { pattern: String, reason: String },

    /// A command could not be started
    #[error("failed to execute {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// A command exited unsuccessfully
    #[error("command `{command}` failed with {}{}", exit_label(.code), stderr_suffix(.stderr))]
    CommandFailed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    /// A step's perform() failed
    #[error("step {position} ({step_type}) failed")]
    StepFailed {
        position: usize,
        step_type: String,
        #[source]
        source: BoxError,
    },

    /// Run state could not be read or written
    #[error("state file {}: {reason}", .path.display())]
    State { path: PathBuf, reason: String },

    /// IO error
    #[error("IO error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    /// Whether the error was raised before any step could run
    pub fn is_load_error(&self) -> bool {
        matches!(
            self,
            Self::ManifestNotFound(_)
                | Self::UnsupportedExtension(_)
                | Self::Parse { .. }
                | Self::InvalidManifest { .. }
                | Self::UnknownStepType(_)
                | Self::DuplicatePlugin(_)
                | Self::InvalidPlugin { .. }
                | Self::InvalidConfig { .. }
        )
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {code}"),
        None => "a signal".to_string(),
    }
}

fn stderr_suffix(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!(": {trimmed}")
    }
}

/// Result type for stepkit operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_failed_includes_code_and_stderr() {
        let err = Error::CommandFailed {
            command: "apt-get install foo".into(),
            code: Some(100),
            stderr: "E: Unable to locate package foo\n".into(),
        };
        assert_eq!(
            err.to_string(),
            "command `apt-get install foo` failed with exit code 100: E: Unable to locate package foo"
        );
    }

    #[test]
    fn command_failed_by_signal() {
        let err = Error::CommandFailed {
            command: "sleep 100".into(),
            code: None,
            stderr: String::new(),
        };
        assert_eq!(err.to_string(), "command `sleep 100` failed with a signal");
    }

    #[test]
    fn load_errors_are_classified() {
        assert!(Error::UnknownStepType("nope".into()).is_load_error());
        assert!(
            !Error::CommandFailed {
                command: "x".into(),
                code: Some(1),
                stderr: String::new()
            }
            .is_load_error()
        );
    }
}
