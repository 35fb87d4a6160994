//! Core types for step execution

use serde::{Deserialize, Serialize};
use std::process::Output;

/// Output from an executed command
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub success: bool,
    /// Exit code, `None` if terminated by a signal
    pub code: Option<i32>,
}

impl From<Output> for CommandOutput {
    fn from(output: Output) -> Self {
        Self {
            stdout: output.stdout,
            stderr: output.stderr,
            success: output.status.success(),
            code: output.status.code(),
        }
    }
}

impl CommandOutput {
    /// Successful output with the given stdout
    pub fn ok(stdout: impl Into<Vec<u8>>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: Vec::new(),
            success: true,
            code: Some(0),
        }
    }

    /// Get stdout as a string
    pub fn stdout_str(&self) -> String {
        String::from_utf8_lossy(&self.stdout).to_string()
    }

    /// Get stderr as a string
    pub fn stderr_str(&self) -> String {
        String::from_utf8_lossy(&self.stderr).to_string()
    }
}

/// Options for a setup run
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Run every step even if it was recorded as done
    pub rerun: bool,
    /// Verbose output from plugins
    pub verbose: bool,
}

/// Outcome of a single step in a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepOutcome {
    /// Step was performed and recorded
    Performed,
    /// Step was already recorded as done
    Skipped,
}

/// Summary of a completed run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub performed: usize,
    pub skipped: usize,
}

impl RunSummary {
    /// Total number of steps visited
    pub fn total(&self) -> usize {
        self.performed + self.skipped
    }

    /// Add an outcome to the summary
    pub fn add_outcome(&mut self, outcome: &StepOutcome) {
        match outcome {
            StepOutcome::Performed => self.performed += 1,
            StepOutcome::Skipped => self.skipped += 1,
        }
    }
}
