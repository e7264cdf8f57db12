// Executes one command to completion and captures its output

use std::process::Command;
use thiserror::Error;
use tracing::debug;

use super::{Binaries, ShapingCommand};

/// Exit status plus captured streams of one finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// `None` when the process was terminated by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success() -> Self {
        Self {
            code: Some(0),
            ..Default::default()
        }
    }

    pub fn failure(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == Some(0)
    }
}

#[derive(Debug, Error)]
pub enum RunnerError {
    /// The process could not be started at all (binary missing, exec refused).
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// The only seam between the shaper and the OS.
///
/// Implementations block until the command exits, impose no timeout and never retry.
pub trait CommandRunner: Send + Sync {
    fn run(&self, command: &ShapingCommand) -> Result<CommandOutput, RunnerError>;
}

/// Runs commands as real processes, optionally through `sudo -n`.
#[derive(Debug, Clone, Default)]
pub struct SystemRunner {
    binaries: Binaries,
    use_sudo: bool,
}

impl SystemRunner {
    pub fn new(binaries: Binaries, use_sudo: bool) -> Self {
        Self {
            binaries,
            use_sudo,
        }
    }
}

impl CommandRunner for SystemRunner {
    fn run(&self, command: &ShapingCommand) -> Result<CommandOutput, RunnerError> {
        let mut invocation = command.to_invocation(&self.binaries);
        // Reads never need elevation.
        if self.use_sudo && !command.is_read_only() {
            invocation = invocation.with_sudo();
        }
        let output = Command::new(&invocation.program)
            .args(&invocation.args)
            .output()
            .map_err(|source| RunnerError::Spawn {
                program: invocation.program.clone(),
                source,
            })?;
        let result = CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        debug!(
            operation = "run_command",
            command = %invocation,
            code = ?result.code,
            stderr = %result.stderr.trim(),
            "command finished"
        );
        Ok(result)
    }
}
