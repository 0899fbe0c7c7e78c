//! Runner module - Execution abstraction layer
//!
//! This module provides a unified interface for running untrusted programs:
//! - `Runner`: spawns one command under a wall-clock limit and captures its output
//! - `ExecutionAction`: an adapter-built plan (interpret, compile then run, or query)
//!   driven through a `Runner`
//! - `ScratchDir`: per-execution temporary directory, removed on drop
//!
//! The runner module does NOT:
//! - Decode output or decide statuses
//! - Compare outputs against expectations
//! - Know about languages

pub mod process;
pub mod scratch;

use async_trait::async_trait;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::domain::{ExecutionLimits, RawOutcome, SandboxResult};

pub use process::ProcessRunner;
pub use scratch::ScratchDir;

/// Command specification for execution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// Program path or name
    pub program: String,
    /// Arguments to the program
    pub args: Vec<String>,
    /// Working directory
    pub work_dir: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            work_dir: None,
        }
    }

    pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args = args.into_iter().map(|a| a.into()).collect();
        self
    }

    pub fn with_work_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.work_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Create from a command vector (first element is program, rest are args)
    pub fn from_vec(cmd: &[String]) -> Self {
        let mut iter = cmd.iter();
        let program = iter.next().cloned().unwrap_or_default();
        let args: Vec<String> = iter.cloned().collect();
        Self {
            program,
            args,
            work_dir: None,
        }
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            // inline sources can be long; keep log lines short
            if arg.len() > 64 {
                write!(f, " <{} bytes>", arg.len())?;
            } else {
                write!(f, " {}", arg)?;
            }
        }
        Ok(())
    }
}

/// Runner trait for executing programs
#[async_trait]
pub trait Runner: Send + Sync {
    /// Run a command with the given limits and optional stdin
    async fn run(
        &self,
        cmd: &CommandSpec,
        stdin: Option<&[u8]>,
        limits: &ExecutionLimits,
    ) -> SandboxResult<RawOutcome>;

    /// Create an isolated scratch directory for one execution
    fn scratch_dir(&self) -> SandboxResult<ScratchDir>;
}

/// Adapter-built plan for one execution, opaque to the runner
#[async_trait]
pub trait ExecutionAction: Send {
    async fn run(
        self: Box<Self>,
        runner: &dyn Runner,
        stdin: Option<&[u8]>,
        limits: &ExecutionLimits,
    ) -> SandboxResult<RawOutcome>;
}

/// Drive an action to completion. Every resource the action acquires is released
/// before this returns.
pub async fn execute(
    runner: &dyn Runner,
    action: Box<dyn ExecutionAction>,
    stdin: Option<&[u8]>,
    limits: &ExecutionLimits,
) -> SandboxResult<RawOutcome> {
    let outcome = action.run(runner, stdin, limits).await?;

    debug!(
        "Execution finished: stage={:?}, exit_code={}, timed_out={}, elapsed_ms={}",
        outcome.stage,
        outcome.exit_code,
        outcome.timed_out,
        outcome.elapsed.as_millis()
    );

    Ok(outcome)
}

/// Action that runs a single prepared command
pub struct CommandAction {
    cmd: CommandSpec,
}

impl CommandAction {
    pub fn new(cmd: CommandSpec) -> Self {
        Self { cmd }
    }
}

#[async_trait]
impl ExecutionAction for CommandAction {
    async fn run(
        self: Box<Self>,
        runner: &dyn Runner,
        stdin: Option<&[u8]>,
        limits: &ExecutionLimits,
    ) -> SandboxResult<RawOutcome> {
        runner.run(&self.cmd, stdin, limits).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_spec_from_vec() {
        let cmd = CommandSpec::from_vec(&["java".into(), "-cp".into(), "/tmp/x".into()]);
        assert_eq!(cmd.program, "java");
        assert_eq!(cmd.args, vec!["-cp", "/tmp/x"]);
        assert!(cmd.work_dir.is_none());

        let empty = CommandSpec::from_vec(&[]);
        assert!(empty.program.is_empty());
    }

    #[test]
    fn test_command_spec_display_shortens_long_args() {
        let cmd = CommandSpec::new("python3").with_args(["-c".to_string(), "x".repeat(100)]);
        assert_eq!(cmd.to_string(), "python3 -c <100 bytes>");
    }
}
