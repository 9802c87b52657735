//! Running the R interpreter as a child process.
//!
//! [`Runner`] is the seam between the agent and process execution.
//! [`ProcessRunner`] is the real implementation; tests substitute their own.

mod interpreter;
mod process;
mod request;

pub use interpreter::{r_string_literal, Interpreter, InterpreterKind, InterpreterLocator};
pub use process::ProcessRunner;
pub use request::{RequestFile, MAX_INLINE_CODE, REQUEST_PREFIX, REQUEST_SUFFIX};

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// One interpreter execution request.
#[derive(Debug, Clone)]
pub struct Invocation {
    /// Executable to run.
    pub interpreter: Interpreter,
    /// Full argument list.
    pub args: Vec<String>,
    /// Working directory (the workspace root).
    pub working_dir: PathBuf,
    /// Wall-clock budget measured from spawn.
    pub timeout: Duration,
}

/// Captured outcome of a process that ran to completion.
///
/// A non-zero exit code is data, not an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOutput {
    /// Exit code, or -1 when the process was ended by a signal.
    pub exit_code: i32,
    /// Signal that ended the process, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signal: Option<i32>,
    /// Whether the exit status reported success.
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
}

/// Trait for interpreter runners.
#[async_trait]
pub trait Runner: Send + Sync {
    /// Resolves the interpreter to use, failing before anything is spawned.
    fn locate(&self) -> Result<Interpreter>;

    /// Every interpreter that could be used, in priority order.
    fn locate_all(&self) -> Vec<Interpreter>;

    /// Runs the invocation to completion or until its timeout.
    async fn run(&self, invocation: Invocation) -> Result<RunOutput>;

    /// Returns the name of this runner.
    fn name(&self) -> &str;
}
