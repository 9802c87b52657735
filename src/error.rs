//! Error types for the rwork agent.
//!
//! Every failure an operation can report is a variant of [`Error`]. The
//! dispatcher turns it into a [`Failure`] carrying a stable [`ErrorCode`], so
//! no raw I/O or process error crosses the operation boundary unclassified.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stable, machine-readable condition codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    NoWorkspace,
    WorkspaceMissing,
    DirNotFound,
    NotADirectory,
    UnsafePath,
    FileExists,
    FileNotFound,
    InterpreterNotFound,
    Timeout,
    ExecError,
    NoSession,
    DecodeError,
    UnknownOperation,
    InvalidArgument,
    InternalError,
}

/// Top-level error type for workspace operations.
#[derive(Error, Debug)]
pub enum Error {
    /// No workspace has been bound yet.
    #[error("no workspace set, call set_workspace first")]
    NoWorkspace,

    /// The bound root disappeared or is no longer a directory.
    #[error("workspace {0} no longer exists")]
    WorkspaceMissing(PathBuf),

    /// set_workspace target is missing and creation was not requested.
    #[error("directory {0} does not exist")]
    DirNotFound(PathBuf),

    /// set_workspace target exists but is not a directory.
    #[error("{0} is not a directory")]
    NotADirectory(PathBuf),

    /// The requested path resolves outside the workspace root.
    #[error("path '{0}' escapes the workspace")]
    UnsafePath(String),

    /// Target file exists and overwriting was not requested.
    #[error("file {0} already exists")]
    FileExists(String),

    /// Target file does not exist.
    #[error("file {0} does not exist")]
    FileNotFound(String),

    /// None of the configured interpreter candidates were found.
    #[error("no R interpreter found in PATH (tried {})", .0.join(", "))]
    InterpreterNotFound(Vec<String>),

    /// The child process exceeded its wall-clock budget and was killed.
    #[error("execution timed out after {} seconds", limit.as_secs())]
    Timeout { limit: Duration, elapsed: Duration },

    /// Spawning or waiting on the child process failed.
    #[error("failed to execute interpreter: {0}")]
    Exec(String),

    /// Inspection requested but no session image has been saved.
    #[error("no saved session found")]
    NoSession,

    /// File content could not be decoded with the requested encoding.
    #[error("cannot decode as {encoding}: {reason}")]
    Decode { encoding: String, reason: String },

    /// Operation name is not part of the dispatch table.
    #[error("unknown operation: {0}")]
    UnknownOperation(String),

    /// Request arguments were malformed.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Configuration file could not be loaded or failed validation.
    #[error("configuration error: {0}")]
    Config(String),

    /// IO error during workspace operations.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Anything else.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Returns the condition code reported to callers.
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::NoWorkspace => ErrorCode::NoWorkspace,
            Error::WorkspaceMissing(_) => ErrorCode::WorkspaceMissing,
            Error::DirNotFound(_) => ErrorCode::DirNotFound,
            Error::NotADirectory(_) => ErrorCode::NotADirectory,
            Error::UnsafePath(_) => ErrorCode::UnsafePath,
            Error::FileExists(_) => ErrorCode::FileExists,
            Error::FileNotFound(_) => ErrorCode::FileNotFound,
            Error::InterpreterNotFound(_) => ErrorCode::InterpreterNotFound,
            Error::Timeout { .. } => ErrorCode::Timeout,
            Error::Exec(_) => ErrorCode::ExecError,
            Error::NoSession => ErrorCode::NoSession,
            Error::Decode { .. } => ErrorCode::DecodeError,
            Error::UnknownOperation(_) => ErrorCode::UnknownOperation,
            Error::InvalidArgument(_) => ErrorCode::InvalidArgument,
            Error::Config(_) | Error::Io(_) | Error::Internal(_) => ErrorCode::InternalError,
        }
    }

    /// Advisory remediation hints. Never parsed by callers.
    pub fn hints(&self) -> Vec<String> {
        let hints: &[&str] = match self {
            Error::NoWorkspace => &["Call set_workspace with a directory path"],
            Error::WorkspaceMissing(_) => &["Recreate the directory or set a new workspace"],
            Error::DirNotFound(_) => &[
                "Set create=true to create it",
                "Provide an existing directory path",
            ],
            Error::FileExists(_) => &[
                "Set overwrite=true to replace it",
                "Choose a different file name",
            ],
            Error::FileNotFound(_) => &["Create the file first with create_file"],
            Error::UnsafePath(_) => &["Use a plain file name inside the workspace"],
            Error::InterpreterNotFound(_) => &[
                "Install R from https://www.r-project.org/",
                "Ensure Rscript is in your PATH",
            ],
            Error::Timeout { .. } => &[
                "Increase timeout_secs",
                "Check the script for infinite loops",
            ],
            Error::NoSession => &["Run a script with save_session=true first"],
            Error::Decode { .. } => &[
                "Pick another encoding",
                "Set as_text=false to read raw bytes",
            ],
            _ => &[],
        };
        hints.iter().map(|h| h.to_string()).collect()
    }
}

/// Serializable failure payload: the single normalized form of [`Error`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Failure {
    pub code: ErrorCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hints: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl From<Error> for Failure {
    fn from(error: Error) -> Self {
        let details = match &error {
            Error::Timeout { limit, elapsed } => Some(serde_json::json!({
                "timeout_secs": limit.as_secs(),
                "duration_ms": elapsed.as_millis() as u64,
            })),
            _ => None,
        };
        Self {
            code: error.code(),
            message: error.to_string(),
            hints: error.hints(),
            details,
        }
    }
}

/// Result type alias for workspace operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_serialize_screaming_snake_case() {
        let json = serde_json::to_string(&ErrorCode::InterpreterNotFound).unwrap();
        assert_eq!(json, "\"INTERPRETER_NOT_FOUND\"");
        let json = serde_json::to_string(&ErrorCode::NotADirectory).unwrap();
        assert_eq!(json, "\"NOT_A_DIRECTORY\"");
    }

    #[test]
    fn io_errors_become_internal() {
        let error = Error::from(std::io::Error::other("disk on fire"));
        assert_eq!(error.code(), ErrorCode::InternalError);
    }

    #[test]
    fn timeout_failure_carries_duration() {
        let failure = Failure::from(Error::Timeout {
            limit: Duration::from_secs(2),
            elapsed: Duration::from_millis(2004),
        });

        assert_eq!(failure.code, ErrorCode::Timeout);
        let details = failure.details.expect("timeout details");
        assert_eq!(details["duration_ms"], 2004);
        assert_eq!(details["timeout_secs"], 2);
        assert!(!failure.hints.is_empty());
    }

    #[test]
    fn no_workspace_names_the_remedy() {
        let failure = Failure::from(Error::NoWorkspace);
        assert!(failure.message.contains("set_workspace"));
        assert_eq!(failure.code, ErrorCode::NoWorkspace);
    }
}
