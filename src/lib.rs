//! rwork - a sandboxed R workspace agent
//!
//! This library manages a directory of R scripts, runs the R interpreter
//! against them under a time budget, and reports the files and session objects
//! those runs produce. No operation can read or write outside the bound
//! workspace root.

pub mod agent;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod inspector;
pub mod runner;
pub mod sandbox;
pub mod state;

pub use agent::{
    normalize_script_name, Agent, BoundWorkspace, CodeWritten, ExportContent, ExportData,
    ExportEntry, ExportList, ExpressionRun, FileCreated, FileRenamed, InterpreterInfo,
    PrimaryFile, ScriptFiles, ScriptRun, SortKey, StateView, TablePreview, TextEncoding,
    WorkspaceInfo, SCAFFOLD, SESSION_IMAGE,
};
pub use config::{Config, Validate, ValidationResult};
pub use dispatch::{dispatch, handle_line, Operation, Reply, Request, Response};
pub use error::{Error, ErrorCode, Failure, Result};
pub use inspector::{Inspection, ObjectReport, SessionInspector};
pub use runner::{Interpreter, InterpreterKind, Invocation, ProcessRunner, RunOutput, Runner};
pub use sandbox::{SandboxGuard, Snapshot};
pub use state::{StateRecord, StateStore};
