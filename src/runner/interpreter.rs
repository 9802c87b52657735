//! Locating the R interpreter and shaping its command lines.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Which front end an executable is. They take arguments differently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterpreterKind {
    /// `Rscript`: runs a file or `-e` expressions directly.
    Rscript,
    /// `R`: needs explicit save/restore flags and `--args` before user args.
    R,
}

impl InterpreterKind {
    /// Infers the kind from the executable's file name.
    pub fn from_path(path: &Path) -> Self {
        match path.file_stem().and_then(|s| s.to_str()) {
            Some("R") => InterpreterKind::R,
            _ => InterpreterKind::Rscript,
        }
    }

    fn preamble(self) -> &'static [&'static str] {
        match self {
            InterpreterKind::Rscript => &[],
            InterpreterKind::R => &["--no-save", "--no-restore", "--no-echo"],
        }
    }

    fn push_user_args(self, out: &mut Vec<String>, args: &[String]) {
        if args.is_empty() {
            return;
        }
        if self == InterpreterKind::R {
            out.push("--args".to_string());
        }
        out.extend(args.iter().cloned());
    }

    /// Arguments that run `file` with trailing user `args`.
    pub fn file_args(self, file: &str, args: &[String]) -> Vec<String> {
        let mut out: Vec<String> = self.preamble().iter().map(|s| s.to_string()).collect();
        if self == InterpreterKind::R {
            out.push("-f".to_string());
        }
        out.push(file.to_string());
        self.push_user_args(&mut out, args);
        out
    }

    /// Arguments that evaluate `expr` with trailing user `args`.
    pub fn expr_args(self, expr: &str, args: &[String]) -> Vec<String> {
        let mut out: Vec<String> = self.preamble().iter().map(|s| s.to_string()).collect();
        out.push("-e".to_string());
        out.push(expr.to_string());
        self.push_user_args(&mut out, args);
        out
    }
}

/// A resolved interpreter executable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interpreter {
    pub path: PathBuf,
    pub kind: InterpreterKind,
}

impl Interpreter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let kind = InterpreterKind::from_path(&path);
        Self { path, kind }
    }
}

/// Searches configured candidates in priority order.
#[derive(Debug, Clone)]
pub struct InterpreterLocator {
    candidates: Vec<String>,
}

impl InterpreterLocator {
    pub fn new(candidates: Vec<String>) -> Self {
        Self { candidates }
    }

    pub fn candidates(&self) -> &[String] {
        &self.candidates
    }

    /// Every candidate that resolves, in priority order.
    pub fn locate_all(&self) -> Vec<Interpreter> {
        let mut found: Vec<Interpreter> = Vec::new();
        for candidate in &self.candidates {
            match which::which(candidate) {
                Ok(path) => {
                    if !found.iter().any(|i| i.path == path) {
                        found.push(Interpreter::new(path));
                    }
                }
                Err(e) => {
                    tracing::debug!(candidate = %candidate, error = %e, "interpreter candidate not found");
                }
            }
        }
        found
    }

    /// The first candidate that resolves.
    pub fn locate(&self) -> Result<Interpreter> {
        self.candidates
            .iter()
            .find_map(|candidate| which::which(candidate).ok())
            .map(Interpreter::new)
            .ok_or_else(|| Error::InterpreterNotFound(self.candidates.clone()))
    }
}

/// Renders `value` as a double-quoted R string literal.
///
/// Quotes, backslashes and control characters are escaped so the value can
/// never terminate the literal early. NUL cannot appear in R strings at all;
/// callers must reject such values before calling this.
pub fn r_string_literal(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() && (c as u32) < 0x80 => {
                out.push_str(&format!("\\x{:02x}", c as u32));
            }
            c if c.is_control() => out.push_str(&format!("\\u{{{:x}}}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}
