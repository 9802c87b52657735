//! Running scripts and expressions, and inspecting the saved session.

use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::inspector::{Inspection, SessionInspector};
use crate::runner::{
    r_string_literal, InterpreterKind, Invocation, RequestFile, RunOutput, Runner, MAX_INLINE_CODE,
};
use crate::sandbox::epoch_seconds;

use super::Agent;

/// Report of a `run_script` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptRun {
    pub run_id: String,
    pub file: String,
    #[serde(flatten)]
    pub output: RunOutput,
    /// Files that are new or have a later mtime than before the run.
    pub new_or_modified_files: Vec<String>,
    pub session_saved: bool,
}

/// Report of a `run_expression` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpressionRun {
    pub run_id: String,
    #[serde(flatten)]
    pub output: RunOutput,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterpreterInfo {
    pub executable: PathBuf,
    pub kind: InterpreterKind,
    /// Every candidate found, in priority order.
    pub alternatives: Vec<PathBuf>,
}

impl<R: Runner> Agent<R> {
    /// Runs a script with the workspace root as working directory.
    ///
    /// With `save_session`, the script is sourced and the global environment
    /// saved to the session image afterwards. Files created or touched by the
    /// run are folded into the exports manifest.
    pub async fn run_script(
        &self,
        name: Option<&str>,
        args: &[String],
        timeout_secs: u64,
        save_session: bool,
    ) -> Result<ScriptRun> {
        let ws = self.workspace()?;
        let file = ws.script_name(name)?;
        let path = ws.guard.resolve(&file)?;
        if !path.is_file() {
            return Err(Error::FileNotFound(file));
        }

        let interpreter = self.runner.locate()?;
        let timeout = self.config.limits.clamp_timeout(timeout_secs);
        let args = if save_session {
            let code = format!(
                "source({}); save.image({})",
                r_string_literal(&file),
                r_string_literal(&ws.session_image())
            );
            interpreter.kind.expr_args(&code, args)
        } else {
            interpreter.kind.file_args(&command_line_path(&file), args)
        };

        let run_id = Uuid::new_v4().to_string();
        tracing::info!(run_id = %run_id, file = %file, save_session, "running script");

        let before = ws.snapshot()?;
        let output = self
            .runner
            .run(Invocation {
                interpreter,
                args,
                working_dir: ws.root.clone(),
                timeout,
            })
            .await?;
        let after = ws.snapshot()?;

        let changed = after.changed_since(&before);
        ws.store.update(|record| {
            record.last_run = Some(Utc::now());
            for name in &changed {
                if let Some(mtime) = after.get(name) {
                    record.exports_manifest.insert(name.clone(), epoch_seconds(mtime));
                }
            }
        })?;

        let session_image = ws.session_image();
        let session_saved = save_session && changed.iter().any(|n| *n == session_image);
        tracing::info!(
            run_id = %run_id,
            exit_code = output.exit_code,
            changed = changed.len(),
            "script finished"
        );

        Ok(ScriptRun {
            run_id,
            file,
            output,
            new_or_modified_files: changed,
            session_saved,
        })
    }

    /// Evaluates a one-off expression in a fresh interpreter.
    ///
    /// Expressions longer than [`MAX_INLINE_CODE`] bytes are staged in the
    /// state directory and run as a file.
    pub async fn run_expression(&self, expr: &str, timeout_secs: u64) -> Result<ExpressionRun> {
        let ws = self.workspace()?;
        if expr.trim().is_empty() {
            return Err(Error::InvalidArgument("expression cannot be empty".to_string()));
        }

        let interpreter = self.runner.locate()?;
        let staged = if expr.len() > MAX_INLINE_CODE {
            Some(RequestFile::create(
                &ws.root,
                Path::new(&ws.state_dir_name),
                expr,
            )?)
        } else {
            None
        };
        let args = match &staged {
            Some(staged) => interpreter.kind.file_args(staged.relative_path(), &[]),
            None => interpreter.kind.expr_args(expr, &[]),
        };
        let run_id = Uuid::new_v4().to_string();
        tracing::info!(run_id = %run_id, staged = staged.is_some(), "evaluating expression");

        let output = self
            .runner
            .run(Invocation {
                interpreter,
                args,
                working_dir: ws.root.clone(),
                timeout: self.config.limits.clamp_timeout(timeout_secs),
            })
            .await?;
        drop(staged);

        Ok(ExpressionRun { run_id, output })
    }

    /// Lists or renders objects from the last saved session.
    pub async fn inspect_objects(
        &self,
        names: &[String],
        detail_level: u32,
        timeout_secs: u64,
    ) -> Result<Inspection> {
        let ws = self.workspace()?;
        SessionInspector::new(&self.runner)
            .inspect(
                &ws.root,
                &ws.session_image(),
                names,
                detail_level,
                self.config.limits.clamp_timeout(timeout_secs),
            )
            .await
    }

    /// Reports the interpreter that would be used.
    pub fn which_interpreter(&self) -> Result<InterpreterInfo> {
        self.workspace()?;
        let interpreter = self.runner.locate()?;
        let alternatives = self
            .runner
            .locate_all()
            .into_iter()
            .map(|i| i.path)
            .collect();

        Ok(InterpreterInfo {
            executable: interpreter.path,
            kind: interpreter.kind,
            alternatives,
        })
    }
}

/// Keeps names starting with `-` from being read as options.
fn command_line_path(file: &str) -> String {
    if file.starts_with('-') {
        format!("./{}", file)
    } else {
        file.to_string()
    }
}
