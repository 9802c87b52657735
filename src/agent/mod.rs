//! The workspace orchestrator.
//!
//! [`Agent`] owns the bound workspace and composes the guard, state store,
//! snapshotter, runner and inspector into the operations callers use. Every
//! operation other than [`Agent::set_workspace`] first resolves the bound
//! workspace and fails with `NO_WORKSPACE` or `WORKSPACE_MISSING` before doing
//! anything else.

mod encoding;
mod execution;
mod exports;
mod files;
mod scaffold;
mod table;

pub use encoding::TextEncoding;
pub use execution::{ExpressionRun, InterpreterInfo, ScriptRun};
pub use exports::{ExportContent, ExportData, ExportEntry, ExportList, SortKey, TablePreview};
pub use files::{CodeWritten, FileCreated, FileRenamed, PrimaryFile, ScriptFiles};
pub use scaffold::SCAFFOLD;

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::runner::{ProcessRunner, Runner};
use crate::sandbox::{SandboxGuard, Snapshot};
use crate::state::{StateRecord, StateStore, STATE_FILE, TEMP_SUFFIX};

/// File name of the saved session image inside the state directory.
pub const SESSION_IMAGE: &str = "last_session.RData";

/// Result of binding a workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceInfo {
    pub workspace: PathBuf,
    pub created: bool,
    pub primary_file: String,
}

/// The state record as reported by `get_state`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateView {
    #[serde(flatten)]
    pub record: StateRecord,
    pub configured: bool,
    pub primary_file_exists: bool,
}

/// A bound workspace root and everything derived from it.
#[derive(Debug)]
pub struct BoundWorkspace {
    root: PathBuf,
    state_dir_name: String,
    state_dir: PathBuf,
    guard: SandboxGuard,
    store: StateStore,
    primary_file: Mutex<String>,
}

impl BoundWorkspace {
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    /// Current primary script name.
    pub fn primary_file(&self) -> Result<String> {
        self.primary_file
            .lock()
            .map(|p| p.clone())
            .map_err(|_| Error::Internal("primary file lock poisoned".to_string()))
    }

    fn set_primary_file(&self, name: &str) -> Result<()> {
        let mut primary = self
            .primary_file
            .lock()
            .map_err(|_| Error::Internal("primary file lock poisoned".to_string()))?;
        *primary = name.to_string();
        Ok(())
    }

    /// Session image path relative to the root, with `/` separators.
    pub fn session_image(&self) -> String {
        format!("{}/{}", self.state_dir_name, SESSION_IMAGE)
    }

    /// Normalizes a script name, defaulting to the primary file.
    fn script_name(&self, name: Option<&str>) -> Result<String> {
        match name {
            Some(name) => normalize_script_name(name),
            None => self.primary_file(),
        }
    }

    /// Top-level files plus the state directory's artifacts.
    fn snapshot(&self) -> Result<Snapshot> {
        let mut snapshot = Snapshot::capture(&self.root, "", |_| false)?;
        snapshot.extend(Snapshot::capture(
            &self.state_dir,
            &format!("{}/", self.state_dir_name),
            |name| name == STATE_FILE || name.ends_with(TEMP_SUFFIX),
        )?);
        Ok(snapshot)
    }
}

/// Appends the canonical `.r` extension unless the name already has one.
pub fn normalize_script_name(name: &str) -> Result<String> {
    if name.is_empty() {
        return Err(Error::InvalidArgument("file name cannot be empty".to_string()));
    }
    if name.ends_with(".r") || name.ends_with(".R") {
        Ok(name.to_string())
    } else {
        Ok(format!("{}.r", name))
    }
}

/// Orchestrates all workspace operations.
pub struct Agent<R: Runner = ProcessRunner> {
    config: Config,
    runner: R,
    bound: RwLock<Option<Arc<BoundWorkspace>>>,
}

impl Agent<ProcessRunner> {
    /// Creates an agent that runs the interpreter as a child process.
    pub fn new(config: Config) -> Self {
        let runner = ProcessRunner::new(config.interpreter.candidates.clone());
        Self::with_runner(config, runner)
    }
}

impl<R: Runner> Agent<R> {
    /// Creates an agent with a custom runner.
    pub fn with_runner(config: Config, runner: R) -> Self {
        Self {
            config,
            runner,
            bound: RwLock::new(None),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Returns the bound workspace, checking that its root still exists.
    pub fn workspace(&self) -> Result<Arc<BoundWorkspace>> {
        let bound = self
            .bound
            .read()
            .map_err(|_| Error::Internal("workspace lock poisoned".to_string()))?
            .clone()
            .ok_or(Error::NoWorkspace)?;
        if !bound.root.is_dir() {
            return Err(Error::WorkspaceMissing(bound.root.clone()));
        }
        Ok(bound)
    }

    /// Binds `path` as the workspace root, replacing any previous binding.
    ///
    /// Creates the directory when `create` is set, writes a fresh state record
    /// and creates the primary script from the scaffold if it is missing.
    pub fn set_workspace(&self, path: impl AsRef<Path>, create: bool) -> Result<WorkspaceInfo> {
        let requested = path.as_ref();
        let absolute = std::path::absolute(requested)?;

        let created = if absolute.exists() {
            if !absolute.is_dir() {
                return Err(Error::NotADirectory(absolute));
            }
            false
        } else if create {
            std::fs::create_dir_all(&absolute)?;
            true
        } else {
            return Err(Error::DirNotFound(absolute));
        };

        let root = absolute.canonicalize()?;
        let guard = SandboxGuard::new(&root)?;

        let state_dir_name = self.config.workspace.state_dir.clone();
        let state_dir = guard.resolve(&state_dir_name)?;
        std::fs::create_dir_all(&state_dir)?;
        if !guard.contains(&state_dir) {
            return Err(Error::UnsafePath(state_dir_name));
        }

        let primary_file = normalize_script_name(&self.config.workspace.primary_file)?;
        let store = StateStore::new(&state_dir);
        store.save(&StateRecord::fresh(root.clone(), primary_file.clone()))?;

        let primary_path = guard.resolve(&primary_file)?;
        if !primary_path.exists() {
            std::fs::write(&primary_path, SCAFFOLD)?;
            tracing::info!(path = ?primary_path, "created primary script");
        }

        let workspace = Arc::new(BoundWorkspace {
            root: root.clone(),
            state_dir_name,
            state_dir,
            guard,
            store,
            primary_file: Mutex::new(primary_file.clone()),
        });
        *self
            .bound
            .write()
            .map_err(|_| Error::Internal("workspace lock poisoned".to_string()))? = Some(workspace);

        tracing::info!(root = ?root, created, "workspace bound");

        Ok(WorkspaceInfo {
            workspace: root,
            created,
            primary_file,
        })
    }

    /// Returns the persisted state record plus derived flags.
    pub fn get_state(&self) -> Result<StateView> {
        let ws = self.workspace()?;
        let primary = ws.primary_file()?;

        let mut record = ws.store.load();
        if record.primary_file.is_none() {
            record.primary_file = Some(primary.clone());
        }
        if record.workspace.is_none() {
            record.workspace = Some(ws.root.clone());
        }

        let primary_file_exists = ws
            .guard
            .resolve(&primary)
            .map(|path| path.is_file())
            .unwrap_or(false);

        Ok(StateView {
            record,
            configured: true,
            primary_file_exists,
        })
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! A runner that never spawns anything, for exercising the agent.

    use std::path::PathBuf;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::error::{Error, Result};
    use crate::runner::{Interpreter, Invocation, RunOutput, Runner};

    type Effect = Box<dyn Fn(&Invocation) -> Result<RunOutput> + Send + Sync>;

    /// Records invocations and answers them with a scripted effect.
    pub struct FakeRunner {
        pub available: bool,
        pub calls: Mutex<Vec<Invocation>>,
        effect: Effect,
    }

    impl FakeRunner {
        pub fn new(effect: impl Fn(&Invocation) -> Result<RunOutput> + Send + Sync + 'static) -> Self {
            Self {
                available: true,
                calls: Mutex::new(Vec::new()),
                effect: Box::new(effect),
            }
        }

        pub fn succeeding() -> Self {
            Self::new(|_| Ok(output(0, "")))
        }

        pub fn missing() -> Self {
            Self {
                available: false,
                ..Self::succeeding()
            }
        }

        pub fn last_call(&self) -> Invocation {
            self.calls.lock().unwrap().last().cloned().expect("no calls recorded")
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    pub fn output(exit_code: i32, stdout: &str) -> RunOutput {
        RunOutput {
            exit_code,
            signal: None,
            success: exit_code == 0,
            stdout: stdout.to_string(),
            stderr: String::new(),
            duration_ms: 5,
        }
    }

    #[async_trait]
    impl Runner for FakeRunner {
        fn locate(&self) -> Result<Interpreter> {
            if self.available {
                Ok(Interpreter::new(PathBuf::from("/usr/bin/Rscript")))
            } else {
                Err(Error::InterpreterNotFound(vec!["Rscript".to_string()]))
            }
        }

        fn locate_all(&self) -> Vec<Interpreter> {
            self.locate().into_iter().collect()
        }

        async fn run(&self, invocation: Invocation) -> Result<RunOutput> {
            self.calls.lock().unwrap().push(invocation.clone());
            (self.effect)(&invocation)
        }

        fn name(&self) -> &str {
            "fake"
        }
    }
}
