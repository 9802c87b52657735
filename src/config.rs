//! Agent configuration and validation.
//!
//! Configuration is read once at startup from a TOML file named by
//! `RWORK_CONFIG`. Every field has a default, so an empty file (or no file)
//! gives a working agent.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Environment variable naming the configuration file.
pub const CONFIG_ENV: &str = "RWORK_CONFIG";

/// Environment variable enabling debug logging.
pub const DEBUG_ENV: &str = "RWORK_DEBUG";

/// Interpreter lookup settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterpreterConfig {
    /// Executables to look for, in priority order.
    #[serde(default = "default_candidates")]
    pub candidates: Vec<String>,
}

fn default_candidates() -> Vec<String> {
    vec!["Rscript".to_string(), "R".to_string()]
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        Self {
            candidates: default_candidates(),
        }
    }
}

/// Workspace layout settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    /// Hidden directory under the root holding state and the session image.
    #[serde(default = "default_state_dir")]
    pub state_dir: String,
    /// Primary script created when a workspace is bound.
    #[serde(default = "default_primary_file")]
    pub primary_file: String,
}

fn default_state_dir() -> String {
    ".rwork".to_string()
}

fn default_primary_file() -> String {
    "agent.r".to_string()
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            state_dir: default_state_dir(),
            primary_file: default_primary_file(),
        }
    }
}

/// Defaults and ceilings applied to operation arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimitsConfig {
    #[serde(default = "default_script_timeout")]
    pub script_timeout_secs: u64,
    #[serde(default = "default_expression_timeout")]
    pub expression_timeout_secs: u64,
    #[serde(default = "default_expression_timeout")]
    pub inspect_timeout_secs: u64,
    /// Hard ceiling for any caller-supplied timeout.
    #[serde(default = "default_max_timeout")]
    pub max_timeout_secs: u64,
    #[serde(default = "default_read_max_bytes")]
    pub read_max_bytes: u64,
    #[serde(default = "default_list_limit")]
    pub list_limit: usize,
    #[serde(default = "default_preview_max_rows")]
    pub preview_max_rows: usize,
}

fn default_script_timeout() -> u64 {
    120
}

fn default_expression_timeout() -> u64 {
    60
}

fn default_max_timeout() -> u64 {
    3600
}

fn default_read_max_bytes() -> u64 {
    2_000_000
}

fn default_list_limit() -> usize {
    200
}

fn default_preview_max_rows() -> usize {
    50
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            script_timeout_secs: default_script_timeout(),
            expression_timeout_secs: default_expression_timeout(),
            inspect_timeout_secs: default_expression_timeout(),
            max_timeout_secs: default_max_timeout(),
            read_max_bytes: default_read_max_bytes(),
            list_limit: default_list_limit(),
            preview_max_rows: default_preview_max_rows(),
        }
    }
}

impl LimitsConfig {
    /// Converts a requested timeout into a duration capped at the ceiling.
    pub fn clamp_timeout(&self, secs: u64) -> Duration {
        Duration::from_secs(secs.clamp(1, self.max_timeout_secs.max(1)))
    }
}

/// Full agent configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub interpreter: InterpreterConfig,
    #[serde(default)]
    pub workspace: WorkspaceConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
}

impl Config {
    /// Parses configuration from TOML text.
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::Config(format!("invalid config: {}", e)))
    }

    /// Loads configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read {}: {}", path.display(), e)))?;
        Self::from_toml(&text)
    }

    /// Loads the file named by `RWORK_CONFIG`, or defaults when unset.
    pub fn from_env() -> Result<Self> {
        match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }
}

/// Returns true when `RWORK_DEBUG` asks for verbose logging.
pub fn debug_enabled() -> bool {
    std::env::var(DEBUG_ENV)
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// Validation result containing all found issues.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    /// List of validation errors (fatal).
    pub errors: Vec<String>,
    /// List of validation warnings (non-fatal).
    pub warnings: Vec<String>,
}

impl ValidationResult {
    /// Returns true if validation passed (no errors).
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Adds an error to the result.
    pub fn add_error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    /// Adds a warning to the result.
    pub fn add_warning(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }

    /// Merges another validation result into this one.
    pub fn merge(&mut self, other: ValidationResult) {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }

    /// Converts to a Result, failing if there are errors.
    pub fn into_result(self) -> Result<Vec<String>> {
        if self.is_valid() {
            Ok(self.warnings)
        } else {
            Err(Error::Config(self.errors.join("; ")))
        }
    }
}

/// Trait for validatable configuration types.
pub trait Validate {
    /// Validates the configuration and returns any issues found.
    fn validate(&self) -> ValidationResult;
}

impl Validate for InterpreterConfig {
    fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        if self.candidates.is_empty() {
            result.add_error("interpreter.candidates cannot be empty");
        }
        for candidate in &self.candidates {
            if candidate.trim().is_empty() {
                result.add_error("interpreter.candidates contains an empty entry");
            }
        }

        result
    }
}

impl Validate for WorkspaceConfig {
    fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        if !is_plain_name(&self.state_dir) {
            result.add_error(format!(
                "workspace.state_dir '{}' must be a single path component",
                self.state_dir
            ));
        } else if !self.state_dir.starts_with('.') {
            result.add_warning(format!(
                "workspace.state_dir '{}' is not hidden and will show up in listings",
                self.state_dir
            ));
        }

        if !is_plain_name(&self.primary_file) {
            result.add_error(format!(
                "workspace.primary_file '{}' must be a single path component",
                self.primary_file
            ));
        }

        result
    }
}

impl Validate for LimitsConfig {
    fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        if self.max_timeout_secs == 0 {
            result.add_error("limits.max_timeout_secs must be positive");
        }

        for (name, secs) in [
            ("script_timeout_secs", self.script_timeout_secs),
            ("expression_timeout_secs", self.expression_timeout_secs),
            ("inspect_timeout_secs", self.inspect_timeout_secs),
        ] {
            if secs == 0 {
                result.add_error(format!("limits.{} must be positive", name));
            } else if secs > self.max_timeout_secs {
                result.add_warning(format!(
                    "limits.{} exceeds max_timeout_secs and will be clamped",
                    name
                ));
            }
        }

        if self.read_max_bytes == 0 {
            result.add_error("limits.read_max_bytes must be positive");
        }

        result
    }
}

impl Validate for Config {
    fn validate(&self) -> ValidationResult {
        let mut result = self.interpreter.validate();
        result.merge(self.workspace.validate());
        result.merge(self.limits.validate());
        result
    }
}

fn is_plain_name(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(std::path::Component::Normal(_)), None)
    )
}
