//! Inspecting objects in a saved R session image.
//!
//! The interpreter is asked to restore the image and print each requested
//! object between marker lines. Markers carry a per-request nonce and the
//! object's index, so sections map back to requested names without parsing
//! name text out of interpreter output.
//!
//! The request grows with the number of names, so it is always run from a
//! staged file beside the session image rather than passed with `-e`.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::runner::{r_string_literal, Invocation, RequestFile, Runner};

const MARKER_OPEN: &str = "@@rwork:";
const MARKER_CLOSE: &str = "@@";

/// Rendering of one requested object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ObjectReport {
    /// `str()` output for the object.
    Found { text: String },
    /// No object by that name exists in the session.
    NotFound,
    /// The interpreter stopped before reaching this object.
    NoOutput,
}

/// Result of an inspection request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Inspection {
    /// Top-level names, in interpreter order. Filled when no names were requested.
    pub listed: Vec<String>,
    /// Per-object reports. Filled when names were requested.
    pub inspected: BTreeMap<String, ObjectReport>,
    pub exit_code: i32,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub stderr: String,
}

/// The generated R request and what is needed to parse its output.
#[derive(Debug, Clone)]
pub struct InspectRequest {
    nonce: String,
    names: Vec<String>,
    expression: String,
}

impl InspectRequest {
    /// Builds the request for `names` (deduplicated, order kept).
    ///
    /// `session_image` is the image path relative to the working directory.
    pub fn new(session_image: &str, names: &[String], detail_level: u32) -> Self {
        let nonce = uuid::Uuid::new_v4().simple().to_string()[..12].to_string();

        let mut unique: Vec<String> = Vec::new();
        for name in names {
            if !unique.contains(name) {
                unique.push(name.clone());
            }
        }

        let mut statements = vec![format!(
            "load({}, envir = .GlobalEnv)",
            r_string_literal(session_image)
        )];

        if unique.is_empty() {
            statements.push(cat_line(&listing_marker(&nonce)));
            statements.push("cat(ls(envir = .GlobalEnv), sep = \"\\n\")".to_string());
        }

        for (index, name) in unique.iter().enumerate() {
            // NUL cannot occur in an R name; such names are answered locally.
            if name.contains('\0') {
                continue;
            }
            let literal = r_string_literal(name);
            statements.push(cat_line(&object_marker(&nonce, index, name)));
            statements.push(format!(
                "if (exists({lit}, envir = .GlobalEnv, inherits = FALSE)) \
                 tryCatch(str(get({lit}, envir = .GlobalEnv), max.level = {level}), \
                 error = function(e) cat(\"<str failed: \", conditionMessage(e), \">\\n\", sep = \"\")) \
                 else {missing}",
                lit = literal,
                level = detail_level,
                missing = cat_line(&not_found_marker(&nonce)),
            ));
        }

        Self {
            nonce,
            names: unique,
            expression: statements.join("; "),
        }
    }

    /// The R expression to evaluate.
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// Whether this request lists names rather than rendering objects.
    pub fn is_listing(&self) -> bool {
        self.names.is_empty()
    }

    /// Names listed after the listing marker, in output order.
    pub fn parse_listing(&self, stdout: &str) -> Vec<String> {
        let marker = listing_marker(&self.nonce);
        stdout
            .lines()
            .skip_while(|line| line.trim_end() != marker)
            .skip(1)
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_owned)
            .collect()
    }

    /// Splits output into one report per requested name.
    ///
    /// Text before the first marker is discarded.
    pub fn parse_objects(&self, stdout: &str) -> BTreeMap<String, ObjectReport> {
        let object_prefix = format!("{}{}:object:", MARKER_OPEN, self.nonce);
        let not_found = not_found_marker(&self.nonce);

        let mut sections: BTreeMap<usize, Vec<&str>> = BTreeMap::new();
        let mut current: Option<usize> = None;
        for line in stdout.lines() {
            if let Some(index) = parse_marker_index(line.trim_end(), &object_prefix) {
                sections.entry(index).or_default();
                current = Some(index);
            } else if let Some(index) = current {
                sections.entry(index).or_default().push(line);
            }
        }

        self.names
            .iter()
            .enumerate()
            .map(|(index, name)| {
                let report = if name.contains('\0') {
                    ObjectReport::NotFound
                } else {
                    match sections.get(&index) {
                        None => ObjectReport::NoOutput,
                        Some(lines) => {
                            let text = lines.join("\n");
                            if text.trim() == not_found {
                                ObjectReport::NotFound
                            } else {
                                ObjectReport::Found {
                                    text: text.trim_end().to_string(),
                                }
                            }
                        }
                    }
                };
                (name.clone(), report)
            })
            .collect()
    }
}

/// Restores a session image through the interpreter and renders objects.
pub struct SessionInspector<'a> {
    runner: &'a dyn Runner,
}

impl<'a> SessionInspector<'a> {
    pub fn new(runner: &'a dyn Runner) -> Self {
        Self { runner }
    }

    /// Lists (empty `names`) or renders objects from the session image.
    ///
    /// `session_image` is relative to `working_dir`. The request file is
    /// staged in the image's directory and removed afterwards.
    pub async fn inspect(
        &self,
        working_dir: &Path,
        session_image: &str,
        names: &[String],
        detail_level: u32,
        timeout: Duration,
    ) -> Result<Inspection> {
        if !working_dir.join(session_image).is_file() {
            return Err(Error::NoSession);
        }

        let interpreter = self.runner.locate()?;
        let request = InspectRequest::new(session_image, names, detail_level);
        let staged_dir = Path::new(session_image).parent().unwrap_or(Path::new(""));
        let staged = RequestFile::create(working_dir, staged_dir, request.expression())?;
        let args = interpreter.kind.file_args(staged.relative_path(), &[]);

        tracing::debug!(objects = names.len(), detail_level, "inspecting session");

        let output = self
            .runner
            .run(Invocation {
                interpreter,
                args,
                working_dir: working_dir.to_path_buf(),
                timeout,
            })
            .await?;
        drop(staged);

        let (listed, inspected) = if request.is_listing() {
            (request.parse_listing(&output.stdout), BTreeMap::new())
        } else {
            (Vec::new(), request.parse_objects(&output.stdout))
        };

        Ok(Inspection {
            listed,
            inspected,
            exit_code: output.exit_code,
            stderr: output.stderr,
        })
    }
}

fn cat_line(text: &str) -> String {
    format!("cat({})", r_string_literal(&format!("\n{}\n", text)))
}

fn listing_marker(nonce: &str) -> String {
    format!("{}{}:listing{}", MARKER_OPEN, nonce, MARKER_CLOSE)
}

fn not_found_marker(nonce: &str) -> String {
    format!("{}{}:not-found{}", MARKER_OPEN, nonce, MARKER_CLOSE)
}

/// `@@rwork:<nonce>:object:<index>:<label>@@`. The label is for humans only.
fn object_marker(nonce: &str, index: usize, name: &str) -> String {
    let label: String = name
        .chars()
        .map(|c| if c.is_control() || c == '@' { '?' } else { c })
        .collect();
    format!(
        "{}{}:object:{}:{}{}",
        MARKER_OPEN, nonce, index, label, MARKER_CLOSE
    )
}

fn parse_marker_index(line: &str, prefix: &str) -> Option<usize> {
    let rest = line.strip_prefix(prefix)?;
    if !rest.ends_with(MARKER_CLOSE) {
        return None;
    }
    let (index, _) = rest.split_once(':')?;
    index.parse().ok()
}
