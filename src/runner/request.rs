//! Staging generated R code in a file.
//!
//! Command-line arguments have a platform size limit, so long code is written
//! to a temporary file and run with [`InterpreterKind::file_args`]. The file
//! is removed when the [`RequestFile`] is dropped.
//!
//! [`InterpreterKind::file_args`]: super::InterpreterKind::file_args

use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::error::{Error, Result};

/// Prefix of staged request files.
pub const REQUEST_PREFIX: &str = "request.";

/// Suffix of staged request files. Snapshots skip it.
pub const REQUEST_SUFFIX: &str = ".tmp";

/// Longest code passed inline with `-e`.
///
/// Stays under the Windows command-line limit once the interpreter path and
/// other arguments are added.
pub const MAX_INLINE_CODE: usize = 4096;

/// R code written to a temporary file under the working directory.
#[derive(Debug)]
pub struct RequestFile {
    file: NamedTempFile,
    relative: String,
}

impl RequestFile {
    /// Writes `code` into `working_dir/dir`.
    ///
    /// `dir` is relative to `working_dir`; an empty `dir` means the working
    /// directory itself.
    pub fn create(working_dir: &Path, dir: &Path, code: &str) -> Result<Self> {
        let mut file = tempfile::Builder::new()
            .prefix(REQUEST_PREFIX)
            .suffix(REQUEST_SUFFIX)
            .tempfile_in(working_dir.join(dir))?;
        file.write_all(code.as_bytes())?;
        file.as_file().sync_all()?;

        let file_name = file
            .path()
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| Error::Internal("request file name is not valid UTF-8".to_string()))?
            .to_string();
        let relative = match dir.to_str() {
            Some("") => file_name,
            Some(dir) => format!("{}/{}", dir.trim_end_matches(['/', '\\']), file_name),
            None => {
                return Err(Error::Internal(
                    "request directory is not valid UTF-8".to_string(),
                ))
            }
        };

        tracing::debug!(file = %relative, bytes = code.len(), "staged request file");
        Ok(Self { file, relative })
    }

    /// Path relative to the working directory, `/`-separated.
    pub fn relative_path(&self) -> &str {
        &self.relative
    }

    pub fn path(&self) -> PathBuf {
        self.file.path().to_path_buf()
    }
}
