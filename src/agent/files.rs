//! Script file management.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::runner::Runner;

use super::{normalize_script_name, Agent, SCAFFOLD};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileCreated {
    pub file: String,
    pub overwritten: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRenamed {
    pub old_name: String,
    pub new_name: String,
    /// Whether the primary file pointer followed the rename.
    pub primary_file_updated: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrimaryFile {
    pub primary_file: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeWritten {
    pub file: String,
    pub bytes_written: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptFiles {
    pub files: Vec<String>,
    pub primary_file: String,
}

impl<R: Runner> Agent<R> {
    /// Creates a script file, optionally seeded with the scaffold.
    pub fn create_file(&self, name: &str, overwrite: bool, scaffold: bool) -> Result<FileCreated> {
        let ws = self.workspace()?;
        let file = normalize_script_name(name)?;
        let path = ws.guard.resolve(&file)?;

        let existed = path.exists();
        if existed && !overwrite {
            return Err(Error::FileExists(file));
        }

        let content = if scaffold { SCAFFOLD } else { "" };
        fs::write(&path, content)?;
        tracing::info!(file = %file, overwritten = existed, "created script file");

        Ok(FileCreated {
            file,
            overwritten: existed,
        })
    }

    /// Renames a script file. The primary pointer follows the file.
    pub fn rename_file(&self, old_name: &str, new_name: &str, overwrite: bool) -> Result<FileRenamed> {
        let ws = self.workspace()?;
        let old = normalize_script_name(old_name)?;
        let new = normalize_script_name(new_name)?;
        let old_path = ws.guard.resolve(&old)?;
        let new_path = ws.guard.resolve(&new)?;

        if !old_path.is_file() {
            return Err(Error::FileNotFound(old));
        }

        let primary = ws.primary_file()?;
        if old == new {
            return Ok(FileRenamed {
                old_name: old,
                new_name: new,
                primary_file_updated: false,
            });
        }

        if new_path.exists() {
            if !overwrite {
                return Err(Error::FileExists(new));
            }
            // rename() replaces the target on unix but not on windows.
            #[cfg(windows)]
            fs::remove_file(&new_path)?;
        }
        fs::rename(&old_path, &new_path)?;
        tracing::info!(from = %old, to = %new, "renamed script file");

        let primary_file_updated = primary == old;
        if primary_file_updated {
            ws.store.update(|record| record.primary_file = Some(new.clone()))?;
            ws.set_primary_file(&new)?;
        }

        Ok(FileRenamed {
            old_name: old,
            new_name: new,
            primary_file_updated,
        })
    }

    /// Points the primary file at an existing script.
    pub fn set_primary_file(&self, name: &str) -> Result<PrimaryFile> {
        let ws = self.workspace()?;
        let file = normalize_script_name(name)?;
        let path = ws.guard.resolve(&file)?;

        if !path.is_file() {
            return Err(Error::FileNotFound(file));
        }

        ws.store.update(|record| record.primary_file = Some(file.clone()))?;
        ws.set_primary_file(&file)?;
        tracing::info!(file = %file, "primary file set");

        Ok(PrimaryFile { primary_file: file })
    }

    /// Appends code to an existing script.
    ///
    /// With `ensure_trailing_newline`, a newline is inserted first when the
    /// existing content does not end with one. The code itself is written
    /// as given.
    pub fn append_code(
        &self,
        code: &str,
        name: Option<&str>,
        ensure_trailing_newline: bool,
    ) -> Result<CodeWritten> {
        let ws = self.workspace()?;
        let file = ws.script_name(name)?;
        let path = ws.guard.resolve(&file)?;
        if !path.is_file() {
            return Err(Error::FileNotFound(file));
        }

        let mut payload = String::with_capacity(code.len() + 1);
        if ensure_trailing_newline && !ends_with_newline(&path)? {
            payload.push('\n');
        }
        payload.push_str(code);

        let mut handle = OpenOptions::new().append(true).open(&path)?;
        handle.write_all(payload.as_bytes())?;
        tracing::debug!(file = %file, bytes = payload.len(), "appended code");

        Ok(CodeWritten {
            file,
            bytes_written: payload.len() as u64,
        })
    }

    /// Writes a whole script. Non-empty code can be prefixed with the scaffold.
    pub fn write_code(
        &self,
        code: &str,
        name: Option<&str>,
        overwrite: bool,
        use_scaffold_header: bool,
    ) -> Result<CodeWritten> {
        let ws = self.workspace()?;
        let file = ws.script_name(name)?;
        let path = ws.guard.resolve(&file)?;

        if path.exists() && !overwrite {
            return Err(Error::FileExists(file));
        }

        let content = if use_scaffold_header && !code.is_empty() {
            format!("{}{}", SCAFFOLD, code)
        } else {
            code.to_string()
        };
        fs::write(&path, &content)?;
        tracing::debug!(file = %file, bytes = content.len(), "wrote code");

        Ok(CodeWritten {
            file,
            bytes_written: content.len() as u64,
        })
    }

    /// Lists top-level `.r`/`.R` files, sorted by name.
    pub fn list_script_files(&self) -> Result<ScriptFiles> {
        let ws = self.workspace()?;
        let mut files = Vec::new();

        for entry in fs::read_dir(&ws.root)? {
            let entry = entry?;
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if !(name.ends_with(".r") || name.ends_with(".R")) {
                continue;
            }
            let path = entry.path();
            if path.is_file() && ws.guard.contains(&path) {
                files.push(name);
            }
        }
        files.sort();

        Ok(ScriptFiles {
            files,
            primary_file: ws.primary_file()?,
        })
    }
}

/// True for empty files and files whose last byte is `\n`.
fn ends_with_newline(path: &Path) -> Result<bool> {
    let mut handle = File::open(path)?;
    if handle.metadata()?.len() == 0 {
        return Ok(true);
    }
    handle.seek(SeekFrom::End(-1))?;
    let mut last = [0u8; 1];
    handle.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}
