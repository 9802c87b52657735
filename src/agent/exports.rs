//! Listing and reading files produced in the workspace.

use std::cmp::Ordering;
use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::{Component, Path};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::runner::Runner;
use crate::sandbox::epoch_seconds;

use super::table::RecordReader;
use super::{Agent, TextEncoding};

/// Extensions treated as text by `is_text_guess`.
const TEXT_EXTENSIONS: &[&str] = &[
    "r", "txt", "csv", "tsv", "json", "xml", "html", "md", "log", "yaml", "yml",
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortKey {
    #[default]
    Mtime,
    Size,
    Name,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportEntry {
    /// Path relative to the workspace root, `/`-separated.
    pub name: String,
    pub size: u64,
    /// Seconds since the epoch.
    pub mtime: f64,
    pub is_text_guess: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportList {
    pub files: Vec<ExportEntry>,
    /// Matches before `limit` was applied.
    pub total_matched: usize,
}

/// File content, as text or base64.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExportData {
    Text { text: String, encoding: String },
    Binary { data_b64: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportContent {
    pub name: String,
    #[serde(flatten)]
    pub data: ExportData,
    pub size: u64,
    pub bytes_read: u64,
    pub truncated: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TablePreview {
    pub name: String,
    pub delimiter: String,
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
    pub row_count_returned: usize,
}

impl<R: Runner> Agent<R> {
    /// Lists workspace files matching a glob pattern.
    ///
    /// The state directory is hidden unless the pattern names it.
    pub fn list_exports(
        &self,
        pattern: &str,
        sort_by: SortKey,
        descending: bool,
        limit: usize,
    ) -> Result<ExportList> {
        let ws = self.workspace()?;
        check_pattern(pattern)?;

        let root_str = ws
            .root
            .to_str()
            .ok_or_else(|| Error::Internal("workspace path is not valid UTF-8".to_string()))?;
        let full = format!(
            "{}/{}",
            glob::Pattern::escape(root_str),
            pattern.trim_start_matches("./")
        );
        let show_state = pattern.contains(ws.state_dir_name.as_str());

        let paths = glob::glob(&full)
            .map_err(|e| Error::InvalidArgument(format!("invalid pattern {:?}: {}", pattern, e)))?;

        let mut files = Vec::new();
        for path in paths {
            let path = match path {
                Ok(path) => path,
                Err(e) => {
                    tracing::debug!(error = %e, "skipping unreadable glob entry");
                    continue;
                }
            };
            if !ws.guard.contains(&path) {
                continue;
            }
            let Ok(metadata) = fs::metadata(&path) else {
                continue;
            };
            if !metadata.is_file() {
                continue;
            }
            let Some(name) = relative_name(&ws.root, &path) else {
                continue;
            };
            if !show_state && name.split('/').next() == Some(ws.state_dir_name.as_str()) {
                continue;
            }

            files.push(ExportEntry {
                is_text_guess: is_text_guess(&name),
                size: metadata.len(),
                mtime: metadata.modified().map(epoch_seconds).unwrap_or(0.0),
                name,
            });
        }

        // Names read A to Z under the default `descending = true`.
        let reverse = match sort_by {
            SortKey::Name => !descending,
            SortKey::Mtime | SortKey::Size => descending,
        };
        files.sort_by(|a, b| {
            let ordering = compare(a, b, sort_by);
            if reverse {
                ordering.reverse()
            } else {
                ordering
            }
        });
        let total_matched = files.len();
        files.truncate(limit);

        tracing::debug!(pattern = %pattern, total_matched, "listed exports");
        Ok(ExportList {
            files,
            total_matched,
        })
    }

    /// Reads up to `max_bytes` of a workspace file.
    pub fn read_export(
        &self,
        name: &str,
        max_bytes: u64,
        as_text: bool,
        encoding: &str,
    ) -> Result<ExportContent> {
        let ws = self.workspace()?;
        let path = ws.guard.resolve(name)?;
        let encoding = if as_text {
            Some(encoding.parse::<TextEncoding>()?)
        } else {
            None
        };
        if !path.is_file() {
            return Err(Error::FileNotFound(name.to_string()));
        }

        let file = File::open(&path)?;
        let size = file.metadata()?.len();
        let mut bytes = Vec::new();
        file.take(max_bytes).read_to_end(&mut bytes)?;
        let truncated = size > bytes.len() as u64;

        let data = match encoding {
            Some(encoding) => ExportData::Text {
                text: encoding.decode(&bytes, truncated)?,
                encoding: encoding.label().to_string(),
            },
            None => ExportData::Binary {
                data_b64: STANDARD.encode(&bytes),
            },
        };

        Ok(ExportContent {
            name: name.to_string(),
            data,
            size,
            bytes_read: bytes.len() as u64,
            truncated,
        })
    }

    /// Parses the first rows of a delimited file.
    ///
    /// `.tsv` files are always read with tab. Other files use `delimiter`,
    /// or comma when none is given.
    pub fn preview_table(
        &self,
        name: &str,
        delimiter: Option<&str>,
        max_rows: usize,
    ) -> Result<TablePreview> {
        let ws = self.workspace()?;
        let path = ws.guard.resolve(name)?;
        let delimiter = if name.to_ascii_lowercase().ends_with(".tsv") {
            '\t'
        } else {
            match delimiter {
                Some(d) => single_char(d)?,
                None => ',',
            }
        };
        if !path.is_file() {
            return Err(Error::FileNotFound(name.to_string()));
        }

        let mut reader = RecordReader::new(BufReader::new(File::open(&path)?), delimiter);
        let header = reader.next_record()?.unwrap_or_default();
        let mut rows = Vec::new();
        while rows.len() < max_rows {
            match reader.next_record()? {
                Some(row) => rows.push(row),
                None => break,
            }
        }

        Ok(TablePreview {
            name: name.to_string(),
            delimiter: delimiter.to_string(),
            header,
            row_count_returned: rows.len(),
            rows,
        })
    }
}

/// Rejects absolute patterns and patterns with `..` segments.
fn check_pattern(pattern: &str) -> Result<()> {
    if pattern.is_empty() {
        return Err(Error::InvalidArgument("pattern cannot be empty".to_string()));
    }
    let escapes = Path::new(pattern)
        .components()
        .any(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)))
        || pattern.split(['/', '\\']).any(|segment| segment == "..");
    if escapes {
        tracing::warn!(pattern = %pattern, "rejected pattern outside workspace");
        return Err(Error::UnsafePath(pattern.to_string()));
    }
    Ok(())
}

fn relative_name(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Option<Vec<&str>> = relative.components().map(|c| c.as_os_str().to_str()).collect();
    Some(parts?.join("/"))
}

fn is_text_guess(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| TEXT_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}

fn compare(a: &ExportEntry, b: &ExportEntry, key: SortKey) -> Ordering {
    let primary = match key {
        SortKey::Mtime => a.mtime.total_cmp(&b.mtime),
        SortKey::Size => a.size.cmp(&b.size),
        SortKey::Name => Ordering::Equal,
    };
    primary.then_with(|| a.name.cmp(&b.name))
}

fn single_char(delimiter: &str) -> Result<char> {
    let mut chars = delimiter.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if c != '"' && c != '\n' && c != '\r' => Ok(c),
        _ => Err(Error::InvalidArgument(format!(
            "delimiter must be a single character, got {:?}",
            delimiter
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::FakeRunner;
    use super::*;
    use crate::config::Config;
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;

    fn bound() -> (TempDir, Agent<FakeRunner>) {
        let dir = TempDir::new().unwrap();
        let agent = Agent::with_runner(Config::default(), FakeRunner::succeeding());
        agent.set_workspace(dir.path(), false).unwrap();
        (dir, agent)
    }

    fn write_aged(dir: &TempDir, name: &str, content: &[u8], age_secs: u64) {
        let path = dir.path().join(name);
        fs::write(&path, content).unwrap();
        let mtime = SystemTime::now() - Duration::from_secs(age_secs);
        File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(mtime)
            .unwrap();
    }

    fn names(list: &ExportList) -> Vec<&str> {
        list.files.iter().map(|f| f.name.as_str()).collect()
    }

    #[test]
    fn lists_newest_first_by_default() {
        let (dir, agent) = bound();
        write_aged(&dir, "old.csv", b"a", 300);
        write_aged(&dir, "new.csv", b"a", 10);
        write_aged(&dir, "mid.csv", b"a", 100);

        let list = agent.list_exports("*.csv", SortKey::Mtime, true, 200).unwrap();

        assert_eq!(names(&list), vec!["new.csv", "mid.csv", "old.csv"]);
        assert_eq!(list.total_matched, 3);
        assert!(list.files.iter().all(|f| f.is_text_guess));
    }

    #[test]
    fn name_sort_is_alphabetical_by_default() {
        let (dir, agent) = bound();
        write_aged(&dir, "b.bin", b"12345", 0);
        write_aged(&dir, "a.bin", b"1", 0);
        write_aged(&dir, "c.bin", b"123", 0);

        let by_name = agent.list_exports("*.bin", SortKey::Name, true, 10).unwrap();
        assert_eq!(names(&by_name), vec!["a.bin", "b.bin", "c.bin"]);

        let by_name_flipped = agent.list_exports("*.bin", SortKey::Name, false, 10).unwrap();
        assert_eq!(names(&by_name_flipped), vec!["c.bin", "b.bin", "a.bin"]);

        let by_size = agent.list_exports("*.bin", SortKey::Size, true, 2).unwrap();
        assert_eq!(names(&by_size), vec!["b.bin", "c.bin"]);
        assert_eq!(by_size.total_matched, 3);
        assert!(!by_size.files[0].is_text_guess);
    }

    #[test]
    fn state_directory_hidden_unless_named() {
        let (dir, agent) = bound();
        fs::write(dir.path().join(".rwork").join("last_session.RData"), b"x").unwrap();

        let all = agent.list_exports("**/*", SortKey::Name, false, 100).unwrap();
        assert!(names(&all).iter().all(|n| !n.starts_with(".rwork")));

        let state = agent.list_exports(".rwork/*", SortKey::Name, false, 100).unwrap();
        assert!(names(&state).contains(&".rwork/last_session.RData"));
    }

    #[test]
    fn subdirectory_patterns_and_escapes() {
        let (dir, agent) = bound();
        fs::create_dir(dir.path().join("out")).unwrap();
        fs::write(dir.path().join("out").join("plot.png"), b"\x89PNG").unwrap();

        let list = agent.list_exports("out/*.png", SortKey::Name, false, 10).unwrap();
        assert_eq!(names(&list), vec!["out/plot.png"]);

        for bad in ["../*", "/etc/*", "out/../../*"] {
            assert!(
                matches!(
                    agent.list_exports(bad, SortKey::Name, false, 10),
                    Err(Error::UnsafePath(_))
                ),
                "{} was accepted",
                bad
            );
        }
    }

    #[cfg(unix)]
    #[test]
    fn symlinks_leaving_the_workspace_are_not_listed() {
        let (dir, agent) = bound();
        let outside = TempDir::new().unwrap();
        fs::write(outside.path().join("secret.txt"), "s").unwrap();
        std::os::unix::fs::symlink(outside.path().join("secret.txt"), dir.path().join("link.txt"))
            .unwrap();

        let list = agent.list_exports("*.txt", SortKey::Name, false, 10).unwrap();

        assert!(list.files.is_empty());
    }

    #[test]
    fn read_text_and_truncation() {
        let (dir, agent) = bound();
        fs::write(dir.path().join("out.txt"), "hello world").unwrap();

        let full = agent.read_export("out.txt", 1000, true, "utf-8").unwrap();
        assert_eq!(
            full.data,
            ExportData::Text {
                text: "hello world".to_string(),
                encoding: "utf-8".to_string()
            }
        );
        assert!(!full.truncated);

        let cut = agent.read_export("out.txt", 5, true, "utf-8").unwrap();
        assert!(cut.truncated);
        assert_eq!(cut.size, 11);
        assert_eq!(cut.bytes_read, 5);
    }

    #[test]
    fn read_binary_as_base64() {
        let (dir, agent) = bound();
        fs::write(dir.path().join("blob.bin"), [0u8, 159, 146, 150]).unwrap();

        let content = agent.read_export("blob.bin", 100, false, "utf-8").unwrap();

        assert_eq!(
            content.data,
            ExportData::Binary {
                data_b64: "AJ+Slg==".to_string()
            }
        );
    }

    #[test]
    fn read_errors() {
        let (dir, agent) = bound();
        fs::write(dir.path().join("bad.txt"), [0x61, 0xff]).unwrap();

        assert!(matches!(
            agent.read_export("bad.txt", 100, true, "utf-8"),
            Err(Error::Decode { .. })
        ));
        assert!(matches!(
            agent.read_export("bad.txt", 100, true, "ebcdic"),
            Err(Error::Decode { .. })
        ));
        assert!(matches!(
            agent.read_export("nothing.txt", 100, true, "utf-8"),
            Err(Error::FileNotFound(_))
        ));
        assert!(matches!(
            agent.read_export("../x", 100, true, "utf-8"),
            Err(Error::UnsafePath(_))
        ));
        assert_eq!(
            agent.read_export("bad.txt", 100, true, "latin-1").unwrap().data,
            ExportData::Text {
                text: "aÿ".to_string(),
                encoding: "latin-1".to_string()
            }
        );
    }

    #[test]
    fn preview_csv_with_row_limit() {
        let (dir, agent) = bound();
        fs::write(dir.path().join("t.csv"), "x,y\n1,2\n3,4\n5,6\n").unwrap();

        let preview = agent.preview_table("t.csv", None, 2).unwrap();

        assert_eq!(preview.header, vec!["x", "y"]);
        assert_eq!(preview.rows, vec![vec!["1", "2"], vec!["3", "4"]]);
        assert_eq!(preview.row_count_returned, 2);
        assert_eq!(preview.delimiter, ",");
    }

    #[test]
    fn preview_tsv_and_explicit_delimiter() {
        let (dir, agent) = bound();
        fs::write(dir.path().join("t.tsv"), "a\tb\n1\t2\n").unwrap();
        fs::write(dir.path().join("s.txt"), "a;b\n1;2\n").unwrap();

        assert_eq!(agent.preview_table("t.tsv", None, 10).unwrap().header, vec!["a", "b"]);
        assert_eq!(
            agent.preview_table("s.txt", Some(";"), 10).unwrap().rows,
            vec![vec!["1", "2"]]
        );
        assert!(matches!(
            agent.preview_table("s.txt", Some(";;"), 10),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn tsv_ignores_explicit_delimiter() {
        let (dir, agent) = bound();
        fs::write(dir.path().join("T.TSV"), "a\tb;c\n1\t2;3\n").unwrap();

        let preview = agent.preview_table("T.TSV", Some(";"), 10).unwrap();

        assert_eq!(preview.delimiter, "\t");
        assert_eq!(preview.header, vec!["a", "b;c"]);
        assert_eq!(preview.rows, vec![vec!["1", "2;3"]]);
        assert_eq!(
            agent.preview_table("T.TSV", Some(";;"), 10).unwrap().delimiter,
            "\t"
        );
    }

    #[test]
    fn unsafe_names_rejected_before_argument_checks() {
        let (_dir, agent) = bound();

        assert!(matches!(
            agent.read_export("../../etc/passwd", 100, true, "klingon"),
            Err(Error::UnsafePath(_))
        ));
        assert!(matches!(
            agent.preview_table("../../etc/passwd", Some(";;"), 10),
            Err(Error::UnsafePath(_))
        ));
        assert!(matches!(
            agent.preview_table("/etc/passwd", Some(""), 10),
            Err(Error::UnsafePath(_))
        ));
    }

    #[test]
    fn preview_empty_file() {
        let (dir, agent) = bound();
        fs::write(dir.path().join("empty.csv"), "").unwrap();

        let preview = agent.preview_table("empty.csv", None, 10).unwrap();

        assert!(preview.header.is_empty());
        assert!(preview.rows.is_empty());
    }
}
