//! Path containment for the workspace root.

use std::path::{Component, Path, PathBuf};

use crate::error::{Error, Result};

/// Decides whether candidate paths stay inside the workspace root.
///
/// Paths are resolved the way the filesystem would resolve them: symlinks are
/// followed and `..` segments collapsed before the prefix check. Anything that
/// cannot be resolved unambiguously is treated as outside the root.
#[derive(Debug, Clone, Default)]
pub struct SandboxGuard {
    /// Canonical root. `None` means no workspace is bound.
    root: Option<PathBuf>,
}

impl SandboxGuard {
    /// Creates a guard for `root`, canonicalizing it.
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().canonicalize()?;
        Ok(Self { root: Some(root) })
    }

    /// Creates a guard with no root. It rejects every path.
    pub fn unbound() -> Self {
        Self { root: None }
    }

    /// Returns the canonical root, if any.
    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    /// Returns true if `path` resolves to the root or a descendant of it.
    pub fn contains(&self, path: &Path) -> bool {
        let Some(root) = &self.root else {
            return false;
        };
        match resolve(path) {
            Some(resolved) => resolved.starts_with(root),
            None => false,
        }
    }

    /// Joins `name` onto the root and checks containment.
    ///
    /// The returned path is the joined (not resolved) path, which is what the
    /// caller should operate on.
    pub fn resolve(&self, name: &str) -> Result<PathBuf> {
        let root = self.root.as_ref().ok_or(Error::NoWorkspace)?;
        let candidate = root.join(name);
        if self.contains(&candidate) {
            Ok(candidate)
        } else {
            tracing::warn!(name = %name, "rejected path outside workspace");
            Err(Error::UnsafePath(name.to_string()))
        }
    }
}

/// Resolves `path` to an absolute canonical form without requiring it to exist.
fn resolve(path: &Path) -> Option<PathBuf> {
    if let Ok(canonical) = path.canonicalize() {
        return Some(canonical);
    }

    // Exists but cannot be canonicalized: a dangling or looping symlink.
    if path.symlink_metadata().is_ok() {
        return None;
    }

    let file_name = match path.components().next_back()? {
        Component::Normal(name) => name.to_owned(),
        _ => return None,
    };
    let parent = path.parent()?;
    let parent = if parent.as_os_str().is_empty() {
        Path::new(".")
    } else {
        parent
    };
    let canonical_parent = parent.canonicalize().ok()?;
    Some(canonical_parent.join(file_name))
}
