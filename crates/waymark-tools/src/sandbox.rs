use std::path::{Path, PathBuf};

/// A per-session workspace directory. Every filesystem-touching tool resolves
/// relative paths against this root and rejects anything that escapes it.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SandboxError {
    #[error("path `{0}` escapes the session workspace")]
    Escape(String),
    #[error("path `{0}` does not exist")]
    NotFound(String),
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves `relative` against the workspace root and rejects escapes
    /// without requiring the path to already exist (for writes).
    pub fn resolve_for_write(&self, relative: &str) -> Result<PathBuf, SandboxError> {
        let candidate = self.root.join(relative);
        let normalized = normalize(&candidate);
        let normalized_root = normalize(&self.root);
        if !normalized.starts_with(&normalized_root) {
            return Err(SandboxError::Escape(relative.to_string()));
        }
        Ok(candidate)
    }

    /// Resolves and requires the path to exist (for reads).
    pub fn resolve_for_read(&self, relative: &str) -> Result<PathBuf, SandboxError> {
        let path = self.resolve_for_write(relative)?;
        if !path.exists() {
            return Err(SandboxError::NotFound(relative.to_string()));
        }
        Ok(path)
    }
}

/// Lexical normalization (no symlink resolution needed since the sandbox only
/// ever joins against a trusted root and rejects `..` escapes by prefix check).
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            std::path::Component::ParentDir => {
                out.pop();
            }
            std::path::Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_parent_dir_escape() {
        let ws = Workspace::new("/tmp/session-a");
        let err = ws.resolve_for_write("../session-b/secret.txt").unwrap_err();
        assert_eq!(err, SandboxError::Escape("../session-b/secret.txt".to_string()));
    }

    #[test]
    fn allows_nested_relative_path() {
        let ws = Workspace::new("/tmp/session-a");
        let resolved = ws.resolve_for_write("notes/plan.md").unwrap();
        assert_eq!(resolved, PathBuf::from("/tmp/session-a/notes/plan.md"));
    }
}
