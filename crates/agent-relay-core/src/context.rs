//! Execution context for agent sessions.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Where a session's subprocess runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionContext {
    /// Working directory for the agent session.
    pub working_dir: PathBuf,
}

impl ExecutionContext {
    /// Create a new execution context with just a working directory.
    #[must_use]
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: working_dir.into(),
        }
    }

    /// Express `path` relative to the working directory when it lies under it.
    ///
    /// Relative paths and absolute paths outside the working directory are
    /// returned unchanged. The working directory itself becomes `"."`.
    #[must_use]
    pub fn relativize(&self, path: &str) -> String {
        relativize(path, &self.working_dir)
    }
}

/// Express `path` relative to `root` when it is absolute and lies under it.
#[must_use]
pub fn relativize(path: &str, root: &Path) -> String {
    let candidate = Path::new(path);
    if !candidate.is_absolute() {
        return path.to_string();
    }
    match candidate.strip_prefix(root) {
        Ok(rel) if rel.as_os_str().is_empty() => ".".to_string(),
        Ok(rel) => rel.to_string_lossy().into_owned(),
        Err(_) => path.to_string(),
    }
}
