//! Project-root discovery.
//!
//! Output locations are derived from a project root (see
//! `PipelineConfig::from_root`). The root is resolved, in order, from:
//!
//! 1. an explicit `--root`
//! 2. the `LMM_PROJECT_ROOT` environment variable (a `.env` file is honoured)
//! 3. the nearest ancestor of the working directory holding `data_cache/` or `.git`
//! 4. the working directory itself

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::AppError;

/// Environment variable naming the project root.
pub const ROOT_ENV: &str = "LMM_PROJECT_ROOT";

const ROOT_MARKERS: [&str; 2] = ["data_cache", ".git"];

/// Walk up from `start` looking for a directory containing a root marker.
pub fn find_project_root(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| ROOT_MARKERS.iter().any(|m| dir.join(m).exists()))
        .map(Path::to_path_buf)
}

/// Resolve the project root used for default paths.
pub fn resolve_root(explicit: Option<&Path>) -> Result<PathBuf, AppError> {
    if let Some(root) = explicit {
        return Ok(root.to_path_buf());
    }

    if let Ok(root) = std::env::var(ROOT_ENV) {
        if !root.trim().is_empty() {
            debug!("Project root from {ROOT_ENV}: {root}");
            return Ok(PathBuf::from(root));
        }
    }

    let cwd = std::env::current_dir()
        .map_err(|e| AppError::config(format!("Failed to read the working directory: {e}")))?;
    match find_project_root(&cwd) {
        Some(root) => {
            debug!("Project root discovered at {}", root.display());
            Ok(root)
        }
        None => Ok(cwd),
    }
}

/// Create the parent directory of an output file if it is missing.
pub fn ensure_parent_dir(path: &Path) -> Result<(), AppError> {
    match path.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(parent) => std::fs::create_dir_all(parent).map_err(|e| {
            AppError::io(format!("Failed to create directory '{}': {e}", parent.display()))
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_nearest_ancestor_with_data_cache() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("proj");
        let nested = root.join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::create_dir_all(root.join("data_cache")).unwrap();

        assert_eq!(find_project_root(&nested), Some(root));
    }

    #[test]
    fn explicit_root_wins() {
        let root = resolve_root(Some(Path::new("/explicit"))).unwrap();
        assert_eq!(root, Path::new("/explicit"));
    }

    #[test]
    fn parent_directories_are_created() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("x").join("y").join("out.csv");
        ensure_parent_dir(&file).unwrap();
        assert!(file.parent().unwrap().is_dir());
        ensure_parent_dir(Path::new("bare.csv")).unwrap();
    }
}
