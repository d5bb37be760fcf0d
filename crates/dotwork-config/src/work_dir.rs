//! Discovery and management of the `.work/` directory.
//!
//! The `.work/` directory is the root of a project's tracker metadata. This
//! module finds it by walking up the directory tree and resolves store file
//! paths, honouring the environment overrides.

use std::path::{Path, PathBuf};

use crate::config::ConfigError;

/// The name of the metadata directory.
const WORK_DIR_NAME: &str = ".work";

/// Overrides the issue store path.
pub const DB_ISSUES_PATH_ENV: &str = "DOT_WORK_DB_ISSUES_PATH";

/// Overrides the knowledge-graph store path.
pub const KG_DB_PATH_ENV: &str = "DOT_WORK_KG_DB_PATH";

/// Default issue store location relative to `.work/`.
const ISSUES_DB_REL: &str = "db-issues/issues.db";

/// Default knowledge-graph store location relative to `.work/`.
const KG_DB_REL: &str = "kg/graph.db";

/// Walk up the directory tree from `start` looking for a `.work/` directory.
///
/// Returns `None` if the filesystem root is reached without finding one.
pub fn find_work_dir(start: &Path) -> Option<PathBuf> {
    let start = start.canonicalize().ok()?;

    let mut current = start.as_path();
    loop {
        let candidate = current.join(WORK_DIR_NAME);
        if candidate.is_dir() {
            return Some(candidate);
        }
        match current.parent() {
            Some(parent) if parent != current => current = parent,
            _ => break, // Reached filesystem root.
        }
    }
    None
}

/// Ensure a `.work/` directory exists at the given path.
///
/// If `path` itself is not called `.work`, a `.work/` subdirectory is created
/// under it. Returns the path to the `.work/` directory.
pub fn ensure_work_dir(path: &Path) -> Result<PathBuf, ConfigError> {
    let work_dir = if path.ends_with(WORK_DIR_NAME) {
        path.to_path_buf()
    } else {
        path.join(WORK_DIR_NAME)
    };

    std::fs::create_dir_all(&work_dir)?;
    Ok(work_dir)
}

/// Resolves the issue store file path for the given `.work/` directory.
///
/// `DOT_WORK_DB_ISSUES_PATH` takes priority over the default
/// `.work/db-issues/issues.db`.
pub fn issues_db_path(work_dir: &Path) -> PathBuf {
    if let Ok(override_path) = std::env::var(DB_ISSUES_PATH_ENV) {
        if !override_path.is_empty() {
            return PathBuf::from(override_path);
        }
    }
    work_dir.join(ISSUES_DB_REL)
}

/// Resolves the knowledge-graph store file path (the optional sibling
/// store). `DOT_WORK_KG_DB_PATH` takes priority over `.work/kg/graph.db`.
pub fn kg_db_path(work_dir: &Path) -> PathBuf {
    if let Ok(override_path) = std::env::var(KG_DB_PATH_ENV) {
        if !override_path.is_empty() {
            return PathBuf::from(override_path);
        }
    }
    work_dir.join(KG_DB_REL)
}
