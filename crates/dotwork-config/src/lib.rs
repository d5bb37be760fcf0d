//! Configuration for the dot-work issue tracker.
//!
//! Covers `.work/` directory discovery, store path resolution with
//! environment overrides, `config.yaml` loading, and logging bootstrap.

pub mod config;
pub mod logging;
pub mod work_dir;

pub use config::{ConfigError, WorkConfig};
pub use work_dir::{ensure_work_dir, find_work_dir, issues_db_path, kg_db_path};
