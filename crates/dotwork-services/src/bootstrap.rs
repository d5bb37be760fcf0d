//! Wires configuration into a ready-to-use store and service plumbing.
//!
//! Adapters call [`open_workspace`] from any directory inside a project:
//! it discovers `.work/`, loads `config.yaml`, initializes logging, and
//! opens the issue store at its configured path.

use std::path::Path;
use std::time::Duration;

use dotwork_config::{issues_db_path, logging, WorkConfig};
use dotwork_core::id::IdGenerator;
use dotwork_storage::{Store, StoreOptions};

use crate::error::{Result, ServiceError};
use crate::scope::ScopeCache;

/// Everything an adapter needs to start serving requests.
#[derive(Debug)]
pub struct Workspace {
    pub store: Store,
    pub config: WorkConfig,
    pub ids: IdGenerator,
    pub scope_cache: ScopeCache,
}

/// Discovers `.work/` upward from `start_dir` and opens the store with the
/// configured tunables.
pub fn open_workspace(start_dir: &Path) -> Result<Workspace> {
    logging::init();

    let work_dir = dotwork_config::find_work_dir(start_dir)
        .ok_or_else(|| ServiceError::validation("no .work directory found"))?;
    let config = WorkConfig::load(&work_dir)
        .map_err(|e| ServiceError::validation(e.to_string()))?;

    let store = Store::open_with_options(
        issues_db_path(&work_dir),
        StoreOptions {
            max_list_limit: config.max_list_limit,
            exclusive_lock: true,
        },
    )?;

    Ok(Workspace {
        ids: IdGenerator::new(config.id_hash_len),
        scope_cache: ScopeCache::new(Duration::from_secs(config.scope_cache_ttl_secs)),
        store,
        config,
    })
}
