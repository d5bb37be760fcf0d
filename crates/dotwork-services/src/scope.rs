//! Scope resolution and the process-wide scope cache.
//!
//! [`build_scope_sets`] turns a [`ScopeFilter`] into precomputed membership
//! sets with a single labels-joined query; [`matches_scope`] is the pure
//! predicate over those sets. The [`ScopeCache`] memoizes built sets by
//! canonical filter key with a TTL, so repeated identical scopes within the
//! window touch the store zero times.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use rusqlite::params;
use tracing::debug;

use dotwork_core::id::EntityId;
use dotwork_core::scope::ScopeFilter;
use dotwork_storage::UnitOfWork;

use crate::error::{Result, ServiceError};

/// Default cache entry time-to-live.
pub const DEFAULT_SCOPE_TTL: Duration = Duration::from_secs(60);

/// Precomputed membership sets for one scope filter. Immutable snapshot;
/// cached entries are shared via `Arc`.
#[derive(Debug, Default)]
pub struct ScopeSets {
    /// Issues in the filter's project. `None` when no project restriction.
    project_members: Option<HashSet<EntityId>>,
    /// Issues carrying at least one included topic. `None` when the filter
    /// lists no topics.
    topic_members: Option<HashSet<EntityId>>,
    /// Issues carrying an excluded topic.
    excluded: HashSet<EntityId>,
    /// Issues without a project.
    shared: HashSet<EntityId>,
    include_shared: bool,
}

/// Pure membership predicate over precomputed sets.
pub fn matches_scope(id: &EntityId, sets: &ScopeSets) -> bool {
    if sets.excluded.contains(id) {
        return false;
    }
    // Project / shared visibility.
    let visible = match &sets.project_members {
        Some(members) => {
            members.contains(id) || (sets.include_shared && sets.shared.contains(id))
        }
        None => sets.include_shared || !sets.shared.contains(id),
    };
    if !visible {
        return false;
    }
    // Topic restriction.
    match &sets.topic_members {
        Some(members) => members.contains(id),
        None => true,
    }
}

/// Builds the membership sets for a filter with one query.
pub fn build_scope_sets(uow: &UnitOfWork, filter: &ScopeFilter) -> Result<ScopeSets> {
    let session = uow.session();
    session.record_query();

    let mut stmt = session
        .connection()
        .prepare(
            "SELECT i.id, i.project_id, l.label
             FROM issues i
             LEFT JOIN issue_labels l ON l.issue_id = i.id",
        )
        .map_err(map_sql)?;

    let rows = stmt
        .query_map(params![], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, Option<String>>(1)?,
                row.get::<_, Option<String>>(2)?,
            ))
        })
        .map_err(map_sql)?;

    let project_key = filter.project.as_ref().map(|p| p.as_str().to_owned());
    let mut sets = ScopeSets {
        project_members: filter.project.as_ref().map(|_| HashSet::new()),
        topic_members: if filter.topics.is_empty() {
            None
        } else {
            Some(HashSet::new())
        },
        excluded: HashSet::new(),
        shared: HashSet::new(),
        include_shared: filter.include_shared,
    };

    for row in rows {
        let (id_text, project_id, label) = row.map_err(map_sql)?;
        let id = EntityId::parse(&id_text)
            .map_err(|e| ServiceError::Store(dotwork_storage::StoreError::CorruptRow {
                entity: "issue".into(),
                reason: e.to_string(),
            }))?;

        match &project_id {
            Some(p) if Some(p) == project_key.as_ref() => {
                if let Some(members) = sets.project_members.as_mut() {
                    members.insert(id.clone());
                }
            }
            None => {
                sets.shared.insert(id.clone());
            }
            _ => {}
        }

        if let Some(label) = label {
            if filter.exclude_topics.contains(&label) {
                sets.excluded.insert(id.clone());
            }
            if filter.topics.contains(&label) {
                if let Some(members) = sets.topic_members.as_mut() {
                    members.insert(id.clone());
                }
            }
        }
    }

    Ok(sets)
}

fn map_sql(e: rusqlite::Error) -> ServiceError {
    ServiceError::from(dotwork_storage::StoreError::from(e))
}

// ---------------------------------------------------------------------------
// Cache
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct CacheEntry {
    built_at: Instant,
    sets: Arc<ScopeSets>,
}

/// Process-wide scope cache. Explicitly constructed and passed to the
/// services that need it; entries are immutable snapshots guarded by a
/// lock, keyed by the canonicalized filter, and expire after the TTL.
#[derive(Debug)]
pub struct ScopeCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl Default for ScopeCache {
    fn default() -> Self {
        Self::new(DEFAULT_SCOPE_TTL)
    }
}

impl ScopeCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Resolves the membership sets for a filter, reusing a cached snapshot
    /// when it is still fresh. `use_cache: false` bypasses the cache for
    /// both read and write.
    pub fn resolve(
        &self,
        uow: &UnitOfWork,
        filter: &ScopeFilter,
        use_cache: bool,
    ) -> Result<Arc<ScopeSets>> {
        if !use_cache {
            return Ok(Arc::new(build_scope_sets(uow, filter)?));
        }

        let key = filter.canonical_key();
        {
            let entries = self.lock();
            if let Some(entry) = entries.get(&key) {
                if entry.built_at.elapsed() < self.ttl {
                    return Ok(Arc::clone(&entry.sets));
                }
            }
        }

        let sets = Arc::new(build_scope_sets(uow, filter)?);
        let mut entries = self.lock();
        // Drop expired entries opportunistically.
        let before = entries.len();
        entries.retain(|_, entry| entry.built_at.elapsed() < self.ttl);
        if entries.len() < before {
            debug!(evicted = before - entries.len(), "scope cache evicted stale entries");
        }
        entries.insert(
            key,
            CacheEntry {
                built_at: Instant::now(),
                sets: Arc::clone(&sets),
            },
        );
        Ok(sets)
    }

    /// Entries are immutable snapshots, so a poisoned lock is recoverable.
    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, CacheEntry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}
