//! [`Store`] -- the SQLite-backed storage engine.
//!
//! A store owns one connection. Work happens through
//! [`UnitOfWork`](crate::uow::UnitOfWork) scopes obtained from
//! [`Store::unit_of_work`]; the engine itself only handles opening,
//! pragmas, and schema upgrades.

use std::cell::Cell;
use std::path::Path;
use std::rc::Rc;

use rusqlite::Connection;
use tracing::{debug, info, warn};

use crate::error::{Result, StoreError};
use crate::lock::StoreLock;
use crate::schema;
use crate::uow::UnitOfWork;

/// Tunables applied to every session of a store.
#[derive(Debug, Clone, Copy)]
pub struct StoreOptions {
    /// Ceiling applied to every listing limit.
    pub max_list_limit: u32,
    /// Whether file-backed stores take the exclusive lock file.
    pub exclusive_lock: bool,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            max_list_limit: 50_000,
            exclusive_lock: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

pub(crate) struct SessionInner {
    pub(crate) conn: Connection,
    options: StoreOptions,
    queries: Cell<u64>,
    in_uow: Cell<bool>,
}

/// A cheap handle onto the store's connection, shared by the unit of work
/// and its repositories.
///
/// Not `Send`: the store is single-writer within a process, and a session
/// never crosses threads.
#[derive(Clone)]
pub struct Session {
    inner: Rc<SessionInner>,
}

impl Session {
    /// Raw connection access for callers that run parameterized SQL
    /// directly (the search path).
    pub fn connection(&self) -> &Connection {
        &self.inner.conn
    }

    /// Number of repository queries executed on this session so far.
    ///
    /// Cheap observability hook; tests lean on it to pin down how many
    /// round-trips an operation costs.
    pub fn queries_executed(&self) -> u64 {
        self.inner.queries.get()
    }

    /// Records one executed query.
    pub fn record_query(&self) {
        self.inner.queries.set(self.inner.queries.get() + 1);
    }

    /// Clamps a listing limit to the configured ceiling, logging when the
    /// caller asked for more.
    pub(crate) fn clamp_limit(&self, limit: u32) -> u32 {
        let max = self.inner.options.max_list_limit;
        if limit > max {
            warn!(requested = limit, max, "listing limit clamped");
            max
        } else {
            limit
        }
    }

    pub(crate) fn begin_uow(&self) -> Result<()> {
        if self.inner.in_uow.get() {
            return Err(StoreError::Transaction(
                "a unit of work is already active on this store".into(),
            ));
        }
        self.inner
            .conn
            .execute_batch("BEGIN IMMEDIATE")
            .map_err(|e| StoreError::Transaction(format!("failed to begin: {e}")))?;
        self.inner.in_uow.set(true);
        Ok(())
    }

    pub(crate) fn end_uow(&self) {
        self.inner.in_uow.set(false);
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("queries", &self.inner.queries.get())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// SQLite-backed storage engine: one file, WAL mode, foreign keys enforced,
/// FTS index co-maintained with the issues table.
pub struct Store {
    session: Session,
    _lock: Option<StoreLock>,
}

impl Store {
    /// Opens (or creates) a store at the given path with default options.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_options(path, StoreOptions::default())
    }

    /// Opens (or creates) a store at the given path.
    ///
    /// Takes the exclusive lock (unless disabled), enables WAL mode and
    /// foreign keys, then upgrades the schema. A failed upgrade rolls back
    /// entirely and the store refuses to open.
    pub fn open_with_options(path: impl AsRef<Path>, options: StoreOptions) -> Result<Self> {
        let path = path.as_ref();
        info!(?path, "opening issue store");

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    StoreError::Connection(format!("failed to create store dir: {e}"))
                })?;
            }
        }

        let lock = if options.exclusive_lock {
            Some(StoreLock::acquire(path)?)
        } else {
            None
        };

        let conn = Connection::open(path)
            .map_err(|e| StoreError::Connection(format!("failed to open store: {e}")))?;

        let store = Self::from_connection(conn, options, lock)?;
        Ok(store)
    }

    /// Opens an in-memory store (useful for tests). No lock file.
    pub fn open_in_memory() -> Result<Self> {
        debug!("opening in-memory issue store");
        let conn = Connection::open_in_memory()
            .map_err(|e| StoreError::Connection(format!("failed to open in-memory store: {e}")))?;
        Self::from_connection(conn, StoreOptions::default(), None)
    }

    /// Opens an in-memory store with custom options.
    pub fn open_in_memory_with_options(options: StoreOptions) -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| StoreError::Connection(format!("failed to open in-memory store: {e}")))?;
        Self::from_connection(conn, options, None)
    }

    fn from_connection(
        conn: Connection,
        options: StoreOptions,
        lock: Option<StoreLock>,
    ) -> Result<Self> {
        configure_connection(&conn)?;
        upgrade_schema(&conn)?;

        Ok(Self {
            session: Session {
                inner: Rc::new(SessionInner {
                    conn,
                    options,
                    queries: Cell::new(0),
                    in_uow: Cell::new(false),
                }),
            },
            _lock: lock,
        })
    }

    /// Begins a unit of work. At most one may be active at a time.
    pub fn unit_of_work(&self) -> Result<UnitOfWork> {
        UnitOfWork::begin(self.session.clone())
    }

    /// Scoped unit-of-work acquisition with guaranteed release: commits on
    /// `Ok`, rolls back on `Err`, closes either way.
    pub fn with_unit_of_work<T>(
        &self,
        f: impl FnOnce(&UnitOfWork) -> Result<T>,
    ) -> Result<T> {
        let mut uow = self.unit_of_work()?;
        let result = f(&uow);
        match result {
            Ok(value) => {
                uow.commit()?;
                uow.close();
                Ok(value)
            }
            Err(e) => {
                uow.rollback()?;
                uow.close();
                Err(e)
            }
        }
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store").finish_non_exhaustive()
    }
}

/// Sets connection pragmas (WAL mode, foreign keys, busy timeout).
fn configure_connection(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = 5000;",
    )
    .map_err(|e| StoreError::Connection(format!("failed to set pragmas: {e}")))?;
    Ok(())
}

/// Reads the persisted schema version (0 for a fresh database).
fn schema_version(conn: &Connection) -> i32 {
    conn.query_row(
        "SELECT value FROM config WHERE key = 'schema_version'",
        [],
        |row| {
            let v: String = row.get(0)?;
            Ok(v.parse::<i32>().unwrap_or(0))
        },
    )
    .unwrap_or(0)
}

/// Creates a fresh schema or applies pending migration steps, all within
/// one transaction. Any failure rolls the whole upgrade back.
fn upgrade_schema(conn: &Connection) -> Result<()> {
    let version = schema_version(conn);
    if version >= schema::CURRENT_SCHEMA_VERSION {
        debug!(version, "schema already current");
        return Ok(());
    }

    conn.execute_batch("BEGIN")
        .map_err(|e| StoreError::Transaction(format!("failed to begin upgrade: {e}")))?;

    let upgrade = apply_upgrade(conn, version);
    match upgrade {
        Ok(()) => {
            conn.execute_batch("COMMIT")
                .map_err(|e| StoreError::Transaction(format!("failed to commit upgrade: {e}")))?;
            info!(
                from = version,
                to = schema::CURRENT_SCHEMA_VERSION,
                "schema upgraded"
            );
            Ok(())
        }
        Err(e) => {
            if let Err(rollback_err) = conn.execute_batch("ROLLBACK") {
                warn!(error = %rollback_err, "schema upgrade rollback failed");
            }
            Err(e)
        }
    }
}

fn apply_upgrade(conn: &Connection, from_version: i32) -> Result<()> {
    if from_version == 0 {
        // Fresh database: create everything at the current version.
        for stmt in schema::SCHEMA_STATEMENTS {
            conn.execute_batch(stmt).map_err(|e| StoreError::Migration {
                version: schema::CURRENT_SCHEMA_VERSION,
                reason: e.to_string(),
            })?;
        }
    } else {
        for &(version, sql) in schema::MIGRATIONS {
            if version <= from_version {
                continue;
            }
            debug!(version, "applying migration step");
            conn.execute_batch(sql).map_err(|e| StoreError::Migration {
                version,
                reason: e.to_string(),
            })?;
            conn.execute(
                "INSERT OR REPLACE INTO meta (key, value) VALUES (?1, 'applied')",
                rusqlite::params![format!("migration:{version}")],
            )
            .map_err(|e| StoreError::Migration {
                version,
                reason: e.to_string(),
            })?;
        }
    }

    conn.execute(
        "INSERT OR REPLACE INTO config (key, value) VALUES ('schema_version', ?1)",
        rusqlite::params![schema::CURRENT_SCHEMA_VERSION.to_string()],
    )
    .map_err(|e| StoreError::Migration {
        version: schema::CURRENT_SCHEMA_VERSION,
        reason: e.to_string(),
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_in_memory_creates_schema() {
        let store = Store::open_in_memory().unwrap();
        let version: String = store
            .session
            .connection()
            .query_row(
                "SELECT value FROM config WHERE key = 'schema_version'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(version, schema::CURRENT_SCHEMA_VERSION.to_string());
    }

    #[test]
    fn open_file_backed_twice_is_locked() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("issues.db");

        let first = Store::open(&path).unwrap();
        assert!(matches!(Store::open(&path), Err(StoreError::Locked)));
        drop(first);

        Store::open(&path).unwrap();
    }

    #[test]
    fn reopen_preserves_schema_version() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("issues.db");

        {
            Store::open(&path).unwrap();
        }
        let store = Store::open(&path).unwrap();
        let version: String = store
            .session
            .connection()
            .query_row(
                "SELECT value FROM config WHERE key = 'schema_version'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(version, schema::CURRENT_SCHEMA_VERSION.to_string());
    }

    #[test]
    fn nested_unit_of_work_rejected() {
        let store = Store::open_in_memory().unwrap();
        let uow = store.unit_of_work().unwrap();
        assert!(matches!(
            store.unit_of_work(),
            Err(StoreError::Transaction(_))
        ));
        drop(uow);
        // Released on drop: a new one can begin.
        store.unit_of_work().unwrap();
    }
}
