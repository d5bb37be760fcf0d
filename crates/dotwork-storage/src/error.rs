//! Storage error types.

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The requested entity was not found.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// The kind of entity (e.g., "issue", "project").
        entity: String,
        /// The identifier that was looked up.
        id: String,
    },

    /// Failed to establish or maintain a database connection.
    #[error("connection error: {0}")]
    Connection(String),

    /// Another writer holds the store lock.
    #[error("store is locked by another writer")]
    Locked,

    /// A transaction operation failed.
    #[error("transaction error: {0}")]
    Transaction(String),

    /// A schema migration failed; the engine refuses to open.
    #[error("migration to version {version} failed: {reason}")]
    Migration {
        /// Target schema version of the failing step.
        version: i32,
        /// Underlying error description.
        reason: String,
    },

    /// An integrity constraint was violated.
    #[error("integrity constraint violated")]
    Integrity(#[source] rusqlite::Error),

    /// A persisted row could not be decoded into its domain type.
    #[error("corrupt {entity} row: {reason}")]
    CorruptRow {
        /// The kind of entity being decoded.
        entity: String,
        /// Why decoding failed.
        reason: String,
    },

    /// A raw SQLite query error.
    #[error("query error: {0}")]
    Query(rusqlite::Error),

    /// JSON serialization/deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Convenience alias used throughout the storage crate.
pub type Result<T> = std::result::Result<T, StoreError>;

impl StoreError {
    /// Creates a [`StoreError::NotFound`] for the given entity kind and id.
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Returns `true` if this is a [`StoreError::NotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns `true` if this is an integrity violation.
    pub fn is_integrity(&self) -> bool {
        matches!(self, Self::Integrity(_))
    }
}

impl From<rusqlite::Error> for StoreError {
    /// Constraint violations map to [`StoreError::Integrity`]; everything
    /// else stays a query error.
    fn from(e: rusqlite::Error) -> Self {
        match &e {
            rusqlite::Error::SqliteFailure(failure, _)
                if failure.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Self::Integrity(e)
            }
            _ => Self::Query(e),
        }
    }
}
