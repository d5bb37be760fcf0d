//! Service error taxonomy.
//!
//! Everything a service can fail with, as a closed set. Display strings are
//! safe to show to callers: they carry user-supplied input and nothing else
//! (no paths, no SQL). Full detail stays on the error source chain and in
//! the logs.

use dotwork_core::enums::Status;
use dotwork_core::id::IdError;
use dotwork_core::validation::ValidationError;
use dotwork_storage::StoreError;

/// Errors surfaced by the service layer.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Input failed a domain validation rule.
    #[error("validation error: {0}")]
    Validation(String),

    /// The referenced entity does not exist.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// The kind of entity (e.g., "issue", "project").
        entity: &'static str,
        /// The identifier that was looked up.
        id: String,
    },

    /// The requested status change is not in the state machine.
    #[error("invalid transition: {from} -> {to}")]
    InvalidTransition {
        /// Status before the attempted change.
        from: Status,
        /// Requested new status.
        to: Status,
    },

    /// Inserting the edge would make the kind's dependency graph cyclic.
    #[error("adding this dependency would create a cycle")]
    Cycle,

    /// An entity with this id already exists.
    #[error("duplicate id: {0}")]
    DuplicateId(String),

    /// The search query was rejected by the sanitizer.
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// Id generation kept colliding with the live store.
    #[error("id generation failed after {attempts} attempts")]
    IdGeneration {
        /// Number of attempts made.
        attempts: u32,
    },

    /// A long-running read exceeded its deadline.
    #[error("deadline exceeded")]
    DeadlineExceeded,

    /// An integrity constraint was violated on commit or write.
    #[error("integrity constraint violated")]
    Integrity,

    /// The storage engine failed. Detail lives on the source chain.
    #[error("storage failure")]
    Store(#[source] StoreError),
}

/// Convenience alias used throughout the service crates.
pub type Result<T> = std::result::Result<T, ServiceError>;

impl ServiceError {
    /// Creates a [`ServiceError::NotFound`].
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Creates a [`ServiceError::Validation`].
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Returns `true` if this is a [`ServiceError::NotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<StoreError> for ServiceError {
    /// Not-found and integrity failures keep their shape; everything else
    /// is an opaque storage failure.
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound { entity, id } => {
                // Entity kinds come from a fixed set of literals in the
                // repositories; fall back to "entity" for anything else.
                let entity: &'static str = match entity.as_str() {
                    "issue" => "issue",
                    "project" => "project",
                    "comment" => "comment",
                    "dependency" => "dependency",
                    _ => "entity",
                };
                Self::NotFound { entity, id }
            }
            StoreError::Integrity(_) => Self::Integrity,
            other => Self::Store(other),
        }
    }
}

impl From<ValidationError> for ServiceError {
    fn from(e: ValidationError) -> Self {
        Self::Validation(e.to_string())
    }
}

impl From<IdError> for ServiceError {
    fn from(e: IdError) -> Self {
        Self::Validation(e.to_string())
    }
}
