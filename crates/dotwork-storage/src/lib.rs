//! SQLite storage engine for the dot-work issue tracker.
//!
//! Provides the [`Store`] (single-file SQLite engine with WAL, enforced
//! foreign keys, and an FTS5 index), the [`UnitOfWork`] transaction scope,
//! and per-entity repositories.

pub mod error;
pub mod fts;
pub mod lock;
pub mod repo;
pub mod schema;
pub mod store;
pub mod uow;

// Re-exports for convenience.
pub use error::StoreError;
pub use fts::FtsHit;
pub use repo::{
    CommentRepository, DependencyRepository, EpicCounts, IssueRepository, LabelCount,
    LabelRepository, ProjectRepository,
};
pub use store::{Store, StoreOptions};
pub use uow::UnitOfWork;
