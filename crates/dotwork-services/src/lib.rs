//! Domain services for the dot-work issue tracker.
//!
//! This is the facade adapters build on: open a [`Store`], begin a
//! [`UnitOfWork`], construct the services you need against it, and commit
//! or roll back the whole scope.
//!
//! ```no_run
//! use dotwork_core::audit::AuditLog;
//! use dotwork_core::id::IdGenerator;
//! use dotwork_services::{CreateIssue, IssueService, Store};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Store::open(".work/db-issues/issues.db")?;
//! let ids = IdGenerator::default();
//! let audit = AuditLog::new();
//!
//! let mut uow = store.unit_of_work()?;
//! let issues = IssueService::new(&uow, &ids, Some(&audit));
//! issues.create_issue(
//!     CreateIssue { title: "Wire up the importer".into(), ..Default::default() },
//!     None,
//! )?;
//! uow.commit()?;
//! # Ok(())
//! # }
//! ```

pub mod bootstrap;
pub mod bulk;
pub mod dependency;
pub mod epic;
pub mod error;
pub mod export;
pub mod issue;
pub mod label;
pub mod project;
pub mod scope;
pub mod search;

// The service layer facade.
pub use bootstrap::{open_workspace, Workspace};
pub use bulk::{BulkResult, BulkService};
pub use dependency::{CycleReport, DependencyService, TreeNode};
pub use epic::{EpicService, EpicSummary};
pub use error::{Result, ServiceError};
pub use export::{export_jsonl, export_page, import_jsonl, ExportCursor, ImportStats};
pub use issue::{
    CreateIssue, DuplicateCandidate, IssueService, MergeDisposition, MergeOutcome, Statistics,
};
pub use label::LabelService;
pub use project::ProjectService;
pub use scope::{build_scope_sets, matches_scope, ScopeCache, ScopeSets};
pub use search::{Deadline, QueryMode, SearchHit, SearchOptions, SearchService};

// Value types and engine handles adapters need, re-exported so thin
// front-ends can depend on this crate alone.
pub use dotwork_core::audit::{AuditEntry, AuditLog};
pub use dotwork_core::comment::Comment;
pub use dotwork_core::dependency::{Dependency, Direction};
pub use dotwork_core::enums::{AuditAction, DependencyKind, IssueType, Priority, Status};
pub use dotwork_core::filter::{GroupKey, IssueFilter, ListOptions, SortKey};
pub use dotwork_core::id::{EntityId, IdGenerator};
pub use dotwork_core::issue::{Issue, IssueChanges};
pub use dotwork_core::jsonl::ImportMode;
pub use dotwork_core::project::{Project, User};
pub use dotwork_core::scope::ScopeFilter;
pub use dotwork_storage::{Store, StoreError, StoreOptions, UnitOfWork};
