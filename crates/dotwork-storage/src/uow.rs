//! Unit of work -- the transaction boundary of the store.
//!
//! A unit of work owns one `BEGIN IMMEDIATE` transaction on the store's
//! session. Repositories are constructed lazily and cached for the unit's
//! lifetime. `commit`/`rollback` end the transaction; `close` releases the
//! session and drops the repository cache, and is idempotent.

use std::cell::{Cell, OnceCell};

use tracing::warn;

use crate::error::{Result, StoreError};
use crate::repo::{
    CommentRepository, DependencyRepository, IssueRepository, LabelRepository, ProjectRepository,
};
use crate::store::Session;

/// Lifecycle state of a unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TxState {
    Active,
    Committed,
    RolledBack,
    Closed,
}

/// A transactional scope over the store.
///
/// Obtained from [`Store::unit_of_work`](crate::store::Store::unit_of_work)
/// or the scoped [`Store::with_unit_of_work`](crate::store::Store::with_unit_of_work).
pub struct UnitOfWork {
    session: Session,
    state: Cell<TxState>,
    issues: OnceCell<IssueRepository>,
    dependencies: OnceCell<DependencyRepository>,
    comments: OnceCell<CommentRepository>,
    labels: OnceCell<LabelRepository>,
    projects: OnceCell<ProjectRepository>,
}

impl UnitOfWork {
    pub(crate) fn begin(session: Session) -> Result<Self> {
        session.begin_uow()?;
        Ok(Self {
            session,
            state: Cell::new(TxState::Active),
            issues: OnceCell::new(),
            dependencies: OnceCell::new(),
            comments: OnceCell::new(),
            labels: OnceCell::new(),
            projects: OnceCell::new(),
        })
    }

    /// The underlying session, for callers that run parameterized SQL
    /// directly (the search path).
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Repository queries executed so far on this session.
    pub fn queries_executed(&self) -> u64 {
        self.session.queries_executed()
    }

    // -- Repositories (lazily constructed, cached) ---------------------------

    pub fn issues(&self) -> &IssueRepository {
        self.issues
            .get_or_init(|| IssueRepository::new(self.session.clone()))
    }

    pub fn dependencies(&self) -> &DependencyRepository {
        self.dependencies
            .get_or_init(|| DependencyRepository::new(self.session.clone()))
    }

    pub fn comments(&self) -> &CommentRepository {
        self.comments
            .get_or_init(|| CommentRepository::new(self.session.clone()))
    }

    pub fn labels(&self) -> &LabelRepository {
        self.labels
            .get_or_init(|| LabelRepository::new(self.session.clone()))
    }

    pub fn projects(&self) -> &ProjectRepository {
        self.projects
            .get_or_init(|| ProjectRepository::new(self.session.clone()))
    }

    // -- Lifecycle -----------------------------------------------------------

    /// Commits the transaction.
    pub fn commit(&mut self) -> Result<()> {
        match self.state.get() {
            TxState::Active => {
                self.session
                    .connection()
                    .execute_batch("COMMIT")
                    .map_err(|e| StoreError::Transaction(format!("failed to commit: {e}")))?;
                self.state.set(TxState::Committed);
                Ok(())
            }
            state => Err(StoreError::Transaction(format!(
                "cannot commit a unit of work in state {state:?}"
            ))),
        }
    }

    /// Rolls the transaction back.
    pub fn rollback(&mut self) -> Result<()> {
        match self.state.get() {
            TxState::Active => {
                self.session
                    .connection()
                    .execute_batch("ROLLBACK")
                    .map_err(|e| StoreError::Transaction(format!("failed to rollback: {e}")))?;
                self.state.set(TxState::RolledBack);
                Ok(())
            }
            state => Err(StoreError::Transaction(format!(
                "cannot rollback a unit of work in state {state:?}"
            ))),
        }
    }

    /// Closes the unit of work: an active transaction is rolled back, the
    /// repository cache is cleared, and the session is released. Idempotent;
    /// failures are logged, never raised.
    pub fn close(&mut self) {
        if self.state.get() == TxState::Closed {
            return;
        }
        if self.state.get() == TxState::Active {
            if let Err(e) = self.session.connection().execute_batch("ROLLBACK") {
                warn!(error = %e, "rollback during close failed");
            }
        }
        // Clear the repository cache, releasing any internal buffers.
        self.issues.take();
        self.dependencies.take();
        self.comments.take();
        self.labels.take();
        self.projects.take();
        self.state.set(TxState::Closed);
        self.session.end_uow();
    }
}

impl Drop for UnitOfWork {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for UnitOfWork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnitOfWork")
            .field("state", &self.state.get())
            .finish_non_exhaustive()
    }
}
