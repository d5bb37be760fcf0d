//! Bulk service: atomic batch create/update/close/label.
//!
//! Every operation is all-or-nothing. Inputs are translated and validated
//! up front; writes run inside a savepoint on the caller's transaction, so
//! a failure mid-batch leaves no partial state even before the caller
//! rolls the unit of work back. The returned [`BulkResult`] reflects the
//! final state: on any error `failed == total` and nothing was written.

use tracing::warn;

use dotwork_core::audit::AuditLog;
use dotwork_core::enums::{AuditAction, Status};
use dotwork_core::id::{prefix, EntityId, IdGenerator};
use dotwork_core::issue::{dedup_preserving_order, Issue, IssueBuilder, IssueChanges};
use dotwork_core::project::User;
use dotwork_core::validation;
use dotwork_storage::UnitOfWork;

use crate::error::{Result, ServiceError};
use crate::issue::CreateIssue;

/// Outcome of a bulk operation.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct BulkResult {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// `(index or id, reason)` pairs for the inputs that caused failure.
    pub errors: Vec<(String, String)>,
    /// Ids created or touched, in input order. Empty on failure.
    pub ids: Vec<EntityId>,
}

impl BulkResult {
    fn all_failed(total: usize, errors: Vec<(String, String)>) -> Self {
        Self {
            total,
            succeeded: 0,
            failed: total,
            errors,
            ids: Vec::new(),
        }
    }

    fn all_succeeded(ids: Vec<EntityId>) -> Self {
        Self {
            total: ids.len(),
            succeeded: ids.len(),
            failed: 0,
            errors: Vec::new(),
            ids,
        }
    }
}

/// Bulk operations over one unit of work.
pub struct BulkService<'a> {
    uow: &'a UnitOfWork,
    ids: &'a IdGenerator,
    audit: Option<&'a AuditLog>,
}

impl<'a> BulkService<'a> {
    pub fn new(uow: &'a UnitOfWork, ids: &'a IdGenerator, audit: Option<&'a AuditLog>) -> Self {
        Self { uow, ids, audit }
    }

    // -- Create --------------------------------------------------------------

    /// Translates every input to an entity, then inserts the whole batch
    /// with one statement. Any invalid input fails the entire batch before
    /// a single row is written.
    pub fn bulk_create(&self, inputs: Vec<CreateIssue>, user: Option<&User>) -> Result<BulkResult> {
        let total = inputs.len();
        let mut entities: Vec<Issue> = Vec::with_capacity(total);
        let mut errors: Vec<(String, String)> = Vec::new();

        for (index, input) in inputs.into_iter().enumerate() {
            match self.translate(input) {
                Ok(issue) => entities.push(issue),
                Err(e) => errors.push((index.to_string(), e.to_string())),
            }
        }
        if !errors.is_empty() {
            warn!(total, failed = errors.len(), "bulk create rejected");
            return Ok(BulkResult::all_failed(total, errors));
        }

        let created: Vec<EntityId> = entities.iter().map(|i| i.id.clone()).collect();
        self.in_savepoint("bulk_create", || {
            self.uow.issues().insert_batch(&entities)?;
            Ok(())
        })?;

        self.record_each(user, AuditAction::BulkCreate, &created);
        Ok(BulkResult::all_succeeded(created))
    }

    // -- Close ---------------------------------------------------------------

    /// Transitions every issue to `closed`. Unknown ids and illegal
    /// transitions are errors and fail the whole batch.
    pub fn bulk_close(&self, ids: &[EntityId], user: Option<&User>) -> Result<BulkResult> {
        let changes = IssueChanges {
            status: Some(Status::Closed),
            ..Default::default()
        };
        self.bulk_update(ids, &changes, user)
            .map(|mut result| {
                // Report under the close action, not update.
                if result.failed == 0 {
                    self.record_each(user, AuditAction::BulkClose, &result.ids);
                    result.errors.clear();
                }
                result
            })
    }

    // -- Update --------------------------------------------------------------

    /// Applies uniform changes to every issue. Unknown ids are errors; a
    /// status change must be legal from every issue's current status
    /// (issues already in a terminal status included).
    pub fn bulk_update(
        &self,
        ids: &[EntityId],
        changes: &IssueChanges,
        user: Option<&User>,
    ) -> Result<BulkResult> {
        let total = ids.len();
        let mut errors: Vec<(String, String)> = Vec::new();

        for id in ids {
            match self.uow.issues().get(id) {
                Ok(current) => {
                    if let Some(new_status) = changes.status {
                        if new_status != current.status
                            && !current.status.can_transition_to(new_status)
                        {
                            errors.push((
                                id.as_str().to_owned(),
                                ServiceError::InvalidTransition {
                                    from: current.status,
                                    to: new_status,
                                }
                                .to_string(),
                            ));
                        }
                    }
                }
                Err(e) => errors.push((id.as_str().to_owned(), ServiceError::from(e).to_string())),
            }
        }
        if !errors.is_empty() {
            warn!(total, failed = errors.len(), "bulk update rejected");
            return Ok(BulkResult::all_failed(total, errors));
        }

        self.in_savepoint("bulk_update", || {
            self.uow.issues().update_batch(ids, changes)?;
            Ok(())
        })?;

        let touched = ids.to_vec();
        if changes.status != Some(Status::Closed) {
            self.record_each(user, AuditAction::BulkUpdate, &touched);
        }
        Ok(BulkResult::all_succeeded(touched))
    }

    // -- Labels --------------------------------------------------------------

    /// Appends labels to every issue. Idempotent per id.
    pub fn bulk_label_add(
        &self,
        ids: &[EntityId],
        labels: &[String],
        user: Option<&User>,
    ) -> Result<BulkResult> {
        self.bulk_label(ids, user, |issue| {
            let mut merged = issue.labels.clone();
            merged.extend(labels.iter().cloned());
            dedup_preserving_order(merged)
        })
    }

    /// Removes labels from every issue. Idempotent per id.
    pub fn bulk_label_remove(
        &self,
        ids: &[EntityId],
        labels: &[String],
        user: Option<&User>,
    ) -> Result<BulkResult> {
        self.bulk_label(ids, user, |issue| {
            issue
                .labels
                .iter()
                .filter(|l| !labels.contains(l))
                .cloned()
                .collect()
        })
    }

    fn bulk_label(
        &self,
        ids: &[EntityId],
        user: Option<&User>,
        rewrite: impl Fn(&Issue) -> Vec<String>,
    ) -> Result<BulkResult> {
        let total = ids.len();
        let mut loaded: Vec<Issue> = Vec::with_capacity(total);
        let mut errors: Vec<(String, String)> = Vec::new();

        for id in ids {
            match self.uow.issues().get(id) {
                Ok(issue) => loaded.push(issue),
                Err(e) => errors.push((id.as_str().to_owned(), ServiceError::from(e).to_string())),
            }
        }
        if !errors.is_empty() {
            warn!(total, failed = errors.len(), "bulk label rejected");
            return Ok(BulkResult::all_failed(total, errors));
        }

        self.in_savepoint("bulk_label", || {
            for issue in &loaded {
                let changes = IssueChanges {
                    labels: Some(rewrite(issue)),
                    ..Default::default()
                };
                self.uow.issues().save(&issue.apply(&changes))?;
            }
            Ok(())
        })?;

        let touched = ids.to_vec();
        self.record_each(user, AuditAction::BulkLabel, &touched);
        Ok(BulkResult::all_succeeded(touched))
    }

    // -- Internals -----------------------------------------------------------

    fn translate(&self, input: CreateIssue) -> Result<Issue> {
        if input.title.trim().is_empty() {
            return Err(ServiceError::validation("title required"));
        }
        if let Some(ref project_id) = input.project_id {
            if self.uow.projects().get(project_id).is_err() {
                return Err(ServiceError::not_found("project", project_id.as_str()));
            }
        }

        let id_prefix = match input.issue_type {
            dotwork_core::enums::IssueType::Epic => prefix::EPIC,
            _ => prefix::ISSUE,
        };
        let mut builder = IssueBuilder::new(self.ids.next(id_prefix), input.title)
            .description(input.description)
            .priority(input.priority)
            .issue_type(input.issue_type)
            .labels(input.labels)
            .assignees(input.assignees)
            .references(input.references);
        if let Some(project_id) = input.project_id {
            builder = builder.project_id(project_id);
        }
        if let Some(epic_id) = input.epic_id {
            builder = builder.epic_id(epic_id);
        }
        if let Some(source_url) = input.source_url {
            builder = builder.source_url(source_url);
        }

        let issue = builder.build();
        validation::validate(&issue)?;
        Ok(issue)
    }

    /// Runs writes inside a savepoint on the caller's transaction: released
    /// on success, rolled back to on failure. Nothing partial survives.
    fn in_savepoint(&self, name: &str, f: impl FnOnce() -> Result<()>) -> Result<()> {
        let conn = self.uow.session().connection();
        conn.execute_batch(&format!("SAVEPOINT {name}"))
            .map_err(|e| ServiceError::from(dotwork_storage::StoreError::from(e)))?;

        match f() {
            Ok(()) => {
                conn.execute_batch(&format!("RELEASE {name}"))
                    .map_err(|e| ServiceError::from(dotwork_storage::StoreError::from(e)))?;
                Ok(())
            }
            Err(e) => {
                if let Err(rollback_err) =
                    conn.execute_batch(&format!("ROLLBACK TO {name}; RELEASE {name}"))
                {
                    warn!(error = %rollback_err, "bulk savepoint rollback failed");
                }
                Err(e)
            }
        }
    }

    fn record_each(&self, user: Option<&User>, action: AuditAction, ids: &[EntityId]) {
        if let (Some(audit), Some(user)) = (self.audit, user) {
            for id in ids {
                audit.record(action, "issue", id.as_str(), &user.username, "");
            }
        }
    }
}
