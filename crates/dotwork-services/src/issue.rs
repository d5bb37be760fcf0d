//! Issue service: creation, update, transition, labels, assignment, merge,
//! duplicate detection, and audit emission.

use chrono::{Duration, Utc};
use tracing::{debug, info};

use dotwork_core::audit::AuditLog;
use dotwork_core::comment::Comment;
use dotwork_core::dependency::{Dependency, Direction};
use dotwork_core::enums::{AuditAction, IssueType, Priority, Status};
use dotwork_core::filter::{GroupKey, IssueFilter, ListOptions};
use dotwork_core::id::{prefix, EntityId, IdGenerator};
use dotwork_core::issue::{dedup_preserving_order, Issue, IssueBuilder, IssueChanges};
use dotwork_core::project::User;
use dotwork_core::similarity::duplicate_score;
use dotwork_core::validation::{self, ValidationError};
use dotwork_storage::UnitOfWork;

use crate::error::{Result, ServiceError};

/// Attempts against the live store before id generation gives up.
const ID_RETRIES: u32 = 5;

/// Inputs for creating an issue.
#[derive(Debug, Clone, Default)]
pub struct CreateIssue {
    pub title: String,
    pub description: String,
    pub priority: Priority,
    pub issue_type: IssueType,
    pub project_id: Option<EntityId>,
    pub epic_id: Option<EntityId>,
    pub labels: Vec<String>,
    pub assignees: Vec<String>,
    pub source_url: Option<String>,
    pub references: Vec<String>,
}

/// What to do with the source issue after a merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeDisposition {
    /// Close the source with a reason pointing at the target.
    Close,
    /// Delete the source outright (its uncopied rows cascade away).
    Delete,
}

/// Result of a merge: the updated target, and the source when it survives.
#[derive(Debug, Clone)]
pub struct MergeOutcome {
    pub target: Issue,
    pub source: Option<Issue>,
}

/// A ranked duplicate candidate.
#[derive(Debug, Clone, serde::Serialize)]
pub struct DuplicateCandidate {
    pub issue: Issue,
    /// Similarity in [0, 1]; higher is more alike.
    pub score: f64,
}

/// Status roll-up for dashboards.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct Statistics {
    pub total: i64,
    pub by_status: Vec<(String, i64)>,
}

/// Issue operations over one unit of work.
pub struct IssueService<'a> {
    uow: &'a UnitOfWork,
    ids: &'a IdGenerator,
    audit: Option<&'a AuditLog>,
}

impl<'a> IssueService<'a> {
    pub fn new(uow: &'a UnitOfWork, ids: &'a IdGenerator, audit: Option<&'a AuditLog>) -> Self {
        Self { uow, ids, audit }
    }

    // -- Creation ------------------------------------------------------------

    /// Validates the input, allocates a collision-checked id, persists the
    /// issue, and emits a `create` audit entry when a user is supplied.
    pub fn create_issue(&self, input: CreateIssue, user: Option<&User>) -> Result<Issue> {
        if let Some(ref project_id) = input.project_id {
            if self.uow.projects().get(project_id).is_err() {
                return Err(ServiceError::not_found("project", project_id.as_str()));
            }
        }
        if let Some(ref epic_id) = input.epic_id {
            self.require_epic(epic_id)?;
            if input.issue_type == IssueType::Epic {
                return Err(ServiceError::validation("epics cannot belong to an epic"));
            }
        }

        let id_prefix = match input.issue_type {
            IssueType::Epic => prefix::EPIC,
            _ => prefix::ISSUE,
        };
        let id = self.allocate_id(id_prefix)?;

        let mut builder = IssueBuilder::new(id, input.title)
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
        self.uow.issues().save(&issue)?;
        info!(id = %issue.id, "issue created");
        self.record(user, AuditAction::Create, &issue.id, String::new());
        Ok(issue)
    }

    // -- Reads ---------------------------------------------------------------

    pub fn get_issue(&self, id: &EntityId) -> Result<Issue> {
        Ok(self.uow.issues().get(id)?)
    }

    pub fn list_issues(&self, filter: &IssueFilter, opts: &ListOptions) -> Result<Vec<Issue>> {
        Ok(self.uow.issues().list(filter, opts)?)
    }

    /// Non-terminal issues untouched for longer than `days`.
    ///
    /// The threshold is an argument, never persisted.
    pub fn list_stale(&self, days: i64, opts: &ListOptions) -> Result<Vec<Issue>> {
        let cutoff = Utc::now() - Duration::days(days);
        let filter = IssueFilter {
            updated_before: Some(cutoff),
            exclude_status: vec![Status::Completed, Status::Closed],
            ..Default::default()
        };
        Ok(self.uow.issues().list(&filter, opts)?)
    }

    /// Counted grouping over a fixed key.
    pub fn group_counts(&self, key: GroupKey) -> Result<Vec<(String, i64)>> {
        Ok(self.uow.issues().group_counts(key)?)
    }

    /// Status roll-up.
    pub fn statistics(&self) -> Result<Statistics> {
        let by_status = self.uow.issues().group_counts(GroupKey::Status)?;
        let total = by_status.iter().map(|(_, n)| n).sum();
        Ok(Statistics { total, by_status })
    }

    // -- Updates -------------------------------------------------------------

    /// Merges changes into the issue. A status field routes through the
    /// transition state machine; referenced projects and epics must resolve.
    pub fn update_issue(
        &self,
        id: &EntityId,
        changes: &IssueChanges,
        user: Option<&User>,
    ) -> Result<Issue> {
        let current = self.uow.issues().get(id)?;

        if let Some(new_status) = changes.status {
            if new_status != current.status
                && !current.status.can_transition_to(new_status)
            {
                return Err(ServiceError::InvalidTransition {
                    from: current.status,
                    to: new_status,
                });
            }
        }
        if let Some(Some(ref project_id)) = changes.project_id {
            if self.uow.projects().get(project_id).is_err() {
                return Err(ServiceError::not_found("project", project_id.as_str()));
            }
        }
        if let Some(Some(ref epic_id)) = changes.epic_id {
            self.require_epic(epic_id)?;
            let new_type = changes.issue_type.unwrap_or(current.issue_type);
            if new_type == IssueType::Epic {
                return Err(ServiceError::validation("epics cannot belong to an epic"));
            }
        }

        let mut next = current.apply(changes);
        // A status change reopening the issue carries the same side effect
        // as transition(); an explicit blocked_reason in the same change
        // set wins.
        if changes.blocked_reason.is_none() {
            clear_reason_on_reopen(&current, &mut next);
        }
        validation::validate(&next)?;
        self.uow.issues().save(&next)?;

        self.record(user, AuditAction::Update, id, changed_fields(changes));
        Ok(next)
    }

    /// Enforces the status state machine and keeps `closed_at` in sync.
    /// Reopening out of `closed` clears `blocked_reason`.
    pub fn transition(
        &self,
        id: &EntityId,
        new_status: Status,
        user: Option<&User>,
    ) -> Result<Issue> {
        let current = self.uow.issues().get(id)?;
        if !current.status.can_transition_to(new_status) {
            return Err(ServiceError::InvalidTransition {
                from: current.status,
                to: new_status,
            });
        }

        let mut next = current.with_status(new_status);
        clear_reason_on_reopen(&current, &mut next);
        self.uow.issues().save(&next)?;

        debug!(id = %id, from = %current.status, to = %new_status, "issue transitioned");
        self.record(
            user,
            AuditAction::Transition,
            id,
            format!("{} -> {}", current.status, new_status),
        );
        Ok(next)
    }

    /// Deletes an issue; comments, labels and edges cascade.
    pub fn delete_issue(&self, id: &EntityId, user: Option<&User>) -> Result<()> {
        self.uow.issues().delete(id)?;
        self.record(user, AuditAction::Delete, id, String::new());
        Ok(())
    }

    // -- Labels --------------------------------------------------------------

    /// Appends a label. Idempotent.
    pub fn add_label(&self, id: &EntityId, label: &str, user: Option<&User>) -> Result<Issue> {
        let current = self.uow.issues().get(id)?;
        let next = current.with_label(label);
        if next.labels.len() != current.labels.len() {
            self.uow.issues().save(&next)?;
            self.record(user, AuditAction::LabelAdd, id, label.to_owned());
        }
        Ok(next)
    }

    /// Removes a label. Idempotent.
    pub fn remove_label(&self, id: &EntityId, label: &str, user: Option<&User>) -> Result<Issue> {
        let current = self.uow.issues().get(id)?;
        let next = current.without_label(label);
        if next.labels.len() != current.labels.len() {
            self.uow.issues().save(&next)?;
            self.record(user, AuditAction::LabelRemove, id, label.to_owned());
        }
        Ok(next)
    }

    /// Replaces the full label set, dropping duplicates while preserving
    /// first-occurrence order.
    pub fn set_labels(
        &self,
        id: &EntityId,
        labels: Vec<String>,
        user: Option<&User>,
    ) -> Result<Issue> {
        let current = self.uow.issues().get(id)?;
        let changes = IssueChanges {
            labels: Some(labels),
            ..Default::default()
        };
        let next = current.apply(&changes);
        self.uow.issues().save(&next)?;
        self.record(user, AuditAction::Update, id, "labels".into());
        Ok(next)
    }

    // -- Assignment ----------------------------------------------------------

    /// Adds an assignee. Idempotent.
    pub fn assign(&self, id: &EntityId, assignee: &str, user: Option<&User>) -> Result<Issue> {
        let current = self.uow.issues().get(id)?;
        let next = current.with_assignee(assignee);
        if next.assignees.len() != current.assignees.len() {
            self.uow.issues().save(&next)?;
            self.record(user, AuditAction::Assign, id, format!("+{assignee}"));
        }
        Ok(next)
    }

    /// Removes an assignee. Idempotent.
    pub fn unassign(&self, id: &EntityId, assignee: &str, user: Option<&User>) -> Result<Issue> {
        let current = self.uow.issues().get(id)?;
        let next = current.without_assignee(assignee);
        if next.assignees.len() != current.assignees.len() {
            self.uow.issues().save(&next)?;
            self.record(user, AuditAction::Assign, id, format!("-{assignee}"));
        }
        Ok(next)
    }

    /// Puts the issue under an epic. The target must be an epic; epics
    /// themselves cannot be nested.
    pub fn assign_to_epic(
        &self,
        id: &EntityId,
        epic_id: &EntityId,
        user: Option<&User>,
    ) -> Result<Issue> {
        let current = self.uow.issues().get(id)?;
        if current.is_epic() {
            return Err(ServiceError::validation("epics cannot belong to an epic"));
        }
        self.require_epic(epic_id)?;

        let changes = IssueChanges {
            epic_id: Some(Some(epic_id.clone())),
            ..Default::default()
        };
        let next = current.apply(&changes);
        self.uow.issues().save(&next)?;
        self.record(user, AuditAction::Update, id, format!("epic {epic_id}"));
        Ok(next)
    }

    // -- Comments ------------------------------------------------------------

    pub fn add_comment(
        &self,
        issue_id: &EntityId,
        author: &str,
        body: &str,
        user: Option<&User>,
    ) -> Result<Comment> {
        if !self.uow.issues().exists(issue_id)? {
            return Err(ServiceError::not_found("issue", issue_id.as_str()));
        }
        let comment = Comment::new(
            self.ids.next(prefix::COMMENT),
            issue_id.clone(),
            author,
            body,
        );
        self.uow.comments().add(&comment)?;
        self.record(user, AuditAction::Update, issue_id, "comment".into());
        Ok(comment)
    }

    pub fn list_comments(&self, issue_id: &EntityId) -> Result<Vec<Comment>> {
        Ok(self.uow.comments().list_for_issue(issue_id)?)
    }

    pub fn delete_comment(&self, comment_id: &EntityId, user: Option<&User>) -> Result<()> {
        self.uow.comments().delete(comment_id)?;
        self.record(user, AuditAction::Delete, comment_id, String::new());
        Ok(())
    }

    // -- Merge ---------------------------------------------------------------

    /// Merges `source_id` into `target_id` in five invariant-preserving
    /// steps: union labels, concatenate descriptions, remap dependency
    /// edges, copy comments, then close or delete the source.
    pub fn merge_issues(
        &self,
        source_id: &EntityId,
        target_id: &EntityId,
        disposition: MergeDisposition,
        user: Option<&User>,
    ) -> Result<MergeOutcome> {
        if source_id == target_id {
            return Err(ServiceError::validation(
                "cannot merge an issue into itself",
            ));
        }
        let source = self.uow.issues().get(source_id)?;
        let target = self.uow.issues().get(target_id)?;

        // 1. Union labels: target order first, then source's new labels in
        //    their original order.
        let mut labels = target.labels.clone();
        labels.extend(source.labels.iter().cloned());
        let labels = dedup_preserving_order(labels);

        // 2. Concatenate descriptions with a delimiter naming the source.
        let description = if source.description.is_empty() {
            target.description.clone()
        } else {
            format!(
                "{}\n\n--- merged from {} ---\n{}",
                target.description, source.id, source.description
            )
        };

        let changes = IssueChanges {
            description: Some(description),
            labels: Some(labels),
            ..Default::default()
        };
        let merged_target = target.apply(&changes);
        self.uow.issues().save(&merged_target)?;

        // 3. Remap dependency edges touching the source onto the target.
        //    Edges that become self-loops or duplicates are dropped.
        for edge in self.uow.dependencies().list_for(source_id, Direction::Both)? {
            self.uow
                .dependencies()
                .remove(&edge.from_issue_id, &edge.to_issue_id, edge.kind)?;

            let from = if edge.from_issue_id == *source_id {
                target_id.clone()
            } else {
                edge.from_issue_id.clone()
            };
            let to = if edge.to_issue_id == *source_id {
                target_id.clone()
            } else {
                edge.to_issue_id.clone()
            };
            if from == to {
                continue;
            }
            let mut remapped = Dependency::new(from, to, edge.kind);
            remapped.created_at = edge.created_at;
            // add() ignores duplicates.
            self.uow.dependencies().add(&remapped)?;
        }

        // 4. Copy comments, preserving timestamps, with a merge marker.
        //    Copies that already landed in an earlier merge are skipped.
        for comment in self.uow.comments().list_for_issue(source_id)? {
            let body = format!("[merged from {}] {}", source.id, comment.body);
            if self.uow.comments().exists_matching(
                target_id,
                &comment.author,
                &body,
                &comment.created_at,
            )? {
                continue;
            }
            let mut copy = Comment::new(
                self.ids.next(prefix::COMMENT),
                target_id.clone(),
                comment.author.clone(),
                body,
            );
            copy.created_at = comment.created_at;
            self.uow.comments().add(&copy)?;
        }

        // 5. Disposition.
        let surviving_source = match disposition {
            MergeDisposition::Close => {
                // Merge always terminates the source, outside the
                // user-facing transition gate.
                let mut closed = source.with_status(Status::Closed);
                closed.blocked_reason = Some(format!("merged into {}", target.id));
                self.uow.issues().save(&closed)?;
                Some(closed)
            }
            MergeDisposition::Delete => {
                self.uow.issues().delete(source_id)?;
                None
            }
        };

        info!(source = %source_id, target = %target_id, "issues merged");
        self.record(
            user,
            AuditAction::Merge,
            source_id,
            format!("into {target_id}"),
        );
        self.record(
            user,
            AuditAction::Merge,
            target_id,
            format!("from {source_id}"),
        );

        Ok(MergeOutcome {
            target: self.uow.issues().get(target_id)?,
            source: surviving_source,
        })
    }

    // -- Duplicate detection -------------------------------------------------

    /// Ranks stored issues by similarity to the candidate. Advisory only;
    /// nothing is mutated.
    pub fn find_duplicates(
        &self,
        candidate: &Issue,
        min_score: f64,
        limit: usize,
    ) -> Result<Vec<DuplicateCandidate>> {
        let others = self.uow.issues().list(
            &IssueFilter::default(),
            &ListOptions::with_limit(u32::MAX),
        )?;

        let mut scored: Vec<DuplicateCandidate> = others
            .into_iter()
            .filter(|other| other.id != candidate.id)
            .map(|other| {
                let score = duplicate_score(
                    &candidate.title,
                    &candidate.labels,
                    &other.title,
                    &other.labels,
                );
                DuplicateCandidate { issue: other, score }
            })
            .filter(|c| c.score >= min_score)
            .collect();

        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(limit);
        Ok(scored)
    }

    // -- Internals -----------------------------------------------------------

    fn require_epic(&self, epic_id: &EntityId) -> Result<()> {
        let epic = self
            .uow
            .issues()
            .get(epic_id)
            .map_err(|_| ServiceError::not_found("epic", epic_id.as_str()))?;
        if !epic.is_epic() {
            return Err(ValidationError::NotAnEpic(epic_id.to_string()).into());
        }
        Ok(())
    }

    fn allocate_id(&self, id_prefix: &str) -> Result<EntityId> {
        for _ in 0..ID_RETRIES {
            let id = self.ids.next(id_prefix);
            if !self.uow.issues().exists(&id)? {
                return Ok(id);
            }
        }
        Err(ServiceError::IdGeneration {
            attempts: ID_RETRIES,
        })
    }

    fn record(&self, user: Option<&User>, action: AuditAction, id: &EntityId, details: String) {
        if let (Some(audit), Some(user)) = (self.audit, user) {
            audit.record(action, "issue", id.as_str(), &user.username, details);
        }
    }
}

/// Reopening an issue out of `closed` discards the stale `blocked_reason`:
/// a fresh cycle should not carry the old annotation.
fn clear_reason_on_reopen(current: &Issue, next: &mut Issue) {
    if current.status == Status::Closed && next.status != Status::Closed {
        next.blocked_reason = None;
    }
}

/// Comma-separated names of the fields a change set touches.
fn changed_fields(changes: &IssueChanges) -> String {
    let mut fields = Vec::new();
    if changes.title.is_some() {
        fields.push("title");
    }
    if changes.description.is_some() {
        fields.push("description");
    }
    if changes.status.is_some() {
        fields.push("status");
    }
    if changes.priority.is_some() {
        fields.push("priority");
    }
    if changes.issue_type.is_some() {
        fields.push("issue_type");
    }
    if changes.project_id.is_some() {
        fields.push("project_id");
    }
    if changes.epic_id.is_some() {
        fields.push("epic_id");
    }
    if changes.blocked_reason.is_some() {
        fields.push("blocked_reason");
    }
    if changes.source_url.is_some() {
        fields.push("source_url");
    }
    if changes.references.is_some() {
        fields.push("references");
    }
    if changes.assignees.is_some() {
        fields.push("assignees");
    }
    if changes.labels.is_some() {
        fields.push("labels");
    }
    fields.join(",")
}
