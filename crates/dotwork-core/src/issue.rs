//! Issue struct -- the central domain model for the dot-work issue tracker.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::comment::Comment;
use crate::dependency::Dependency;
use crate::enums::{IssueType, Priority, Status};
use crate::id::EntityId;

/// Helper for `skip_serializing_if` on `Vec` fields.
fn is_empty_vec<T>(v: &Vec<T>) -> bool {
    v.is_empty()
}

/// Represents a trackable work item.
///
/// Issues are immutable in the large: mutators return a new value with
/// `updated_at` refreshed. Collection fields keep insertion order and are
/// deduplicated on the way in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Issue {
    // ===== Core identification =====
    pub id: EntityId,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<EntityId>,

    // ===== Content =====
    pub title: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,

    // ===== Status & workflow =====
    #[serde(default)]
    pub status: Status,

    #[serde(default)]
    pub priority: Priority,

    #[serde(default)]
    pub issue_type: IssueType,

    // ===== Assignment =====
    #[serde(default, skip_serializing_if = "is_empty_vec")]
    pub assignees: Vec<String>,

    /// Insertion order preserved for display; uniqueness enforced.
    #[serde(default, skip_serializing_if = "is_empty_vec")]
    pub labels: Vec<String>,

    // ===== Aggregation =====
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub epic_id: Option<EntityId>,

    // ===== Annotations =====
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocked_reason: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,

    #[serde(default, skip_serializing_if = "is_empty_vec")]
    pub references: Vec<String>,

    // ===== Timestamps =====
    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,

    /// Set iff status is terminal (completed or closed).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<DateTime<Utc>>,

    // ===== Relational data (populated for export/import) =====
    #[serde(default, skip_serializing_if = "is_empty_vec")]
    pub comments: Vec<Comment>,

    #[serde(default, skip_serializing_if = "is_empty_vec")]
    pub dependencies: Vec<Dependency>,
}

/// Keeps the first occurrence of each string, preserving order.
pub fn dedup_preserving_order(items: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.clone()))
        .collect()
}

impl Issue {
    /// Creates a minimal issue with the given id and title.
    pub fn new(id: EntityId, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            project_id: None,
            title: title.into(),
            description: String::new(),
            status: Status::Proposed,
            priority: Priority::Medium,
            issue_type: IssueType::Task,
            assignees: Vec::new(),
            labels: Vec::new(),
            epic_id: None,
            blocked_reason: None,
            source_url: None,
            references: Vec::new(),
            created_at: now,
            updated_at: now,
            closed_at: None,
            comments: Vec::new(),
            dependencies: Vec::new(),
        }
    }

    /// Returns `true` if this issue is an epic.
    pub fn is_epic(&self) -> bool {
        self.issue_type == IssueType::Epic
    }

    /// Copy-with-changes: applies the `Some` fields of `changes` and
    /// refreshes `updated_at`.
    ///
    /// The status field is applied verbatim (with `closed_at` kept in sync);
    /// enforcing the transition state machine is the service layer's job.
    pub fn apply(&self, changes: &IssueChanges) -> Self {
        let mut next = self.clone();

        if let Some(ref title) = changes.title {
            next.title = title.clone();
        }
        if let Some(ref description) = changes.description {
            next.description = description.clone();
        }
        if let Some(priority) = changes.priority {
            next.priority = priority;
        }
        if let Some(issue_type) = changes.issue_type {
            next.issue_type = issue_type;
        }
        if let Some(ref project_id) = changes.project_id {
            next.project_id = project_id.clone();
        }
        if let Some(ref epic_id) = changes.epic_id {
            next.epic_id = epic_id.clone();
        }
        if let Some(ref blocked_reason) = changes.blocked_reason {
            next.blocked_reason = blocked_reason.clone();
        }
        if let Some(ref source_url) = changes.source_url {
            next.source_url = source_url.clone();
        }
        if let Some(ref references) = changes.references {
            next.references = dedup_preserving_order(references.clone());
        }
        if let Some(ref assignees) = changes.assignees {
            next.assignees = dedup_preserving_order(assignees.clone());
        }
        if let Some(ref labels) = changes.labels {
            next.labels = dedup_preserving_order(labels.clone());
        }
        if let Some(status) = changes.status {
            next = next.with_status(status);
        }

        next.updated_at = Utc::now();
        next
    }

    /// Returns a copy in the given status with `closed_at` kept in sync:
    /// entering a terminal status stamps it, leaving one clears it.
    pub fn with_status(&self, status: Status) -> Self {
        let mut next = self.clone();
        next.status = status;
        next.closed_at = if status.is_terminal() {
            Some(self.closed_at.unwrap_or_else(Utc::now))
        } else {
            None
        };
        next.updated_at = Utc::now();
        next
    }

    /// Returns a copy with the label appended (no-op if already present).
    pub fn with_label(&self, label: &str) -> Self {
        let mut next = self.clone();
        if !next.labels.iter().any(|l| l == label) {
            next.labels.push(label.to_owned());
            next.updated_at = Utc::now();
        }
        next
    }

    /// Returns a copy with the label removed (no-op if absent).
    pub fn without_label(&self, label: &str) -> Self {
        let mut next = self.clone();
        let before = next.labels.len();
        next.labels.retain(|l| l != label);
        if next.labels.len() != before {
            next.updated_at = Utc::now();
        }
        next
    }

    /// Returns a copy with the assignee added (no-op if already present).
    pub fn with_assignee(&self, user: &str) -> Self {
        let mut next = self.clone();
        if !next.assignees.iter().any(|a| a == user) {
            next.assignees.push(user.to_owned());
            next.updated_at = Utc::now();
        }
        next
    }

    /// Returns a copy with the assignee removed (no-op if absent).
    pub fn without_assignee(&self, user: &str) -> Self {
        let mut next = self.clone();
        let before = next.assignees.len();
        next.assignees.retain(|a| a != user);
        if next.assignees.len() != before {
            next.updated_at = Utc::now();
        }
        next
    }
}

/// Typed partial-update struct for issues.
///
/// Only `Some` fields are applied; `None` fields are left unchanged. Double
/// options (`Option<Option<T>>`) distinguish "leave alone" from "clear".
#[derive(Debug, Clone, Default)]
pub struct IssueChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<Status>,
    pub priority: Option<Priority>,
    pub issue_type: Option<IssueType>,
    pub project_id: Option<Option<EntityId>>,
    pub epic_id: Option<Option<EntityId>>,
    pub blocked_reason: Option<Option<String>>,
    pub source_url: Option<Option<String>>,
    pub references: Option<Vec<String>>,
    pub assignees: Option<Vec<String>>,
    pub labels: Option<Vec<String>>,
}

impl IssueChanges {
    /// Returns `true` if no field is set.
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.status.is_none()
            && self.priority.is_none()
            && self.issue_type.is_none()
            && self.project_id.is_none()
            && self.epic_id.is_none()
            && self.blocked_reason.is_none()
            && self.source_url.is_none()
            && self.references.is_none()
            && self.assignees.is_none()
            && self.labels.is_none()
    }
}

/// Builder for constructing an [`Issue`] with a fluent API.
pub struct IssueBuilder {
    issue: Issue,
}

impl IssueBuilder {
    /// Creates a new builder with the given id and title.
    pub fn new(id: EntityId, title: impl Into<String>) -> Self {
        Self {
            issue: Issue::new(id, title),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.issue.description = description.into();
        self
    }

    pub fn status(mut self, status: Status) -> Self {
        self.issue.status = status;
        if status.is_terminal() && self.issue.closed_at.is_none() {
            self.issue.closed_at = Some(Utc::now());
        }
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.issue.priority = priority;
        self
    }

    pub fn issue_type(mut self, issue_type: IssueType) -> Self {
        self.issue.issue_type = issue_type;
        self
    }

    pub fn project_id(mut self, project_id: EntityId) -> Self {
        self.issue.project_id = Some(project_id);
        self
    }

    pub fn epic_id(mut self, epic_id: EntityId) -> Self {
        self.issue.epic_id = Some(epic_id);
        self
    }

    pub fn assignees(mut self, assignees: Vec<String>) -> Self {
        self.issue.assignees = dedup_preserving_order(assignees);
        self
    }

    pub fn labels(mut self, labels: Vec<String>) -> Self {
        self.issue.labels = dedup_preserving_order(labels);
        self
    }

    pub fn blocked_reason(mut self, reason: impl Into<String>) -> Self {
        self.issue.blocked_reason = Some(reason.into());
        self
    }

    pub fn source_url(mut self, url: impl Into<String>) -> Self {
        self.issue.source_url = Some(url.into());
        self
    }

    pub fn references(mut self, references: Vec<String>) -> Self {
        self.issue.references = dedup_preserving_order(references);
        self
    }

    pub fn created_at(mut self, t: DateTime<Utc>) -> Self {
        self.issue.created_at = t;
        self.issue.updated_at = t;
        self
    }

    /// Consumes the builder and returns the constructed [`Issue`].
    pub fn build(self) -> Issue {
        self.issue
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_id(n: u32) -> EntityId {
        EntityId::parse(&format!("issue-t{n}@00000000")).unwrap()
    }

    #[test]
    fn new_issue_defaults() {
        let issue = Issue::new(test_id(1), "Fix the bug");
        assert_eq!(issue.status, Status::Proposed);
        assert_eq!(issue.priority, Priority::Medium);
        assert_eq!(issue.issue_type, IssueType::Task);
        assert_eq!(issue.created_at, issue.updated_at);
        assert!(issue.closed_at.is_none());
    }

    #[test]
    fn builder_basic() {
        let issue = IssueBuilder::new(test_id(2), "Add dashboard")
            .priority(Priority::High)
            .issue_type(IssueType::Feature)
            .labels(vec!["ui".into(), "ui".into(), "dashboard".into()])
            .build();

        assert_eq!(issue.title, "Add dashboard");
        assert_eq!(issue.priority, Priority::High);
        assert_eq!(issue.labels, vec!["ui", "dashboard"]);
    }

    #[test]
    fn apply_changes_bumps_updated_at() {
        let issue = Issue::new(test_id(3), "Original");
        let changes = IssueChanges {
            title: Some("Renamed".into()),
            priority: Some(Priority::Critical),
            ..Default::default()
        };
        let next = issue.apply(&changes);
        assert_eq!(next.title, "Renamed");
        assert_eq!(next.priority, Priority::Critical);
        assert!(next.updated_at >= issue.updated_at);
        // Original untouched.
        assert_eq!(issue.title, "Original");
    }

    #[test]
    fn with_status_syncs_closed_at() {
        let issue = Issue::new(test_id(4), "Lifecycle");
        let completed = issue.with_status(Status::Completed);
        assert!(completed.closed_at.is_some());

        let reopened = completed.with_status(Status::InProgress);
        assert!(reopened.closed_at.is_none());
    }

    #[test]
    fn label_set_semantics() {
        let issue = Issue::new(test_id(5), "Labels")
            .with_label("bug")
            .with_label("ui")
            .with_label("bug");
        assert_eq!(issue.labels, vec!["bug", "ui"]);

        let issue = issue.without_label("bug");
        assert_eq!(issue.labels, vec!["ui"]);

        // Removing an absent label is a no-op.
        let issue = issue.without_label("nope");
        assert_eq!(issue.labels, vec!["ui"]);
    }

    #[test]
    fn assignee_set_semantics() {
        let issue = Issue::new(test_id(6), "Assignees")
            .with_assignee("alice")
            .with_assignee("bob")
            .with_assignee("alice");
        assert_eq!(issue.assignees, vec!["alice", "bob"]);
        assert_eq!(issue.without_assignee("alice").assignees, vec!["bob"]);
    }

    #[test]
    fn serde_roundtrip() {
        let issue = IssueBuilder::new(test_id(7), "Round trip")
            .description("body text")
            .labels(vec!["x".into(), "y".into()])
            .build();

        let json = serde_json::to_string(&issue).unwrap();
        let back: Issue = serde_json::from_str(&json).unwrap();
        assert_eq!(back, issue);
    }

    #[test]
    fn serde_rejects_unknown_fields() {
        let json = r#"{"id":"issue-a1@00000000","title":"x",
            "created_at":"2024-01-01T00:00:00Z","updated_at":"2024-01-01T00:00:00Z",
            "bogus_field":1}"#;
        assert!(serde_json::from_str::<Issue>(json).is_err());
    }
}
