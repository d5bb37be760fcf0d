//! Dependency edges -- typed relationships between issues.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::enums::DependencyKind;
use crate::id::EntityId;

/// A directed edge between two issues. `(from, to, kind)` is unique.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    pub from_issue_id: EntityId,

    pub to_issue_id: EntityId,

    pub kind: DependencyKind,

    pub created_at: DateTime<Utc>,
}

impl Dependency {
    /// Creates an edge stamped now.
    pub fn new(from_issue_id: EntityId, to_issue_id: EntityId, kind: DependencyKind) -> Self {
        Self {
            from_issue_id,
            to_issue_id,
            kind,
            created_at: Utc::now(),
        }
    }

    /// The uniqueness key of this edge.
    pub fn key(&self) -> (&EntityId, &EntityId, DependencyKind) {
        (&self.from_issue_id, &self.to_issue_id, self.kind)
    }

    /// Returns `true` if the edge starts and ends at the same issue.
    pub fn is_self_loop(&self) -> bool {
        self.from_issue_id == self.to_issue_id
    }
}

/// Direction selector for per-issue edge listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Edges leaving the issue.
    Out,
    /// Edges arriving at the issue.
    In,
    /// Both directions.
    Both,
}
