//! Filter and listing option types for issue queries.

use chrono::{DateTime, Utc};

use crate::enums::{IssueType, Priority, Status};
use crate::id::EntityId;

/// Filter for issue queries. All fields combine with AND semantics.
#[derive(Debug, Clone, Default)]
pub struct IssueFilter {
    pub status: Option<Status>,
    pub priority: Option<Priority>,
    pub issue_type: Option<IssueType>,

    /// `Some(None)` matches issues without a project.
    pub project_id: Option<Option<EntityId>>,
    pub epic_id: Option<EntityId>,

    pub assignee: Option<String>,

    /// AND semantics: issue must have ALL these labels.
    pub labels: Vec<String>,
    /// OR semantics: issue must have AT LEAST ONE of these labels.
    pub labels_any: Vec<String>,

    /// Filter by specific issue IDs.
    pub ids: Vec<EntityId>,

    // Date ranges
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
    pub updated_after: Option<DateTime<Utc>>,
    pub updated_before: Option<DateTime<Utc>>,

    /// Exclude issues with these statuses.
    pub exclude_status: Vec<Status>,
}

/// Sort key for issue listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortKey {
    #[default]
    CreatedAt,
    UpdatedAt,
    Priority,
    Title,
}

/// Listing window. Listings are never unbounded: `limit` is required and
/// repositories clamp it to the configured ceiling.
#[derive(Debug, Clone, Copy)]
pub struct ListOptions {
    pub sort: SortKey,
    pub descending: bool,
    pub limit: u32,
    pub offset: u32,
}

impl ListOptions {
    /// Newest-first listing with the given limit.
    pub fn with_limit(limit: u32) -> Self {
        Self {
            sort: SortKey::CreatedAt,
            descending: true,
            limit,
            offset: 0,
        }
    }

    pub fn sorted_by(mut self, sort: SortKey, descending: bool) -> Self {
        self.sort = sort;
        self.descending = descending;
        self
    }

    pub fn offset(mut self, offset: u32) -> Self {
        self.offset = offset;
        self
    }
}

/// Fixed set of grouping keys for counted statistics.
///
/// User input selects one of these variants; the SQL fragment each maps to
/// is a literal owned by the storage layer, so no user-supplied string ever
/// names a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GroupKey {
    Status,
    Priority,
    IssueType,
    EpicId,
    ProjectId,
}

impl GroupKey {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Status => "status",
            Self::Priority => "priority",
            Self::IssueType => "issue_type",
            Self::EpicId => "epic_id",
            Self::ProjectId => "project_id",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issue_filter_defaults() {
        let f = IssueFilter::default();
        assert!(f.status.is_none());
        assert!(f.labels.is_empty());
        assert!(f.exclude_status.is_empty());
    }

    #[test]
    fn list_options_builder() {
        let opts = ListOptions::with_limit(25)
            .sorted_by(SortKey::Priority, false)
            .offset(50);
        assert_eq!(opts.limit, 25);
        assert_eq!(opts.offset, 50);
        assert_eq!(opts.sort, SortKey::Priority);
        assert!(!opts.descending);
    }

    #[test]
    fn group_key_names() {
        assert_eq!(GroupKey::Status.as_str(), "status");
        assert_eq!(GroupKey::EpicId.as_str(), "epic_id");
    }
}
