//! Scope filter value type.
//!
//! A scope restricts which issues are visible to search and listing paths:
//! a project, a set of topic labels to include or exclude, and whether
//! shared (project-less) content participates. The canonical cache key makes
//! equal scopes hash identically regardless of construction order.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::id::EntityId;

/// A membership filter over `(project, topics, include_shared)`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ScopeFilter {
    /// Restrict to issues in this project.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<EntityId>,

    /// Topic labels the issue must carry at least one of (empty = any).
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub topics: BTreeSet<String>,

    /// Topic labels that exclude an issue outright.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub exclude_topics: BTreeSet<String>,

    /// Whether issues without a project are visible.
    #[serde(default)]
    pub include_shared: bool,
}

impl ScopeFilter {
    /// A scope that matches everything.
    pub fn everything() -> Self {
        Self {
            include_shared: true,
            ..Self::default()
        }
    }

    /// Returns `true` if the scope imposes no restriction at all.
    pub fn is_unrestricted(&self) -> bool {
        self.project.is_none()
            && self.topics.is_empty()
            && self.exclude_topics.is_empty()
            && self.include_shared
    }

    /// Canonical cache key: stable across construction order because the
    /// topic sets are ordered.
    pub fn canonical_key(&self) -> String {
        let project = self.project.as_ref().map(EntityId::as_str).unwrap_or("");
        let topics: Vec<&str> = self.topics.iter().map(String::as_str).collect();
        let excludes: Vec<&str> = self.exclude_topics.iter().map(String::as_str).collect();
        format!(
            "p={project};t={};x={};s={}",
            topics.join(","),
            excludes.join(","),
            self.include_shared
        )
    }
}
