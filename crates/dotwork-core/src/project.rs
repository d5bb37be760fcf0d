//! Project and User value types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::EntityId;

/// A project grouping issues. Names are unique across the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: EntityId,

    pub name: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub owner: String,

    pub created_at: DateTime<Utc>,
}

impl Project {
    /// Creates a project stamped now.
    pub fn new(id: EntityId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            description: String::new(),
            owner: String::new(),
            created_at: Utc::now(),
        }
    }
}

/// Acting user, carried through service calls for audit attribution.
///
/// A value object, never persisted; identity comes from the caller
/// (typically version-control configuration) and is recorded but not
/// checked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub username: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl User {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            email: None,
        }
    }

    pub fn with_email(username: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            email: Some(email.into()),
        }
    }
}
