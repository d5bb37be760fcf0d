//! Comment type.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::EntityId;

/// A comment on an issue. Immutable once created except via delete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: EntityId,

    pub issue_id: EntityId,

    pub author: String,

    pub body: String,

    pub created_at: DateTime<Utc>,
}

impl Comment {
    /// Creates a comment stamped now.
    pub fn new(
        id: EntityId,
        issue_id: EntityId,
        author: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            id,
            issue_id,
            author: author.into(),
            body: body.into(),
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comment_serde_roundtrip() {
        let c = Comment::new(
            EntityId::parse("comment-abc@00000000").unwrap(),
            EntityId::parse("issue-xyz@11111111").unwrap(),
            "alice",
            "Looks good to me",
        );

        let json = serde_json::to_string(&c).unwrap();
        let back: Comment = serde_json::from_str(&json).unwrap();
        assert_eq!(back, c);
    }
}
