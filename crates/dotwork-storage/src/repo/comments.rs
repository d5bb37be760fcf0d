//! Comment repository.

use chrono::{DateTime, Utc};
use rusqlite::{params, Row};

use dotwork_core::comment::Comment;
use dotwork_core::id::EntityId;

use crate::error::{Result, StoreError};
use crate::repo::{decode_err, format_datetime, parse_datetime};
use crate::store::Session;

fn scan_comment(row: &Row<'_>) -> rusqlite::Result<Comment> {
    let id_text: String = row.get(0)?;
    let issue_text: String = row.get(1)?;
    let created_text: String = row.get(4)?;

    Ok(Comment {
        id: EntityId::parse(&id_text).map_err(decode_err)?,
        issue_id: EntityId::parse(&issue_text).map_err(decode_err)?,
        author: row.get(2)?,
        body: row.get(3)?,
        created_at: parse_datetime(&created_text).map_err(decode_err)?,
    })
}

/// Comment persistence over the unit-of-work session.
pub struct CommentRepository {
    session: Session,
}

impl CommentRepository {
    pub(crate) fn new(session: Session) -> Self {
        Self { session }
    }

    /// Inserts a comment, preserving its `created_at` (merge copies and
    /// imports carry original timestamps).
    pub fn add(&self, comment: &Comment) -> Result<()> {
        self.session.record_query();
        self.session.connection().execute(
            "INSERT INTO comments (id, issue_id, author, body, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                comment.id.as_str(),
                comment.issue_id.as_str(),
                comment.author,
                comment.body,
                format_datetime(&comment.created_at),
            ],
        )?;
        Ok(())
    }

    /// All comments on an issue, oldest first.
    pub fn list_for_issue(&self, issue_id: &EntityId) -> Result<Vec<Comment>> {
        self.session.record_query();
        let mut stmt = self.session.connection().prepare(
            "SELECT id, issue_id, author, body, created_at
             FROM comments WHERE issue_id = ?1
             ORDER BY created_at ASC, id ASC",
        )?;
        let rows = stmt.query_map(params![issue_id.as_str()], scan_comment)?;

        let mut comments = Vec::new();
        for row in rows {
            comments.push(row?);
        }
        Ok(comments)
    }

    /// Deletes a comment by id.
    pub fn delete(&self, id: &EntityId) -> Result<()> {
        self.session.record_query();
        let affected = self
            .session
            .connection()
            .execute("DELETE FROM comments WHERE id = ?1", params![id.as_str()])?;
        if affected == 0 {
            return Err(StoreError::not_found("comment", id.as_str()));
        }
        Ok(())
    }

    /// Returns `true` if the issue already holds a comment with the same
    /// author, body, and timestamp. Keeps merge copies idempotent.
    pub fn exists_matching(
        &self,
        issue_id: &EntityId,
        author: &str,
        body: &str,
        created_at: &DateTime<Utc>,
    ) -> Result<bool> {
        self.session.record_query();
        let count: i64 = self.session.connection().query_row(
            "SELECT COUNT(*) FROM comments
             WHERE issue_id = ?1 AND author = ?2 AND body = ?3 AND created_at = ?4",
            params![
                issue_id.as_str(),
                author,
                body,
                format_datetime(created_at)
            ],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }
}
