//! Full-text index maintenance and queries.
//!
//! The `issues_fts` virtual table is synchronized by explicit writes inside
//! the same transaction as the issue mutation: every save, batch write, and
//! delete in the issue repository calls into this module. Indexed fields
//! are title, description, and the labels joined by spaces.

use rusqlite::params;

use dotwork_core::id::EntityId;

use crate::error::Result;
use crate::repo::decode_err;
use crate::store::Session;

/// A single full-text match.
#[derive(Debug, Clone)]
pub struct FtsHit {
    pub issue_id: EntityId,
    /// BM25 rank; lower is more relevant.
    pub rank: f64,
}

/// Replaces the index row for one issue.
pub(crate) fn sync_issue(
    session: &Session,
    issue_id: &EntityId,
    title: &str,
    description: &str,
    labels: &[String],
) -> Result<()> {
    let conn = session.connection();
    session.record_query();
    conn.execute(
        "DELETE FROM issues_fts WHERE issue_id = ?1",
        params![issue_id.as_str()],
    )?;
    session.record_query();
    conn.execute(
        "INSERT INTO issues_fts (issue_id, title, description, labels)
         VALUES (?1, ?2, ?3, ?4)",
        params![issue_id.as_str(), title, description, labels.join(" ")],
    )?;
    Ok(())
}

/// Drops the index row for one issue.
pub(crate) fn remove_issue(session: &Session, issue_id: &EntityId) -> Result<()> {
    session.record_query();
    session.connection().execute(
        "DELETE FROM issues_fts WHERE issue_id = ?1",
        params![issue_id.as_str()],
    )?;
    Ok(())
}

/// Re-synchronizes the index rows for a set of issues from their current
/// table state. Used after batch updates.
pub(crate) fn sync_ids(session: &Session, ids: &[EntityId]) -> Result<()> {
    if ids.is_empty() {
        return Ok(());
    }
    let conn = session.connection();
    let placeholders = ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");

    session.record_query();
    conn.execute(
        &format!("DELETE FROM issues_fts WHERE issue_id IN ({placeholders})"),
        rusqlite::params_from_iter(ids.iter().map(EntityId::as_str)),
    )?;

    session.record_query();
    conn.execute(
        &format!(
            "INSERT INTO issues_fts (issue_id, title, description, labels)
             SELECT i.id, i.title, i.description,
                    COALESCE((SELECT GROUP_CONCAT(l.label, ' ' ORDER BY l.position)
                              FROM issue_labels l
                              WHERE l.issue_id = i.id), '')
             FROM issues i WHERE i.id IN ({placeholders})"
        ),
        rusqlite::params_from_iter(ids.iter().map(EntityId::as_str)),
    )?;
    Ok(())
}

/// Executes a full-text query. The match expression is bound as a
/// parameter, never interpolated; sanitization happens upstream.
pub fn search(session: &Session, match_query: &str, limit: u32) -> Result<Vec<FtsHit>> {
    let limit = session.clamp_limit(limit);
    let conn = session.connection();

    session.record_query();
    let mut stmt = conn.prepare(
        "SELECT issue_id, bm25(issues_fts) AS rank
         FROM issues_fts
         WHERE issues_fts MATCH ?1
         ORDER BY rank
         LIMIT ?2",
    )?;
    let rows = stmt.query_map(params![match_query, limit], |row| {
        let id_text: String = row.get(0)?;
        let rank: f64 = row.get(1)?;
        Ok(FtsHit {
            issue_id: EntityId::parse(&id_text).map_err(decode_err)?,
            rank,
        })
    })?;

    let mut hits = Vec::new();
    for row in rows {
        hits.push(row?);
    }
    Ok(hits)
}
