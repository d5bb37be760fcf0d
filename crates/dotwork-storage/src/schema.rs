//! DDL statements and versioned migrations for the SQLite schema.
//!
//! Timestamps are stored as TEXT in ISO 8601 format (SQLite has no native
//! datetime type). JSON-shaped columns (assignees, refs) are TEXT. Priority
//! is stored as its integer rank (0 = critical .. 4 = backlog) so priority
//! ordering is a plain `ORDER BY`.

/// Current schema version. Bumped whenever DDL or migrations change.
pub const CURRENT_SCHEMA_VERSION: i32 = 1;

/// Core DDL statements executed when creating a fresh database.
pub const SCHEMA_STATEMENTS: &[&str] = &[
    // -- Projects table ------------------------------------------------------
    r#"
    CREATE TABLE IF NOT EXISTS projects (
        id          TEXT PRIMARY KEY,
        name        TEXT NOT NULL UNIQUE,
        description TEXT NOT NULL DEFAULT '',
        owner       TEXT NOT NULL DEFAULT '',
        created_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
    )
    "#,
    // -- Issues table --------------------------------------------------------
    r#"
    CREATE TABLE IF NOT EXISTS issues (
        id             TEXT PRIMARY KEY,
        project_id     TEXT REFERENCES projects(id),
        title          TEXT NOT NULL,
        description    TEXT NOT NULL DEFAULT '',
        status         TEXT NOT NULL DEFAULT 'proposed',
        priority       INTEGER NOT NULL DEFAULT 2,
        issue_type     TEXT NOT NULL DEFAULT 'task',
        assignees      TEXT NOT NULL DEFAULT '[]',
        epic_id        TEXT REFERENCES issues(id) ON DELETE SET NULL,
        blocked_reason TEXT,
        source_url     TEXT,
        refs           TEXT NOT NULL DEFAULT '[]',
        created_at     TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
        updated_at     TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
        closed_at      TEXT
    )
    "#,
    // -- Indexes on issues ---------------------------------------------------
    "CREATE INDEX IF NOT EXISTS idx_issues_status ON issues(status)",
    "CREATE INDEX IF NOT EXISTS idx_issues_priority ON issues(priority)",
    "CREATE INDEX IF NOT EXISTS idx_issues_epic ON issues(epic_id)",
    "CREATE INDEX IF NOT EXISTS idx_issues_project ON issues(project_id)",
    "CREATE INDEX IF NOT EXISTS idx_issues_created_at ON issues(created_at)",
    // -- Labels table --------------------------------------------------------
    // `position` preserves insertion order for display.
    r#"
    CREATE TABLE IF NOT EXISTS issue_labels (
        issue_id TEXT NOT NULL REFERENCES issues(id) ON DELETE CASCADE,
        label    TEXT NOT NULL,
        position INTEGER NOT NULL,
        PRIMARY KEY (issue_id, label)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_issue_labels_label ON issue_labels(label)",
    // -- Dependencies table --------------------------------------------------
    r#"
    CREATE TABLE IF NOT EXISTS dependencies (
        from_issue_id TEXT NOT NULL REFERENCES issues(id) ON DELETE CASCADE,
        to_issue_id   TEXT NOT NULL REFERENCES issues(id) ON DELETE CASCADE,
        kind          TEXT NOT NULL DEFAULT 'blocks',
        created_at    TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
        PRIMARY KEY (from_issue_id, to_issue_id, kind)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_dependencies_from ON dependencies(from_issue_id)",
    "CREATE INDEX IF NOT EXISTS idx_dependencies_to ON dependencies(to_issue_id)",
    // -- Comments table ------------------------------------------------------
    r#"
    CREATE TABLE IF NOT EXISTS comments (
        id         TEXT PRIMARY KEY,
        issue_id   TEXT NOT NULL REFERENCES issues(id) ON DELETE CASCADE,
        author     TEXT NOT NULL,
        body       TEXT NOT NULL,
        created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_comments_issue ON comments(issue_id)",
    // -- Full-text index -----------------------------------------------------
    // Synchronized by explicit writes in the same transaction as the issue
    // mutation (see fts.rs). Labels are flattened to a space-joined string.
    r#"
    CREATE VIRTUAL TABLE IF NOT EXISTS issues_fts USING fts5(
        issue_id UNINDEXED,
        title,
        description,
        labels
    )
    "#,
    // -- Config table --------------------------------------------------------
    r#"
    CREATE TABLE IF NOT EXISTS config (
        key   TEXT PRIMARY KEY,
        value TEXT NOT NULL
    )
    "#,
    // -- Meta table (migration bookkeeping) ----------------------------------
    r#"
    CREATE TABLE IF NOT EXISTS meta (
        key   TEXT PRIMARY KEY,
        value TEXT NOT NULL
    )
    "#,
];

/// Versioned migration steps applied to databases older than
/// [`CURRENT_SCHEMA_VERSION`].
///
/// Each entry upgrades `version - 1` to `version` and is applied in order
/// inside a single transaction; a failing step rolls the whole upgrade back
/// and the engine refuses to open. Fresh databases are created directly at
/// the current version, so version 1 has no migration entry.
pub const MIGRATIONS: &[(i32, &str)] = &[
    // Future steps go here, e.g.:
    // (2, "ALTER TABLE issues ADD COLUMN triage_state TEXT DEFAULT ''"),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_sequential() {
        let mut expected = 2;
        for &(version, _) in MIGRATIONS {
            assert_eq!(version, expected, "migration versions must be gapless");
            expected += 1;
        }
    }

    #[test]
    fn migrations_end_at_current_version() {
        let last = MIGRATIONS.last().map(|&(v, _)| v).unwrap_or(1);
        assert_eq!(last, CURRENT_SCHEMA_VERSION);
    }
}
