//! Issue repository: CRUD, typed queries, and batch writes.

use std::collections::HashMap;

use chrono::Utc;
use rusqlite::{params, Row};

use dotwork_core::enums::{IssueType, Priority, Status};
use dotwork_core::filter::{GroupKey, IssueFilter, ListOptions, SortKey};
use dotwork_core::id::EntityId;
use dotwork_core::issue::{Issue, IssueChanges};

use crate::error::{Result, StoreError};
use crate::fts;
use crate::repo::{decode_err, format_datetime, parse_datetime};
use crate::store::Session;

/// All issue columns in a deterministic order for SELECT queries.
pub(crate) const ISSUE_COLUMNS: &str = r#"
    id, project_id, title, description, status, priority, issue_type,
    assignees, epic_id, blocked_reason, source_url, refs,
    created_at, updated_at, closed_at
"#;

/// Open/closed/total counts for one epic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct EpicCounts {
    pub open: i64,
    pub closed: i64,
    pub total: i64,
}

/// Deserialises a row into an [`Issue`]. Labels are hydrated separately.
///
/// The column order MUST match [`ISSUE_COLUMNS`].
pub(crate) fn scan_issue(row: &Row<'_>) -> rusqlite::Result<Issue> {
    let id_text: String = row.get("id")?;
    let project_text: Option<String> = row.get("project_id")?;
    let title: String = row.get("title")?;
    let description: String = row.get("description")?;
    let status_text: String = row.get("status")?;
    let priority_rank: i32 = row.get("priority")?;
    let type_text: String = row.get("issue_type")?;
    let assignees_text: String = row.get("assignees")?;
    let epic_text: Option<String> = row.get("epic_id")?;
    let blocked_reason: Option<String> = row.get("blocked_reason")?;
    let source_url: Option<String> = row.get("source_url")?;
    let refs_text: String = row.get("refs")?;
    let created_text: String = row.get("created_at")?;
    let updated_text: String = row.get("updated_at")?;
    let closed_text: Option<String> = row.get("closed_at")?;

    let id = EntityId::parse(&id_text).map_err(decode_err)?;
    let project_id = project_text
        .as_deref()
        .map(EntityId::parse)
        .transpose()
        .map_err(decode_err)?;
    let epic_id = epic_text
        .as_deref()
        .map(EntityId::parse)
        .transpose()
        .map_err(decode_err)?;

    let status: Status = status_text.parse().map_err(decode_err)?;
    let issue_type: IssueType = type_text.parse().map_err(decode_err)?;
    let priority = Priority::from_rank(priority_rank).ok_or_else(|| {
        decode_err(dotwork_core::enums::ParseEnumError {
            kind: "Priority",
            value: priority_rank.to_string(),
        })
    })?;

    let assignees: Vec<String> = serde_json::from_str(&assignees_text).map_err(decode_err)?;
    let references: Vec<String> = serde_json::from_str(&refs_text).map_err(decode_err)?;

    let created_at = parse_datetime(&created_text).map_err(decode_err)?;
    let updated_at = parse_datetime(&updated_text).map_err(decode_err)?;
    let closed_at = closed_text
        .as_deref()
        .map(parse_datetime)
        .transpose()
        .map_err(decode_err)?;

    Ok(Issue {
        id,
        project_id,
        title,
        description,
        status,
        priority,
        issue_type,
        assignees,
        labels: Vec::new(),
        epic_id,
        blocked_reason,
        source_url,
        references,
        created_at,
        updated_at,
        closed_at,
        comments: Vec::new(),
        dependencies: Vec::new(),
    })
}

/// The 15 bound values for one issue row, in [`ISSUE_COLUMNS`] order.
fn issue_params(issue: &Issue) -> Result<Vec<Box<dyn rusqlite::types::ToSql>>> {
    let assignees = serde_json::to_string(&issue.assignees)?;
    let references = serde_json::to_string(&issue.references)?;

    Ok(vec![
        Box::new(issue.id.as_str().to_owned()),
        Box::new(issue.project_id.as_ref().map(|p| p.as_str().to_owned())),
        Box::new(issue.title.clone()),
        Box::new(issue.description.clone()),
        Box::new(issue.status.as_str().to_owned()),
        Box::new(issue.priority.rank()),
        Box::new(issue.issue_type.as_str().to_owned()),
        Box::new(assignees),
        Box::new(issue.epic_id.as_ref().map(|e| e.as_str().to_owned())),
        Box::new(issue.blocked_reason.clone()),
        Box::new(issue.source_url.clone()),
        Box::new(references),
        Box::new(format_datetime(&issue.created_at)),
        Box::new(format_datetime(&issue.updated_at)),
        Box::new(issue.closed_at.as_ref().map(format_datetime)),
    ])
}

const UPSERT_CONFLICT_CLAUSE: &str = r#"
    ON CONFLICT(id) DO UPDATE SET
        project_id = excluded.project_id,
        title = excluded.title,
        description = excluded.description,
        status = excluded.status,
        priority = excluded.priority,
        issue_type = excluded.issue_type,
        assignees = excluded.assignees,
        epic_id = excluded.epic_id,
        blocked_reason = excluded.blocked_reason,
        source_url = excluded.source_url,
        refs = excluded.refs,
        updated_at = excluded.updated_at,
        closed_at = excluded.closed_at
"#;

/// Issue persistence over the unit-of-work session.
pub struct IssueRepository {
    session: Session,
}

impl IssueRepository {
    pub(crate) fn new(session: Session) -> Self {
        Self { session }
    }

    // -- Reads ---------------------------------------------------------------

    /// Retrieves an issue by id, with labels hydrated.
    pub fn get(&self, id: &EntityId) -> Result<Issue> {
        let conn = self.session.connection();
        let sql = format!("SELECT {ISSUE_COLUMNS} FROM issues WHERE id = ?1");

        self.session.record_query();
        let mut issue = conn
            .query_row(&sql, params![id.as_str()], scan_issue)
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::not_found("issue", id.as_str()),
                other => StoreError::from(other),
            })?;

        self.hydrate_labels(std::slice::from_mut(&mut issue))?;
        Ok(issue)
    }

    /// Returns `true` if an issue with this id exists.
    pub fn exists(&self, id: &EntityId) -> Result<bool> {
        self.session.record_query();
        let count: i64 = self.session.connection().query_row(
            "SELECT COUNT(*) FROM issues WHERE id = ?1",
            params![id.as_str()],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Lists issues matching the filter, bounded by the listing window.
    pub fn list(&self, filter: &IssueFilter, opts: &ListOptions) -> Result<Vec<Issue>> {
        let (where_sql, param_values) = build_where(filter)?;

        let order_col = match opts.sort {
            SortKey::CreatedAt => "created_at",
            SortKey::UpdatedAt => "updated_at",
            SortKey::Priority => "priority",
            SortKey::Title => "title",
        };
        let direction = if opts.descending { "DESC" } else { "ASC" };
        let limit = self.session.clamp_limit(opts.limit);

        let sql = format!(
            "SELECT {ISSUE_COLUMNS} FROM issues {where_sql}
             ORDER BY {order_col} {direction}, id ASC
             LIMIT {limit} OFFSET {offset}",
            offset = opts.offset
        );

        let param_refs: Vec<&dyn rusqlite::types::ToSql> =
            param_values.iter().map(|p| p.as_ref()).collect();

        self.session.record_query();
        let mut stmt = self.session.connection().prepare(&sql)?;
        let rows = stmt.query_map(param_refs.as_slice(), scan_issue)?;

        let mut issues = Vec::new();
        for row in rows {
            issues.push(row?);
        }
        self.hydrate_labels(&mut issues)?;
        Ok(issues)
    }

    /// Lists non-epic issues assigned to an epic.
    pub fn list_by_epic(&self, epic_id: &EntityId, opts: &ListOptions) -> Result<Vec<Issue>> {
        let filter = IssueFilter {
            epic_id: Some(epic_id.clone()),
            ..Default::default()
        };
        self.list(&filter, opts)
    }

    /// Cursor page ordered by id; the cursor is the last id of the previous
    /// page. Serves exports.
    pub fn list_page(&self, after: Option<&EntityId>, limit: u32) -> Result<Vec<Issue>> {
        let limit = self.session.clamp_limit(limit);
        let conn = self.session.connection();

        let (sql, params_vec): (String, Vec<String>) = match after {
            Some(cursor) => (
                format!(
                    "SELECT {ISSUE_COLUMNS} FROM issues WHERE id > ?1 ORDER BY id ASC LIMIT {limit}"
                ),
                vec![cursor.as_str().to_owned()],
            ),
            None => (
                format!("SELECT {ISSUE_COLUMNS} FROM issues ORDER BY id ASC LIMIT {limit}"),
                Vec::new(),
            ),
        };

        self.session.record_query();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(params_vec.iter()), scan_issue)?;

        let mut issues = Vec::new();
        for row in rows {
            issues.push(row?);
        }
        self.hydrate_labels(&mut issues)?;
        Ok(issues)
    }

    /// Issues ready to work on: status proposed or in_progress, no incoming
    /// `blocks` edge from a non-terminal issue, no outgoing `depends_on`
    /// edge to a non-terminal issue. Ordered by priority then age.
    pub fn list_ready(&self, limit: u32) -> Result<Vec<Issue>> {
        let limit = self.session.clamp_limit(limit);
        let sql = format!(
            "SELECT {ISSUE_COLUMNS} FROM issues
             WHERE status IN ('proposed', 'in_progress')
               AND NOT EXISTS (
                   SELECT 1 FROM dependencies d
                   INNER JOIN issues blocker ON blocker.id = d.from_issue_id
                   WHERE d.to_issue_id = issues.id
                     AND d.kind = 'blocks'
                     AND blocker.status NOT IN ('completed', 'closed')
               )
               AND NOT EXISTS (
                   SELECT 1 FROM dependencies d
                   INNER JOIN issues target ON target.id = d.to_issue_id
                   WHERE d.from_issue_id = issues.id
                     AND d.kind = 'depends_on'
                     AND target.status NOT IN ('completed', 'closed')
               )
             ORDER BY priority ASC, created_at ASC, id ASC
             LIMIT {limit}"
        );

        self.session.record_query();
        let mut stmt = self.session.connection().prepare(&sql)?;
        let rows = stmt.query_map([], scan_issue)?;

        let mut issues = Vec::new();
        for row in rows {
            issues.push(row?);
        }
        self.hydrate_labels(&mut issues)?;
        Ok(issues)
    }

    // -- Writes --------------------------------------------------------------

    /// Inserts or replaces an issue by id, rewrites its label rows, and
    /// synchronizes the full-text index.
    pub fn save(&self, issue: &Issue) -> Result<()> {
        let values = issue_params(issue)?;
        let param_refs: Vec<&dyn rusqlite::types::ToSql> =
            values.iter().map(|p| p.as_ref()).collect();

        let sql = format!(
            "INSERT INTO issues ({ISSUE_COLUMNS}) VALUES
             (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
             {UPSERT_CONFLICT_CLAUSE}"
        );

        self.session.record_query();
        self.session
            .connection()
            .execute(&sql, param_refs.as_slice())?;

        self.write_labels(&issue.id, &issue.labels)?;
        fts::sync_issue(
            &self.session,
            &issue.id,
            &issue.title,
            &issue.description,
            &issue.labels,
        )?;
        Ok(())
    }

    /// Deletes an issue; label, comment and dependency rows cascade, and the
    /// full-text row is dropped explicitly.
    pub fn delete(&self, id: &EntityId) -> Result<()> {
        self.session.record_query();
        let affected = self
            .session
            .connection()
            .execute("DELETE FROM issues WHERE id = ?1", params![id.as_str()])?;
        if affected == 0 {
            return Err(StoreError::not_found("issue", id.as_str()));
        }
        fts::remove_issue(&self.session, id)?;
        Ok(())
    }

    /// Inserts a batch of issues with one statement, then their labels and
    /// full-text rows with one statement each.
    pub fn insert_batch(&self, issues: &[Issue]) -> Result<()> {
        if issues.is_empty() {
            return Ok(());
        }
        let conn = self.session.connection();

        // Issues: one multi-VALUES statement.
        let row_placeholders = (0..issues.len())
            .map(|i| {
                let base = i * 15;
                let slots: Vec<String> = (1..=15).map(|j| format!("?{}", base + j)).collect();
                format!("({})", slots.join(", "))
            })
            .collect::<Vec<_>>()
            .join(",\n");

        let mut all_values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();
        for issue in issues {
            all_values.extend(issue_params(issue)?);
        }
        let param_refs: Vec<&dyn rusqlite::types::ToSql> =
            all_values.iter().map(|p| p.as_ref()).collect();

        self.session.record_query();
        conn.execute(
            &format!("INSERT INTO issues ({ISSUE_COLUMNS}) VALUES {row_placeholders}"),
            param_refs.as_slice(),
        )?;

        // Labels: one multi-VALUES statement across all issues.
        let mut label_rows: Vec<(String, String, i64)> = Vec::new();
        for issue in issues {
            for (position, label) in issue.labels.iter().enumerate() {
                label_rows.push((issue.id.as_str().to_owned(), label.clone(), position as i64));
            }
        }
        if !label_rows.is_empty() {
            let placeholders = (0..label_rows.len())
                .map(|i| format!("(?{}, ?{}, ?{})", i * 3 + 1, i * 3 + 2, i * 3 + 3))
                .collect::<Vec<_>>()
                .join(",");
            let mut label_values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();
            for (issue_id, label, position) in &label_rows {
                label_values.push(Box::new(issue_id.clone()));
                label_values.push(Box::new(label.clone()));
                label_values.push(Box::new(*position));
            }
            let label_refs: Vec<&dyn rusqlite::types::ToSql> =
                label_values.iter().map(|p| p.as_ref()).collect();

            self.session.record_query();
            conn.execute(
                &format!(
                    "INSERT INTO issue_labels (issue_id, label, position) VALUES {placeholders}"
                ),
                label_refs.as_slice(),
            )?;
        }

        // Full-text rows: one multi-VALUES statement.
        let fts_placeholders = (0..issues.len())
            .map(|i| format!("(?{}, ?{}, ?{}, ?{})", i * 4 + 1, i * 4 + 2, i * 4 + 3, i * 4 + 4))
            .collect::<Vec<_>>()
            .join(",");
        let mut fts_values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();
        for issue in issues {
            fts_values.push(Box::new(issue.id.as_str().to_owned()));
            fts_values.push(Box::new(issue.title.clone()));
            fts_values.push(Box::new(issue.description.clone()));
            fts_values.push(Box::new(issue.labels.join(" ")));
        }
        let fts_refs: Vec<&dyn rusqlite::types::ToSql> =
            fts_values.iter().map(|p| p.as_ref()).collect();

        self.session.record_query();
        conn.execute(
            &format!(
                "INSERT INTO issues_fts (issue_id, title, description, labels)
                 VALUES {fts_placeholders}"
            ),
            fts_refs.as_slice(),
        )?;

        Ok(())
    }

    /// Applies uniform scalar changes to a set of issues with one UPDATE
    /// statement, then re-syncs the full-text rows if text changed.
    ///
    /// Label and assignee rewrites go through [`IssueRepository::save`].
    pub fn update_batch(&self, ids: &[EntityId], changes: &IssueChanges) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        if changes.labels.is_some() || changes.assignees.is_some() {
            return Err(StoreError::Transaction(
                "update_batch cannot rewrite labels or assignees".into(),
            ));
        }

        let mut set_clauses: Vec<String> = Vec::new();
        let mut param_values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

        if let Some(ref title) = changes.title {
            set_clauses.push("title = ?".into());
            param_values.push(Box::new(title.clone()));
        }
        if let Some(ref description) = changes.description {
            set_clauses.push("description = ?".into());
            param_values.push(Box::new(description.clone()));
        }
        if let Some(status) = changes.status {
            set_clauses.push("status = ?".into());
            param_values.push(Box::new(status.as_str().to_owned()));
            if status.is_terminal() {
                set_clauses.push("closed_at = COALESCE(closed_at, ?)".into());
                param_values.push(Box::new(format_datetime(&Utc::now())));
            } else {
                set_clauses.push("closed_at = NULL".into());
                // Rows reopened out of closed drop their stale annotation,
                // unless this change writes a new one. The CASE reads the
                // pre-update status.
                if changes.blocked_reason.is_none() {
                    set_clauses.push(
                        "blocked_reason = CASE WHEN status = 'closed'
                             THEN NULL ELSE blocked_reason END"
                            .into(),
                    );
                }
            }
        }
        if let Some(priority) = changes.priority {
            set_clauses.push("priority = ?".into());
            param_values.push(Box::new(priority.rank()));
        }
        if let Some(issue_type) = changes.issue_type {
            set_clauses.push("issue_type = ?".into());
            param_values.push(Box::new(issue_type.as_str().to_owned()));
        }
        if let Some(ref project_id) = changes.project_id {
            set_clauses.push("project_id = ?".into());
            param_values.push(Box::new(
                project_id.as_ref().map(|p| p.as_str().to_owned()),
            ));
        }
        if let Some(ref epic_id) = changes.epic_id {
            set_clauses.push("epic_id = ?".into());
            param_values.push(Box::new(epic_id.as_ref().map(|e| e.as_str().to_owned())));
        }
        if let Some(ref blocked_reason) = changes.blocked_reason {
            set_clauses.push("blocked_reason = ?".into());
            param_values.push(Box::new(blocked_reason.clone()));
        }
        if let Some(ref source_url) = changes.source_url {
            set_clauses.push("source_url = ?".into());
            param_values.push(Box::new(source_url.clone()));
        }
        if let Some(ref references) = changes.references {
            set_clauses.push("refs = ?".into());
            param_values.push(Box::new(serde_json::to_string(references)?));
        }

        if set_clauses.is_empty() {
            return Ok(());
        }

        set_clauses.push("updated_at = ?".into());
        param_values.push(Box::new(format_datetime(&Utc::now())));

        let id_placeholders = ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        for id in ids {
            param_values.push(Box::new(id.as_str().to_owned()));
        }

        let sql = format!(
            "UPDATE issues SET {} WHERE id IN ({id_placeholders})",
            set_clauses.join(", ")
        );
        let param_refs: Vec<&dyn rusqlite::types::ToSql> =
            param_values.iter().map(|p| p.as_ref()).collect();

        self.session.record_query();
        self.session
            .connection()
            .execute(&sql, param_refs.as_slice())?;

        if changes.title.is_some() || changes.description.is_some() {
            fts::sync_ids(&self.session, ids)?;
        }
        Ok(())
    }

    // -- Aggregations --------------------------------------------------------

    /// Open/closed/total counts per epic in one GROUP BY.
    pub fn get_epic_counts(&self) -> Result<HashMap<EntityId, EpicCounts>> {
        self.session.record_query();
        let mut stmt = self.session.connection().prepare(
            "SELECT epic_id,
                    SUM(CASE WHEN status IN ('completed', 'closed') THEN 0 ELSE 1 END),
                    SUM(CASE WHEN status IN ('completed', 'closed') THEN 1 ELSE 0 END),
                    COUNT(*)
             FROM issues
             WHERE epic_id IS NOT NULL
             GROUP BY epic_id",
        )?;
        let rows = stmt.query_map([], |row| {
            let epic_text: String = row.get(0)?;
            let epic_id = EntityId::parse(&epic_text).map_err(decode_err)?;
            Ok((
                epic_id,
                EpicCounts {
                    open: row.get(1)?,
                    closed: row.get(2)?,
                    total: row.get(3)?,
                },
            ))
        })?;

        let mut counts = HashMap::new();
        for row in rows {
            let (epic_id, entry) = row?;
            counts.insert(epic_id, entry);
        }
        Ok(counts)
    }

    /// Counted grouping over a fixed key. The SQL fragment is selected from
    /// a closed table; user input never names a column.
    pub fn group_counts(&self, key: GroupKey) -> Result<Vec<(String, i64)>> {
        let column = match key {
            GroupKey::Status => "status",
            GroupKey::Priority => "priority",
            GroupKey::IssueType => "issue_type",
            GroupKey::EpicId => "COALESCE(epic_id, '')",
            GroupKey::ProjectId => "COALESCE(project_id, '')",
        };
        let sql = format!(
            "SELECT {column}, COUNT(*) FROM issues GROUP BY {column} ORDER BY COUNT(*) DESC"
        );

        self.session.record_query();
        let mut stmt = self.session.connection().prepare(&sql)?;
        let rows = stmt.query_map([], move |row| {
            let group = if key == GroupKey::Priority {
                let rank: i32 = row.get(0)?;
                Priority::from_rank(rank)
                    .map(|p| p.as_str().to_owned())
                    .unwrap_or_else(|| rank.to_string())
            } else {
                row.get::<_, String>(0)?
            };
            Ok((group, row.get::<_, i64>(1)?))
        })?;

        let mut counts = Vec::new();
        for row in rows {
            counts.push(row?);
        }
        Ok(counts)
    }

    /// Number of issues referencing a project.
    pub fn count_by_project(&self, project_id: &EntityId) -> Result<i64> {
        self.session.record_query();
        let count: i64 = self.session.connection().query_row(
            "SELECT COUNT(*) FROM issues WHERE project_id = ?1",
            params![project_id.as_str()],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Ids of issues referencing a project (for cascade deletes).
    pub fn ids_by_project(&self, project_id: &EntityId) -> Result<Vec<EntityId>> {
        self.session.record_query();
        let mut stmt = self
            .session
            .connection()
            .prepare("SELECT id FROM issues WHERE project_id = ?1 ORDER BY id")?;
        let rows = stmt.query_map(params![project_id.as_str()], |row| {
            let text: String = row.get(0)?;
            EntityId::parse(&text).map_err(decode_err)
        })?;

        let mut ids = Vec::new();
        for row in rows {
            ids.push(row?);
        }
        Ok(ids)
    }

    // -- Internals -----------------------------------------------------------

    fn write_labels(&self, issue_id: &EntityId, labels: &[String]) -> Result<()> {
        let conn = self.session.connection();
        self.session.record_query();
        conn.execute(
            "DELETE FROM issue_labels WHERE issue_id = ?1",
            params![issue_id.as_str()],
        )?;
        for (position, label) in labels.iter().enumerate() {
            self.session.record_query();
            conn.execute(
                "INSERT INTO issue_labels (issue_id, label, position) VALUES (?1, ?2, ?3)",
                params![issue_id.as_str(), label, position as i64],
            )?;
        }
        Ok(())
    }

    fn hydrate_labels(&self, issues: &mut [Issue]) -> Result<()> {
        if issues.is_empty() {
            return Ok(());
        }
        let placeholders = issues.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let sql = format!(
            "SELECT issue_id, label FROM issue_labels
             WHERE issue_id IN ({placeholders})
             ORDER BY issue_id, position"
        );

        self.session.record_query();
        let mut stmt = self.session.connection().prepare(&sql)?;
        let rows = stmt.query_map(
            rusqlite::params_from_iter(issues.iter().map(|i| i.id.as_str())),
            |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
        )?;

        let mut by_issue: HashMap<String, Vec<String>> = HashMap::new();
        for row in rows {
            let (issue_id, label) = row?;
            by_issue.entry(issue_id).or_default().push(label);
        }
        for issue in issues {
            if let Some(labels) = by_issue.remove(issue.id.as_str()) {
                issue.labels = labels;
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// WHERE clause construction
// ---------------------------------------------------------------------------

/// Builds the WHERE clause and bound parameters for an issue filter. Every
/// user-influenced value is bound; clause text is assembled from literals.
fn build_where(
    filter: &IssueFilter,
) -> Result<(String, Vec<Box<dyn rusqlite::types::ToSql>>)> {
    let mut clauses: Vec<String> = Vec::new();
    let mut params_vec: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

    if let Some(status) = filter.status {
        clauses.push("status = ?".into());
        params_vec.push(Box::new(status.as_str().to_owned()));
    }
    if let Some(priority) = filter.priority {
        clauses.push("priority = ?".into());
        params_vec.push(Box::new(priority.rank()));
    }
    if let Some(issue_type) = filter.issue_type {
        clauses.push("issue_type = ?".into());
        params_vec.push(Box::new(issue_type.as_str().to_owned()));
    }
    match &filter.project_id {
        Some(Some(project_id)) => {
            clauses.push("project_id = ?".into());
            params_vec.push(Box::new(project_id.as_str().to_owned()));
        }
        Some(None) => clauses.push("project_id IS NULL".into()),
        None => {}
    }
    if let Some(ref epic_id) = filter.epic_id {
        clauses.push("epic_id = ?".into());
        params_vec.push(Box::new(epic_id.as_str().to_owned()));
    }
    if let Some(ref assignee) = filter.assignee {
        clauses.push(
            "EXISTS (SELECT 1 FROM json_each(issues.assignees) WHERE json_each.value = ?)".into(),
        );
        params_vec.push(Box::new(assignee.clone()));
    }
    for label in &filter.labels {
        clauses.push(
            "EXISTS (SELECT 1 FROM issue_labels
             WHERE issue_labels.issue_id = issues.id AND issue_labels.label = ?)"
                .into(),
        );
        params_vec.push(Box::new(label.clone()));
    }
    if !filter.labels_any.is_empty() {
        let placeholders = filter
            .labels_any
            .iter()
            .map(|_| "?")
            .collect::<Vec<_>>()
            .join(",");
        clauses.push(format!(
            "EXISTS (SELECT 1 FROM issue_labels
             WHERE issue_labels.issue_id = issues.id AND issue_labels.label IN ({placeholders}))"
        ));
        for label in &filter.labels_any {
            params_vec.push(Box::new(label.clone()));
        }
    }
    if !filter.ids.is_empty() {
        let placeholders = filter.ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        clauses.push(format!("id IN ({placeholders})"));
        for id in &filter.ids {
            params_vec.push(Box::new(id.as_str().to_owned()));
        }
    }
    if let Some(ref created_after) = filter.created_after {
        clauses.push("created_at >= ?".into());
        params_vec.push(Box::new(format_datetime(created_after)));
    }
    if let Some(ref created_before) = filter.created_before {
        clauses.push("created_at <= ?".into());
        params_vec.push(Box::new(format_datetime(created_before)));
    }
    if let Some(ref updated_after) = filter.updated_after {
        clauses.push("updated_at >= ?".into());
        params_vec.push(Box::new(format_datetime(updated_after)));
    }
    if let Some(ref updated_before) = filter.updated_before {
        clauses.push("updated_at <= ?".into());
        params_vec.push(Box::new(format_datetime(updated_before)));
    }
    for status in &filter.exclude_status {
        clauses.push("status != ?".into());
        params_vec.push(Box::new(status.as_str().to_owned()));
    }

    let where_sql = if clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", clauses.join(" AND "))
    };
    Ok((where_sql, params_vec))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;
    use dotwork_core::issue::IssueBuilder;

    fn id(s: &str) -> EntityId {
        EntityId::parse(s).unwrap()
    }

    fn issue(idx: u32, title: &str) -> Issue {
        IssueBuilder::new(id(&format!("issue-r{idx}@00000000")), title).build()
    }

    #[test]
    fn save_and_get_roundtrip() {
        let store = Store::open_in_memory().unwrap();
        let uow = store.unit_of_work().unwrap();

        let original = IssueBuilder::new(id("issue-rt@00000000"), "Round trip")
            .description("with labels")
            .priority(Priority::High)
            .labels(vec!["bug".into(), "ui".into()])
            .assignees(vec!["alice".into()])
            .build();
        uow.issues().save(&original).unwrap();

        let got = uow.issues().get(&original.id).unwrap();
        assert_eq!(got.title, "Round trip");
        assert_eq!(got.priority, Priority::High);
        assert_eq!(got.labels, vec!["bug", "ui"]);
        assert_eq!(got.assignees, vec!["alice"]);
    }

    #[test]
    fn get_missing_is_not_found() {
        let store = Store::open_in_memory().unwrap();
        let uow = store.unit_of_work().unwrap();
        let err = uow.issues().get(&id("issue-nope@00000000")).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn save_upserts() {
        let store = Store::open_in_memory().unwrap();
        let uow = store.unit_of_work().unwrap();

        let first = issue(1, "First title");
        uow.issues().save(&first).unwrap();

        let mut second = first.clone();
        second.title = "Second title".into();
        second.labels = vec!["revised".into()];
        uow.issues().save(&second).unwrap();

        let got = uow.issues().get(&first.id).unwrap();
        assert_eq!(got.title, "Second title");
        assert_eq!(got.labels, vec!["revised"]);
    }

    #[test]
    fn list_by_status_filter() {
        let store = Store::open_in_memory().unwrap();
        let uow = store.unit_of_work().unwrap();

        uow.issues().save(&issue(10, "Open one")).unwrap();
        let closed = IssueBuilder::new(id("issue-r11@00000000"), "Closed one")
            .status(Status::Closed)
            .build();
        uow.issues().save(&closed).unwrap();

        let filter = IssueFilter {
            status: Some(Status::Proposed),
            ..Default::default()
        };
        let found = uow
            .issues()
            .list(&filter, &ListOptions::with_limit(10))
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].title, "Open one");
    }

    #[test]
    fn list_by_assignee_uses_json_membership() {
        let store = Store::open_in_memory().unwrap();
        let uow = store.unit_of_work().unwrap();

        let assigned = IssueBuilder::new(id("issue-r20@00000000"), "Mine")
            .assignees(vec!["alice".into(), "bob".into()])
            .build();
        uow.issues().save(&assigned).unwrap();
        uow.issues().save(&issue(21, "Unassigned")).unwrap();

        let filter = IssueFilter {
            assignee: Some("bob".into()),
            ..Default::default()
        };
        let found = uow
            .issues()
            .list(&filter, &ListOptions::with_limit(10))
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].title, "Mine");
    }

    #[test]
    fn insert_batch_writes_rows_and_labels() {
        let store = Store::open_in_memory().unwrap();
        let uow = store.unit_of_work().unwrap();

        let batch: Vec<Issue> = (30..33)
            .map(|i| {
                IssueBuilder::new(id(&format!("issue-r{i}@00000000")), format!("Batch {i}"))
                    .labels(vec!["batch".into()])
                    .build()
            })
            .collect();
        uow.issues().insert_batch(&batch).unwrap();

        for item in &batch {
            let got = uow.issues().get(&item.id).unwrap();
            assert_eq!(got.labels, vec!["batch"]);
        }
    }

    #[test]
    fn insert_batch_duplicate_id_is_integrity_error() {
        let store = Store::open_in_memory().unwrap();
        let uow = store.unit_of_work().unwrap();

        let a = issue(40, "A");
        uow.issues().save(&a).unwrap();
        let err = uow.issues().insert_batch(&[a.clone()]).unwrap_err();
        assert!(err.is_integrity());
    }

    #[test]
    fn update_batch_applies_uniform_changes() {
        let store = Store::open_in_memory().unwrap();
        let uow = store.unit_of_work().unwrap();

        let a = issue(50, "A");
        let b = issue(51, "B");
        uow.issues().insert_batch(&[a.clone(), b.clone()]).unwrap();

        let changes = IssueChanges {
            priority: Some(Priority::Critical),
            ..Default::default()
        };
        uow.issues()
            .update_batch(&[a.id.clone(), b.id.clone()], &changes)
            .unwrap();

        assert_eq!(uow.issues().get(&a.id).unwrap().priority, Priority::Critical);
        assert_eq!(uow.issues().get(&b.id).unwrap().priority, Priority::Critical);
    }

    #[test]
    fn update_batch_reopen_clears_blocked_reason() {
        let store = Store::open_in_memory().unwrap();
        let uow = store.unit_of_work().unwrap();

        let mut closed = IssueBuilder::new(id("issue-r55@00000000"), "Was merged away")
            .status(Status::Closed)
            .build();
        closed.blocked_reason = Some("merged into issue-r56".into());
        uow.issues().save(&closed).unwrap();

        let reopen = IssueChanges {
            status: Some(Status::Proposed),
            ..Default::default()
        };
        uow.issues().update_batch(&[closed.id.clone()], &reopen).unwrap();

        let got = uow.issues().get(&closed.id).unwrap();
        assert_eq!(got.status, Status::Proposed);
        assert!(got.closed_at.is_none());
        assert!(got.blocked_reason.is_none());
    }

    #[test]
    fn update_batch_reopen_respects_explicit_reason() {
        let store = Store::open_in_memory().unwrap();
        let uow = store.unit_of_work().unwrap();

        let closed = IssueBuilder::new(id("issue-r57@00000000"), "Coming back")
            .status(Status::Closed)
            .build();
        uow.issues().save(&closed).unwrap();

        let reopen = IssueChanges {
            status: Some(Status::Proposed),
            blocked_reason: Some(Some("blocked on review".into())),
            ..Default::default()
        };
        uow.issues().update_batch(&[closed.id.clone()], &reopen).unwrap();

        let got = uow.issues().get(&closed.id).unwrap();
        assert_eq!(got.blocked_reason.as_deref(), Some("blocked on review"));
    }

    #[test]
    fn epic_counts_single_aggregation() {
        let store = Store::open_in_memory().unwrap();
        let uow = store.unit_of_work().unwrap();

        let epic = IssueBuilder::new(id("epic-r60@00000000"), "Theme")
            .issue_type(IssueType::Epic)
            .build();
        uow.issues().save(&epic).unwrap();

        let child_open = IssueBuilder::new(id("issue-r61@00000000"), "Child open")
            .epic_id(epic.id.clone())
            .build();
        let child_done = IssueBuilder::new(id("issue-r62@00000000"), "Child done")
            .epic_id(epic.id.clone())
            .status(Status::Completed)
            .build();
        uow.issues().save(&child_open).unwrap();
        uow.issues().save(&child_done).unwrap();

        let counts = uow.issues().get_epic_counts().unwrap();
        let entry = counts.get(&epic.id).unwrap();
        assert_eq!(entry.total, 2);
        assert_eq!(entry.open, 1);
        assert_eq!(entry.closed, 1);
    }

    #[test]
    fn list_page_cursor_walks_everything_once() {
        let store = Store::open_in_memory().unwrap();
        let uow = store.unit_of_work().unwrap();

        for i in 70..75 {
            uow.issues().save(&issue(i, &format!("Page {i}"))).unwrap();
        }

        let mut seen = Vec::new();
        let mut cursor: Option<EntityId> = None;
        loop {
            let page = uow.issues().list_page(cursor.as_ref(), 2).unwrap();
            if page.is_empty() {
                break;
            }
            cursor = Some(page.last().unwrap().id.clone());
            seen.extend(page.into_iter().map(|i| i.id));
        }
        assert_eq!(seen.len(), 5);
        let mut deduped = seen.clone();
        deduped.dedup();
        assert_eq!(deduped, seen);
    }

    #[test]
    fn group_counts_by_priority_reports_names() {
        let store = Store::open_in_memory().unwrap();
        let uow = store.unit_of_work().unwrap();

        uow.issues()
            .save(
                &IssueBuilder::new(id("issue-r80@00000000"), "Hot")
                    .priority(Priority::Critical)
                    .build(),
            )
            .unwrap();

        let counts = uow.issues().group_counts(GroupKey::Priority).unwrap();
        assert_eq!(counts, vec![("critical".to_owned(), 1)]);
    }
}
