//! Project repository.

use rusqlite::{params, Row};

use dotwork_core::id::EntityId;
use dotwork_core::project::Project;

use crate::error::{Result, StoreError};
use crate::repo::{decode_err, format_datetime, parse_datetime};
use crate::store::Session;

fn scan_project(row: &Row<'_>) -> rusqlite::Result<Project> {
    let id_text: String = row.get(0)?;
    let created_text: String = row.get(4)?;

    Ok(Project {
        id: EntityId::parse(&id_text).map_err(decode_err)?,
        name: row.get(1)?,
        description: row.get(2)?,
        owner: row.get(3)?,
        created_at: parse_datetime(&created_text).map_err(decode_err)?,
    })
}

/// Project persistence over the unit-of-work session.
pub struct ProjectRepository {
    session: Session,
}

impl ProjectRepository {
    pub(crate) fn new(session: Session) -> Self {
        Self { session }
    }

    pub fn get(&self, id: &EntityId) -> Result<Project> {
        self.session.record_query();
        self.session
            .connection()
            .query_row(
                "SELECT id, name, description, owner, created_at FROM projects WHERE id = ?1",
                params![id.as_str()],
                scan_project,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => {
                    StoreError::not_found("project", id.as_str())
                }
                other => StoreError::from(other),
            })
    }

    /// Looks a project up by its unique name.
    pub fn get_by_name(&self, name: &str) -> Result<Option<Project>> {
        self.session.record_query();
        let result = self.session.connection().query_row(
            "SELECT id, name, description, owner, created_at FROM projects WHERE name = ?1",
            params![name],
            scan_project,
        );
        match result {
            Ok(project) => Ok(Some(project)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn list(&self, limit: u32) -> Result<Vec<Project>> {
        let limit = self.session.clamp_limit(limit);
        self.session.record_query();
        let mut stmt = self.session.connection().prepare(&format!(
            "SELECT id, name, description, owner, created_at FROM projects
             ORDER BY name ASC LIMIT {limit}"
        ))?;
        let rows = stmt.query_map([], scan_project)?;

        let mut projects = Vec::new();
        for row in rows {
            projects.push(row?);
        }
        Ok(projects)
    }

    /// Inserts or replaces a project by id. A name collision with another
    /// project surfaces as an integrity error.
    pub fn save(&self, project: &Project) -> Result<()> {
        self.session.record_query();
        self.session.connection().execute(
            "INSERT INTO projects (id, name, description, owner, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
                 name = excluded.name,
                 description = excluded.description,
                 owner = excluded.owner",
            params![
                project.id.as_str(),
                project.name,
                project.description,
                project.owner,
                format_datetime(&project.created_at),
            ],
        )?;
        Ok(())
    }

    pub fn delete(&self, id: &EntityId) -> Result<()> {
        self.session.record_query();
        let affected = self
            .session
            .connection()
            .execute("DELETE FROM projects WHERE id = ?1", params![id.as_str()])?;
        if affected == 0 {
            return Err(StoreError::not_found("project", id.as_str()));
        }
        Ok(())
    }
}
