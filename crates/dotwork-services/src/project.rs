//! Project service.

use tracing::info;

use dotwork_core::audit::AuditLog;
use dotwork_core::enums::AuditAction;
use dotwork_core::id::{prefix, EntityId, IdGenerator};
use dotwork_core::project::{Project, User};
use dotwork_storage::UnitOfWork;

use crate::error::{Result, ServiceError};

/// Project operations over one unit of work.
pub struct ProjectService<'a> {
    uow: &'a UnitOfWork,
    ids: &'a IdGenerator,
    audit: Option<&'a AuditLog>,
}

impl<'a> ProjectService<'a> {
    pub fn new(uow: &'a UnitOfWork, ids: &'a IdGenerator, audit: Option<&'a AuditLog>) -> Self {
        Self { uow, ids, audit }
    }

    /// Creates a project. Names are unique.
    pub fn create_project(
        &self,
        name: &str,
        description: &str,
        user: Option<&User>,
    ) -> Result<Project> {
        if name.trim().is_empty() {
            return Err(ServiceError::validation("project name required"));
        }
        if self.uow.projects().get_by_name(name)?.is_some() {
            return Err(ServiceError::validation(format!(
                "project name already in use: {name}"
            )));
        }

        let mut project = Project::new(self.ids.next(prefix::PROJECT), name);
        project.description = description.to_owned();
        if let Some(user) = user {
            project.owner = user.username.clone();
        }
        self.uow.projects().save(&project)?;

        self.record(user, AuditAction::Create, &project.id, String::new());
        Ok(project)
    }

    pub fn get_project(&self, id: &EntityId) -> Result<Project> {
        Ok(self.uow.projects().get(id)?)
    }

    pub fn get_by_name(&self, name: &str) -> Result<Option<Project>> {
        Ok(self.uow.projects().get_by_name(name)?)
    }

    pub fn list_projects(&self, limit: u32) -> Result<Vec<Project>> {
        Ok(self.uow.projects().list(limit)?)
    }

    /// Deletes a project. Refused while issues reference it unless
    /// `cascade` is set, in which case the issues (and their comments,
    /// labels, and edges) go with it.
    pub fn delete_project(
        &self,
        id: &EntityId,
        cascade: bool,
        user: Option<&User>,
    ) -> Result<()> {
        // Existence check first so the error names the right problem.
        self.uow.projects().get(id)?;

        let issue_count = self.uow.issues().count_by_project(id)?;
        if issue_count > 0 && !cascade {
            return Err(ServiceError::validation(format!(
                "project has {issue_count} issues; delete requires cascade"
            )));
        }
        if cascade {
            for issue_id in self.uow.issues().ids_by_project(id)? {
                self.uow.issues().delete(&issue_id)?;
            }
        }
        self.uow.projects().delete(id)?;

        info!(%id, cascade, "project deleted");
        self.record(user, AuditAction::Delete, id, format!("cascade={cascade}"));
        Ok(())
    }

    fn record(&self, user: Option<&User>, action: AuditAction, id: &EntityId, details: String) {
        if let (Some(audit), Some(user)) = (self.audit, user) {
            audit.record(action, "project", id.as_str(), &user.username, details);
        }
    }
}
