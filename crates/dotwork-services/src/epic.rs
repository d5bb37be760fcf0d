//! Epic service: scoped aggregates over issues of type `epic`.
//!
//! Counts never materialize children; they come from one GROUP BY in the
//! issue repository.

use std::collections::HashMap;

use dotwork_core::audit::AuditLog;
use dotwork_core::enums::{AuditAction, IssueType};
use dotwork_core::filter::{IssueFilter, ListOptions};
use dotwork_core::id::{prefix, EntityId, IdGenerator};
use dotwork_core::issue::{Issue, IssueBuilder};
use dotwork_core::project::User;
use dotwork_core::validation::{self, ValidationError};
use dotwork_storage::{EpicCounts, UnitOfWork};

use crate::error::{Result, ServiceError};

/// An epic with its child counts.
#[derive(Debug, Clone, serde::Serialize)]
pub struct EpicSummary {
    pub epic: Issue,
    pub counts: EpicCounts,
}

/// Epic operations over one unit of work.
pub struct EpicService<'a> {
    uow: &'a UnitOfWork,
    ids: &'a IdGenerator,
    audit: Option<&'a AuditLog>,
}

impl<'a> EpicService<'a> {
    pub fn new(uow: &'a UnitOfWork, ids: &'a IdGenerator, audit: Option<&'a AuditLog>) -> Self {
        Self { uow, ids, audit }
    }

    /// Creates an epic. Epics are issues with `type = epic` and never carry
    /// an `epic_id` themselves.
    pub fn create_epic(
        &self,
        title: impl Into<String>,
        description: impl Into<String>,
        user: Option<&User>,
    ) -> Result<Issue> {
        let epic = IssueBuilder::new(self.ids.next(prefix::EPIC), title)
            .description(description)
            .issue_type(IssueType::Epic)
            .build();
        validation::validate(&epic)?;
        self.uow.issues().save(&epic)?;

        if let (Some(audit), Some(user)) = (self.audit, user) {
            audit.record(
                AuditAction::Create,
                "issue",
                epic.id.as_str(),
                &user.username,
                "epic",
            );
        }
        Ok(epic)
    }

    /// Lists epics with their child counts: one listing plus one GROUP BY.
    pub fn list_epics(&self, opts: &ListOptions) -> Result<Vec<EpicSummary>> {
        let filter = IssueFilter {
            issue_type: Some(IssueType::Epic),
            ..Default::default()
        };
        let epics = self.uow.issues().list(&filter, opts)?;
        let mut counts: HashMap<EntityId, EpicCounts> = self.uow.issues().get_epic_counts()?;

        Ok(epics
            .into_iter()
            .map(|epic| {
                let entry = counts.remove(&epic.id).unwrap_or_default();
                EpicSummary {
                    epic,
                    counts: entry,
                }
            })
            .collect())
    }

    /// Child counts for one epic.
    pub fn counts(&self, epic_id: &EntityId) -> Result<EpicCounts> {
        self.require_epic(epic_id)?;
        Ok(self
            .uow
            .issues()
            .get_epic_counts()?
            .remove(epic_id)
            .unwrap_or_default())
    }

    /// Lists the issues assigned to an epic. The repository clamps the
    /// listing window to the safe limit.
    pub fn issues_in_epic(&self, epic_id: &EntityId, opts: &ListOptions) -> Result<Vec<Issue>> {
        self.require_epic(epic_id)?;
        Ok(self.uow.issues().list_by_epic(epic_id, opts)?)
    }

    fn require_epic(&self, epic_id: &EntityId) -> Result<()> {
        let epic = self
            .uow
            .issues()
            .get(epic_id)
            .map_err(|_| ServiceError::not_found("epic", epic_id.as_str()))?;
        if !epic.is_epic() {
            return Err(ValidationError::NotAnEpic(epic_id.to_string()).into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dotwork_core::enums::Status;
    use dotwork_storage::Store;

    #[test]
    fn create_and_list_with_counts() {
        let store = Store::open_in_memory().unwrap();
        let uow = store.unit_of_work().unwrap();
        let ids = IdGenerator::default();
        let service = EpicService::new(&uow, &ids, None);

        let epic = service.create_epic("Big theme", "", None).unwrap();
        assert!(epic.id.has_prefix("epic"));

        // Two children, one of them done.
        let open_child = IssueBuilder::new(ids.next(prefix::ISSUE), "Open child")
            .epic_id(epic.id.clone())
            .build();
        let done_child = IssueBuilder::new(ids.next(prefix::ISSUE), "Done child")
            .epic_id(epic.id.clone())
            .status(Status::Completed)
            .build();
        uow.issues().save(&open_child).unwrap();
        uow.issues().save(&done_child).unwrap();

        let summaries = service.list_epics(&ListOptions::with_limit(10)).unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].counts, EpicCounts { open: 1, closed: 1, total: 2 });

        let listed = service
            .issues_in_epic(&epic.id, &ListOptions::with_limit(10))
            .unwrap();
        assert_eq!(listed.len(), 2);
    }

    #[test]
    fn counts_for_non_epic_is_validation_error() {
        let store = Store::open_in_memory().unwrap();
        let uow = store.unit_of_work().unwrap();
        let ids = IdGenerator::default();
        let service = EpicService::new(&uow, &ids, None);

        let plain = IssueBuilder::new(ids.next(prefix::ISSUE), "Plain").build();
        uow.issues().save(&plain).unwrap();

        let err = service.counts(&plain.id).unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }
}
