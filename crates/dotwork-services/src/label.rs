//! Label service.
//!
//! Labels live only as per-issue rows; the dictionary view is a counted
//! DISTINCT. Bulk label writes belong to the bulk service.

use dotwork_core::filter::{IssueFilter, ListOptions};
use dotwork_core::id::EntityId;
use dotwork_core::issue::Issue;
use dotwork_storage::{LabelCount, UnitOfWork};

use crate::error::Result;

/// Label queries over one unit of work.
pub struct LabelService<'a> {
    uow: &'a UnitOfWork,
}

impl<'a> LabelService<'a> {
    pub fn new(uow: &'a UnitOfWork) -> Self {
        Self { uow }
    }

    /// Every label in use, with counts, optionally restricted to a project.
    pub fn all_labels(&self, project_id: Option<&EntityId>) -> Result<Vec<LabelCount>> {
        Ok(self.uow.labels().distinct_counts(project_id)?)
    }

    /// Issues carrying a label.
    pub fn issues_with_label(&self, label: &str, opts: &ListOptions) -> Result<Vec<Issue>> {
        let filter = IssueFilter {
            labels: vec![label.to_owned()],
            ..Default::default()
        };
        Ok(self.uow.issues().list(&filter, opts)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dotwork_core::id::{prefix, IdGenerator};
    use dotwork_core::issue::IssueBuilder;
    use dotwork_storage::Store;

    #[test]
    fn dictionary_counts_and_lookup() {
        let store = Store::open_in_memory().unwrap();
        let uow = store.unit_of_work().unwrap();
        let ids = IdGenerator::default();

        for (title, labels) in [
            ("A", vec!["bug", "ui"]),
            ("B", vec!["bug"]),
            ("C", vec!["infra"]),
        ] {
            let issue = IssueBuilder::new(ids.next(prefix::ISSUE), title)
                .labels(labels.into_iter().map(String::from).collect())
                .build();
            uow.issues().save(&issue).unwrap();
        }

        let service = LabelService::new(&uow);
        let all = service.all_labels(None).unwrap();
        assert_eq!(all[0].label, "bug");
        assert_eq!(all[0].count, 2);

        let bugs = service
            .issues_with_label("bug", &ListOptions::with_limit(10))
            .unwrap();
        assert_eq!(bugs.len(), 2);

        let none = service
            .issues_with_label("missing", &ListOptions::with_limit(10))
            .unwrap();
        assert!(none.is_empty());
    }
}
