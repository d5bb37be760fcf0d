//! Label queries.
//!
//! Labels have no table of their own beyond the per-issue rows: the label
//! dictionary is a `SELECT DISTINCT` with counts. Label writes flow through
//! [`IssueRepository::save`](crate::repo::IssueRepository::save), which
//! rewrites the rows from the issue's ordered label list.

use rusqlite::params;

use dotwork_core::id::EntityId;

use crate::error::Result;
use crate::store::Session;

/// A label with its usage count.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct LabelCount {
    pub label: String,
    pub count: i64,
}

/// Label read-side over the unit-of-work session.
pub struct LabelRepository {
    session: Session,
}

impl LabelRepository {
    pub(crate) fn new(session: Session) -> Self {
        Self { session }
    }

    /// Labels of one issue in insertion order.
    pub fn labels_for(&self, issue_id: &EntityId) -> Result<Vec<String>> {
        self.session.record_query();
        let mut stmt = self.session.connection().prepare(
            "SELECT label FROM issue_labels WHERE issue_id = ?1 ORDER BY position",
        )?;
        let rows = stmt.query_map(params![issue_id.as_str()], |row| row.get::<_, String>(0))?;

        let mut labels = Vec::new();
        for row in rows {
            labels.push(row?);
        }
        Ok(labels)
    }

    /// The label dictionary with usage counts, optionally restricted to a
    /// project. One aggregation query.
    pub fn distinct_counts(&self, project_id: Option<&EntityId>) -> Result<Vec<LabelCount>> {
        let conn = self.session.connection();
        self.session.record_query();

        let mut counts = Vec::new();
        match project_id {
            Some(project) => {
                let mut stmt = conn.prepare(
                    "SELECT l.label, COUNT(*) FROM issue_labels l
                     INNER JOIN issues i ON i.id = l.issue_id
                     WHERE i.project_id = ?1
                     GROUP BY l.label
                     ORDER BY COUNT(*) DESC, l.label ASC",
                )?;
                let rows = stmt.query_map(params![project.as_str()], |row| {
                    Ok(LabelCount {
                        label: row.get(0)?,
                        count: row.get(1)?,
                    })
                })?;
                for row in rows {
                    counts.push(row?);
                }
            }
            None => {
                let mut stmt = conn.prepare(
                    "SELECT label, COUNT(*) FROM issue_labels
                     GROUP BY label
                     ORDER BY COUNT(*) DESC, label ASC",
                )?;
                let rows = stmt.query_map([], |row| {
                    Ok(LabelCount {
                        label: row.get(0)?,
                        count: row.get(1)?,
                    })
                })?;
                for row in rows {
                    counts.push(row?);
                }
            }
        }
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;
    use dotwork_core::issue::IssueBuilder;
    use dotwork_core::project::Project;

    fn id(s: &str) -> EntityId {
        EntityId::parse(s).unwrap()
    }

    #[test]
    fn labels_keep_insertion_order() {
        let store = Store::open_in_memory().unwrap();
        let uow = store.unit_of_work().unwrap();

        let issue = IssueBuilder::new(id("issue-l1@00000000"), "Ordered")
            .labels(vec!["zebra".into(), "alpha".into(), "middle".into()])
            .build();
        uow.issues().save(&issue).unwrap();

        let labels = uow.labels().labels_for(&issue.id).unwrap();
        assert_eq!(labels, vec!["zebra", "alpha", "middle"]);
    }

    #[test]
    fn distinct_counts_aggregate() {
        let store = Store::open_in_memory().unwrap();
        let uow = store.unit_of_work().unwrap();

        uow.issues()
            .save(
                &IssueBuilder::new(id("issue-l2@00000000"), "A")
                    .labels(vec!["bug".into(), "ui".into()])
                    .build(),
            )
            .unwrap();
        uow.issues()
            .save(
                &IssueBuilder::new(id("issue-l3@00000000"), "B")
                    .labels(vec!["bug".into()])
                    .build(),
            )
            .unwrap();

        let counts = uow.labels().distinct_counts(None).unwrap();
        assert_eq!(counts[0].label, "bug");
        assert_eq!(counts[0].count, 2);
        assert_eq!(counts[1].label, "ui");
        assert_eq!(counts[1].count, 1);
    }

    #[test]
    fn distinct_counts_scoped_to_project() {
        let store = Store::open_in_memory().unwrap();
        let uow = store.unit_of_work().unwrap();

        let project = Project::new(id("project-l4@00000000"), "scoped");
        uow.projects().save(&project).unwrap();

        uow.issues()
            .save(
                &IssueBuilder::new(id("issue-l5@00000000"), "In project")
                    .project_id(project.id.clone())
                    .labels(vec!["scoped-label".into()])
                    .build(),
            )
            .unwrap();
        uow.issues()
            .save(
                &IssueBuilder::new(id("issue-l6@00000000"), "Outside")
                    .labels(vec!["other-label".into()])
                    .build(),
            )
            .unwrap();

        let counts = uow.labels().distinct_counts(Some(&project.id)).unwrap();
        assert_eq!(counts.len(), 1);
        assert_eq!(counts[0].label, "scoped-label");
    }
}
