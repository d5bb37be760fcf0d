//! Dependency-edge repository.

use rusqlite::{params, Row};

use dotwork_core::dependency::{Dependency, Direction};
use dotwork_core::enums::DependencyKind;
use dotwork_core::id::EntityId;

use crate::error::Result;
use crate::repo::{decode_err, format_datetime, parse_datetime};
use crate::store::Session;

const DEP_COLUMNS: &str = "from_issue_id, to_issue_id, kind, created_at";

fn scan_dependency(row: &Row<'_>) -> rusqlite::Result<Dependency> {
    let from_text: String = row.get(0)?;
    let to_text: String = row.get(1)?;
    let kind_text: String = row.get(2)?;
    let created_text: String = row.get(3)?;

    Ok(Dependency {
        from_issue_id: EntityId::parse(&from_text).map_err(decode_err)?,
        to_issue_id: EntityId::parse(&to_text).map_err(decode_err)?,
        kind: kind_text.parse::<DependencyKind>().map_err(decode_err)?,
        created_at: parse_datetime(&created_text).map_err(decode_err)?,
    })
}

/// Dependency persistence over the unit-of-work session.
pub struct DependencyRepository {
    session: Session,
}

impl DependencyRepository {
    pub(crate) fn new(session: Session) -> Self {
        Self { session }
    }

    /// Inserts an edge. Returns `false` when the `(from, to, kind)` triple
    /// already existed (the insert is idempotent).
    pub fn add(&self, dep: &Dependency) -> Result<bool> {
        self.session.record_query();
        let affected = self.session.connection().execute(
            "INSERT OR IGNORE INTO dependencies (from_issue_id, to_issue_id, kind, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                dep.from_issue_id.as_str(),
                dep.to_issue_id.as_str(),
                dep.kind.as_str(),
                format_datetime(&dep.created_at),
            ],
        )?;
        Ok(affected > 0)
    }

    /// Removes an edge. Idempotent: returns `false` if it was absent.
    pub fn remove(
        &self,
        from: &EntityId,
        to: &EntityId,
        kind: DependencyKind,
    ) -> Result<bool> {
        self.session.record_query();
        let affected = self.session.connection().execute(
            "DELETE FROM dependencies
             WHERE from_issue_id = ?1 AND to_issue_id = ?2 AND kind = ?3",
            params![from.as_str(), to.as_str(), kind.as_str()],
        )?;
        Ok(affected > 0)
    }

    /// Edges touching an issue in the requested direction.
    pub fn list_for(&self, id: &EntityId, direction: Direction) -> Result<Vec<Dependency>> {
        let sql = match direction {
            Direction::Out => format!(
                "SELECT {DEP_COLUMNS} FROM dependencies WHERE from_issue_id = ?1
                 ORDER BY created_at, to_issue_id"
            ),
            Direction::In => format!(
                "SELECT {DEP_COLUMNS} FROM dependencies WHERE to_issue_id = ?1
                 ORDER BY created_at, from_issue_id"
            ),
            Direction::Both => format!(
                "SELECT {DEP_COLUMNS} FROM dependencies
                 WHERE from_issue_id = ?1 OR to_issue_id = ?1
                 ORDER BY created_at, from_issue_id, to_issue_id"
            ),
        };

        self.session.record_query();
        let mut stmt = self.session.connection().prepare(&sql)?;
        let rows = stmt.query_map(params![id.as_str()], scan_dependency)?;

        let mut deps = Vec::new();
        for row in rows {
            deps.push(row?);
        }
        Ok(deps)
    }

    /// Every edge in the store, optionally restricted to one kind, in a
    /// single query. The cycle gate builds its adjacency map from this.
    pub fn list_all(&self, kind: Option<DependencyKind>) -> Result<Vec<Dependency>> {
        let (sql, kind_param): (String, Option<&str>) = match kind {
            Some(k) => (
                format!("SELECT {DEP_COLUMNS} FROM dependencies WHERE kind = ?1"),
                Some(k.as_str()),
            ),
            None => (format!("SELECT {DEP_COLUMNS} FROM dependencies"), None),
        };

        self.session.record_query();
        let mut stmt = self.session.connection().prepare(&sql)?;
        let mut deps = Vec::new();
        match kind_param {
            Some(k) => {
                let rows = stmt.query_map(params![k], scan_dependency)?;
                for row in rows {
                    deps.push(row?);
                }
            }
            None => {
                let rows = stmt.query_map([], scan_dependency)?;
                for row in rows {
                    deps.push(row?);
                }
            }
        }
        Ok(deps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;
    use dotwork_core::issue::IssueBuilder;

    fn id(s: &str) -> EntityId {
        EntityId::parse(s).unwrap()
    }

    fn seed_issue(uow: &crate::uow::UnitOfWork, id_text: &str) -> EntityId {
        let issue_id = id(id_text);
        let issue = IssueBuilder::new(issue_id.clone(), format!("Issue {id_text}")).build();
        uow.issues().save(&issue).unwrap();
        issue_id
    }

    #[test]
    fn add_list_remove() {
        let store = Store::open_in_memory().unwrap();
        let uow = store.unit_of_work().unwrap();
        let a = seed_issue(&uow, "issue-da@00000000");
        let b = seed_issue(&uow, "issue-db@00000000");

        let dep = Dependency::new(a.clone(), b.clone(), DependencyKind::Blocks);
        assert!(uow.dependencies().add(&dep).unwrap());
        // Idempotent re-add.
        assert!(!uow.dependencies().add(&dep).unwrap());

        let out = uow.dependencies().list_for(&a, Direction::Out).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].to_issue_id, b);

        let incoming = uow.dependencies().list_for(&b, Direction::In).unwrap();
        assert_eq!(incoming.len(), 1);

        assert!(uow
            .dependencies()
            .remove(&a, &b, DependencyKind::Blocks)
            .unwrap());
        // Idempotent re-remove.
        assert!(!uow
            .dependencies()
            .remove(&a, &b, DependencyKind::Blocks)
            .unwrap());
    }

    #[test]
    fn kind_is_part_of_the_edge_key() {
        let store = Store::open_in_memory().unwrap();
        let uow = store.unit_of_work().unwrap();
        let a = seed_issue(&uow, "issue-dk1@00000000");
        let b = seed_issue(&uow, "issue-dk2@00000000");

        assert!(uow
            .dependencies()
            .add(&Dependency::new(a.clone(), b.clone(), DependencyKind::Blocks))
            .unwrap());
        assert!(uow
            .dependencies()
            .add(&Dependency::new(a.clone(), b.clone(), DependencyKind::RelatedTo))
            .unwrap());

        let both = uow.dependencies().list_for(&a, Direction::Out).unwrap();
        assert_eq!(both.len(), 2);
    }

    #[test]
    fn list_all_filters_by_kind() {
        let store = Store::open_in_memory().unwrap();
        let uow = store.unit_of_work().unwrap();
        let a = seed_issue(&uow, "issue-dl1@00000000");
        let b = seed_issue(&uow, "issue-dl2@00000000");
        let c = seed_issue(&uow, "issue-dl3@00000000");

        uow.dependencies()
            .add(&Dependency::new(a.clone(), b.clone(), DependencyKind::Blocks))
            .unwrap();
        uow.dependencies()
            .add(&Dependency::new(b.clone(), c.clone(), DependencyKind::DependsOn))
            .unwrap();

        let blocks = uow
            .dependencies()
            .list_all(Some(DependencyKind::Blocks))
            .unwrap();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].from_issue_id, a);

        let all = uow.dependencies().list_all(None).unwrap();
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn dangling_endpoint_is_integrity_error() {
        let store = Store::open_in_memory().unwrap();
        let uow = store.unit_of_work().unwrap();
        let a = seed_issue(&uow, "issue-dd@00000000");

        let dep = Dependency::new(a, id("issue-ghost@00000000"), DependencyKind::Blocks);
        let err = uow.dependencies().add(&dep).unwrap_err();
        assert!(err.is_integrity());
    }
}
