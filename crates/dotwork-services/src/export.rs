//! JSONL export and import over a unit of work.
//!
//! Export walks the store in id order through an explicit cursor; the
//! sequence is lazy, finite, and not restartable -- callers resume by
//! passing the cursor back. Each line embeds the issue's labels, comments,
//! and outgoing dependency edges, so a full export round-trips into an
//! isomorphic store.

use std::io::{BufRead, Write};

use tracing::info;

use dotwork_core::dependency::Direction;
use dotwork_core::id::EntityId;
use dotwork_core::issue::Issue;
use dotwork_core::jsonl::{self, ImportMode};
use dotwork_storage::UnitOfWork;

use crate::error::{Result, ServiceError};

/// Resume point for a paged export: the last id of the previous page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportCursor(pub EntityId);

/// Import outcome.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct ImportStats {
    pub issues: u64,
    pub comments: u64,
    pub dependencies: u64,
}

/// One page of issues with relational data embedded, plus the cursor for
/// the next page (`None` when the walk is done).
pub fn export_page(
    uow: &UnitOfWork,
    cursor: Option<&ExportCursor>,
    limit: u32,
) -> Result<(Vec<Issue>, Option<ExportCursor>)> {
    let after = cursor.map(|c| &c.0);
    let mut page = uow.issues().list_page(after, limit)?;

    for issue in &mut page {
        issue.comments = uow.comments().list_for_issue(&issue.id)?;
        issue.dependencies = uow.dependencies().list_for(&issue.id, Direction::Out)?;
    }

    let next = if page.len() as u32 == limit {
        page.last().map(|last| ExportCursor(last.id.clone()))
    } else {
        None
    };
    Ok((page, next))
}

/// Streams the whole store as JSONL. Returns the number of issues written.
pub fn export_jsonl<W: Write>(uow: &UnitOfWork, writer: &mut W, page_size: u32) -> Result<u64> {
    let mut cursor: Option<ExportCursor> = None;
    let mut written = 0u64;
    loop {
        let (page, next) = export_page(uow, cursor.as_ref(), page_size)?;
        if page.is_empty() {
            break;
        }
        written += page.len() as u64;
        jsonl::write_jsonl(writer, &page)
            .map_err(|e| ServiceError::validation(e.to_string()))?;
        match next {
            Some(c) => cursor = Some(c),
            None => break,
        }
    }
    info!(issues = written, "export complete");
    Ok(written)
}

/// Imports a JSONL stream. Issues land first (so dependency targets
/// resolve), then comments and edges. Strict mode rejects unknown fields;
/// timestamps and ids are preserved verbatim.
pub fn import_jsonl<R: BufRead>(
    uow: &UnitOfWork,
    reader: R,
    mode: ImportMode,
) -> Result<ImportStats> {
    let mut issues: Vec<Issue> = Vec::new();
    for line in jsonl::read_jsonl(reader, mode) {
        let issue = line.map_err(|e| ServiceError::validation(e.to_string()))?;
        issues.push(issue);
    }

    let mut stats = ImportStats {
        issues: issues.len() as u64,
        ..Default::default()
    };

    for issue in &issues {
        if uow.issues().exists(&issue.id)? {
            return Err(ServiceError::DuplicateId(issue.id.as_str().to_owned()));
        }
    }

    // Pass 1: the issue rows themselves.
    for issue in &issues {
        uow.issues().save(issue)?;
    }
    // Pass 2: relational data, now that every endpoint exists.
    for issue in &issues {
        for comment in &issue.comments {
            uow.comments().add(comment)?;
            stats.comments += 1;
        }
        for dep in &issue.dependencies {
            uow.dependencies().add(dep)?;
            stats.dependencies += 1;
        }
    }

    info!(
        issues = stats.issues,
        comments = stats.comments,
        dependencies = stats.dependencies,
        "import complete"
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dotwork_core::comment::Comment;
    use dotwork_core::dependency::Dependency;
    use dotwork_core::enums::DependencyKind;
    use dotwork_core::id::{prefix, IdGenerator};
    use dotwork_core::issue::IssueBuilder;
    use dotwork_storage::Store;
    use std::io::BufReader;

    fn seeded_store(ids: &IdGenerator) -> (Store, Vec<EntityId>) {
        let store = Store::open_in_memory().unwrap();
        let mut created = Vec::new();
        {
            let mut uow = store.unit_of_work().unwrap();
            for i in 0..5 {
                let issue = IssueBuilder::new(ids.next(prefix::ISSUE), format!("Issue {i}"))
                    .labels(vec![format!("label-{i}")])
                    .build();
                uow.issues().save(&issue).unwrap();
                created.push(issue.id.clone());
            }
            let comment = Comment::new(
                ids.next(prefix::COMMENT),
                created[0].clone(),
                "alice",
                "first comment",
            );
            uow.comments().add(&comment).unwrap();
            uow.dependencies()
                .add(&Dependency::new(
                    created[0].clone(),
                    created[1].clone(),
                    DependencyKind::Blocks,
                ))
                .unwrap();
            uow.commit().unwrap();
        }
        (store, created)
    }

    #[test]
    fn export_pages_are_disjoint_and_complete() {
        let ids = IdGenerator::default();
        let (store, created) = seeded_store(&ids);
        let uow = store.unit_of_work().unwrap();

        let mut all = Vec::new();
        let mut cursor = None;
        loop {
            let (page, next) = export_page(&uow, cursor.as_ref(), 2).unwrap();
            all.extend(page.into_iter().map(|i| i.id));
            match next {
                Some(c) => cursor = Some(c),
                None => break,
            }
        }
        assert_eq!(all.len(), created.len());
    }

    #[test]
    fn round_trip_preserves_ids_timestamps_and_relationships() {
        let ids = IdGenerator::default();
        let (store, created) = seeded_store(&ids);

        let mut buf = Vec::new();
        {
            let uow = store.unit_of_work().unwrap();
            let written = export_jsonl(&uow, &mut buf, 2).unwrap();
            assert_eq!(written, 5);
        }

        // Import into a fresh store.
        let target = Store::open_in_memory().unwrap();
        {
            let mut uow = target.unit_of_work().unwrap();
            let stats =
                import_jsonl(&uow, BufReader::new(buf.as_slice()), ImportMode::Strict).unwrap();
            assert_eq!(stats.issues, 5);
            assert_eq!(stats.comments, 1);
            assert_eq!(stats.dependencies, 1);
            uow.commit().unwrap();
        }

        let source_uow = store.unit_of_work().unwrap();
        let target_uow = target.unit_of_work().unwrap();
        for id in &created {
            let original = source_uow.issues().get(id).unwrap();
            let imported = target_uow.issues().get(id).unwrap();
            assert_eq!(imported.title, original.title);
            assert_eq!(imported.labels, original.labels);
            assert_eq!(
                imported.created_at.timestamp_millis(),
                original.created_at.timestamp_millis()
            );
            assert_eq!(
                imported.updated_at.timestamp_millis(),
                original.updated_at.timestamp_millis()
            );
        }
        let comments = target_uow.comments().list_for_issue(&created[0]).unwrap();
        assert_eq!(comments.len(), 1);
        assert_eq!(comments[0].author, "alice");
        let deps = target_uow
            .dependencies()
            .list_for(&created[0], Direction::Out)
            .unwrap();
        assert_eq!(deps.len(), 1);
        assert_eq!(deps[0].to_issue_id, created[1]);
    }

    #[test]
    fn import_rejects_colliding_ids() {
        let ids = IdGenerator::default();
        let (store, _) = seeded_store(&ids);

        let mut buf = Vec::new();
        {
            let uow = store.unit_of_work().unwrap();
            export_jsonl(&uow, &mut buf, 10).unwrap();
        }

        // Importing into the same store collides.
        let mut uow = store.unit_of_work().unwrap();
        let err = import_jsonl(&uow, BufReader::new(buf.as_slice()), ImportMode::Strict)
            .unwrap_err();
        assert!(matches!(err, ServiceError::DuplicateId(_)));
        uow.rollback().unwrap();
    }
}
