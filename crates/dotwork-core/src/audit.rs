//! Append-only audit log.
//!
//! Entries are held in memory; persistence is a caller concern. The NDJSON
//! writer produces one JSON object per line for streaming consumers.

use std::io::Write;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::enums::AuditAction;
use crate::id::{prefix, EntityId, IdGenerator};

/// A single audit record. Append-only; never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: EntityId,

    pub action: AuditAction,

    /// Entity kind, e.g. "issue", "project".
    pub entity_type: String,

    pub entity_id: String,

    pub user: String,

    pub timestamp: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub details: String,
}

/// In-memory append-only audit log.
///
/// Shared across services; interior mutability keeps the append path `&self`
/// so services can hold plain references.
#[derive(Debug, Default)]
pub struct AuditLog {
    entries: Mutex<Vec<AuditEntry>>,
    ids: IdGenerator,
}

impl AuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry and returns its id.
    pub fn record(
        &self,
        action: AuditAction,
        entity_type: &str,
        entity_id: &str,
        user: &str,
        details: impl Into<String>,
    ) -> EntityId {
        let entry = AuditEntry {
            id: self.ids.next(prefix::AUDIT),
            action,
            entity_type: entity_type.to_owned(),
            entity_id: entity_id.to_owned(),
            user: user.to_owned(),
            timestamp: Utc::now(),
            details: details.into(),
        };
        let id = entry.id.clone();
        self.lock().push(entry);
        id
    }

    /// Number of recorded entries.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of all entries in append order.
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.lock().clone()
    }

    /// Entries are immutable once appended, so a poisoned lock still holds
    /// consistent data and can be recovered.
    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<AuditEntry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Writes the log as newline-delimited JSON.
    pub fn write_ndjson<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        for entry in self.entries() {
            let line = serde_json::to_string(&entry)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
            writer.write_all(line.as_bytes())?;
            writer.write_all(b"\n")?;
        }
        writer.flush()
    }
}
