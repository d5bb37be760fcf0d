//! JSONL (JSON Lines) read/write support.
//!
//! Each line is a complete JSON object representing one Issue, with labels,
//! comments and dependency edges embedded. Timestamps are RFC 3339 UTC.
//! Strict import rejects unknown fields; lenient import drops them.

use std::io::{self, BufRead, Write};

use crate::issue::Issue;

/// Error type for JSONL operations.
#[derive(Debug, thiserror::Error)]
pub enum JsonlError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error at line {line}: {source}")]
    Json {
        line: usize,
        source: serde_json::Error,
    },
}

/// Result alias for JSONL operations.
pub type Result<T> = std::result::Result<T, JsonlError>;

/// How unknown fields are treated during import.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImportMode {
    /// Unknown fields are errors.
    #[default]
    Strict,
    /// Unknown fields are dropped.
    Lenient,
}

/// Issue field names accepted on import. Kept in sync with [`Issue`]'s
/// serde surface; lenient mode retains only these keys.
const KNOWN_FIELDS: &[&str] = &[
    "id",
    "project_id",
    "title",
    "description",
    "status",
    "priority",
    "issue_type",
    "assignees",
    "labels",
    "epic_id",
    "blocked_reason",
    "source_url",
    "references",
    "created_at",
    "updated_at",
    "closed_at",
    "comments",
    "dependencies",
];

/// Writes issues as JSONL to the given writer.
pub fn write_jsonl<W: Write>(writer: &mut W, issues: &[Issue]) -> Result<()> {
    for issue in issues {
        serde_json::to_writer(&mut *writer, issue)
            .map_err(|e| JsonlError::Json { line: 0, source: e })?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(())
}

/// Parses one JSONL line according to the import mode.
fn parse_line(line: &str, mode: ImportMode) -> std::result::Result<Issue, serde_json::Error> {
    match mode {
        ImportMode::Strict => serde_json::from_str(line),
        ImportMode::Lenient => {
            let mut value: serde_json::Value = serde_json::from_str(line)?;
            if let Some(map) = value.as_object_mut() {
                map.retain(|key, _| KNOWN_FIELDS.contains(&key.as_str()));
            }
            serde_json::from_value(value)
        }
    }
}

/// Returns an iterator that reads issues from a JSONL reader.
///
/// Each line is parsed as a JSON object. Empty lines are skipped.
pub fn read_jsonl<R: BufRead>(reader: R, mode: ImportMode) -> JsonlIter<R> {
    JsonlIter {
        reader,
        mode,
        line_number: 0,
    }
}

/// Iterator over JSONL-encoded issues.
pub struct JsonlIter<R> {
    reader: R,
    mode: ImportMode,
    line_number: usize,
}

impl<R: BufRead> Iterator for JsonlIter<R> {
    type Item = Result<Issue>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut line = String::new();
        loop {
            line.clear();
            match self.reader.read_line(&mut line) {
                Ok(0) => return None, // EOF
                Ok(_) => {
                    self.line_number += 1;
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    return Some(parse_line(trimmed, self.mode).map_err(|e| JsonlError::Json {
                        line: self.line_number,
                        source: e,
                    }));
                }
                Err(e) => return Some(Err(JsonlError::Io(e))),
            }
        }
    }
}
