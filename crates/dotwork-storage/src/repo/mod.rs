//! Per-entity repositories over the store session.
//!
//! Repositories are constructed by the unit of work and share its session.
//! They materialize results (no open cursors across calls) and clamp every
//! listing limit to the configured ceiling.

mod comments;
mod dependencies;
mod issues;
mod labels;
mod projects;

pub use comments::CommentRepository;
pub use dependencies::DependencyRepository;
pub use issues::{EpicCounts, IssueRepository};
pub use labels::{LabelCount, LabelRepository};
pub use projects::ProjectRepository;

use chrono::{DateTime, NaiveDateTime, Utc};

// ---------------------------------------------------------------------------
// Shared row helpers
// ---------------------------------------------------------------------------

/// Formats a `DateTime<Utc>` as ISO 8601 TEXT for SQLite.
pub(crate) fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

/// Parses an ISO 8601 TEXT string from SQLite into a `DateTime<Utc>`.
pub(crate) fn parse_datetime(s: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    s.parse::<DateTime<Utc>>()
        .or_else(|_| {
            NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.fZ").map(|ndt| ndt.and_utc())
        })
        .or_else(|_| {
            NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
}

/// Wraps a domain decoding failure as a rusqlite conversion error so it can
/// surface from row-mapping closures.
pub(crate) fn decode_err<E>(e: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn datetime_roundtrip() {
        let now = Utc::now();
        let text = format_datetime(&now);
        let back = parse_datetime(&text).unwrap();
        // Millisecond precision is preserved.
        assert_eq!(back.timestamp_millis(), now.timestamp_millis());
    }

    #[test]
    fn parse_datetime_accepts_sqlite_default_format() {
        parse_datetime("2024-06-01T12:30:00.000Z").unwrap();
        parse_datetime("2024-06-01 12:30:00").unwrap();
    }

    #[test]
    fn parse_datetime_rejects_garbage() {
        assert!(parse_datetime("not a date").is_err());
    }
}
