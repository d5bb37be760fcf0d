//! Issue validation rules.

use crate::enums::IssueType;
use crate::issue::Issue;

/// Error type for validation failures.
///
/// Messages are safe to surface: they carry the offending user input and
/// nothing else.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("title required")]
    TitleRequired,

    #[error("title must be 500 characters or less (got {0})")]
    TitleTooLong(usize),

    #[error("terminal issues must have closed_at timestamp")]
    TerminalWithoutTimestamp,

    #[error("non-terminal issues cannot have closed_at timestamp")]
    NotTerminalWithTimestamp,

    #[error("updated_at must not precede created_at")]
    UpdatedBeforeCreated,

    #[error("epics cannot belong to an epic")]
    EpicWithEpicId,

    #[error("{0} is not an epic")]
    NotAnEpic(String),

    #[error("an issue cannot depend on itself")]
    SelfDependency,

    #[error("unknown {field}: {value}")]
    UnknownValue {
        /// The field being validated.
        field: &'static str,
        /// The rejected input.
        value: String,
    },
}

/// Maximum title length in characters.
pub const MAX_TITLE_LEN: usize = 500;

/// Validates an issue's field-level invariants.
///
/// Referential checks (`project_id`, `epic_id` resolution) need the store
/// and live in the service layer.
pub fn validate(issue: &Issue) -> Result<(), ValidationError> {
    if issue.title.trim().is_empty() {
        return Err(ValidationError::TitleRequired);
    }
    if issue.title.chars().count() > MAX_TITLE_LEN {
        return Err(ValidationError::TitleTooLong(issue.title.chars().count()));
    }
    // closed_at iff terminal.
    if issue.status.is_terminal() && issue.closed_at.is_none() {
        return Err(ValidationError::TerminalWithoutTimestamp);
    }
    if !issue.status.is_terminal() && issue.closed_at.is_some() {
        return Err(ValidationError::NotTerminalWithTimestamp);
    }
    if issue.updated_at < issue.created_at {
        return Err(ValidationError::UpdatedBeforeCreated);
    }
    // No nested epics at the entity level.
    if issue.issue_type == IssueType::Epic && issue.epic_id.is_some() {
        return Err(ValidationError::EpicWithEpicId);
    }
    Ok(())
}
