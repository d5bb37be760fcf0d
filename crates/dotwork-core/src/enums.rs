//! Enum types for the dot-work issue tracker.
//!
//! Each enum has:
//! - Serialize as a snake_case string
//! - Deserialize / `FromStr` that rejects unknown values
//! - `as_str()`, `Display`, and an `ALL` slice for listings

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Error returned when parsing an unknown enum string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind}: {value}")]
pub struct ParseEnumError {
    /// The enum type being parsed (e.g., "Status").
    pub kind: &'static str,
    /// The rejected input value.
    pub value: String,
}

// ---------------------------------------------------------------------------
// Macro: defines a closed enum backed by fixed string variants.
// ---------------------------------------------------------------------------
macro_rules! define_enum {
    (
        $(#[$meta:meta])*
        $name:ident, default = $default:ident,
        variants: [
            $( ($variant:ident, $str:expr) ),+ $(,)?
        ]
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $( $variant, )+
        }

        impl $name {
            /// All variants, in declaration order.
            pub const ALL: &'static [Self] = &[ $( Self::$variant, )+ ];

            /// Returns the string representation.
            pub fn as_str(self) -> &'static str {
                match self {
                    $( Self::$variant => $str, )+
                }
            }

            /// Returns `true` if this is the default variant.
            pub fn is_default(self) -> bool {
                self == Self::$default
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::$default
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = ParseEnumError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $( $str => Ok(Self::$variant), )+
                    other => Err(ParseEnumError {
                        kind: stringify!($name),
                        value: other.to_owned(),
                    }),
                }
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

// ===========================================================================
// Status
// ===========================================================================

define_enum! {
    /// Current state of an issue.
    Status, default = Proposed,
    variants: [
        (Proposed, "proposed"),
        (InProgress, "in_progress"),
        (Blocked, "blocked"),
        (Completed, "completed"),
        (Closed, "closed"),
    ]
}

impl Status {
    /// Returns `true` for statuses that end the issue lifecycle.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Closed)
    }

    /// The states reachable from this one through a single transition.
    pub fn transitions(self) -> &'static [Status] {
        match self {
            Self::Proposed => &[Self::InProgress, Self::Blocked, Self::Closed],
            Self::InProgress => &[Self::Blocked, Self::Completed, Self::Proposed],
            Self::Blocked => &[Self::InProgress, Self::Proposed, Self::Closed],
            Self::Completed => &[Self::Closed, Self::InProgress],
            Self::Closed => &[Self::Proposed],
        }
    }

    /// Returns `true` if the transition `self -> to` is allowed.
    pub fn can_transition_to(self, to: Status) -> bool {
        self.transitions().contains(&to)
    }
}

// ===========================================================================
// Priority
// ===========================================================================

define_enum! {
    /// Urgency of an issue. Lower rank = more urgent.
    Priority, default = Medium,
    variants: [
        (Critical, "critical"),
        (High, "high"),
        (Medium, "medium"),
        (Low, "low"),
        (Backlog, "backlog"),
    ]
}

impl Priority {
    /// Sort rank: 0 (critical) through 4 (backlog).
    pub fn rank(self) -> i32 {
        match self {
            Self::Critical => 0,
            Self::High => 1,
            Self::Medium => 2,
            Self::Low => 3,
            Self::Backlog => 4,
        }
    }

    /// Inverse of [`Priority::rank`].
    pub fn from_rank(rank: i32) -> Option<Self> {
        match rank {
            0 => Some(Self::Critical),
            1 => Some(Self::High),
            2 => Some(Self::Medium),
            3 => Some(Self::Low),
            4 => Some(Self::Backlog),
            _ => None,
        }
    }
}

// ===========================================================================
// IssueType
// ===========================================================================

define_enum! {
    /// Categorises the kind of work.
    IssueType, default = Task,
    variants: [
        (Task, "task"),
        (Bug, "bug"),
        (Feature, "feature"),
        (Epic, "epic"),
        (Story, "story"),
    ]
}

// ===========================================================================
// DependencyKind
// ===========================================================================

define_enum! {
    /// Relationship type between issues.
    DependencyKind, default = Blocks,
    variants: [
        (Blocks, "blocks"),
        (DependsOn, "depends_on"),
        (RelatedTo, "related_to"),
        (DiscoveredFrom, "discovered_from"),
    ]
}

impl DependencyKind {
    /// Returns `true` if edges of this kind affect the ready queue.
    pub fn affects_ready_work(self) -> bool {
        matches!(self, Self::Blocks | Self::DependsOn)
    }
}

// ===========================================================================
// AuditAction
// ===========================================================================

define_enum! {
    /// Categorises audit trail entries.
    AuditAction, default = Create,
    variants: [
        (Create, "create"),
        (Update, "update"),
        (Delete, "delete"),
        (Transition, "transition"),
        (Assign, "assign"),
        (LabelAdd, "label_add"),
        (LabelRemove, "label_remove"),
        (Merge, "merge"),
        (BulkCreate, "bulk_create"),
        (BulkUpdate, "bulk_update"),
        (BulkClose, "bulk_close"),
        (BulkLabel, "bulk_label"),
    ]
}
