//! Identifier newtypes for people, subjects, and audit records.
//!
//! An [`Actor`] and a [`Recipient`] are both strings on the wire, but mixing
//! them up would silently mis-key a digest, so each gets its own type.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// string_id! expands to a non-empty String newtype with new(), as_str(),
// Display, and serde conversions that reject "" during deserialisation.
// ---------------------------------------------------------------------------
macro_rules! string_id {
    (
        $(#[$attr:meta])*
        $name:ident
    ) => {
        $(#[$attr])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Returns `None` for an empty value.
            pub fn new(value: impl Into<String>) -> Option<Self> {
                let value = value.into();
                (!value.is_empty()).then_some(Self(value))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = String;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value).ok_or_else(|| {
                    format!("{} must not be empty", stringify!($name))
                })
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> String {
                id.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

// ---------------------------------------------------------------------------
// String-backed identifiers
// ---------------------------------------------------------------------------

string_id! {
    /// The display identity of the person who made a change (e.g. `"alice"`).
    ///
    /// Half of every aggregation key: bursts are grouped per actor, not per
    /// subject.
    Actor
}

string_id! {
    /// Identifies the subject of a change, typically an issue key such as `"T-1"`.
    SubjectId
}

string_id! {
    /// A resolved notification target (e.g. a phone number such as `"+1555"`).
    ///
    /// Recipients are resolved upstream; this crate only carries and unions them.
    Recipient
}

// ---------------------------------------------------------------------------
// UUID-backed identifiers (internally generated)
// ---------------------------------------------------------------------------

/// Identifies a single audit record.
///
/// Generated fresh for every ingested event so an audit entry can be
/// correlated with the log lines emitted while ingesting it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AuditRecordId(Uuid);

impl AuditRecordId {
    /// Generates a new random record identifier.
    pub fn new_random() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for AuditRecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
