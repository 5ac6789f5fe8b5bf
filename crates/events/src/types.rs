//! Shared value types for the change-digest domain.
//!
//! Unlike the newtype identifiers in [`crate::identifiers`], these types carry
//! the content of a change: what kind it was, which field moved from where to
//! where, and who should hear about it.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::{Actor, AuditRecordId, Recipient, SubjectId};

// ---------------------------------------------------------------------------
// Event kinds and transitions
// ---------------------------------------------------------------------------

/// The kind of change an event describes.
///
/// Half of every [`AggregationKey`] and the selector the digest renderer uses
/// to pick a title and line layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A subject was created.
    Created,
    /// A subject was deleted.
    Deleted,
    /// The reporter of a subject changed.
    ReporterChanged,
    /// The assignee of a subject changed.
    AssigneeChanged,
    /// The workflow status of a subject changed.
    StatusChanged,
}

impl EventKind {
    /// Stable wire name, identical to the serde representation.
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Created => "created",
            EventKind::Deleted => "deleted",
            EventKind::ReporterChanged => "reporter_changed",
            EventKind::AssigneeChanged => "assignee_changed",
            EventKind::StatusChanged => "status_changed",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------

/// Kind-specific payload of a change.
///
/// One variant per [`EventKind`], each carrying only the fields that kind
/// needs. The aggregation engine only ever looks at [`Transition::kind`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Transition {
    /// The subject was created.
    Created,
    /// The subject was deleted.
    Deleted,
    /// The reporter moved from one person to another.
    ReporterChanged {
        /// Previous reporter display name.
        from: String,
        /// New reporter display name.
        to: String,
    },
    /// The assignee moved from one person (or nobody) to another.
    AssigneeChanged {
        /// Previous assignee, `None` if the subject was unassigned.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        from: Option<String>,
        /// New assignee display name.
        to: String,
    },
    /// The workflow status moved from one state to another.
    StatusChanged {
        /// Previous status name.
        from: String,
        /// New status name.
        to: String,
    },
}

impl Transition {
    /// Returns the [`EventKind`] tag of this transition.
    pub fn kind(&self) -> EventKind {
        match self {
            Transition::Created => EventKind::Created,
            Transition::Deleted => EventKind::Deleted,
            Transition::ReporterChanged { .. } => EventKind::ReporterChanged,
            Transition::AssigneeChanged { .. } => EventKind::AssigneeChanged,
            Transition::StatusChanged { .. } => EventKind::StatusChanged,
        }
    }
}

// ---------------------------------------------------------------------------
// Inbound events and staged records
// ---------------------------------------------------------------------------

/// A normalized change notification as handed over by the upstream dispatcher.
///
/// One `ChangeEvent` is produced per relevant field change. Recipients have
/// already been resolved; the list may be empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// The subject that changed (e.g. issue key).
    pub subject: SubjectId,
    /// Who made the change.
    pub actor: Actor,
    /// Human-readable summary of the subject.
    pub summary: String,
    /// What changed.
    pub transition: Transition,
    /// Resolved notification targets for this occurrence. Entries that
    /// upstream could not resolve arrive as `""` and are dropped on decode.
    #[serde(default, deserialize_with = "resolved_recipients")]
    pub recipients: Vec<Recipient>,
    /// When the upstream source observed the change.
    #[serde(default = "Timestamp::now")]
    pub occurred_at: Timestamp,
}

fn resolved_recipients<'de, D>(deserializer: D) -> Result<Vec<Recipient>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Vec::<String>::deserialize(deserializer)?;
    Ok(raw.into_iter().filter_map(Recipient::new).collect())
}

impl ChangeEvent {
    /// Returns the [`EventKind`] of this event.
    pub fn kind(&self) -> EventKind {
        self.transition.kind()
    }

    /// Returns the aggregation key this event is staged under.
    pub fn aggregation_key(&self) -> AggregationKey {
        AggregationKey::new(self.kind(), self.actor.clone())
    }

    /// Builds the immutable staged snapshot of this event.
    pub fn to_staged(&self, staged_at: Timestamp) -> StagedEvent {
        StagedEvent {
            subject: self.subject.clone(),
            actor: self.actor.clone(),
            summary: self.summary.clone(),
            transition: self.transition.clone(),
            staged_at,
        }
    }
}

// ---------------------------------------------------------------------------

/// Immutable snapshot of one occurrence, owned by the staging store until the
/// key is flushed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagedEvent {
    /// The subject that changed.
    pub subject: SubjectId,
    /// Who made the change.
    pub actor: Actor,
    /// Human-readable summary of the subject.
    pub summary: String,
    /// What changed.
    pub transition: Transition,
    /// When the record was appended to the staging store.
    pub staged_at: Timestamp,
}

impl StagedEvent {
    /// Returns the [`EventKind`] of the staged change.
    pub fn kind(&self) -> EventKind {
        self.transition.kind()
    }
}

// ---------------------------------------------------------------------------
// Aggregation
// ---------------------------------------------------------------------------

/// Identifies one debounce group: every event with the same kind and actor is
/// coalesced into a single digest.
///
/// The subject is deliberately not part of the key, so two unrelated subjects
/// changed by the same actor inside one window share a digest.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AggregationKey {
    kind: EventKind,
    actor: Actor,
}

impl AggregationKey {
    /// Creates a key for the given kind and actor.
    pub fn new(kind: EventKind, actor: Actor) -> Self {
        Self { kind, actor }
    }

    /// The event kind half of the key.
    pub fn kind(&self) -> EventKind {
        self.kind
    }

    /// The actor half of the key.
    pub fn actor(&self) -> &Actor {
        &self.actor
    }
}

impl std::fmt::Display for AggregationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind, self.actor)
    }
}

// ---------------------------------------------------------------------------

/// Everything staged for one key, as returned by a drain.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StagedBatch {
    /// Staged records in insertion order.
    pub events: Vec<StagedEvent>,
    /// Union of all recipients staged for the key.
    pub recipients: BTreeSet<Recipient>,
}

impl StagedBatch {
    /// Returns `true` if no records were staged.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Audit
// ---------------------------------------------------------------------------

/// Durable record of one raw inbound event, independent of aggregation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Unique record identifier.
    pub id: AuditRecordId,
    /// When the engine received the event.
    pub received_at: Timestamp,
    /// The event exactly as ingested.
    pub event: ChangeEvent,
}

impl AuditRecord {
    /// Wraps an event in a fresh audit record stamped with the current time.
    pub fn new(event: ChangeEvent) -> Self {
        Self {
            id: AuditRecordId::new_random(),
            received_at: Timestamp::now(),
            event,
        }
    }
}

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// When an event happened or was staged. Serialised as RFC 3339.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    pub fn now() -> Self {
        Self(Utc::now())
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(at: DateTime<Utc>) -> Self {
        Self(at)
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0.to_rfc3339())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn actor(name: &str) -> Actor {
        Actor::new(name).unwrap()
    }

    #[test]
    fn key_ignores_subject() {
        let a = ChangeEvent {
            subject: SubjectId::new("T-1").unwrap(),
            actor: actor("alice"),
            summary: "first".into(),
            transition: Transition::Deleted,
            recipients: vec![],
            occurred_at: Timestamp::now(),
        };
        let b = ChangeEvent {
            subject: SubjectId::new("T-2").unwrap(),
            summary: "second".into(),
            ..a.clone()
        };
        assert_eq!(a.aggregation_key(), b.aggregation_key());
    }

    #[test]
    fn key_separates_actors_and_kinds() {
        let alice = AggregationKey::new(EventKind::StatusChanged, actor("alice"));
        let bob = AggregationKey::new(EventKind::StatusChanged, actor("bob"));
        let alice_created = AggregationKey::new(EventKind::Created, actor("alice"));
        assert_ne!(alice, bob);
        assert_ne!(alice, alice_created);
        assert_eq!(alice.to_string(), "status_changed:alice");
    }

    #[test]
    fn change_event_wire_format() {
        let json = r#"{
            "subject": "T-1",
            "actor": "alice",
            "summary": "Fix login",
            "transition": { "kind": "status_changed", "from": "Open", "to": "Done" },
            "recipients": ["+1555"]
        }"#;
        let event: ChangeEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.kind(), EventKind::StatusChanged);
        assert_eq!(
            event.transition,
            Transition::StatusChanged {
                from: "Open".into(),
                to: "Done".into()
            }
        );
        assert_eq!(event.recipients, vec![Recipient::new("+1555").unwrap()]);
    }

    #[test]
    fn unresolved_recipients_are_dropped_not_rejected() {
        let json = r#"{
            "subject": "T-1",
            "actor": "alice",
            "summary": "Fix login",
            "transition": { "kind": "deleted" },
            "recipients": ["", "+1555", ""]
        }"#;
        let event: ChangeEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.recipients, vec![Recipient::new("+1555").unwrap()]);
    }

    #[test]
    fn unassigned_assignee_change_omits_from() {
        let json = r#"{ "kind": "assignee_changed", "to": "bob" }"#;
        let transition: Transition = serde_json::from_str(json).unwrap();
        assert_eq!(
            transition,
            Transition::AssigneeChanged {
                from: None,
                to: "bob".into()
            }
        );
        assert_eq!(serde_json::to_string(&transition).unwrap(), json.replace(' ', ""));
    }
}
