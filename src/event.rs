use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

/// The kind of record an event stream or read-model table holds.
///
/// Every aggregate kind owns one event stream per instance. [`EntityKind::Name`]
/// is a read-model kind only: names are recorded on their person's stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Person,
    Name,
    Family,
    Source,
    Citation,
    Media,
    LifeEvent,
    LdsOrdinance,
}

impl EntityKind {
    /// The snake_case identifier used in serialized events.
    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Person => "person",
            EntityKind::Name => "name",
            EntityKind::Family => "family",
            EntityKind::Source => "source",
            EntityKind::Citation => "citation",
            EntityKind::Media => "media",
            EntityKind::LifeEvent => "life_event",
            EntityKind::LdsOrdinance => "lds_ordinance",
        }
    }

    /// Event types recorded for this kind.
    ///
    /// Used to turn an entity-kind filter into an event-type filter for
    /// global history queries. Names map to the name events of person
    /// streams.
    pub fn event_types(self) -> &'static [&'static str] {
        match self {
            EntityKind::Person => &[
                "PersonCreated",
                "PersonUpdated",
                "PersonDeleted",
                "PersonMerged",
                "PersonRolledBack",
                "NameAdded",
                "NameUpdated",
                "NameRemoved",
            ],
            EntityKind::Name => &["NameAdded", "NameUpdated", "NameRemoved"],
            EntityKind::Family => &[
                "FamilyCreated",
                "FamilyUpdated",
                "FamilyDeleted",
                "FamilyRolledBack",
                "ChildLinked",
                "ChildUnlinked",
            ],
            EntityKind::Source => &[
                "SourceCreated",
                "SourceUpdated",
                "SourceDeleted",
                "SourceRolledBack",
            ],
            EntityKind::Citation => &[
                "CitationCreated",
                "CitationUpdated",
                "CitationDeleted",
                "CitationRolledBack",
            ],
            EntityKind::Media => &[
                "MediaCreated",
                "MediaUpdated",
                "MediaDeleted",
                "MediaRolledBack",
            ],
            EntityKind::LifeEvent => &[
                "LifeEventCreated",
                "LifeEventUpdated",
                "LifeEventDeleted",
                "LifeEventRolledBack",
            ],
            EntityKind::LdsOrdinance => &[
                "LdsOrdinanceCreated",
                "LdsOrdinanceUpdated",
                "LdsOrdinanceDeleted",
                "LdsOrdinanceRolledBack",
            ],
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The stream version a writer expects to find before appending.
///
/// Appends are a compare-and-swap on the stream length: the batch is
/// accepted only if the stream currently matches the expectation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExpectedVersion {
    /// The stream must not exist yet.
    NoStream,
    /// The stream must hold exactly this many events.
    Exact(u64),
}

impl ExpectedVersion {
    /// Whether a stream currently holding `current` events satisfies this
    /// expectation.
    pub fn matches(self, current: u64) -> bool {
        match self {
            ExpectedVersion::NoStream => current == 0,
            ExpectedVersion::Exact(v) => current == v,
        }
    }

    /// The stream length this expectation stands for.
    pub fn as_len(self) -> u64 {
        match self {
            ExpectedVersion::NoStream => 0,
            ExpectedVersion::Exact(v) => v,
        }
    }
}

impl fmt::Display for ExpectedVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExpectedVersion::NoStream => f.write_str("no stream"),
            ExpectedVersion::Exact(v) => write!(f, "{v}"),
        }
    }
}

/// An immutable event record stored in an aggregate stream.
///
/// Events are serialized as single JSON lines by the file-backed store. The
/// `data` field holds the payload of a typed [`DomainEvent`](crate::DomainEvent);
/// the log itself has no opinion about its shape.
///
/// Within one stream, `version` is 1-based and gapless. `position` is the
/// global sequence number assigned at append time and orders events across
/// streams.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[non_exhaustive]
pub struct Event {
    pub aggregate_id: Uuid,

    pub aggregate_type: EntityKind,

    /// The event type identifier (e.g. `"PersonCreated"`).
    ///
    /// Serialized as `"type"` in JSON for brevity.
    #[serde(rename = "type")]
    pub event_type: String,

    pub data: Value,

    pub version: u64,

    pub position: u64,

    pub ts: DateTime<Utc>,

    /// Identity of the user that issued the command.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,

    /// Correlation id and caller supplied metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

/// An event that has not been appended yet.
///
/// The store stamps aggregate id, kind, version and global position when the
/// batch is accepted.
///
/// # Examples
///
/// ```
/// use kinfold::PendingEvent;
/// use serde_json::json;
///
/// let event = PendingEvent::new("PersonUpdated", json!({"changes": {}}))
///     .with_actor("user_42");
/// assert_eq!(event.event_type, "PersonUpdated");
/// assert_eq!(event.actor, Some("user_42".to_string()));
/// ```
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub struct PendingEvent {
    pub event_type: String,
    pub data: Value,
    pub ts: DateTime<Utc>,
    pub actor: Option<String>,
    pub meta: Option<Value>,
}

impl PendingEvent {
    /// Create a new pending event timestamped now.
    pub fn new(event_type: &str, data: Value) -> Self {
        PendingEvent {
            event_type: event_type.to_string(),
            data,
            ts: Utc::now(),
            actor: None,
            meta: None,
        }
    }

    /// Override the timestamp.
    pub fn at(mut self, ts: DateTime<Utc>) -> Self {
        self.ts = ts;
        self
    }

    /// Set the actor that caused this event.
    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    /// Set extensible metadata.
    pub fn with_meta(mut self, meta: Value) -> Self {
        self.meta = Some(meta);
        self
    }

    /// Stamp the event into a stream.
    pub(crate) fn into_event(
        self,
        aggregate_id: Uuid,
        aggregate_type: EntityKind,
        version: u64,
        position: u64,
    ) -> Event {
        Event {
            aggregate_id,
            aggregate_type,
            event_type: self.event_type,
            data: self.data,
            version,
            position,
            ts: self.ts,
            actor: self.actor,
            meta: self.meta,
        }
    }
}
