//! Typed domain events and their mapping onto stored [`Event`]s.

use crate::changes::FieldChanges;
use crate::commands::CommandContext;
use crate::error::Result;
use crate::event::{Event, PendingEvent};
use crate::model::{
    Citation, CitationChanges, Entity, Family, FamilyChanges, FamilyChild, LdsOrdinance,
    LdsOrdinanceChanges, LifeEvent, LifeEventChanges, Media, MediaChanges, NameChanges, Person,
    PersonChanges, PersonName, Source, SourceChanges, Tables,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Every state transition the store records.
///
/// Uses adjacently tagged serialization: the `"type"` tag becomes
/// [`Event::event_type`] and the `"data"` content becomes [`Event::data`].
/// Created events carry the whole new record; update and rollback events
/// carry only the changed fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum DomainEvent {
    PersonCreated {
        person: Person,
    },
    PersonUpdated {
        changes: PersonChanges,
    },
    PersonDeleted {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        merged_into: Option<Uuid>,
    },
    PersonMerged(Box<PersonMerge>),
    PersonRolledBack {
        target_version: u64,
        changes: PersonChanges,
        /// Full name set at the target version, present only when it differs
        /// from the names at rollback time.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        names: Option<Vec<PersonName>>,
    },
    NameAdded {
        name: PersonName,
    },
    NameUpdated {
        name_id: Uuid,
        changes: NameChanges,
    },
    NameRemoved {
        name_id: Uuid,
    },

    FamilyCreated {
        family: Family,
    },
    FamilyUpdated {
        changes: FamilyChanges,
    },
    ChildLinked {
        child: FamilyChild,
    },
    ChildUnlinked {
        person_id: Uuid,
    },
    FamilyDeleted,
    FamilyRolledBack {
        target_version: u64,
        changes: FamilyChanges,
    },

    SourceCreated {
        source: Source,
    },
    SourceUpdated {
        changes: SourceChanges,
    },
    SourceDeleted,
    SourceRolledBack {
        target_version: u64,
        changes: SourceChanges,
    },

    CitationCreated {
        citation: Citation,
    },
    CitationUpdated {
        changes: CitationChanges,
    },
    CitationDeleted,
    CitationRolledBack {
        target_version: u64,
        changes: CitationChanges,
    },

    MediaCreated {
        media: Media,
    },
    MediaUpdated {
        changes: MediaChanges,
    },
    MediaDeleted,
    MediaRolledBack {
        target_version: u64,
        changes: MediaChanges,
    },

    LifeEventCreated {
        life_event: LifeEvent,
    },
    LifeEventUpdated {
        changes: LifeEventChanges,
    },
    LifeEventDeleted,
    LifeEventRolledBack {
        target_version: u64,
        changes: LifeEventChanges,
    },

    LdsOrdinanceCreated {
        ordinance: LdsOrdinance,
    },
    LdsOrdinanceUpdated {
        changes: LdsOrdinanceChanges,
    },
    LdsOrdinanceDeleted,
    LdsOrdinanceRolledBack {
        target_version: u64,
        changes: LdsOrdinanceChanges,
    },
}

/// Audit record of a person merge, committed on the survivor's stream.
///
/// Carries the merged person as it was (for audit and manual undo), the
/// field changes applied to the survivor, and the ids of every record that
/// was re-pointed from the merged person to the survivor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonMerge {
    pub merged_id: Uuid,
    pub merged: Person,
    pub merged_names: Vec<PersonName>,
    pub changes: PersonChanges,
    pub families: Vec<Uuid>,
    pub citations: Vec<Uuid>,
    pub names: Vec<Uuid>,
    pub life_events: Vec<Uuid>,
    pub media: Vec<Uuid>,
    pub ordinances: Vec<Uuid>,
}

impl PersonMerge {
    /// Whether applying this merge rewrites the record with `id`.
    pub fn references(&self, id: Uuid) -> bool {
        [
            &self.families,
            &self.citations,
            &self.names,
            &self.life_events,
            &self.media,
            &self.ordinances,
        ]
        .iter()
        .any(|ids| ids.contains(&id))
    }
}

impl DomainEvent {
    /// Decode a stored event.
    ///
    /// # Errors
    ///
    /// Returns a serialization error for unknown event types or malformed
    /// payloads.
    pub fn decode(event: &Event) -> Result<Self> {
        let tagged = if event.data.is_null() {
            serde_json::json!({ "type": event.event_type })
        } else {
            serde_json::json!({
                "type": event.event_type,
                "data": event.data,
            })
        };
        Ok(serde_json::from_value(tagged)?)
    }

    /// Encode into a pending event, carrying actor and correlation metadata
    /// from the command context.
    pub fn encode(&self, ctx: &CommandContext) -> Result<PendingEvent> {
        let value = serde_json::to_value(self)?;
        let event_type = value
            .get("type")
            .and_then(|t| t.as_str())
            .ok_or_else(|| {
                <serde_json::Error as serde::ser::Error>::custom(
                    "domain event must serialize with a string type tag",
                )
            })?
            .to_string();
        let data = value.get("data").cloned().unwrap_or(serde_json::Value::Null);

        let mut pending = PendingEvent::new(&event_type, data);
        if let Some(actor) = &ctx.actor {
            pending = pending.with_actor(actor.clone());
        }

        let mut meta = match &ctx.metadata {
            Some(serde_json::Value::Object(map)) => map.clone(),
            _ => serde_json::Map::new(),
        };
        if let Some(cid) = &ctx.correlation_id {
            meta.insert(
                "correlation_id".to_string(),
                serde_json::Value::String(cid.clone()),
            );
        }
        if !meta.is_empty() {
            pending = pending.with_meta(serde_json::Value::Object(meta));
        }
        Ok(pending)
    }

    /// History action label: `created`, `updated`, `deleted`, `merged`,
    /// `rolled_back`, or the name/child event it stands for.
    pub fn action(&self) -> &'static str {
        use DomainEvent::*;
        match self {
            PersonCreated { .. }
            | FamilyCreated { .. }
            | SourceCreated { .. }
            | CitationCreated { .. }
            | MediaCreated { .. }
            | LifeEventCreated { .. }
            | LdsOrdinanceCreated { .. } => "created",
            PersonUpdated { .. }
            | FamilyUpdated { .. }
            | SourceUpdated { .. }
            | CitationUpdated { .. }
            | MediaUpdated { .. }
            | LifeEventUpdated { .. }
            | LdsOrdinanceUpdated { .. } => "updated",
            PersonDeleted { .. }
            | FamilyDeleted
            | SourceDeleted
            | CitationDeleted
            | MediaDeleted
            | LifeEventDeleted
            | LdsOrdinanceDeleted => "deleted",
            PersonMerged(_) => "merged",
            PersonRolledBack { .. }
            | FamilyRolledBack { .. }
            | SourceRolledBack { .. }
            | CitationRolledBack { .. }
            | MediaRolledBack { .. }
            | LifeEventRolledBack { .. }
            | LdsOrdinanceRolledBack { .. } => "rolled_back",
            NameAdded { .. } => "name_added",
            NameUpdated { .. } => "name_updated",
            NameRemoved { .. } => "name_removed",
            ChildLinked { .. } => "child_linked",
            ChildUnlinked { .. } => "child_unlinked",
        }
    }

    /// Target version carried by a rollback event.
    pub fn rollback_target(&self) -> Option<u64> {
        use DomainEvent::*;
        match self {
            PersonRolledBack { target_version, .. }
            | FamilyRolledBack { target_version, .. }
            | SourceRolledBack { target_version, .. }
            | CitationRolledBack { target_version, .. }
            | MediaRolledBack { target_version, .. }
            | LifeEventRolledBack { target_version, .. }
            | LdsOrdinanceRolledBack { target_version, .. } => Some(*target_version),
            _ => None,
        }
    }

    /// Whether this is the terminal event of its stream.
    pub fn is_delete(&self) -> bool {
        matches!(
            self,
            DomainEvent::PersonDeleted { .. }
                | DomainEvent::FamilyDeleted
                | DomainEvent::SourceDeleted
                | DomainEvent::CitationDeleted
                | DomainEvent::MediaDeleted
                | DomainEvent::LifeEventDeleted
                | DomainEvent::LdsOrdinanceDeleted
        )
    }
}

/// A record kind governed by its own stream, and the events that drive it.
///
/// Lets the executor and the rollback service run the same create, update,
/// delete and rollback flows for every aggregate kind.
pub trait Aggregate: Entity {
    type Changes: FieldChanges<Record = Self>;

    fn created(self) -> DomainEvent;

    fn updated(changes: Self::Changes) -> DomainEvent;

    fn deleted() -> DomainEvent;

    fn rolled_back(target_version: u64, changes: Self::Changes) -> DomainEvent;

    /// Check the record against the rest of the read model.
    fn validate(&self, tables: &Tables) -> Result<()>;
}

macro_rules! aggregate {
    ($record:ty, $changes:ty, $field:ident,
     $created:ident, $updated:ident, $deleted:expr, $rolled_back:ident,
     |$this:ident, $tables:ident| $validate:expr) => {
        impl Aggregate for $record {
            type Changes = $changes;

            fn created(self) -> DomainEvent {
                DomainEvent::$created { $field: self }
            }

            fn updated(changes: $changes) -> DomainEvent {
                DomainEvent::$updated { changes }
            }

            fn deleted() -> DomainEvent {
                $deleted
            }

            fn rolled_back(target_version: u64, changes: $changes) -> DomainEvent {
                DomainEvent::$rolled_back {
                    target_version,
                    changes,
                }
            }

            fn validate(&self, tables: &Tables) -> Result<()> {
                let ($this, $tables) = (self, tables);
                $validate
            }
        }
    };
}

impl Aggregate for Person {
    type Changes = PersonChanges;

    fn created(self) -> DomainEvent {
        DomainEvent::PersonCreated { person: self }
    }

    fn updated(changes: PersonChanges) -> DomainEvent {
        DomainEvent::PersonUpdated { changes }
    }

    fn deleted() -> DomainEvent {
        DomainEvent::PersonDeleted { merged_into: None }
    }

    fn rolled_back(target_version: u64, changes: PersonChanges) -> DomainEvent {
        DomainEvent::PersonRolledBack {
            target_version,
            changes,
            names: None,
        }
    }

    fn validate(&self, _tables: &Tables) -> Result<()> {
        Person::validate(self)
    }
}

aggregate!(Family, FamilyChanges, family,
    FamilyCreated, FamilyUpdated, DomainEvent::FamilyDeleted, FamilyRolledBack,
    |family, tables| family.validate(tables));
aggregate!(Source, SourceChanges, source,
    SourceCreated, SourceUpdated, DomainEvent::SourceDeleted, SourceRolledBack,
    |source, _tables| source.validate());
aggregate!(Citation, CitationChanges, citation,
    CitationCreated, CitationUpdated, DomainEvent::CitationDeleted, CitationRolledBack,
    |citation, tables| citation.validate(tables));
aggregate!(Media, MediaChanges, media,
    MediaCreated, MediaUpdated, DomainEvent::MediaDeleted, MediaRolledBack,
    |media, tables| media.validate(tables));
aggregate!(LifeEvent, LifeEventChanges, life_event,
    LifeEventCreated, LifeEventUpdated, DomainEvent::LifeEventDeleted, LifeEventRolledBack,
    |life_event, tables| life_event.validate(tables));
aggregate!(LdsOrdinance, LdsOrdinanceChanges, ordinance,
    LdsOrdinanceCreated, LdsOrdinanceUpdated, DomainEvent::LdsOrdinanceDeleted,
    LdsOrdinanceRolledBack,
    |ordinance, tables| ordinance.validate(tables));
