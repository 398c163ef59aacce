//! Event-sourced genealogy records.
//!
//! Every change to the family tree is an immutable event appended to the
//! stream of one aggregate (a person, family, source, citation, media item,
//! life event or LDS ordinance). The queryable tables are a fold over those
//! events, so any earlier state can be reconstructed, inspected and restored
//! by appending a corrective event.

#[macro_use]
mod changes;

mod commands;
mod domain;
mod error;
mod event;
mod executor;
mod genealogy;
mod history;
mod locks;
mod merge;
mod model;
pub mod projector;
mod read_model;
mod rollback;
pub mod snapshot;
mod store;

pub use changes::FieldChanges;
pub use commands::{
    AddName, CommandContext, CommandResult, LinkChild, NewCitation, NewFamily, NewLdsOrdinance,
    NewLifeEvent, NewMedia, NewPerson, NewSource, UpdateCitation, UpdateFamily,
    UpdateLdsOrdinance, UpdateLifeEvent, UpdateMedia, UpdateName, UpdatePerson, UpdateSource,
};
pub use domain::{Aggregate, DomainEvent, PersonMerge};
pub use error::{Error, Result};
pub use event::{EntityKind, Event, ExpectedVersion, PendingEvent};
pub use genealogy::{DEFAULT_MAX_PAGE_SIZE, Genealogy, GenealogyBuilder};
pub use history::{ChangeEntry, FieldChange, HistoryQuery, RestorePoint, RestorePoints};
pub use merge::{FieldSource, MergePersons, MergeResult, Transferred};
pub use model::{
    ChildRelationship, Citation, CitationChanges, CitationQuality, Entity, FactType, Family,
    FamilyChanges, FamilyChild, Gender, LdsOrdinance, LdsOrdinanceChanges, LifeEvent,
    LifeEventChanges, Media, MediaChanges, NameChanges, NameType, OrdinanceType, Person,
    PersonChanges, PersonName, Record, RelationshipType, ResearchStatus, Source, SourceChanges,
    Tables,
};
pub use read_model::{ListQuery, MemoryReadModel, Page, ReadModelStore, Sort};
pub use snapshot::Snapshot;
pub use store::{EventStore, FileEventStore, LockMode, LogTail, MemoryEventStore, line_hash};
