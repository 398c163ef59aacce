use super::{Entity, Record, Tables};
use crate::event::EntityKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// A documentary source (register, census, book) that citations point into.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub id: Uuid,
    pub title: String,
    pub author: Option<String>,
    pub publisher: Option<String>,
    pub publish_date: Option<String>,
    pub url: Option<String>,
    pub repository_name: Option<String>,
    pub notes: Option<String>,
    pub version: u64,
    pub updated_at: DateTime<Utc>,
}

impl Source {
    pub(crate) fn validate(&self) -> crate::Result<()> {
        super::require("title", &self.title)
    }
}

field_changes! {
    pub struct SourceChanges for Source {
        title: String,
        author: Option<String>,
        publisher: Option<String>,
        publish_date: Option<String>,
        url: Option<String>,
        repository_name: Option<String>,
        notes: Option<String>,
    }
}

impl Record for Source {
    const KIND: EntityKind = EntityKind::Source;

    fn id(&self) -> Uuid {
        self.id
    }

    fn table(tables: &Tables) -> &BTreeMap<Uuid, Self> {
        &tables.sources
    }

    fn table_mut(tables: &mut Tables) -> &mut BTreeMap<Uuid, Self> {
        &mut tables.sources
    }

    fn display_name(&self, _tables: &Tables) -> String {
        self.title.clone()
    }
}

impl Entity for Source {
    fn version(&self) -> u64 {
        self.version
    }

    fn stamp(&mut self, version: u64, at: DateTime<Utc>) {
        self.version = version;
        self.updated_at = at;
    }
}
