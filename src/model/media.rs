use super::{Entity, Record, Tables};
use crate::event::EntityKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Metadata of a media item attached to a person or family.
///
/// The file content itself lives outside the event store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Media {
    pub id: Uuid,
    pub owner_type: EntityKind,
    pub owner_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub mime_type: String,
    pub file_name: Option<String>,
    pub file_size: u64,
    pub version: u64,
    pub updated_at: DateTime<Utc>,
}

impl Media {
    pub(crate) fn validate(&self, tables: &Tables) -> crate::Result<()> {
        super::require("title", &self.title)?;
        super::require("mime_type", &self.mime_type)?;
        super::require_owner(tables, self.owner_type, self.owner_id)
    }
}

field_changes! {
    pub struct MediaChanges for Media {
        owner_type: EntityKind,
        owner_id: Uuid,
        title: String,
        description: Option<String>,
        mime_type: String,
        file_name: Option<String>,
        file_size: u64,
    }
}

impl Record for Media {
    const KIND: EntityKind = EntityKind::Media;

    fn id(&self) -> Uuid {
        self.id
    }

    fn table(tables: &Tables) -> &BTreeMap<Uuid, Self> {
        &tables.media
    }

    fn table_mut(tables: &mut Tables) -> &mut BTreeMap<Uuid, Self> {
        &mut tables.media
    }

    fn display_name(&self, _tables: &Tables) -> String {
        self.title.clone()
    }
}

impl Entity for Media {
    fn version(&self) -> u64 {
        self.version
    }

    fn stamp(&mut self, version: u64, at: DateTime<Utc>) {
        self.version = version;
        self.updated_at = at;
    }
}
