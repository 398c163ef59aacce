use super::{Entity, Record, Tables};
use crate::event::EntityKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Evidence quality, following the GEDCOM `QUAY` scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CitationQuality {
    Unreliable,
    Questionable,
    Secondary,
    Primary,
}

/// A pointer from a fact about a person or family into a source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub id: Uuid,
    pub source_id: Uuid,
    pub owner_type: EntityKind,
    pub owner_id: Uuid,
    /// The fact being supported, e.g. `"birth"`.
    pub fact_type: Option<String>,
    pub page: Option<String>,
    pub quality: Option<CitationQuality>,
    pub quoted_text: Option<String>,
    pub analysis: Option<String>,
    pub version: u64,
    pub updated_at: DateTime<Utc>,
}

impl Citation {
    pub(crate) fn validate(&self, tables: &Tables) -> crate::Result<()> {
        if !tables.sources.contains_key(&self.source_id) {
            return Err(crate::Error::not_found(EntityKind::Source, self.source_id));
        }
        super::require_owner(tables, self.owner_type, self.owner_id)
    }
}

field_changes! {
    pub struct CitationChanges for Citation {
        source_id: Uuid,
        owner_type: EntityKind,
        owner_id: Uuid,
        fact_type: Option<String>,
        page: Option<String>,
        quality: Option<CitationQuality>,
        quoted_text: Option<String>,
        analysis: Option<String>,
    }
}

impl Record for Citation {
    const KIND: EntityKind = EntityKind::Citation;

    fn id(&self) -> Uuid {
        self.id
    }

    fn table(tables: &Tables) -> &BTreeMap<Uuid, Self> {
        &tables.citations
    }

    fn table_mut(tables: &mut Tables) -> &mut BTreeMap<Uuid, Self> {
        &mut tables.citations
    }

    fn display_name(&self, tables: &Tables) -> String {
        let source = tables
            .sources
            .get(&self.source_id)
            .map(|s| s.title.clone())
            .unwrap_or_else(|| "unknown source".to_string());
        match &self.page {
            Some(page) => format!("{source}, {page}"),
            None => source,
        }
    }
}

impl Entity for Citation {
    fn version(&self) -> u64 {
        self.version
    }

    fn stamp(&mut self, version: u64, at: DateTime<Utc>) {
        self.version = version;
        self.updated_at = at;
    }
}
