use super::{Entity, Record, Tables};
use crate::event::EntityKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactType {
    Birth,
    Baptism,
    Christening,
    Death,
    Burial,
    Cremation,
    Marriage,
    Divorce,
    Residence,
    Occupation,
    Education,
    Immigration,
    Emigration,
    Naturalization,
    Census,
    Military,
    Other,
}

/// A dated fact in the life of a person or family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LifeEvent {
    pub id: Uuid,
    pub owner_type: EntityKind,
    pub owner_id: Uuid,
    pub fact_type: FactType,
    pub date: Option<String>,
    pub place: Option<String>,
    pub description: Option<String>,
    pub version: u64,
    pub updated_at: DateTime<Utc>,
}

impl LifeEvent {
    pub(crate) fn validate(&self, tables: &Tables) -> crate::Result<()> {
        if !matches!(self.owner_type, EntityKind::Person | EntityKind::Family) {
            return Err(crate::Error::validation(format!(
                "life events belong to a person or a family, not a {}",
                self.owner_type
            )));
        }
        super::require_owner(tables, self.owner_type, self.owner_id)
    }
}

field_changes! {
    pub struct LifeEventChanges for LifeEvent {
        owner_type: EntityKind,
        owner_id: Uuid,
        fact_type: FactType,
        date: Option<String>,
        place: Option<String>,
        description: Option<String>,
    }
}

impl Record for LifeEvent {
    const KIND: EntityKind = EntityKind::LifeEvent;

    fn id(&self) -> Uuid {
        self.id
    }

    fn table(tables: &Tables) -> &BTreeMap<Uuid, Self> {
        &tables.life_events
    }

    fn table_mut(tables: &mut Tables) -> &mut BTreeMap<Uuid, Self> {
        &mut tables.life_events
    }

    fn display_name(&self, tables: &Tables) -> String {
        let owner = match self.owner_type {
            EntityKind::Family => tables
                .families
                .get(&self.owner_id)
                .map(|f| f.display_name(tables)),
            _ => tables.person_label(self.owner_id),
        };
        match owner {
            Some(owner) => format!("{:?} of {owner}", self.fact_type),
            None => format!("{:?}", self.fact_type),
        }
    }
}

impl Entity for LifeEvent {
    fn version(&self) -> u64 {
        self.version
    }

    fn stamp(&mut self, version: u64, at: DateTime<Utc>) {
        self.version = version;
        self.updated_at = at;
    }
}
