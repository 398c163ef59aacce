use super::{Entity, Record, Tables};
use crate::event::EntityKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrdinanceType {
    Baptism,
    Confirmation,
    Initiatory,
    Endowment,
    SealingToParents,
    SealingToSpouse,
}

impl OrdinanceType {
    /// Spouse sealings belong to a couple; every other ordinance to a person.
    pub fn is_family_ordinance(self) -> bool {
        matches!(self, OrdinanceType::SealingToSpouse)
    }
}

/// A Latter-day Saint temple ordinance record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LdsOrdinance {
    pub id: Uuid,
    pub ordinance_type: OrdinanceType,
    pub person_id: Option<Uuid>,
    pub family_id: Option<Uuid>,
    pub date: Option<String>,
    pub place: Option<String>,
    pub temple_code: Option<String>,
    /// GEDCOM ordinance status code, e.g. `"COMPLETED"`.
    pub status: Option<String>,
    pub notes: Option<String>,
    pub version: u64,
    pub updated_at: DateTime<Utc>,
}

impl LdsOrdinance {
    pub(crate) fn validate(&self, tables: &Tables) -> crate::Result<()> {
        if self.ordinance_type.is_family_ordinance() {
            let family_id = self.family_id.ok_or_else(|| {
                crate::Error::validation("a spouse sealing requires a family")
            })?;
            if !tables.families.contains_key(&family_id) {
                return Err(crate::Error::not_found(EntityKind::Family, family_id));
            }
        } else {
            let person_id = self.person_id.ok_or_else(|| {
                crate::Error::validation("this ordinance requires a person")
            })?;
            if !tables.persons.contains_key(&person_id) {
                return Err(crate::Error::not_found(EntityKind::Person, person_id));
            }
        }
        Ok(())
    }
}

field_changes! {
    pub struct LdsOrdinanceChanges for LdsOrdinance {
        ordinance_type: OrdinanceType,
        person_id: Option<Uuid>,
        family_id: Option<Uuid>,
        date: Option<String>,
        place: Option<String>,
        temple_code: Option<String>,
        status: Option<String>,
        notes: Option<String>,
    }
}

impl Record for LdsOrdinance {
    const KIND: EntityKind = EntityKind::LdsOrdinance;

    fn id(&self) -> Uuid {
        self.id
    }

    fn table(tables: &Tables) -> &BTreeMap<Uuid, Self> {
        &tables.ordinances
    }

    fn table_mut(tables: &mut Tables) -> &mut BTreeMap<Uuid, Self> {
        &mut tables.ordinances
    }

    fn display_name(&self, tables: &Tables) -> String {
        let subject = self
            .person_id
            .and_then(|p| tables.person_label(p))
            .or_else(|| {
                self.family_id
                    .and_then(|f| tables.families.get(&f))
                    .map(|f| f.display_name(tables))
            });
        match subject {
            Some(subject) => format!("{:?} for {subject}", self.ordinance_type),
            None => format!("{:?}", self.ordinance_type),
        }
    }
}

impl Entity for LdsOrdinance {
    fn version(&self) -> u64 {
        self.version
    }

    fn stamp(&mut self, version: u64, at: DateTime<Utc>) {
        self.version = version;
        self.updated_at = at;
    }
}
