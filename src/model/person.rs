use super::{Entity, Record, Tables, join_name};
use crate::event::EntityKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Male,
    Female,
    Unknown,
}

/// How confident the researcher is in the person's identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResearchStatus {
    Certain,
    Probable,
    Possible,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NameType {
    #[default]
    Birth,
    Married,
    Aka,
    Immigrant,
    Religious,
    Professional,
    Other,
}

/// Current projection of a person aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Person {
    pub id: Uuid,
    pub given_name: String,
    pub surname: String,
    pub gender: Option<Gender>,
    /// Genealogical date text, e.g. `"ABT 1850"`.
    pub birth_date: Option<String>,
    pub birth_place: Option<String>,
    pub death_date: Option<String>,
    pub death_place: Option<String>,
    pub notes: Option<String>,
    pub research_status: Option<ResearchStatus>,
    pub version: u64,
    pub updated_at: DateTime<Utc>,
}

impl Person {
    pub fn full_name(&self) -> String {
        join_name(&self.given_name, &self.surname)
    }

    pub(crate) fn validate(&self) -> crate::Result<()> {
        if self.given_name.trim().is_empty() && self.surname.trim().is_empty() {
            return Err(crate::Error::validation(
                "a person needs a given name or a surname",
            ));
        }
        Ok(())
    }
}

field_changes! {
    /// Changed person fields.
    pub struct PersonChanges for Person {
        given_name: String,
        surname: String,
        gender: Option<Gender>,
        birth_date: Option<String>,
        birth_place: Option<String>,
        death_date: Option<String>,
        death_place: Option<String>,
        notes: Option<String>,
        research_status: Option<ResearchStatus>,
    }
}

impl Record for Person {
    const KIND: EntityKind = EntityKind::Person;

    fn id(&self) -> Uuid {
        self.id
    }

    fn table(tables: &Tables) -> &BTreeMap<Uuid, Self> {
        &tables.persons
    }

    fn table_mut(tables: &mut Tables) -> &mut BTreeMap<Uuid, Self> {
        &mut tables.persons
    }

    fn display_name(&self, _tables: &Tables) -> String {
        self.full_name()
    }
}

impl Entity for Person {
    fn version(&self) -> u64 {
        self.version
    }

    fn stamp(&mut self, version: u64, at: DateTime<Utc>) {
        self.version = version;
        self.updated_at = at;
    }
}

/// An additional name recorded on a person's stream (married name, alias...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonName {
    pub id: Uuid,
    pub person_id: Uuid,
    pub given_name: String,
    pub surname: String,
    pub name_type: NameType,
    pub nickname: Option<String>,
    pub is_primary: bool,
}

impl PersonName {
    pub(crate) fn validate(&self) -> crate::Result<()> {
        if self.given_name.trim().is_empty() && self.surname.trim().is_empty() {
            return Err(crate::Error::validation(
                "a name needs a given name or a surname",
            ));
        }
        Ok(())
    }
}

field_changes! {
    pub struct NameChanges for PersonName {
        given_name: String,
        surname: String,
        name_type: NameType,
        nickname: Option<String>,
        is_primary: bool,
    }
}

impl Record for PersonName {
    const KIND: EntityKind = EntityKind::Name;

    fn id(&self) -> Uuid {
        self.id
    }

    fn table(tables: &Tables) -> &BTreeMap<Uuid, Self> {
        &tables.names
    }

    fn table_mut(tables: &mut Tables) -> &mut BTreeMap<Uuid, Self> {
        &mut tables.names
    }

    fn display_name(&self, _tables: &Tables) -> String {
        join_name(&self.given_name, &self.surname)
    }
}
