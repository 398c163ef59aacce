use super::{CommandContext, CommandResult};
use crate::error::Result;
use crate::genealogy::Genealogy;
use crate::model::{LdsOrdinance, LdsOrdinanceChanges, OrdinanceType};
use crate::read_model::ReadModelStore;
use crate::store::EventStore;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Input of [`Genealogy::create_lds_ordinance`].
///
/// A spouse sealing names the couple's family; every other ordinance names
/// the person.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewLdsOrdinance {
    pub id: Option<Uuid>,
    pub ordinance_type: OrdinanceType,
    pub person_id: Option<Uuid>,
    pub family_id: Option<Uuid>,
    pub date: Option<String>,
    pub place: Option<String>,
    pub temple_code: Option<String>,
    pub status: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateLdsOrdinance {
    pub id: Uuid,
    pub version: u64,
    pub changes: LdsOrdinanceChanges,
}

impl<E: EventStore, R: ReadModelStore> Genealogy<E, R> {
    pub fn create_lds_ordinance(
        &self,
        ctx: &CommandContext,
        input: NewLdsOrdinance,
    ) -> Result<CommandResult> {
        let ordinance = LdsOrdinance {
            id: input.id.unwrap_or_else(Uuid::new_v4),
            ordinance_type: input.ordinance_type,
            person_id: input.person_id,
            family_id: input.family_id,
            date: input.date,
            place: input.place,
            temple_code: input.temple_code,
            status: input.status,
            notes: input.notes,
            version: 1,
            updated_at: Utc::now(),
        };
        self.executor.create(ctx, ordinance)
    }

    pub fn update_lds_ordinance(
        &self,
        ctx: &CommandContext,
        input: UpdateLdsOrdinance,
    ) -> Result<CommandResult> {
        self.executor
            .update::<LdsOrdinance>(ctx, input.id, input.version, &input.changes)
    }

    pub fn delete_lds_ordinance(
        &self,
        ctx: &CommandContext,
        id: Uuid,
        version: u64,
    ) -> Result<CommandResult> {
        self.executor.delete::<LdsOrdinance>(ctx, id, version)
    }
}
