use super::{CommandContext, CommandResult};
use crate::error::Result;
use crate::event::EntityKind;
use crate::genealogy::Genealogy;
use crate::model::{FactType, LifeEvent, LifeEventChanges};
use crate::read_model::ReadModelStore;
use crate::store::EventStore;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewLifeEvent {
    pub id: Option<Uuid>,
    pub owner_type: EntityKind,
    pub owner_id: Uuid,
    pub fact_type: FactType,
    pub date: Option<String>,
    pub place: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateLifeEvent {
    pub id: Uuid,
    pub version: u64,
    pub changes: LifeEventChanges,
}

impl<E: EventStore, R: ReadModelStore> Genealogy<E, R> {
    pub fn create_life_event(
        &self,
        ctx: &CommandContext,
        input: NewLifeEvent,
    ) -> Result<CommandResult> {
        let life_event = LifeEvent {
            id: input.id.unwrap_or_else(Uuid::new_v4),
            owner_type: input.owner_type,
            owner_id: input.owner_id,
            fact_type: input.fact_type,
            date: input.date,
            place: input.place,
            description: input.description,
            version: 1,
            updated_at: Utc::now(),
        };
        self.executor.create(ctx, life_event)
    }

    pub fn update_life_event(
        &self,
        ctx: &CommandContext,
        input: UpdateLifeEvent,
    ) -> Result<CommandResult> {
        self.executor
            .update::<LifeEvent>(ctx, input.id, input.version, &input.changes)
    }

    pub fn delete_life_event(
        &self,
        ctx: &CommandContext,
        id: Uuid,
        version: u64,
    ) -> Result<CommandResult> {
        self.executor.delete::<LifeEvent>(ctx, id, version)
    }
}
