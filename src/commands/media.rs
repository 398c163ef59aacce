use super::{CommandContext, CommandResult};
use crate::error::Result;
use crate::event::EntityKind;
use crate::genealogy::Genealogy;
use crate::model::{Media, MediaChanges};
use crate::read_model::ReadModelStore;
use crate::store::EventStore;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Input of [`Genealogy::create_media`]: metadata only, the file content is
/// stored elsewhere.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewMedia {
    pub id: Option<Uuid>,
    pub owner_type: EntityKind,
    pub owner_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub mime_type: String,
    pub file_name: Option<String>,
    pub file_size: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateMedia {
    pub id: Uuid,
    pub version: u64,
    pub changes: MediaChanges,
}

impl<E: EventStore, R: ReadModelStore> Genealogy<E, R> {
    pub fn create_media(&self, ctx: &CommandContext, input: NewMedia) -> Result<CommandResult> {
        let media = Media {
            id: input.id.unwrap_or_else(Uuid::new_v4),
            owner_type: input.owner_type,
            owner_id: input.owner_id,
            title: input.title,
            description: input.description,
            mime_type: input.mime_type,
            file_name: input.file_name,
            file_size: input.file_size,
            version: 1,
            updated_at: Utc::now(),
        };
        self.executor.create(ctx, media)
    }

    pub fn update_media(&self, ctx: &CommandContext, input: UpdateMedia) -> Result<CommandResult> {
        self.executor
            .update::<Media>(ctx, input.id, input.version, &input.changes)
    }

    pub fn delete_media(
        &self,
        ctx: &CommandContext,
        id: Uuid,
        version: u64,
    ) -> Result<CommandResult> {
        self.executor.delete::<Media>(ctx, id, version)
    }
}
