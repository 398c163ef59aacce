use super::{CommandContext, CommandResult};
use crate::error::Result;
use crate::event::EntityKind;
use crate::genealogy::Genealogy;
use crate::model::{Citation, CitationChanges, CitationQuality};
use crate::read_model::ReadModelStore;
use crate::store::EventStore;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewCitation {
    pub id: Option<Uuid>,
    pub source_id: Uuid,
    pub owner_type: EntityKind,
    pub owner_id: Uuid,
    pub fact_type: Option<String>,
    pub page: Option<String>,
    pub quality: Option<CitationQuality>,
    pub quoted_text: Option<String>,
    pub analysis: Option<String>,
}

impl NewCitation {
    /// A bare citation of `source_id` on a person or family.
    pub fn new(source_id: Uuid, owner_type: EntityKind, owner_id: Uuid) -> Self {
        NewCitation {
            id: None,
            source_id,
            owner_type,
            owner_id,
            fact_type: None,
            page: None,
            quality: None,
            quoted_text: None,
            analysis: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateCitation {
    pub id: Uuid,
    pub version: u64,
    pub changes: CitationChanges,
}

impl<E: EventStore, R: ReadModelStore> Genealogy<E, R> {
    pub fn create_citation(
        &self,
        ctx: &CommandContext,
        input: NewCitation,
    ) -> Result<CommandResult> {
        let citation = Citation {
            id: input.id.unwrap_or_else(Uuid::new_v4),
            source_id: input.source_id,
            owner_type: input.owner_type,
            owner_id: input.owner_id,
            fact_type: input.fact_type,
            page: input.page,
            quality: input.quality,
            quoted_text: input.quoted_text,
            analysis: input.analysis,
            version: 1,
            updated_at: Utc::now(),
        };
        self.executor.create(ctx, citation)
    }

    pub fn update_citation(
        &self,
        ctx: &CommandContext,
        input: UpdateCitation,
    ) -> Result<CommandResult> {
        self.executor
            .update::<Citation>(ctx, input.id, input.version, &input.changes)
    }

    pub fn delete_citation(
        &self,
        ctx: &CommandContext,
        id: Uuid,
        version: u64,
    ) -> Result<CommandResult> {
        self.executor.delete::<Citation>(ctx, id, version)
    }
}
