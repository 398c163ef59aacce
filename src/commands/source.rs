use super::{CommandContext, CommandResult};
use crate::error::{Error, Result};
use crate::genealogy::Genealogy;
use crate::model::{Source, SourceChanges};
use crate::read_model::ReadModelStore;
use crate::store::EventStore;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewSource {
    pub id: Option<Uuid>,
    pub title: String,
    pub author: Option<String>,
    pub publisher: Option<String>,
    pub publish_date: Option<String>,
    pub url: Option<String>,
    pub repository_name: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateSource {
    pub id: Uuid,
    pub version: u64,
    pub changes: SourceChanges,
}

impl<E: EventStore, R: ReadModelStore> Genealogy<E, R> {
    pub fn create_source(&self, ctx: &CommandContext, input: NewSource) -> Result<CommandResult> {
        let source = Source {
            id: input.id.unwrap_or_else(Uuid::new_v4),
            title: input.title,
            author: input.author,
            publisher: input.publisher,
            publish_date: input.publish_date,
            url: input.url,
            repository_name: input.repository_name,
            notes: input.notes,
            version: 1,
            updated_at: Utc::now(),
        };
        self.executor.create(ctx, source)
    }

    pub fn update_source(&self, ctx: &CommandContext, input: UpdateSource) -> Result<CommandResult> {
        self.executor
            .update::<Source>(ctx, input.id, input.version, &input.changes)
    }

    /// Delete a source that no citation points into.
    pub fn delete_source(
        &self,
        ctx: &CommandContext,
        id: Uuid,
        version: u64,
    ) -> Result<CommandResult> {
        self.executor.check(|tables| {
            let cited = tables
                .citations
                .values()
                .filter(|c| c.source_id == id)
                .count();
            if cited > 0 {
                return Err(Error::validation(format!(
                    "source {id} is still cited by {cited} citation(s)"
                )));
            }
            Ok(())
        })?;
        self.executor.delete::<Source>(ctx, id, version)
    }
}
