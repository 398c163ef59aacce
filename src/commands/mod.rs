//! Command inputs and outputs.
//!
//! Each submodule adds the commands of one aggregate kind to
//! [`Genealogy`](crate::Genealogy). Every command validates against the read
//! model, builds its events and commits them through the executor.

mod citation;
mod family;
mod life_event;
mod media;
mod ordinance;
mod person;
mod source;

pub use citation::{NewCitation, UpdateCitation};
pub use family::{LinkChild, NewFamily, UpdateFamily};
pub use life_event::{NewLifeEvent, UpdateLifeEvent};
pub use media::{NewMedia, UpdateMedia};
pub use ordinance::{NewLdsOrdinance, UpdateLdsOrdinance};
pub use person::{AddName, NewPerson, UpdateName, UpdatePerson};
pub use source::{NewSource, UpdateSource};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Cross-cutting metadata passed alongside a command.
///
/// Carries the audit trail without polluting command inputs or domain
/// events. `actor` becomes [`Event::actor`](crate::Event::actor);
/// `correlation_id` and `metadata` are merged into
/// [`Event::meta`](crate::Event::meta).
///
/// # Examples
///
/// ```
/// use kinfold::CommandContext;
/// use serde_json::json;
///
/// let ctx = CommandContext::default()
///     .with_actor("user-42")
///     .with_correlation_id("req-abc-123")
///     .with_metadata(json!({"source": "api"}));
///
/// assert_eq!(ctx.actor.as_deref(), Some("user-42"));
/// assert_eq!(ctx.correlation_id.as_deref(), Some("req-abc-123"));
/// assert!(ctx.metadata.is_some());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommandContext {
    /// Identity of the user issuing the command.
    pub actor: Option<String>,
    /// Correlation ID for tracing a request across aggregates.
    pub correlation_id: Option<String>,
    /// Arbitrary metadata forwarded into the event's `meta` object.
    pub metadata: Option<Value>,
}

impl CommandContext {
    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    /// Set arbitrary metadata. Only JSON objects are forwarded.
    pub fn with_metadata(mut self, meta: Value) -> Self {
        self.metadata = Some(meta);
        self
    }
}

/// Outcome of a successful command: the aggregate and its new version.
///
/// The version is the optimistic-lock token for the next command on the
/// same aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResult {
    pub id: Uuid,
    pub version: u64,
}
