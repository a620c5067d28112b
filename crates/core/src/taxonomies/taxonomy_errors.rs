//! Taxonomy-specific error types.

use serde::Serialize;
use thiserror::Error;

/// Business-rule rejections returned by the taxonomy command handlers.
///
/// These are expected outcomes (wrong lifecycle state, duplicate id or value,
/// missing parent, orphaned children, unknown row) and never abort the process.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "detail")]
pub enum TaxonomyError {
    #[error("Create failed: {0}")]
    CreateFailed(String),

    #[error("Remove failed: {0}")]
    RemoveFailed(String),

    #[error("Publish failed: {0}")]
    PublishFailed(String),

    #[error("Incorrect {action}: {reason}")]
    IncorrectAdd { action: String, reason: String },

    #[error("Incorrect {action}: {reason}")]
    IncorrectRemove { action: String, reason: String },

    #[error("Incorrect updateRow: {0}")]
    IncorrectUpdate(String),
}

impl TaxonomyError {
    pub fn incorrect_add(action: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::IncorrectAdd {
            action: action.into(),
            reason: reason.into(),
        }
    }

    pub fn incorrect_remove(action: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::IncorrectRemove {
            action: action.into(),
            reason: reason.into(),
        }
    }

    /// Human readable reason without the variant prefix.
    pub fn reason(&self) -> &str {
        match self {
            Self::CreateFailed(reason)
            | Self::RemoveFailed(reason)
            | Self::PublishFailed(reason)
            | Self::IncorrectUpdate(reason) => reason,
            Self::IncorrectAdd { reason, .. } | Self::IncorrectRemove { reason, .. } => reason,
        }
    }
}

/// A persisted event could not be folded into state.
///
/// The command side validated the event before it was appended, so this
/// indicates a corrupted log or a logic bug. The owning aggregate instance
/// stops accepting commands once this is raised.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("taxonomy '{aggregate_id}' event #{sequence} ({event_type}): {reason}")]
pub struct ApplyError {
    pub aggregate_id: String,
    pub sequence: u64,
    pub event_type: String,
    pub reason: String,
}

impl ApplyError {
    pub fn new(
        aggregate_id: impl Into<String>,
        sequence: u64,
        event_type: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            aggregate_id: aggregate_id.into(),
            sequence,
            event_type: event_type.into(),
            reason: reason.into(),
        }
    }
}
