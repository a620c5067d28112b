//! Commands accepted by the taxonomy aggregate.

use serde::{Deserialize, Serialize};

use super::{NewRow, RowId, RowUpdate, TaxonomyCreate};
use crate::events::EventEnvelope;

/// Every operation a gateway can issue against one taxonomy instance.
///
/// Commands are transient: they are validated against current state and
/// either rejected or turned into events. Only events are persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum TaxonomyCommand {
    Create(TaxonomyCreate),
    Publish { is_published: bool },
    Remove,
    AddRow(NewRow),
    AddRows { rows: Vec<NewRow>, is_replace: bool },
    RemoveRow { row_id: RowId },
    RemoveRows { row_ids: Vec<RowId> },
    UpdateRow { row_id: RowId, update: RowUpdate },
}

impl TaxonomyCommand {
    /// Operation name used in logs and rejection messages.
    pub fn name(&self) -> &'static str {
        match self {
            TaxonomyCommand::Create(_) => "create",
            TaxonomyCommand::Publish { .. } => "publish",
            TaxonomyCommand::Remove => "remove",
            TaxonomyCommand::AddRow(_) => "addRow",
            TaxonomyCommand::AddRows { .. } => "addRows",
            TaxonomyCommand::RemoveRow { .. } => "removeRow",
            TaxonomyCommand::RemoveRows { .. } => "removeRows",
            TaxonomyCommand::UpdateRow { .. } => "updateRow",
        }
    }
}

/// Acknowledgement returned once a command's events are durably appended.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandReceipt {
    pub taxonomy_id: String,
    /// Stream version after the command (sequence of the last event).
    pub version: u64,
    /// Empty when the command was accepted as a no-op.
    pub events: Vec<EventEnvelope>,
}
