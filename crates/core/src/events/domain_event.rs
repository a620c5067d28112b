//! Taxonomy event types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::taxonomies::{Row, RowId, RowUpdate, TaxonomyVersion};

/// Schema version stamped on every stored event.
pub const EVENT_SCHEMA_VERSION: u16 = 1;

/// Facts recorded against one taxonomy instance.
///
/// Events are the only durable artifact. Both the aggregate and the read
/// projection fold them; a new variant must be handled in both places.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum TaxonomyEvent {
    #[serde(rename = "taxonomy-created")]
    TaxonomyCreated {
        name: String,
        description: Option<String>,
        dimension: String,
        version: TaxonomyVersion,
    },

    /// `is_published = false` reopens a published taxonomy for editing.
    #[serde(rename = "taxonomy-published")]
    TaxonomyPublished { is_published: bool },

    #[serde(rename = "taxonomy-taxrow-added")]
    TaxonomyTaxRowAdded { row: Row },

    /// With `is_replace`, the existing rows are cleared before insertion.
    #[serde(rename = "taxonomy-taxrows-added")]
    TaxonomyTaxRowsAdded { rows: Vec<Row>, is_replace: bool },

    #[serde(rename = "taxonomy-taxrow-removed")]
    TaxonomyTaxRowRemoved { row_id: RowId },

    #[serde(rename = "taxonomy-taxrows-removed")]
    TaxonomyTaxRowsRemoved { row_ids: Vec<RowId> },

    #[serde(rename = "taxonomy-taxrow-updated")]
    TaxonomyTaxRowUpdated { row_id: RowId, update: RowUpdate },

    #[serde(rename = "taxonomy-removed")]
    TaxonomyRemoved,
}

impl TaxonomyEvent {
    /// Wire name of the event, as stored in the log.
    pub fn event_type(&self) -> &'static str {
        match self {
            TaxonomyEvent::TaxonomyCreated { .. } => "taxonomy-created",
            TaxonomyEvent::TaxonomyPublished { .. } => "taxonomy-published",
            TaxonomyEvent::TaxonomyTaxRowAdded { .. } => "taxonomy-taxrow-added",
            TaxonomyEvent::TaxonomyTaxRowsAdded { .. } => "taxonomy-taxrows-added",
            TaxonomyEvent::TaxonomyTaxRowRemoved { .. } => "taxonomy-taxrow-removed",
            TaxonomyEvent::TaxonomyTaxRowsRemoved { .. } => "taxonomy-taxrows-removed",
            TaxonomyEvent::TaxonomyTaxRowUpdated { .. } => "taxonomy-taxrow-updated",
            TaxonomyEvent::TaxonomyRemoved => "taxonomy-removed",
        }
    }

    /// Creates a TaxonomyPublished event.
    pub fn published(is_published: bool) -> Self {
        Self::TaxonomyPublished { is_published }
    }

    /// Creates a TaxonomyTaxRowAdded event.
    pub fn row_added(row: Row) -> Self {
        Self::TaxonomyTaxRowAdded { row }
    }

    /// Creates a TaxonomyTaxRowRemoved event.
    pub fn row_removed(row_id: impl Into<RowId>) -> Self {
        Self::TaxonomyTaxRowRemoved {
            row_id: row_id.into(),
        }
    }
}

/// An event together with its position in the taxonomy's stream.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEnvelope {
    pub aggregate_id: String,
    /// 1-based, contiguous per aggregate id.
    pub sequence: u64,
    pub event_version: u16,
    pub recorded_at: DateTime<Utc>,
    pub event: TaxonomyEvent,
}

impl EventEnvelope {
    pub fn new(aggregate_id: impl Into<String>, sequence: u64, event: TaxonomyEvent) -> Self {
        Self {
            aggregate_id: aggregate_id.into(),
            sequence,
            event_version: EVENT_SCHEMA_VERSION,
            recorded_at: Utc::now(),
            event,
        }
    }

    pub fn event_type(&self) -> &'static str {
        self.event.event_type()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization_uses_wire_names() {
        let event = TaxonomyEvent::TaxonomyTaxRowsAdded {
            rows: Vec::new(),
            is_replace: true,
        };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "taxonomy-taxrows-added");
        assert_eq!(json["isReplace"], true);
        assert_eq!(json["type"], event.event_type());

        let removed = serde_json::to_string(&TaxonomyEvent::TaxonomyRemoved).unwrap();
        assert_eq!(removed, r#"{"type":"taxonomy-removed"}"#);
    }

    #[test]
    fn test_row_update_event_deserialization() {
        let json = r#"{
            "type": "taxonomy-taxrow-updated",
            "rowId": "r2",
            "update": { "value": "COGS", "description": null, "parent": null }
        }"#;

        let event: TaxonomyEvent = serde_json::from_str(json).unwrap();
        match event {
            TaxonomyEvent::TaxonomyTaxRowUpdated { row_id, update } => {
                assert_eq!(row_id, "r2");
                assert_eq!(update.value, "COGS");
                assert!(update.parent.is_none());
                assert!(update.aliases.is_empty());
            }
            _ => panic!("Expected TaxonomyTaxRowUpdated"),
        }
    }

    #[test]
    fn test_envelope_stamps_schema_version() {
        let envelope = EventEnvelope::new("D1.T1.1.0", 3, TaxonomyEvent::published(true));
        assert_eq!(envelope.event_version, EVENT_SCHEMA_VERSION);
        assert_eq!(envelope.sequence, 3);
        assert_eq!(envelope.event_type(), "taxonomy-published");
    }
}
