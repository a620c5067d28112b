//! Database models for the event log.

use chrono::{DateTime, Utc};
use diesel::prelude::*;

use taxonomist_core::events::{EventEnvelope, TaxonomyEvent, EVENT_SCHEMA_VERSION};

use crate::errors::StorageError;

/// A stored event. `payload` is the JSON of the `TaxonomyEvent`, tag included.
#[derive(Queryable, Selectable, PartialEq, Debug, Clone)]
#[diesel(table_name = crate::schema::taxonomy_events)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct TaxonomyEventDB {
    pub aggregate_id: String,
    pub sequence: i64,
    pub event_type: String,
    pub event_version: i32,
    pub payload: String,
    pub recorded_at: String, // RFC3339
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = crate::schema::taxonomy_events)]
pub struct NewTaxonomyEventDB {
    pub aggregate_id: String,
    pub sequence: i64,
    pub event_type: String,
    pub event_version: i32,
    pub payload: String,
    pub recorded_at: String,
}

impl TryFrom<&EventEnvelope> for NewTaxonomyEventDB {
    type Error = StorageError;

    fn try_from(envelope: &EventEnvelope) -> Result<Self, Self::Error> {
        let sequence = i64::try_from(envelope.sequence).map_err(|_| {
            StorageError::SerializationError(format!(
                "sequence {} does not fit the event log",
                envelope.sequence
            ))
        })?;
        Ok(Self {
            aggregate_id: envelope.aggregate_id.clone(),
            sequence,
            event_type: envelope.event_type().to_string(),
            event_version: i32::from(envelope.event_version),
            payload: serde_json::to_string(&envelope.event)?,
            recorded_at: envelope.recorded_at.to_rfc3339(),
        })
    }
}

impl TryFrom<TaxonomyEventDB> for EventEnvelope {
    type Error = StorageError;

    /// Fails on anything this build cannot fold faithfully: a newer schema
    /// version, a payload whose tag disagrees with `event_type`, or a bad
    /// timestamp.
    fn try_from(db: TaxonomyEventDB) -> Result<Self, Self::Error> {
        let corrupt = |detail: String| {
            StorageError::SerializationError(format!(
                "event {}#{}: {}",
                db.aggregate_id, db.sequence, detail
            ))
        };

        let event_version = u16::try_from(db.event_version)
            .ok()
            .filter(|v| *v >= 1 && *v <= EVENT_SCHEMA_VERSION)
            .ok_or_else(|| corrupt(format!("unsupported event version {}", db.event_version)))?;
        let sequence =
            u64::try_from(db.sequence).map_err(|_| corrupt("negative sequence".to_string()))?;
        let event: TaxonomyEvent =
            serde_json::from_str(&db.payload).map_err(|e| corrupt(e.to_string()))?;
        if event.event_type() != db.event_type {
            return Err(corrupt(format!(
                "payload is '{}' but row says '{}'",
                event.event_type(),
                db.event_type
            )));
        }
        let recorded_at = DateTime::parse_from_rfc3339(&db.recorded_at)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| corrupt(e.to_string()))?;

        Ok(EventEnvelope {
            aggregate_id: db.aggregate_id,
            sequence,
            event_version,
            recorded_at,
            event,
        })
    }
}
