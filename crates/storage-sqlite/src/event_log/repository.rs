use async_trait::async_trait;
use diesel::prelude::*;
use diesel::SqliteConnection;
use log::{debug, error};
use std::sync::Arc;

use taxonomist_core::errors::{DatabaseError, Error, Result};
use taxonomist_core::events::{EventEnvelope, TaxonomyEvent};
use taxonomist_core::taxonomies::TaxonomyEventLogTrait;

use super::model::{NewTaxonomyEventDB, TaxonomyEventDB};
use crate::db::{get_connection, DbPool, WriteHandle};
use crate::errors::StorageError;
use crate::schema::taxonomy_events;

/// SQLite-backed event log. Reads use the pool; appends go through the
/// single writer so the version check and the insert share one transaction.
pub struct SqliteEventLog {
    pool: Arc<DbPool>,
    writer: WriteHandle,
}

impl SqliteEventLog {
    pub fn new(pool: Arc<DbPool>, writer: WriteHandle) -> Self {
        Self { pool, writer }
    }

    fn load(&self, aggregate_id: &str, after_sequence: u64) -> Result<Vec<EventEnvelope>> {
        let after = i64::try_from(after_sequence).unwrap_or(i64::MAX);
        let mut conn = get_connection(&self.pool)?;
        let rows = taxonomy_events::table
            .filter(taxonomy_events::aggregate_id.eq(aggregate_id))
            .filter(taxonomy_events::sequence.gt(after))
            .order(taxonomy_events::sequence.asc())
            .select(TaxonomyEventDB::as_select())
            .load::<TaxonomyEventDB>(&mut conn)
            .map_err(StorageError::from)?;

        rows.into_iter()
            .map(|row| {
                EventEnvelope::try_from(row).map_err(|e| {
                    error!("taxonomy={} unreadable event: {}", aggregate_id, e);
                    Error::from(e)
                })
            })
            .collect()
    }
}

fn stream_version(conn: &mut SqliteConnection, aggregate_id: &str) -> Result<u64> {
    let max: Option<i64> = taxonomy_events::table
        .filter(taxonomy_events::aggregate_id.eq(aggregate_id))
        .select(diesel::dsl::max(taxonomy_events::sequence))
        .first::<Option<i64>>(conn)
        .map_err(StorageError::from)?;
    Ok(max.map_or(0, |v| v.max(0) as u64))
}

#[async_trait]
impl TaxonomyEventLogTrait for SqliteEventLog {
    async fn append(
        &self,
        aggregate_id: &str,
        expected_version: u64,
        events: Vec<TaxonomyEvent>,
    ) -> Result<Vec<EventEnvelope>> {
        let aggregate_id = aggregate_id.to_string();
        self.writer
            .exec(move |conn| -> Result<Vec<EventEnvelope>> {
                let actual = stream_version(conn, &aggregate_id)?;
                if actual != expected_version {
                    return Err(DatabaseError::Conflict {
                        aggregate_id,
                        expected: expected_version,
                        actual,
                    }
                    .into());
                }

                let envelopes: Vec<EventEnvelope> = events
                    .into_iter()
                    .enumerate()
                    .map(|(i, event)| {
                        EventEnvelope::new(aggregate_id.as_str(), actual + 1 + i as u64, event)
                    })
                    .collect();
                let rows = envelopes
                    .iter()
                    .map(NewTaxonomyEventDB::try_from)
                    .collect::<std::result::Result<Vec<_>, StorageError>>()?;

                diesel::insert_into(taxonomy_events::table)
                    .values(&rows)
                    .execute(conn)
                    .map_err(StorageError::from)?;

                debug!(
                    "taxonomy={} appended seq {}..={}",
                    aggregate_id,
                    actual + 1,
                    actual + envelopes.len() as u64
                );
                Ok(envelopes)
            })
            .await
    }

    fn load_events(&self, aggregate_id: &str) -> Result<Vec<EventEnvelope>> {
        self.load(aggregate_id, 0)
    }

    fn load_events_after(
        &self,
        aggregate_id: &str,
        after_sequence: u64,
    ) -> Result<Vec<EventEnvelope>> {
        self.load(aggregate_id, after_sequence)
    }

    fn current_version(&self, aggregate_id: &str) -> Result<u64> {
        let mut conn = get_connection(&self.pool)?;
        stream_version(&mut conn, aggregate_id)
    }
}
