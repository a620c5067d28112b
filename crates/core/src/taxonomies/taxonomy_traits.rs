//! Traits for the taxonomy event log and command service.

use async_trait::async_trait;

use crate::events::{EventEnvelope, TaxonomyEvent};
use crate::Result;

use super::{CommandReceipt, NewRow, RowId, RowUpdate, Taxonomy, TaxonomyCommand, TaxonomyCreate};

/// Append-only per-taxonomy event stream.
///
/// Implementations guarantee atomic append: either every event of a call is
/// stored with contiguous sequence numbers, or none is.
#[async_trait]
pub trait TaxonomyEventLogTrait: Send + Sync {
    /// Appends `events` after `expected_version`. Returns the stored envelopes.
    ///
    /// Fails with `DatabaseError::Conflict` when the stream has moved past
    /// `expected_version`.
    async fn append(
        &self,
        aggregate_id: &str,
        expected_version: u64,
        events: Vec<TaxonomyEvent>,
    ) -> Result<Vec<EventEnvelope>>;

    /// Full stream for `aggregate_id`, ordered by sequence.
    fn load_events(&self, aggregate_id: &str) -> Result<Vec<EventEnvelope>>;

    /// Events with a sequence strictly greater than `after_sequence`.
    fn load_events_after(&self, aggregate_id: &str, after_sequence: u64)
        -> Result<Vec<EventEnvelope>>;

    /// Sequence of the last stored event, 0 for an unknown id.
    fn current_version(&self, aggregate_id: &str) -> Result<u64>;
}

/// Command gateway for taxonomy aggregates.
#[async_trait]
pub trait TaxonomyServiceTrait: Send + Sync {
    async fn execute(&self, taxonomy_id: &str, command: TaxonomyCommand) -> Result<CommandReceipt>;

    async fn create_taxonomy(
        &self,
        taxonomy_id: &str,
        create: TaxonomyCreate,
    ) -> Result<CommandReceipt>;
    async fn publish_taxonomy(&self, taxonomy_id: &str, is_published: bool)
        -> Result<CommandReceipt>;
    async fn remove_taxonomy(&self, taxonomy_id: &str) -> Result<CommandReceipt>;

    async fn add_row(&self, taxonomy_id: &str, row: NewRow) -> Result<CommandReceipt>;
    async fn add_rows(
        &self,
        taxonomy_id: &str,
        rows: Vec<NewRow>,
        is_replace: bool,
    ) -> Result<CommandReceipt>;
    async fn remove_row(&self, taxonomy_id: &str, row_id: &str) -> Result<CommandReceipt>;
    async fn remove_rows(&self, taxonomy_id: &str, row_ids: Vec<RowId>) -> Result<CommandReceipt>;
    async fn update_row(
        &self,
        taxonomy_id: &str,
        row_id: &str,
        update: RowUpdate,
    ) -> Result<CommandReceipt>;

    /// Current command-side state; `None` when nothing was ever created.
    async fn get_taxonomy(&self, taxonomy_id: &str) -> Result<Option<Taxonomy>>;
}
