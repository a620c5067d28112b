//! Taxonomy aggregate: lifecycle state machine and event fold.

use log::{debug, error};

use super::row_invariants::{
    ensure_row_mutable, validate_add_row, validate_add_rows, validate_create,
    validate_remove_row, validate_remove_rows, validate_update_row, RowAction,
};
use super::{
    ApplyError, NewRow, Taxonomy, TaxonomyCommand, TaxonomyCreate, TaxonomyError, TaxonomyStatus,
};
use crate::events::{EventEnvelope, TaxonomyEvent};

/// One taxonomy instance, rebuilt from its event stream.
///
/// `handle` decides which events a command produces without touching state.
/// `apply` is the only way state changes, and it re-checks every rule the
/// handler checked, so a log that could not have been produced by `handle`
/// is caught on replay instead of being folded silently.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaxonomyAggregate {
    state: Taxonomy,
    /// Sequence number of the last applied event; 0 for a fresh stream.
    version: u64,
}

impl TaxonomyAggregate {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            state: Taxonomy::empty(id),
            version: 0,
        }
    }

    /// Replays a full stream. Any event that cannot be folded aborts the load.
    pub fn from_events<'a, I>(id: impl Into<String>, envelopes: I) -> Result<Self, ApplyError>
    where
        I: IntoIterator<Item = &'a EventEnvelope>,
    {
        let mut aggregate = Self::new(id);
        for envelope in envelopes {
            aggregate.apply(envelope)?;
        }
        debug!(
            "taxonomy={} version={} status={} rows={} replayed",
            aggregate.id(),
            aggregate.version,
            aggregate.state.status,
            aggregate.state.rows.len()
        );
        Ok(aggregate)
    }

    pub fn id(&self) -> &str {
        &self.state.id
    }

    pub fn state(&self) -> &Taxonomy {
        &self.state
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn status(&self) -> TaxonomyStatus {
        self.state.status
    }

    /// Validates `command` against current state and returns the events it
    /// produces. An empty list means the command was an accepted no-op.
    pub fn handle(&self, command: TaxonomyCommand) -> Result<Vec<TaxonomyEvent>, TaxonomyError> {
        let state = &self.state;
        match command {
            TaxonomyCommand::Create(create) => self.handle_create(create),
            TaxonomyCommand::Publish { is_published } => {
                check_publish(state.status, is_published)?;
                Ok(vec![TaxonomyEvent::published(is_published)])
            }
            TaxonomyCommand::Remove => {
                check_remove(state.status)?;
                Ok(vec![TaxonomyEvent::TaxonomyRemoved])
            }
            TaxonomyCommand::AddRow(new_row) => {
                ensure_row_mutable(state.status, RowAction::AddRow)?;
                let row = new_row.into_row();
                validate_add_row(&state.rows, &row)?;
                Ok(vec![TaxonomyEvent::row_added(row)])
            }
            TaxonomyCommand::AddRows { rows, is_replace } => {
                ensure_row_mutable(state.status, RowAction::AddRows)?;
                if rows.is_empty() && !is_replace {
                    return Ok(Vec::new());
                }
                let rows: Vec<_> = rows.into_iter().map(NewRow::into_row).collect();
                validate_add_rows(&state.rows, &rows, is_replace)?;
                Ok(vec![TaxonomyEvent::TaxonomyTaxRowsAdded { rows, is_replace }])
            }
            TaxonomyCommand::RemoveRow { row_id } => {
                ensure_row_mutable(state.status, RowAction::RemoveRow)?;
                validate_remove_row(&state.rows, &row_id)?;
                Ok(vec![TaxonomyEvent::row_removed(row_id)])
            }
            TaxonomyCommand::RemoveRows { row_ids } => {
                ensure_row_mutable(state.status, RowAction::RemoveRows)?;
                if row_ids.is_empty() {
                    return Ok(Vec::new());
                }
                validate_remove_rows(&state.rows, &row_ids)?;
                Ok(vec![TaxonomyEvent::TaxonomyTaxRowsRemoved { row_ids }])
            }
            TaxonomyCommand::UpdateRow { row_id, update } => {
                ensure_row_mutable(state.status, RowAction::UpdateRow)?;
                validate_update_row(&state.rows, &row_id, &update)?;
                Ok(vec![TaxonomyEvent::TaxonomyTaxRowUpdated { row_id, update }])
            }
        }
    }

    fn handle_create(&self, create: TaxonomyCreate) -> Result<Vec<TaxonomyEvent>, TaxonomyError> {
        validate_create(self.state.status, &create.name, &create.dimension)?;
        Ok(vec![TaxonomyEvent::TaxonomyCreated {
            name: create.name,
            description: create.description,
            dimension: create.dimension,
            version: create.version,
        }])
    }

    /// Folds one persisted event into state.
    ///
    /// The envelope must carry the next sequence number of this stream and
    /// belong to this aggregate. On error the state is left untouched.
    pub fn apply(&mut self, envelope: &EventEnvelope) -> Result<(), ApplyError> {
        let id = self.state.id.clone();
        let reject = |reason: String| {
            ApplyError::new(id.clone(), envelope.sequence, envelope.event_type(), reason)
        };

        if envelope.aggregate_id != id {
            return Err(reject(format!(
                "event belongs to taxonomy '{}'",
                envelope.aggregate_id
            )));
        }
        let expected = self.version + 1;
        if envelope.sequence != expected {
            return Err(reject(format!("expected sequence {}", expected)));
        }

        if let Err(e) = fold(&mut self.state, &envelope.event) {
            let err = reject(e.to_string());
            error!("taxonomy={} seq={} fold failed: {}", err.aggregate_id, err.sequence, e);
            return Err(err);
        }
        self.version = envelope.sequence;
        Ok(())
    }
}

/// Applies `event` to `state` after re-validating it. Validation happens
/// before any mutation, so a rejected event leaves `state` as it was.
fn fold(state: &mut Taxonomy, event: &TaxonomyEvent) -> Result<(), TaxonomyError> {
    match event {
        TaxonomyEvent::TaxonomyCreated {
            name,
            description,
            dimension,
            version,
        } => {
            validate_create(state.status, name, dimension)?;
            state.name = name.clone();
            state.description = description.clone();
            state.dimension = dimension.clone();
            state.version = *version;
            state.status = TaxonomyStatus::Initialized;
            state.rows.clear();
        }
        TaxonomyEvent::TaxonomyPublished { is_published } => {
            state.status = check_publish(state.status, *is_published)?;
        }
        TaxonomyEvent::TaxonomyTaxRowAdded { row } => {
            ensure_row_mutable(state.status, RowAction::AddRow)?;
            validate_add_row(&state.rows, row)?;
            state.rows.insert(row.row_id.clone(), row.clone());
        }
        TaxonomyEvent::TaxonomyTaxRowsAdded { rows, is_replace } => {
            ensure_row_mutable(state.status, RowAction::AddRows)?;
            validate_add_rows(&state.rows, rows, *is_replace)?;
            if *is_replace {
                state.rows.clear();
            }
            for row in rows {
                state.rows.insert(row.row_id.clone(), row.clone());
            }
        }
        TaxonomyEvent::TaxonomyTaxRowRemoved { row_id } => {
            ensure_row_mutable(state.status, RowAction::RemoveRow)?;
            validate_remove_row(&state.rows, row_id)?;
            state.rows.remove(row_id);
        }
        TaxonomyEvent::TaxonomyTaxRowsRemoved { row_ids } => {
            ensure_row_mutable(state.status, RowAction::RemoveRows)?;
            validate_remove_rows(&state.rows, row_ids)?;
            for row_id in row_ids {
                state.rows.remove(row_id);
            }
        }
        TaxonomyEvent::TaxonomyTaxRowUpdated { row_id, update } => {
            ensure_row_mutable(state.status, RowAction::UpdateRow)?;
            validate_update_row(&state.rows, row_id, update)?;
            if let Some(row) = state.rows.get_mut(row_id) {
                row.apply_update(update);
            }
        }
        TaxonomyEvent::TaxonomyRemoved => {
            check_remove(state.status)?;
            state.rows.clear();
            state.status = TaxonomyStatus::Disabled;
        }
    }
    Ok(())
}

/// Returns the status reached by publishing (`true`) or reopening (`false`).
fn check_publish(
    status: TaxonomyStatus,
    is_published: bool,
) -> Result<TaxonomyStatus, TaxonomyError> {
    let reason = match (status, is_published) {
        (TaxonomyStatus::Initialized, true) => return Ok(TaxonomyStatus::Published),
        (TaxonomyStatus::Published, false) => return Ok(TaxonomyStatus::Initialized),
        (TaxonomyStatus::Published, true) => "taxonomy is already published",
        (TaxonomyStatus::Initialized, false) => "taxonomy is not published",
        (TaxonomyStatus::Empty, _) => "taxonomy does not exist",
        (TaxonomyStatus::Disabled, _) => "taxonomy is disabled",
    };
    Err(TaxonomyError::PublishFailed(reason.to_string()))
}

fn check_remove(status: TaxonomyStatus) -> Result<(), TaxonomyError> {
    match status {
        TaxonomyStatus::Initialized => Ok(()),
        TaxonomyStatus::Empty => Err(TaxonomyError::RemoveFailed(
            "taxonomy does not exist".to_string(),
        )),
        TaxonomyStatus::Published | TaxonomyStatus::Disabled => Err(TaxonomyError::RemoveFailed(
            "cannot remove disabled or published taxonomy".to_string(),
        )),
    }
}
