//! Pure fold of taxonomy events into the read model.

use log::debug;

use super::{ProjectionError, TaxonomyView, ViewRow};
use crate::events::{EventEnvelope, TaxonomyEvent};
use crate::taxonomies::{
    ensure_row_mutable, validate_add_row, validate_add_rows, validate_create, validate_remove_row,
    validate_remove_rows, validate_update_row, Row, RowAction, TaxonomyStatus,
};

/// Result of offering one envelope to a view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FoldOutcome {
    /// The event was the next in sequence; this is the new view.
    Applied(TaxonomyView),
    /// Already folded. Redelivery is expected from an at-least-once feed.
    Duplicate,
    /// Events between the view and this envelope are missing.
    Gap { expected: u64, received: u64 },
}

/// Read-side fold. Keeps its own row arena and children cache, and checks
/// each event against that state rather than trusting the command side.
pub struct TaxonomyProjection;

impl TaxonomyProjection {
    /// Folds `envelope` into a copy of `current`.
    ///
    /// `current` is left untouched; on error nothing is produced, so a batch
    /// event either applies completely or not at all.
    pub fn apply(
        current: Option<&TaxonomyView>,
        envelope: &EventEnvelope,
    ) -> Result<FoldOutcome, ProjectionError> {
        let last_sequence = current.map_or(0, |view| view.last_sequence);
        if envelope.sequence <= last_sequence {
            return Ok(FoldOutcome::Duplicate);
        }
        if envelope.sequence > last_sequence + 1 {
            return Ok(FoldOutcome::Gap {
                expected: last_sequence + 1,
                received: envelope.sequence,
            });
        }

        let mut view = match current {
            Some(view) => view.clone(),
            None => TaxonomyView::new(envelope.aggregate_id.clone(), envelope.recorded_at),
        };
        if view.id != envelope.aggregate_id {
            return Err(ProjectionError::diverged(
                envelope.aggregate_id.clone(),
                envelope.sequence,
                format!("envelope offered to view '{}'", view.id),
            ));
        }

        fold_view(&mut view, &envelope.event).map_err(|reason| {
            ProjectionError::diverged(view.id.clone(), envelope.sequence, reason)
        })?;
        view.last_sequence = envelope.sequence;
        view.updated_at = envelope.recorded_at;

        debug!(
            "taxonomy={} seq={} event={} folded into view",
            view.id,
            envelope.sequence,
            envelope.event_type()
        );
        Ok(FoldOutcome::Applied(view))
    }
}

fn fold_view(view: &mut TaxonomyView, event: &TaxonomyEvent) -> Result<(), String> {
    match event {
        TaxonomyEvent::TaxonomyCreated {
            name,
            description,
            dimension,
            version,
        } => {
            validate_create(view.status, name, dimension).map_err(|e| e.to_string())?;
            view.name = name.clone();
            view.description = description.clone();
            view.dimension = dimension.clone();
            view.version = *version;
            view.status = TaxonomyStatus::Initialized;
            view.is_published = false;
        }
        TaxonomyEvent::TaxonomyPublished { is_published } => {
            view.status = match (view.status, *is_published) {
                (TaxonomyStatus::Initialized, true) => TaxonomyStatus::Published,
                (TaxonomyStatus::Published, false) => TaxonomyStatus::Initialized,
                (status, flag) => {
                    return Err(format!("cannot apply publish({}) while {}", flag, status))
                }
            };
            view.is_published = *is_published;
        }
        TaxonomyEvent::TaxonomyTaxRowAdded { row } => {
            ensure_row_mutable(view.status, RowAction::AddRow).map_err(|e| e.to_string())?;
            validate_add_row(&view.rows, row).map_err(|e| e.to_string())?;
            insert_row(view, row);
        }
        TaxonomyEvent::TaxonomyTaxRowsAdded { rows, is_replace } => {
            ensure_row_mutable(view.status, RowAction::AddRows).map_err(|e| e.to_string())?;
            validate_add_rows(&view.rows, rows, *is_replace).map_err(|e| e.to_string())?;
            if *is_replace {
                view.rows.clear();
            }
            for row in rows {
                insert_row(view, row);
            }
        }
        TaxonomyEvent::TaxonomyTaxRowRemoved { row_id } => {
            ensure_row_mutable(view.status, RowAction::RemoveRow).map_err(|e| e.to_string())?;
            validate_remove_row(&view.rows, row_id).map_err(|e| e.to_string())?;
            remove_row(view, row_id);
        }
        TaxonomyEvent::TaxonomyTaxRowsRemoved { row_ids } => {
            ensure_row_mutable(view.status, RowAction::RemoveRows).map_err(|e| e.to_string())?;
            validate_remove_rows(&view.rows, row_ids).map_err(|e| e.to_string())?;
            for row_id in row_ids {
                remove_row(view, row_id);
            }
        }
        TaxonomyEvent::TaxonomyTaxRowUpdated { row_id, update } => {
            ensure_row_mutable(view.status, RowAction::UpdateRow).map_err(|e| e.to_string())?;
            validate_update_row(&view.rows, row_id, update).map_err(|e| e.to_string())?;
            let Some(row) = view.rows.get_mut(row_id) else {
                return Err(format!("row '{}' vanished during update", row_id));
            };
            let old_parent = row.parent.clone();
            row.value = update.value.clone();
            row.description = update.description.clone();
            row.aliases = update.aliases.clone();
            row.keywords = update.keywords.clone();
            row.dimension_src_hints = update.dimension_src_hints.clone();
            row.parent = update.parent.clone();
            if old_parent != update.parent {
                if let Some(old_parent) = old_parent {
                    view.detach_child(&old_parent, row_id);
                }
                if let Some(new_parent) = update.parent.as_deref() {
                    view.attach_child(new_parent, row_id);
                }
            }
        }
        TaxonomyEvent::TaxonomyRemoved => {
            if view.status != TaxonomyStatus::Initialized {
                return Err(format!("cannot apply removal while {}", view.status));
            }
            view.rows.clear();
            view.status = TaxonomyStatus::Disabled;
            view.is_published = false;
        }
    }
    Ok(())
}

/// Inserts a validated row and attaches it under its parent.
fn insert_row(view: &mut TaxonomyView, row: &Row) {
    let ordinal = view.next_ordinal;
    view.next_ordinal += 1;
    view.rows
        .insert(row.row_id.clone(), ViewRow::from_row(row, ordinal));
    if let Some(parent) = row.parent.as_deref() {
        view.attach_child(parent, &row.row_id);
    }
}

/// Deletes a row and detaches it from its parent, if the parent remains.
fn remove_row(view: &mut TaxonomyView, row_id: &str) {
    if let Some(removed) = view.rows.remove(row_id) {
        if let Some(parent) = removed.parent.as_deref() {
            view.detach_child(parent, row_id);
        }
    }
}
