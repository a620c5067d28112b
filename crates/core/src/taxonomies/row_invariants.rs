//! Row-set integrity rules shared by the aggregate's command handlers and its fold.
//!
//! All checks are pure and run against an in-memory row set through the
//! [`RowLookup`] seam, so the same rules validate a command before its event
//! is emitted and re-check the event when it is applied.
//!
//! # Invariants
//! - Rows form a forest: at most one parent each, parents exist when referenced.
//! - `row_id` and `value` are unique within a taxonomy (case-sensitive).
//! - A row with at least one child cannot be removed.
//! - Row mutations are accepted only while the taxonomy is initialized.

use std::collections::{HashMap, HashSet};

use super::{Row, RowId, RowUpdate, TaxonomyError, TaxonomyStatus};

/// Read access to a row set, as needed by the integrity rules.
pub trait RowLookup {
    fn contains_row(&self, row_id: &str) -> bool;

    /// Id of the row currently holding `value`, if any.
    fn row_id_for_value(&self, value: &str) -> Option<&str>;

    /// Parent of `row_id`; `None` for roots and unknown rows.
    fn parent_of(&self, row_id: &str) -> Option<&str>;

    fn child_ids(&self, row_id: &str) -> Vec<&str>;

    fn has_children(&self, row_id: &str) -> bool {
        !self.child_ids(row_id).is_empty()
    }
}

impl RowLookup for HashMap<RowId, Row> {
    fn contains_row(&self, row_id: &str) -> bool {
        self.contains_key(row_id)
    }

    fn row_id_for_value(&self, value: &str) -> Option<&str> {
        self.values()
            .find(|row| row.value == value)
            .map(|row| row.row_id.as_str())
    }

    fn parent_of(&self, row_id: &str) -> Option<&str> {
        self.get(row_id).and_then(|row| row.parent.as_deref())
    }

    fn child_ids(&self, row_id: &str) -> Vec<&str> {
        self.values()
            .filter(|row| row.parent.as_deref() == Some(row_id))
            .map(|row| row.row_id.as_str())
            .collect()
    }
}

/// Row-set operation names, as reported in rejections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowAction {
    AddRow,
    AddRows,
    RemoveRow,
    RemoveRows,
    UpdateRow,
}

impl RowAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            RowAction::AddRow => "addRow",
            RowAction::AddRows => "addRows",
            RowAction::RemoveRow => "removeRow",
            RowAction::RemoveRows => "removeRows",
            RowAction::UpdateRow => "updateRow",
        }
    }

    fn reject(&self, reason: impl Into<String>) -> TaxonomyError {
        match self {
            RowAction::AddRow | RowAction::AddRows => {
                TaxonomyError::incorrect_add(self.as_str(), reason)
            }
            RowAction::RemoveRow | RowAction::RemoveRows => {
                TaxonomyError::incorrect_remove(self.as_str(), reason)
            }
            RowAction::UpdateRow => TaxonomyError::IncorrectUpdate(reason.into()),
        }
    }
}

/// Rejects row mutations unless the taxonomy is initialized.
pub fn ensure_row_mutable(status: TaxonomyStatus, action: RowAction) -> Result<(), TaxonomyError> {
    let reason = match status {
        TaxonomyStatus::Initialized => return Ok(()),
        TaxonomyStatus::Empty => "taxonomy does not exist",
        TaxonomyStatus::Published => "taxonomy is published",
        TaxonomyStatus::Disabled => "taxonomy is disabled",
    };
    Err(action.reject(reason))
}

/// Creation is legal only for an id nothing has happened to yet.
pub fn validate_create(
    status: TaxonomyStatus,
    name: &str,
    dimension: &str,
) -> Result<(), TaxonomyError> {
    let reason = match status {
        TaxonomyStatus::Empty => {
            if name.trim().is_empty() {
                "taxonomy name must not be empty"
            } else if dimension.trim().is_empty() {
                "taxonomy dimension must not be empty"
            } else {
                return Ok(());
            }
        }
        TaxonomyStatus::Initialized | TaxonomyStatus::Published => "taxonomy already exists",
        TaxonomyStatus::Disabled => "taxonomy has been removed",
    };
    Err(TaxonomyError::CreateFailed(reason.to_string()))
}

/// Validates a single row about to be inserted.
pub fn validate_add_row<L: RowLookup + ?Sized>(rows: &L, row: &Row) -> Result<(), TaxonomyError> {
    check_new_row(rows, row).map_err(|reason| RowAction::AddRow.reject(reason))
}

/// Validates a batch insert, in order.
///
/// Each row is checked against the rows accepted earlier in the same batch,
/// plus the existing rows unless `is_replace` clears them first. Earlier rows
/// may therefore parent later ones, and duplicates inside the batch are
/// rejected. Any failure rejects the whole batch.
pub fn validate_add_rows<L: RowLookup + ?Sized>(
    rows: &L,
    batch: &[Row],
    is_replace: bool,
) -> Result<(), TaxonomyError> {
    let base: Option<&L> = if is_replace { None } else { Some(rows) };
    let mut staged = StagedRows::new(base, batch.len());
    for (index, row) in batch.iter().enumerate() {
        check_new_row(&staged, row).map_err(|reason| {
            RowAction::AddRows.reject(format!("row #{} ('{}'): {}", index, row.row_id, reason))
        })?;
        staged.stage(row);
    }
    Ok(())
}

/// Validates removal of one row.
pub fn validate_remove_row<L: RowLookup + ?Sized>(
    rows: &L,
    row_id: &str,
) -> Result<(), TaxonomyError> {
    let action = RowAction::RemoveRow;
    if !rows.contains_row(row_id) {
        return Err(action.reject(format!("row '{}' not found", row_id)));
    }
    if rows.has_children(row_id) {
        return Err(action.reject(format!(
            "row '{}' is a parent of other rows and cannot be removed",
            row_id
        )));
    }
    Ok(())
}

/// Validates removal of several rows at once.
///
/// Every id must resolve first; then no removed row may keep a child that is
/// not removed by the same batch.
pub fn validate_remove_rows<L: RowLookup + ?Sized>(
    rows: &L,
    row_ids: &[RowId],
) -> Result<(), TaxonomyError> {
    let action = RowAction::RemoveRows;
    let mut removing: HashSet<&str> = HashSet::with_capacity(row_ids.len());
    for row_id in row_ids {
        if !rows.contains_row(row_id) {
            return Err(action.reject(format!("row '{}' not found", row_id)));
        }
        if !removing.insert(row_id.as_str()) {
            return Err(action.reject(format!("row '{}' is listed more than once", row_id)));
        }
    }

    for row_id in row_ids {
        if let Some(child) = rows
            .child_ids(row_id)
            .into_iter()
            .find(|child| !removing.contains(child))
        {
            return Err(action.reject(format!(
                "row '{}' is a parent of row '{}' which is not being removed",
                row_id, child
            )));
        }
    }
    Ok(())
}

/// Validates a wholesale update of `row_id`.
///
/// The new value may equal the row's own value. A parent change must point at
/// an existing row other than the row itself and outside its subtree.
pub fn validate_update_row<L: RowLookup + ?Sized>(
    rows: &L,
    row_id: &str,
    update: &RowUpdate,
) -> Result<(), TaxonomyError> {
    let action = RowAction::UpdateRow;
    if !rows.contains_row(row_id) {
        return Err(action.reject(format!("row '{}' not found", row_id)));
    }
    if update.value.trim().is_empty() {
        return Err(action.reject("row value must not be empty"));
    }
    if let Some(owner) = rows.row_id_for_value(&update.value) {
        if owner != row_id {
            return Err(action.reject(format!(
                "value '{}' is already used by row '{}'",
                update.value, owner
            )));
        }
    }

    let current_parent = rows.parent_of(row_id);
    if let Some(new_parent) = update.parent.as_deref() {
        if current_parent != Some(new_parent) {
            if new_parent == row_id {
                return Err(action.reject(format!("row '{}' cannot be its own parent", row_id)));
            }
            if !rows.contains_row(new_parent) {
                return Err(action.reject(format!("parent row '{}' not found", new_parent)));
            }
            if is_descendant(rows, new_parent, row_id) {
                return Err(action.reject(format!(
                    "moving row '{}' under its descendant '{}' would create a cycle",
                    row_id, new_parent
                )));
            }
        }
    }
    Ok(())
}

/// Whether `candidate` sits somewhere below `ancestor`.
pub fn is_descendant<L: RowLookup + ?Sized>(rows: &L, candidate: &str, ancestor: &str) -> bool {
    let mut visited: HashSet<&str> = HashSet::new();
    let mut current = rows.parent_of(candidate);
    while let Some(parent) = current {
        if parent == ancestor {
            return true;
        }
        if !visited.insert(parent) {
            return false;
        }
        current = rows.parent_of(parent);
    }
    false
}

fn check_new_row<L: RowLookup + ?Sized>(rows: &L, row: &Row) -> Result<(), String> {
    if row.row_id.trim().is_empty() {
        return Err("row id must not be empty".to_string());
    }
    if row.value.trim().is_empty() {
        return Err("row value must not be empty".to_string());
    }
    if rows.contains_row(&row.row_id) {
        return Err(format!("row '{}' already exists", row.row_id));
    }
    if let Some(owner) = rows.row_id_for_value(&row.value) {
        return Err(format!(
            "value '{}' is already used by row '{}'",
            row.value, owner
        ));
    }
    if let Some(parent) = row.parent.as_deref() {
        if parent == row.row_id {
            return Err(format!("row '{}' cannot be its own parent", row.row_id));
        }
        if !rows.contains_row(parent) {
            return Err(format!("parent row '{}' not found", parent));
        }
    }
    Ok(())
}

/// Existing rows overlaid with the rows accepted so far from one batch.
///
/// Staged rows are indexed by id, value and parent so each check stays
/// constant-time regardless of batch size.
struct StagedRows<'a, L: RowLookup + ?Sized> {
    base: Option<&'a L>,
    by_id: HashMap<&'a str, &'a Row>,
    by_value: HashMap<&'a str, &'a str>,
    children: HashMap<&'a str, Vec<&'a str>>,
}

impl<'a, L: RowLookup + ?Sized> StagedRows<'a, L> {
    fn new(base: Option<&'a L>, capacity: usize) -> Self {
        Self {
            base,
            by_id: HashMap::with_capacity(capacity),
            by_value: HashMap::with_capacity(capacity),
            children: HashMap::new(),
        }
    }

    fn stage(&mut self, row: &'a Row) {
        self.by_id.insert(row.row_id.as_str(), row);
        self.by_value.insert(row.value.as_str(), row.row_id.as_str());
        if let Some(parent) = row.parent.as_deref() {
            self.children
                .entry(parent)
                .or_default()
                .push(row.row_id.as_str());
        }
    }
}

impl<L: RowLookup + ?Sized> RowLookup for StagedRows<'_, L> {
    fn contains_row(&self, row_id: &str) -> bool {
        self.by_id.contains_key(row_id) || self.base.is_some_and(|base| base.contains_row(row_id))
    }

    fn row_id_for_value(&self, value: &str) -> Option<&str> {
        self.by_value
            .get(value)
            .copied()
            .or_else(|| self.base.and_then(|base| base.row_id_for_value(value)))
    }

    fn parent_of(&self, row_id: &str) -> Option<&str> {
        match self.by_id.get(row_id) {
            Some(row) => row.parent.as_deref(),
            None => self.base.and_then(|base| base.parent_of(row_id)),
        }
    }

    fn child_ids(&self, row_id: &str) -> Vec<&str> {
        let mut children: Vec<&str> = self
            .base
            .map(|base| base.child_ids(row_id))
            .unwrap_or_default();
        if let Some(staged) = self.children.get(row_id) {
            children.extend(staged.iter().copied());
        }
        children
    }
}
