//! Read-model types for taxonomies.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::taxonomies::{Row, RowId, RowLookup, TaxonomyStatus, TaxonomyVersion};

/// A row as stored by the read model, with its children cached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewRow {
    pub row_id: RowId,
    pub value: String,
    pub description: Option<String>,
    pub aliases: Vec<String>,
    pub keywords: Vec<String>,
    pub dimension_src_hints: BTreeMap<String, Vec<String>>,
    pub parent: Option<RowId>,
    /// Ids of rows whose parent is this row, ordered by ordinal.
    pub children: Vec<RowId>,
    /// Position in which the row entered the view. Never reused.
    pub ordinal: u64,
}

impl ViewRow {
    pub fn from_row(row: &Row, ordinal: u64) -> Self {
        Self {
            row_id: row.row_id.clone(),
            value: row.value.clone(),
            description: row.description.clone(),
            aliases: row.aliases.clone(),
            keywords: row.keywords.clone(),
            dimension_src_hints: row.dimension_src_hints.clone(),
            parent: row.parent.clone(),
            children: Vec::new(),
            ordinal,
        }
    }

    /// Flattened `(dimension, source column)` pairs, in dimension order.
    pub fn source_hint_pairs(&self) -> Vec<(&str, &str)> {
        self.dimension_src_hints
            .iter()
            .flat_map(|(dimension, columns)| {
                columns
                    .iter()
                    .map(move |column| (dimension.as_str(), column.as_str()))
            })
            .collect()
    }
}

/// Denormalized, queryable state of one taxonomy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxonomyView {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub version: TaxonomyVersion,
    pub dimension: String,
    pub status: TaxonomyStatus,
    pub is_published: bool,
    pub rows: BTreeMap<RowId, ViewRow>,
    /// Ordinal handed to the next inserted row.
    pub next_ordinal: u64,
    /// Sequence of the last folded event; 0 before the first one.
    pub last_sequence: u64,
    pub updated_at: DateTime<Utc>,
}

impl TaxonomyView {
    pub fn new(id: impl Into<String>, updated_at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            description: None,
            version: TaxonomyVersion::default(),
            dimension: String::new(),
            status: TaxonomyStatus::Empty,
            is_published: false,
            rows: BTreeMap::new(),
            next_ordinal: 0,
            last_sequence: 0,
            updated_at,
        }
    }

    pub fn row(&self, row_id: &str) -> Option<&ViewRow> {
        self.rows.get(row_id)
    }

    /// Verifies that every parent reference resolves and that each cached
    /// children list equals the inversion of the parent pointers.
    pub fn check_links(&self) -> Result<(), String> {
        let mut expected: HashMap<&str, Vec<&ViewRow>> = HashMap::new();
        for row in self.rows.values() {
            if let Some(parent) = row.parent.as_deref() {
                if !self.rows.contains_key(parent) {
                    return Err(format!(
                        "row '{}' references missing parent '{}'",
                        row.row_id, parent
                    ));
                }
                expected.entry(parent).or_default().push(row);
            }
        }

        for row in self.rows.values() {
            let mut children: Vec<&ViewRow> =
                expected.remove(row.row_id.as_str()).unwrap_or_default();
            children.sort_by_key(|child| child.ordinal);
            let children: Vec<&str> = children.iter().map(|c| c.row_id.as_str()).collect();
            if row.children != children {
                return Err(format!(
                    "row '{}' caches children {:?} but parent pointers give {:?}",
                    row.row_id, row.children, children
                ));
            }
        }
        Ok(())
    }

    /// Places `child_id` among the cached children of `parent_id`, by ordinal.
    pub(crate) fn attach_child(&mut self, parent_id: &str, child_id: &str) {
        let Some(ordinal) = self.rows.get(child_id).map(|row| row.ordinal) else {
            return;
        };
        let Some(parent) = self.rows.get(parent_id) else {
            return;
        };
        let position = parent.children.partition_point(|sibling| {
            self.rows
                .get(sibling)
                .map_or(true, |sibling| sibling.ordinal < ordinal)
        });
        if let Some(parent) = self.rows.get_mut(parent_id) {
            parent.children.insert(position, child_id.to_string());
        }
    }

    pub(crate) fn detach_child(&mut self, parent_id: &str, child_id: &str) {
        if let Some(parent) = self.rows.get_mut(parent_id) {
            parent.children.retain(|child| child != child_id);
        }
    }
}

impl RowLookup for BTreeMap<RowId, ViewRow> {
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

    /// Answered from the cached lists, not from parent pointers.
    fn child_ids(&self, row_id: &str) -> Vec<&str> {
        self.get(row_id)
            .map(|row| row.children.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }
}

/// A row rendered with its subtree, for presentation.
///
/// Building and dropping a node are iterative. The derived `Clone`,
/// `PartialEq`, `Debug` and `Serialize` impls still recurse once per level,
/// so callers walking arbitrarily deep trees should iterate `children`
/// themselves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxonomyNode {
    pub row_id: RowId,
    pub value: String,
    pub description: Option<String>,
    pub aliases: Vec<String>,
    pub keywords: Vec<String>,
    pub dimension_src_hints: BTreeMap<String, Vec<String>>,
    pub children: Vec<TaxonomyNode>,
}

impl Drop for TaxonomyNode {
    fn drop(&mut self) {
        // Detach descendants first so each one drops with no children left.
        let mut pending = std::mem::take(&mut self.children);
        while let Some(mut node) = pending.pop() {
            pending.append(&mut node.children);
        }
    }
}

/// Predicate for scans over stored views.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaxonomyFilter {
    pub dimension: Option<String>,
    pub name: Option<String>,
    pub published_only: bool,
}

impl TaxonomyFilter {
    pub fn by_dimension_and_name(dimension: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            dimension: Some(dimension.into()),
            name: Some(name.into()),
            published_only: false,
        }
    }

    pub fn published(mut self) -> Self {
        self.published_only = true;
        self
    }

    /// Removed and never-created taxonomies never match a scan.
    pub fn matches(&self, view: &TaxonomyView) -> bool {
        if matches!(view.status, TaxonomyStatus::Empty | TaxonomyStatus::Disabled) {
            return false;
        }
        if self.published_only && !view.is_published {
            return false;
        }
        self.dimension.as_ref().map_or(true, |d| *d == view.dimension)
            && self.name.as_ref().map_or(true, |n| *n == view.name)
    }
}
