//! Taxonomies module - aggregate, commands, invariants, and service.
//!
//! A taxonomy is a named, versioned classification tree owned by a
//! dimension. Its rows form a forest and are editable only while the
//! taxonomy is initialized.

mod row_invariants;
mod taxonomy_aggregate;
mod taxonomy_commands;
mod taxonomy_errors;
mod taxonomy_model;
mod taxonomy_service;
mod taxonomy_traits;



#[cfg(test)]
mod taxonomy_service_tests;

pub use row_invariants::{
    ensure_row_mutable, is_descendant, validate_add_row, validate_add_rows, validate_create,
    validate_remove_row, validate_remove_rows, validate_update_row, RowAction, RowLookup,
};
pub use taxonomy_aggregate::TaxonomyAggregate;
pub use taxonomy_commands::{CommandReceipt, TaxonomyCommand};
pub use taxonomy_errors::{ApplyError, TaxonomyError};
pub use taxonomy_model::{
    NewRow, Row, RowId, RowUpdate, Taxonomy, TaxonomyCreate, TaxonomyId, TaxonomyStatus,
    TaxonomyVersion,
};
pub use taxonomy_service::TaxonomyService;
pub use taxonomy_traits::{TaxonomyEventLogTrait, TaxonomyServiceTrait};
