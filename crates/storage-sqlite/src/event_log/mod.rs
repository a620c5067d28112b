//! Append-only taxonomy event log.

mod model;
mod repository;

pub use model::{NewTaxonomyEventDB, TaxonomyEventDB};
pub use repository::SqliteEventLog;
