//! Persisted read-model views.

mod model;
mod repository;

pub use model::{TaxonomyViewDB, TaxonomyViewRowDB};
pub use repository::TaxonomyViewRepository;
