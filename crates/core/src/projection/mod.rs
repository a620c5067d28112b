//! Taxonomy read projection.
//!
//! Independently folds the same event stream as the aggregate into a
//! denormalized view with cached children lists, and serves point lookups,
//! filtered scans, and nested trees from it. The view may lag behind the
//! command side.

mod projection_errors;
mod projection_model;
mod projection_traits;
mod projection_worker;
mod query_service;
mod taxonomy_projection;
mod tree;


#[cfg(test)]
mod taxonomy_projection_tests;

pub use projection_errors::ProjectionError;
pub use projection_model::{TaxonomyFilter, TaxonomyNode, TaxonomyView, ViewRow};
pub use projection_traits::{TaxonomyQueryServiceTrait, TaxonomyViewStoreTrait};
pub use projection_worker::{
    run_projection_worker, start_projection_worker, ProjectionHealth, ProjectionWorker,
};
pub use query_service::TaxonomyQueryService;
pub use taxonomy_projection::{FoldOutcome, TaxonomyProjection};
pub use tree::build_tree;
