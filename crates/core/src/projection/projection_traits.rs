//! Traits for the read-model store and query service.

use async_trait::async_trait;

use crate::Result;

use super::{TaxonomyFilter, TaxonomyNode, TaxonomyView};

/// Query store backing the read projection.
#[async_trait]
pub trait TaxonomyViewStoreTrait: Send + Sync {
    fn get_view(&self, taxonomy_id: &str) -> Result<Option<TaxonomyView>>;
    fn find_views(&self, filter: &TaxonomyFilter) -> Result<Vec<TaxonomyView>>;
    /// Replaces the stored view, rows included.
    async fn upsert_view(&self, view: TaxonomyView) -> Result<()>;
    async fn delete_view(&self, taxonomy_id: &str) -> Result<usize>;
}

/// Read-side queries. Results may lag behind accepted commands.
pub trait TaxonomyQueryServiceTrait: Send + Sync {
    fn get_taxonomy(&self, taxonomy_id: &str) -> Result<Option<TaxonomyView>>;
    fn find_by_dimension_and_name(&self, dimension: &str, name: &str)
        -> Result<Vec<TaxonomyView>>;
    fn find_published(&self, dimension: &str, name: &str) -> Result<Vec<TaxonomyView>>;
    fn get_tree(&self, taxonomy_id: &str) -> Result<Option<Vec<TaxonomyNode>>>;
}
