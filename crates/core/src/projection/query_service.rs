use std::sync::Arc;

use crate::Result;

use super::{
    build_tree, TaxonomyFilter, TaxonomyNode, TaxonomyQueryServiceTrait, TaxonomyView,
    TaxonomyViewStoreTrait,
};

pub struct TaxonomyQueryService {
    view_store: Arc<dyn TaxonomyViewStoreTrait>,
}

impl TaxonomyQueryService {
    pub fn new(view_store: Arc<dyn TaxonomyViewStoreTrait>) -> Self {
        Self { view_store }
    }
}

impl TaxonomyQueryServiceTrait for TaxonomyQueryService {
    fn get_taxonomy(&self, taxonomy_id: &str) -> Result<Option<TaxonomyView>> {
        self.view_store.get_view(taxonomy_id)
    }

    fn find_by_dimension_and_name(
        &self,
        dimension: &str,
        name: &str,
    ) -> Result<Vec<TaxonomyView>> {
        self.view_store
            .find_views(&TaxonomyFilter::by_dimension_and_name(dimension, name))
    }

    fn find_published(&self, dimension: &str, name: &str) -> Result<Vec<TaxonomyView>> {
        self.view_store
            .find_views(&TaxonomyFilter::by_dimension_and_name(dimension, name).published())
    }

    fn get_tree(&self, taxonomy_id: &str) -> Result<Option<Vec<TaxonomyNode>>> {
        Ok(self
            .view_store
            .get_view(taxonomy_id)?
            .map(|view| build_tree(&view)))
    }
}
