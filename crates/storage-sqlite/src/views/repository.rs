use async_trait::async_trait;
use diesel::prelude::*;
use diesel::SqliteConnection;
use std::collections::HashMap;
use std::sync::Arc;

use taxonomist_core::projection::{TaxonomyFilter, TaxonomyView, TaxonomyViewStoreTrait};
use taxonomist_core::taxonomies::TaxonomyStatus;
use taxonomist_core::{Error, Result};

use super::model::{view_from_db, view_to_db, TaxonomyViewDB, TaxonomyViewRowDB};
use crate::db::{get_connection, DbPool, WriteHandle};
use crate::errors::StorageError;
use crate::schema::{taxonomy_view_rows, taxonomy_views};

// Keeps multi-row inserts under SQLite's bound-parameter limit.
const ROW_INSERT_CHUNK: usize = 500;

pub struct TaxonomyViewRepository {
    pool: Arc<DbPool>,
    writer: WriteHandle,
}

impl TaxonomyViewRepository {
    pub fn new(pool: Arc<DbPool>, writer: WriteHandle) -> Self {
        Self { pool, writer }
    }

    fn load_rows(
        conn: &mut SqliteConnection,
        ids: &[String],
    ) -> Result<HashMap<String, Vec<TaxonomyViewRowDB>>> {
        let rows = taxonomy_view_rows::table
            .filter(taxonomy_view_rows::taxonomy_id.eq_any(ids))
            .order((
                taxonomy_view_rows::taxonomy_id.asc(),
                taxonomy_view_rows::ordinal.asc(),
            ))
            .select(TaxonomyViewRowDB::as_select())
            .load::<TaxonomyViewRowDB>(conn)
            .map_err(StorageError::from)?;

        let mut grouped: HashMap<String, Vec<TaxonomyViewRowDB>> = HashMap::new();
        for row in rows {
            grouped.entry(row.taxonomy_id.clone()).or_default().push(row);
        }
        Ok(grouped)
    }
}

fn delete_view_records(conn: &mut SqliteConnection, id: &str) -> Result<usize> {
    diesel::delete(taxonomy_view_rows::table.filter(taxonomy_view_rows::taxonomy_id.eq(id)))
        .execute(conn)
        .map_err(StorageError::from)?;
    Ok(diesel::delete(taxonomy_views::table.find(id))
        .execute(conn)
        .map_err(StorageError::from)?)
}

#[async_trait]
impl TaxonomyViewStoreTrait for TaxonomyViewRepository {
    fn get_view(&self, taxonomy_id: &str) -> Result<Option<TaxonomyView>> {
        let mut conn = get_connection(&self.pool)?;
        let header = taxonomy_views::table
            .find(taxonomy_id)
            .select(TaxonomyViewDB::as_select())
            .first::<TaxonomyViewDB>(&mut conn)
            .optional()
            .map_err(StorageError::from)?;

        let Some(header) = header else {
            return Ok(None);
        };
        let rows = Self::load_rows(&mut conn, &[header.id.clone()])?
            .remove(&header.id)
            .unwrap_or_default();
        Ok(Some(view_from_db(header, rows)?))
    }

    fn find_views(&self, filter: &TaxonomyFilter) -> Result<Vec<TaxonomyView>> {
        let mut conn = get_connection(&self.pool)?;

        let mut query = taxonomy_views::table
            .filter(taxonomy_views::status.ne_all([
                TaxonomyStatus::Empty.as_str(),
                TaxonomyStatus::Disabled.as_str(),
            ]))
            .order(taxonomy_views::id.asc())
            .select(TaxonomyViewDB::as_select())
            .into_boxed();

        if let Some(dimension) = &filter.dimension {
            query = query.filter(taxonomy_views::dimension.eq(dimension.clone()));
        }
        if let Some(name) = &filter.name {
            query = query.filter(taxonomy_views::name.eq(name.clone()));
        }
        if filter.published_only {
            query = query.filter(taxonomy_views::is_published.eq(true));
        }

        let headers = query
            .load::<TaxonomyViewDB>(&mut conn)
            .map_err(StorageError::from)?;
        if headers.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<String> = headers.iter().map(|h| h.id.clone()).collect();
        let mut rows = Self::load_rows(&mut conn, &ids)?;
        headers
            .into_iter()
            .map(|header| {
                let view_rows = rows.remove(&header.id).unwrap_or_default();
                view_from_db(header, view_rows).map_err(Error::from)
            })
            .collect()
    }

    async fn upsert_view(&self, view: TaxonomyView) -> Result<()> {
        let (header, rows) = view_to_db(&view)?;
        self.writer
            .exec(move |conn| -> Result<()> {
                delete_view_records(conn, &header.id)?;
                diesel::insert_into(taxonomy_views::table)
                    .values(&header)
                    .execute(conn)
                    .map_err(StorageError::from)?;
                for chunk in rows.chunks(ROW_INSERT_CHUNK) {
                    diesel::insert_into(taxonomy_view_rows::table)
                        .values(chunk)
                        .execute(conn)
                        .map_err(StorageError::from)?;
                }
                Ok(())
            })
            .await
    }

    async fn delete_view(&self, taxonomy_id: &str) -> Result<usize> {
        let id = taxonomy_id.to_string();
        self.writer
            .exec(move |conn| -> Result<usize> { delete_view_records(conn, &id) })
            .await
    }
}
