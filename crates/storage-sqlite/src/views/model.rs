//! Database models for persisted taxonomy views.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use diesel::prelude::*;

use taxonomist_core::projection::{TaxonomyView, ViewRow};
use taxonomist_core::taxonomies::{TaxonomyStatus, TaxonomyVersion};

use crate::errors::StorageError;

#[derive(Queryable, Identifiable, Insertable, Selectable, PartialEq, Debug, Clone)]
#[diesel(table_name = crate::schema::taxonomy_views)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct TaxonomyViewDB {
    pub id: String,
    pub dimension: String,
    pub name: String,
    pub description: Option<String>,
    pub version: String, // "major.minor"
    pub status: String,
    pub is_published: bool,
    pub next_ordinal: i64,
    pub last_sequence: i64,
    pub updated_at: String, // RFC3339
}

/// One row of a view. Collections are stored as JSON text.
#[derive(Queryable, Insertable, Selectable, PartialEq, Debug, Clone)]
#[diesel(table_name = crate::schema::taxonomy_view_rows)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct TaxonomyViewRowDB {
    pub taxonomy_id: String,
    pub row_id: String,
    pub value: String,
    pub description: Option<String>,
    pub aliases: String,
    pub keywords: String,
    pub dimension_src_hints: String,
    pub parent_id: Option<String>,
    pub children: String,
    pub ordinal: i64,
}

fn to_i64(value: u64, field: &str) -> Result<i64, StorageError> {
    i64::try_from(value)
        .map_err(|_| StorageError::SerializationError(format!("{} out of range: {}", field, value)))
}

fn to_u64(value: i64, field: &str) -> Result<u64, StorageError> {
    u64::try_from(value)
        .map_err(|_| StorageError::SerializationError(format!("{} out of range: {}", field, value)))
}

/// Splits a view into its header record and row records.
pub fn view_to_db(
    view: &TaxonomyView,
) -> Result<(TaxonomyViewDB, Vec<TaxonomyViewRowDB>), StorageError> {
    let header = TaxonomyViewDB {
        id: view.id.clone(),
        dimension: view.dimension.clone(),
        name: view.name.clone(),
        description: view.description.clone(),
        version: view.version.to_string(),
        status: view.status.as_str().to_string(),
        is_published: view.is_published,
        next_ordinal: to_i64(view.next_ordinal, "next_ordinal")?,
        last_sequence: to_i64(view.last_sequence, "last_sequence")?,
        updated_at: view.updated_at.to_rfc3339(),
    };

    let rows = view
        .rows
        .values()
        .map(|row| {
            Ok(TaxonomyViewRowDB {
                taxonomy_id: view.id.clone(),
                row_id: row.row_id.clone(),
                value: row.value.clone(),
                description: row.description.clone(),
                aliases: serde_json::to_string(&row.aliases)?,
                keywords: serde_json::to_string(&row.keywords)?,
                dimension_src_hints: serde_json::to_string(&row.dimension_src_hints)?,
                parent_id: row.parent.clone(),
                children: serde_json::to_string(&row.children)?,
                ordinal: to_i64(row.ordinal, "ordinal")?,
            })
        })
        .collect::<Result<Vec<_>, StorageError>>()?;

    Ok((header, rows))
}

/// Reassembles a view from its stored records.
pub fn view_from_db(
    header: TaxonomyViewDB,
    rows: Vec<TaxonomyViewRowDB>,
) -> Result<TaxonomyView, StorageError> {
    let invalid = |e: String| StorageError::SerializationError(format!("view {}: {}", header.id, e));

    let version = header
        .version
        .parse::<TaxonomyVersion>()
        .map_err(|e| invalid(e.to_string()))?;
    let status = header
        .status
        .parse::<TaxonomyStatus>()
        .map_err(|e| invalid(e.to_string()))?;
    let updated_at = DateTime::parse_from_rfc3339(&header.updated_at)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| invalid(e.to_string()))?;

    let mut view_rows = BTreeMap::new();
    for row in rows {
        let view_row = ViewRow {
            row_id: row.row_id.clone(),
            value: row.value,
            description: row.description,
            aliases: serde_json::from_str(&row.aliases)?,
            keywords: serde_json::from_str(&row.keywords)?,
            dimension_src_hints: serde_json::from_str(&row.dimension_src_hints)?,
            parent: row.parent_id,
            children: serde_json::from_str(&row.children)?,
            ordinal: to_u64(row.ordinal, "ordinal")?,
        };
        view_rows.insert(row.row_id, view_row);
    }

    Ok(TaxonomyView {
        next_ordinal: to_u64(header.next_ordinal, "next_ordinal")?,
        last_sequence: to_u64(header.last_sequence, "last_sequence")?,
        id: header.id,
        name: header.name,
        description: header.description,
        version,
        dimension: header.dimension,
        status,
        is_published: header.is_published,
        rows: view_rows,
        updated_at,
    })
}
