//! Domain models for taxonomies.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::ValidationError;

/// Stable identifier of a row inside one taxonomy. Never reused.
pub type RowId = String;

/// A `major.minor` version pair. A new version is a new aggregate instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaxonomyVersion {
    pub major: u32,
    pub minor: u32,
}

impl TaxonomyVersion {
    pub fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }
}

impl Default for TaxonomyVersion {
    fn default() -> Self {
        Self { major: 1, minor: 0 }
    }
}

impl fmt::Display for TaxonomyVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl FromStr for TaxonomyVersion {
    type Err = ValidationError;

    /// Parses a version string in the format `major.minor`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ValidationError::InvalidInput(format!("Invalid version string: {}", s));
        let (major, minor) = s.split_once('.').ok_or_else(invalid)?;
        let major = major.trim().parse::<u32>().map_err(|_| invalid())?;
        let minor = minor.trim().parse::<u32>().map_err(|_| invalid())?;
        Ok(Self { major, minor })
    }
}

/// Canonical taxonomy identity: `<dimension>.<name>.<major>.<minor>`.
///
/// Gateways use it to derive aggregate ids; the aggregate itself treats its
/// id as an opaque string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TaxonomyId {
    pub dimension: String,
    pub name: String,
    pub version: TaxonomyVersion,
}

impl TaxonomyId {
    pub fn new(
        dimension: impl Into<String>,
        name: impl Into<String>,
        version: TaxonomyVersion,
    ) -> Result<Self, ValidationError> {
        let dimension = dimension.into();
        let name = name.into();
        for (field, value) in [("dimension", &dimension), ("name", &name)] {
            if value.trim().is_empty() {
                return Err(ValidationError::MissingField(field.to_string()));
            }
            if value.contains('.') {
                return Err(ValidationError::InvalidInput(format!(
                    "Taxonomy {} '{}' must not contain '.'",
                    field, value
                )));
            }
        }
        Ok(Self {
            dimension,
            name,
            version,
        })
    }
}

impl fmt::Display for TaxonomyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.dimension, self.name, self.version)
    }
}

impl FromStr for TaxonomyId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('.').collect();
        if parts.len() != 4 {
            return Err(ValidationError::InvalidInput(format!(
                "Invalid taxonomy id: {}",
                s
            )));
        }
        let version = format!("{}.{}", parts[2], parts[3]).parse::<TaxonomyVersion>()?;
        Self::new(parts[0], parts[1], version)
    }
}

/// Lifecycle state of a taxonomy aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaxonomyStatus {
    /// No taxonomy has been created for this id yet.
    #[default]
    Empty,
    /// Created; rows are mutable.
    Initialized,
    /// Rows are frozen until the taxonomy is reopened.
    Published,
    /// Removed. Terminal for this instance.
    Disabled,
}

impl TaxonomyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaxonomyStatus::Empty => "EMPTY",
            TaxonomyStatus::Initialized => "INITIALIZED",
            TaxonomyStatus::Published => "PUBLISHED",
            TaxonomyStatus::Disabled => "DISABLED",
        }
    }

    /// Row-set mutations are accepted only while initialized.
    pub fn is_row_mutable(&self) -> bool {
        matches!(self, TaxonomyStatus::Initialized)
    }
}

impl fmt::Display for TaxonomyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaxonomyStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "EMPTY" => Ok(TaxonomyStatus::Empty),
            "INITIALIZED" => Ok(TaxonomyStatus::Initialized),
            "PUBLISHED" => Ok(TaxonomyStatus::Published),
            "DISABLED" => Ok(TaxonomyStatus::Disabled),
            other => Err(ValidationError::InvalidInput(format!(
                "Unknown taxonomy status: {}",
                other
            ))),
        }
    }
}

/// A node of the classification tree, as held by the aggregate.
///
/// `children` is derived from parent pointers and is not stored here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Row {
    pub row_id: RowId,
    pub value: String,
    pub description: Option<String>,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    /// External dimension name -> source column names. Opaque to the engine.
    #[serde(default)]
    pub dimension_src_hints: BTreeMap<String, Vec<String>>,
    pub parent: Option<RowId>,
}

impl Row {
    /// Replaces every mutable field with the values from `update`.
    pub fn apply_update(&mut self, update: &RowUpdate) {
        self.value = update.value.clone();
        self.description = update.description.clone();
        self.aliases = update.aliases.clone();
        self.keywords = update.keywords.clone();
        self.dimension_src_hints = update.dimension_src_hints.clone();
        self.parent = update.parent.clone();
    }
}

/// Data for adding a row. `row_id` is assigned by the aggregate when absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRow {
    pub row_id: Option<RowId>,
    pub value: String,
    pub description: Option<String>,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub dimension_src_hints: BTreeMap<String, Vec<String>>,
    pub parent: Option<RowId>,
}

impl NewRow {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            ..Default::default()
        }
    }

    pub fn with_id(mut self, row_id: impl Into<RowId>) -> Self {
        self.row_id = Some(row_id.into());
        self
    }

    pub fn with_parent(mut self, parent: impl Into<RowId>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Converts into a `Row`, generating a UUID v4 id when none was supplied.
    pub fn into_row(self) -> Row {
        Row {
            row_id: self.row_id.unwrap_or_else(|| Uuid::new_v4().to_string()),
            value: self.value,
            description: self.description,
            aliases: self.aliases,
            keywords: self.keywords,
            dimension_src_hints: self.dimension_src_hints,
            parent: self.parent,
        }
    }
}

/// Wholesale replacement of a row's mutable fields. `row_id` never changes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RowUpdate {
    pub value: String,
    pub description: Option<String>,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub dimension_src_hints: BTreeMap<String, Vec<String>>,
    pub parent: Option<RowId>,
}

impl From<&Row> for RowUpdate {
    fn from(row: &Row) -> Self {
        Self {
            value: row.value.clone(),
            description: row.description.clone(),
            aliases: row.aliases.clone(),
            keywords: row.keywords.clone(),
            dimension_src_hints: row.dimension_src_hints.clone(),
            parent: row.parent.clone(),
        }
    }
}

/// Data for creating a taxonomy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxonomyCreate {
    pub name: String,
    pub description: Option<String>,
    pub dimension: String,
    #[serde(default)]
    pub version: TaxonomyVersion,
}

impl TaxonomyCreate {
    pub fn new(name: impl Into<String>, dimension: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            dimension: dimension.into(),
            version: TaxonomyVersion::default(),
        }
    }

    /// The canonical id a gateway would route this creation to.
    pub fn derived_id(&self) -> Result<TaxonomyId, ValidationError> {
        TaxonomyId::new(self.dimension.clone(), self.name.clone(), self.version)
    }
}

/// Current state of a taxonomy aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Taxonomy {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub version: TaxonomyVersion,
    pub dimension: String,
    pub status: TaxonomyStatus,
    pub rows: HashMap<RowId, Row>,
}

impl Taxonomy {
    /// State of an id for which nothing has happened yet.
    pub fn empty(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            description: None,
            version: TaxonomyVersion::default(),
            dimension: String::new(),
            status: TaxonomyStatus::Empty,
            rows: HashMap::new(),
        }
    }

    pub fn row(&self, row_id: &str) -> Option<&Row> {
        self.rows.get(row_id)
    }

    /// Derives the child ids of `row_id` from parent pointers, sorted by id.
    pub fn children_of(&self, row_id: &str) -> Vec<RowId> {
        let mut children: Vec<RowId> = self
            .rows
            .values()
            .filter(|row| row.parent.as_deref() == Some(row_id))
            .map(|row| row.row_id.clone())
            .collect();
        children.sort();
        children
    }
}
