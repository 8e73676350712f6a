#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Backend adapters for fetching police datasets from remote services.
//!
//! Each backend technology ([`csv_file`], [`geojson`], [`socrata`],
//! [`arcgis`]) implements the [`DataBackend`] trait, translating the shared
//! fetch/filter/enumerate contract into its native query language. Callers
//! select an implementation through a [`BackendRegistry`] keyed by
//! [`BackendType`] rather than branching on the backend themselves.

pub mod arcgis;
pub mod csv_file;
pub mod geojson;
pub mod parsing;
pub mod socrata;

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use police_data_catalog_models::{BackendType, YearSpec};

/// Errors that can occur during backend operations.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV parsing failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The response body did not have the expected shape.
    #[error("Parse error: {message}")]
    Parse {
        /// Description of what went wrong.
        message: String,
    },

    /// The operation cannot be implemented for this backend technology.
    #[error("{backend} backend does not support {operation}")]
    Unsupported {
        /// The backend that refused the operation.
        backend: BackendType,
        /// The refused operation.
        operation: String,
    },
}

/// A uniform tabular result: ordered column names plus one JSON object per
/// row, keyed by column name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordSet {
    /// Column names in their original order.
    pub columns: Vec<String>,
    /// One JSON object per row.
    pub records: Vec<serde_json::Value>,
}

impl RecordSet {
    /// Creates a record set with an explicit column order.
    #[must_use]
    pub const fn new(columns: Vec<String>, records: Vec<serde_json::Value>) -> Self {
        Self { columns, records }
    }

    /// Creates a record set from JSON records, deriving the column order
    /// from first appearance across the records.
    #[must_use]
    pub fn from_records(records: Vec<serde_json::Value>) -> Self {
        let mut columns: Vec<String> = Vec::new();
        for record in &records {
            if let Some(object) = record.as_object() {
                for key in object.keys() {
                    if !columns.iter().any(|c| c == key) {
                        columns.push(key.clone());
                    }
                }
            }
        }
        Self { columns, records }
    }

    /// Returns the number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns `true` if the record set holds no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Location of one dataset at a backend.
#[derive(Debug, Clone, Copy)]
pub struct DatasetRef<'a> {
    /// URL (or host, for Socrata) the dataset is served from.
    pub url: &'a str,
    /// Backend-specific dataset identifier, when the backend needs one.
    pub dataset_id: Option<&'a str>,
}

/// An equality filter on one field, translated by each backend into its
/// native filter syntax (or applied row-wise for flat files).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldFilter {
    /// Field to filter on.
    pub field: String,
    /// Value the field must equal.
    pub value: String,
}

/// Contract every backend technology must satisfy.
///
/// Implementations translate these operations into their native query
/// language. Operations a technology cannot express return
/// [`BackendError::Unsupported`].
#[async_trait]
pub trait DataBackend: Send + Sync {
    /// The backend type this implementation serves.
    fn backend_type(&self) -> BackendType;

    /// Fetches rows, optionally filtered by year (via `date_field`) and by
    /// an equality filter on one field.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError`] if the request or response parsing fails.
    async fn fetch_filtered(
        &self,
        dataset: &DatasetRef<'_>,
        date_field: Option<&str>,
        year: Option<&YearSpec>,
        field_filter: Option<&FieldFilter>,
        limit: Option<u64>,
    ) -> Result<RecordSet, BackendError>;

    /// Fetches every row of the dataset, up to `limit`.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError`] if the request or response parsing fails.
    async fn fetch_all(
        &self,
        dataset: &DatasetRef<'_>,
        limit: Option<u64>,
    ) -> Result<RecordSet, BackendError> {
        self.fetch_filtered(dataset, None, None, None, limit).await
    }

    /// Enumerates the distinct years present in the dataset's date column.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Unsupported`] for backends that would have to
    /// read the entire dataset to answer.
    async fn enumerate_years(
        &self,
        dataset: &DatasetRef<'_>,
        date_field: &str,
    ) -> Result<BTreeSet<i32>, BackendError>;

    /// Enumerates the distinct values of `select_field`, optionally scoped
    /// to a year and to values containing `partial`.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Unsupported`] for backends without a
    /// distinct-values query.
    async fn enumerate_distinct(
        &self,
        dataset: &DatasetRef<'_>,
        select_field: &str,
        date_field: Option<&str>,
        year: Option<&YearSpec>,
        partial: Option<&str>,
    ) -> Result<BTreeSet<String>, BackendError>;
}

/// Registry of backend implementations keyed by [`BackendType`].
///
/// The default registry wires up the four concrete backends; tests swap in
/// mocks by registering over them.
pub struct BackendRegistry {
    backends: HashMap<BackendType, Box<dyn DataBackend>>,
}

impl BackendRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            backends: HashMap::new(),
        }
    }

    /// Registers a backend under its own [`BackendType`], replacing any
    /// previous registration for that type.
    pub fn register(&mut self, backend: Box<dyn DataBackend>) {
        self.backends.insert(backend.backend_type(), backend);
    }

    /// Looks up the backend registered for `backend_type`.
    #[must_use]
    pub fn get(&self, backend_type: BackendType) -> Option<&dyn DataBackend> {
        self.backends.get(&backend_type).map(|backend| &**backend)
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(csv_file::CsvBackend::new()));
        registry.register(Box::new(geojson::GeoJsonBackend::new()));
        registry.register(Box::new(socrata::SocrataBackend::new()));
        registry.register(Box::new(arcgis::ArcGisBackend::new()));
        registry
    }
}
