#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Source facade: dataset resolution, loading, and export.
//!
//! A [`Source`] owns the catalog subset belonging to one originating
//! source and resolves partial criteria (table type, year, agency) down to
//! exactly one [`Descriptor`]. Multi-year and multi-agency rows are expanded
//! through backend queries; fetched rows pass through the
//! [`date_check`] sanitizer before they reach the caller as a [`Table`].

pub mod date_check;
pub mod table;

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use police_data_backend::{BackendError, BackendRegistry, DataBackend, DatasetRef, FieldFilter};
use police_data_catalog::Catalog;
use police_data_catalog_models::{Agency, BackendType, Descriptor, TableType, YearSpec};

pub use date_check::{DateError, sanitize};
pub use table::{Table, csv_filename};

/// Errors that can occur while resolving or loading datasets.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// A catalog row is missing a field the requested operation needs, or
    /// no backend is registered for its backend type.
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the missing configuration.
        message: String,
    },

    /// Zero descriptors satisfy the query.
    #[error("{message}")]
    NoMatch {
        /// Description of the query that found nothing.
        message: String,
    },

    /// More than one descriptor satisfies a query that must be unique.
    #[error("{message}")]
    Ambiguous {
        /// Description of the ambiguous query.
        message: String,
    },

    /// Export was requested on a table whose load was deferred and never
    /// fulfilled.
    #[error("There is no table to save to CSV")]
    NoRecords,

    /// A backend operation failed.
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// The fetched date column is corrupted.
    #[error(transparent)]
    Date(#[from] DateError),

    /// I/O error reading a local export.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV error reading or writing a local export.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// A handle for exploring one data source and loading its datasets.
pub struct Source {
    descriptors: Vec<Descriptor>,
    backends: BackendRegistry,
    limit: Option<u64>,
}

impl Source {
    /// Creates a source bound to `source_name` (and optionally `state`,
    /// needed when the name is not unique across states), using the default
    /// backend registry.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::NoMatch`] when the catalog has no descriptors
    /// for the source, or [`SourceError::Ambiguous`] when the matching
    /// descriptors span more than one state.
    pub fn new(catalog: &Catalog, source_name: &str, state: Option<&str>) -> Result<Self, SourceError> {
        Self::with_backends(catalog, source_name, state, BackendRegistry::default())
    }

    /// Creates a source with an explicit backend registry.
    ///
    /// # Errors
    ///
    /// Same conditions as [`Source::new`].
    pub fn with_backends(
        catalog: &Catalog,
        source_name: &str,
        state: Option<&str>,
        backends: BackendRegistry,
    ) -> Result<Self, SourceError> {
        let descriptors = catalog.query(Some(source_name), state);
        if descriptors.is_empty() {
            return Err(SourceError::NoMatch {
                message: format!("No sources found for {source_name}"),
            });
        }

        let states: BTreeSet<&str> = descriptors.iter().map(|d| d.state.as_str()).collect();
        if states.len() > 1 {
            return Err(SourceError::Ambiguous {
                message: format!("Not all {source_name} sources are from the same state"),
            });
        }

        Ok(Self {
            descriptors,
            backends,
            limit: None,
        })
    }

    /// Caps the number of records fetched per load. Set at construction
    /// time; resolution itself is stateless.
    #[must_use]
    pub const fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Returns the descriptors owned by this source.
    #[must_use]
    pub fn descriptors(&self) -> &[Descriptor] {
        &self.descriptors
    }

    /// Returns the distinct table types available from this source, in
    /// canonical order.
    #[must_use]
    pub fn table_types(&self) -> Vec<TableType> {
        let types: BTreeSet<TableType> = self.descriptors.iter().map(|d| d.table_type).collect();
        types.into_iter().collect()
    }

    /// Returns the years available for this source's datasets, ascending and
    /// deduplicated. Multi-year rows are expanded by querying their backend
    /// for the distinct years in the date column.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Configuration`] when a multi-year row has no
    /// date field, or a backend error from the year enumeration.
    pub async fn years(&self, table_type: Option<TableType>) -> Result<Vec<i32>, SourceError> {
        let mut years: BTreeSet<i32> = BTreeSet::new();

        for descriptor in self.filtered(table_type) {
            match &descriptor.year {
                YearSpec::Exact(year) => {
                    years.insert(*year);
                }
                YearSpec::Range(start, end) => {
                    years.extend(*start..=*end);
                }
                YearSpec::Multi => {
                    let date_field =
                        descriptor
                            .date_field
                            .as_deref()
                            .ok_or_else(|| SourceError::Configuration {
                                message: format!(
                                    "No date field is provided to identify the years of {}",
                                    descriptor.id
                                ),
                            })?;
                    let backend = self.backend_for(descriptor)?;
                    years.extend(
                        backend
                            .enumerate_years(&dataset_ref(descriptor), date_field)
                            .await?,
                    );
                }
                YearSpec::NotApplicable => {}
            }
        }

        Ok(years.into_iter().collect())
    }

    /// Returns the agencies available for the dataset selected by
    /// `table_type` and `year`. The combination must select exactly one
    /// descriptor. Multi-agency rows are expanded with a distinct-values
    /// query on the agency field, optionally scoped to `year` and to names
    /// containing `partial_name`. Order is backend-defined.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Ambiguous`] when the criteria select zero or
    /// several descriptors, [`SourceError::Configuration`] when the row has
    /// no agency field, or the backend's error when it cannot enumerate
    /// distinct values.
    pub async fn agencies(
        &self,
        table_type: Option<TableType>,
        year: Option<&YearSpec>,
        partial_name: Option<&str>,
    ) -> Result<Vec<String>, SourceError> {
        let candidates: Vec<&Descriptor> = self
            .filtered(table_type)
            .filter(|d| year.is_none_or(|y| d.year == *y))
            .collect();

        if candidates.len() != 1 {
            return Err(SourceError::Ambiguous {
                message: format!(
                    "table type and year must select a single dataset, found {}",
                    candidates.len()
                ),
            });
        }
        let descriptor = candidates[0];

        match &descriptor.agency {
            Agency::Named(name) => Ok(vec![name.clone()]),
            Agency::Multi => {
                let agency_field =
                    descriptor
                        .agency_field
                        .as_deref()
                        .ok_or_else(|| SourceError::Configuration {
                            message: format!(
                                "No agency field is provided to identify the agencies of {}",
                                descriptor.id
                            ),
                        })?;
                let year_scope =
                    year.filter(|y| matches!(y, YearSpec::Exact(_) | YearSpec::Range(_, _)));
                let backend = self.backend_for(descriptor)?;
                let agencies = backend
                    .enumerate_distinct(
                        &dataset_ref(descriptor),
                        agency_field,
                        descriptor.date_field.as_deref(),
                        year_scope,
                        partial_name,
                    )
                    .await?;
                Ok(agencies.into_iter().collect())
            }
        }
    }

    /// Resolves partial criteria down to exactly one descriptor and
    /// optionally loads its data.
    ///
    /// `year` identifies the dataset when it matches a row's own year;
    /// otherwise, against a multi-year row, it becomes a post-fetch filter
    /// passed to the backend. An exact-year row always beats an overlapping
    /// multi-year row.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::NoMatch`] / [`SourceError::Ambiguous`] when
    /// the criteria select zero or several descriptors,
    /// [`SourceError::Configuration`] for an unregistered backend type, and
    /// backend or date-sanitation errors when loading.
    pub async fn resolve(
        &self,
        year: &YearSpec,
        table_type: Option<TableType>,
        agency_filter: Option<&str>,
        load_data: bool,
    ) -> Result<Table, SourceError> {
        let subset: Vec<&Descriptor> = self.filtered(table_type).collect();

        let matching: Vec<&Descriptor> = subset
            .iter()
            .copied()
            .filter(|d| literal_year_match(&d.year, year))
            .collect();

        let filter_by_year = matching.is_empty();
        let candidates: Vec<&Descriptor> = if filter_by_year {
            subset
                .into_iter()
                .filter(|d| d.year == YearSpec::Multi)
                .collect()
        } else {
            matching
        };

        let type_label = table_type.map_or_else(|| "any".to_owned(), |t| t.to_string());
        if candidates.is_empty() {
            return Err(SourceError::NoMatch {
                message: format!(
                    "There are no sources matching table type {type_label} and year {year}"
                ),
            });
        }
        if candidates.len() > 1 {
            return Err(SourceError::Ambiguous {
                message: format!(
                    "There is more than one source matching table type {type_label} and year {year}"
                ),
            });
        }
        let descriptor = candidates[0];

        let year_filter: Option<&YearSpec> = if filter_by_year {
            match year {
                YearSpec::Exact(_) | YearSpec::Range(_, _) => Some(year),
                YearSpec::Multi | YearSpec::NotApplicable => None,
            }
        } else {
            None
        };

        // The resolved table records the effective filter values, so a
        // multi-year row filtered to 2020 reads as year 2020, not MULTI.
        let table_year = if descriptor.date_field.is_some() {
            year_filter.cloned()
        } else {
            None
        };

        // Agency filtering at the source is skipped for ArcGIS feature
        // services; callers post-filter the returned rows.
        let field_filter = match (agency_filter, descriptor.agency_field.as_deref()) {
            (Some(value), Some(field)) if descriptor.backend != BackendType::ArcGis => {
                Some(FieldFilter {
                    field: field.to_owned(),
                    value: value.to_owned(),
                })
            }
            _ => None,
        };
        let table_agency = field_filter.as_ref().map(|f| f.value.clone());

        let records = if load_data {
            let backend = self.backend_for(descriptor)?;
            let dataset = dataset_ref(descriptor);
            let fetched = if year_filter.is_none() && field_filter.is_none() {
                backend.fetch_all(&dataset, self.limit).await?
            } else {
                backend
                    .fetch_filtered(
                        &dataset,
                        descriptor.date_field.as_deref(),
                        year_filter,
                        field_filter.as_ref(),
                        self.limit,
                    )
                    .await?
            };
            Some(date_check::sanitize(
                fetched,
                descriptor.date_field.as_deref(),
            )?)
        } else {
            None
        };

        Ok(Table::new(
            descriptor.clone(),
            records,
            table_year,
            table_agency.as_deref(),
        ))
    }

    /// Resolves and loads a dataset from its remote backend.
    ///
    /// # Errors
    ///
    /// Same conditions as [`Source::resolve`].
    pub async fn load_from_remote(
        &self,
        year: &YearSpec,
        table_type: Option<TableType>,
        agency_filter: Option<&str>,
    ) -> Result<Table, SourceError> {
        self.resolve(year, table_type, agency_filter, true).await
    }

    /// Resolves a dataset and loads its rows from a previously exported
    /// CSV file in `directory` (current directory when `None`), then
    /// sanitizes the date column.
    ///
    /// # Errors
    ///
    /// Resolution errors as in [`Source::resolve`], plus I/O/CSV errors
    /// reading the export and date-sanitation errors.
    pub async fn load_from_local_export(
        &self,
        year: &YearSpec,
        directory: Option<&Path>,
        table_type: Option<TableType>,
        agency_filter: Option<&str>,
    ) -> Result<Table, SourceError> {
        let mut resolved = self.resolve(year, table_type, agency_filter, false).await?;

        let filename = resolved.export_filename();
        let path = directory.map_or_else(|| PathBuf::from(&filename), |dir| dir.join(&filename));

        let records = table::read_csv_export(&path)?;
        let records = date_check::sanitize(records, resolved.date_field.as_deref())?;
        resolved.attach_records(records);

        Ok(resolved)
    }

    /// Resolves a dataset and returns the canonical export path without
    /// reading or writing any data.
    ///
    /// # Errors
    ///
    /// Resolution errors as in [`Source::resolve`].
    pub async fn export_filename(
        &self,
        year: &YearSpec,
        directory: Option<&Path>,
        table_type: Option<TableType>,
        agency_filter: Option<&str>,
    ) -> Result<PathBuf, SourceError> {
        let resolved = self.resolve(year, table_type, agency_filter, false).await?;
        let filename = resolved.export_filename();
        Ok(directory.map_or_else(|| PathBuf::from(&filename), |dir| dir.join(&filename)))
    }

    fn filtered(&self, table_type: Option<TableType>) -> impl Iterator<Item = &Descriptor> {
        self.descriptors
            .iter()
            .filter(move |d| table_type.is_none_or(|t| d.table_type == t))
    }

    fn backend_for(&self, descriptor: &Descriptor) -> Result<&dyn DataBackend, SourceError> {
        self.backends
            .get(descriptor.backend)
            .ok_or_else(|| SourceError::Configuration {
                message: format!("No backend registered for type {}", descriptor.backend),
            })
    }
}

/// Returns `true` when the requested year identifies the row's own year
/// coverage: an exact request matches an equal exact row, a range request
/// matches a row carrying either endpoint, and the sentinels match rows
/// carrying the same sentinel.
fn literal_year_match(row: &YearSpec, requested: &YearSpec) -> bool {
    match requested {
        YearSpec::Exact(year) => matches!(row, YearSpec::Exact(r) if r == year),
        YearSpec::Range(start, end) => {
            matches!(row, YearSpec::Exact(r) if r == start || r == end)
        }
        YearSpec::Multi => matches!(row, YearSpec::Multi),
        YearSpec::NotApplicable => matches!(row, YearSpec::NotApplicable),
    }
}

fn dataset_ref(descriptor: &Descriptor) -> DatasetRef<'_> {
    DatasetRef {
        url: &descriptor.url,
        dataset_id: descriptor.dataset_id.as_deref(),
    }
}
