#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Static catalog of police datasets.
//!
//! Dataset registrations live in TOML files under `packages/catalog/datasets/`
//! and are baked into the binary at compile time (see [`registry`]). A
//! registration describes one dataset family: one agency/table-type pairing
//! with one or more year/url pairs. [`build_catalog`] expands registrations
//! into individual [`Descriptor`] rows, drops duplicates, and returns an
//! immutable [`Catalog`] that is shared for the life of the process.

pub mod registry;

use std::collections::HashSet;

use police_data_catalog_models::{
    Agency, BackendType, Descriptor, TableType, YearSpec, derive_id, is_known_state,
};
use serde::Deserialize;

pub use registry::build_catalog;

/// Errors raised while building the catalog from registrations.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    /// Registration names a state outside the recognized jurisdiction set.
    #[error("Unknown state: {state}")]
    UnknownState {
        /// The unrecognized state name.
        state: String,
    },

    /// Registration pairs N years with M urls where M is neither N nor 1.
    #[error("{years} year(s) cannot be paired with {urls} url(s)")]
    UrlYearMismatch {
        /// Number of urls in the registration.
        urls: usize,
        /// Number of years in the registration.
        years: usize,
    },

    /// Registration uses a year sentinel other than `"MULTI"` or `"NA"`.
    #[error("Invalid year sentinel: {value}")]
    InvalidYearSentinel {
        /// The unrecognized sentinel string.
        value: String,
    },

    /// Registration TOML is malformed.
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),
}

/// One dataset registration as written in a TOML file.
///
/// A registration expands into one [`Descriptor`] per year, with urls paired
/// positionally (a single url may be shared across all years).
#[derive(Debug, Deserialize)]
pub struct Registration {
    /// State the dataset covers. Must be a recognized jurisdiction name.
    pub state: String,
    /// Originating source name (e.g., `"Virginia"` for the statewide
    /// collection, or the agency name for single-agency sources).
    pub source_name: String,
    /// Covered agency, or `"MULTI"` for shared endpoints.
    pub agency: String,
    /// Kind of data in the table.
    pub table_type: TableType,
    /// Backend technology serving the data.
    pub backend: BackendType,
    /// Access url(s), one per year or a single shared url.
    pub urls: UrlsField,
    /// Year coverage: a year, a list of years, `"MULTI"`, or `"NA"`.
    #[serde(default)]
    pub years: YearsField,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// Backend-specific dataset identifier (required by Socrata).
    #[serde(default)]
    pub dataset_id: Option<String>,
    /// Date column name, when known.
    #[serde(default)]
    pub date_field: Option<String>,
    /// Agency column name, when known.
    #[serde(default)]
    pub agency_field: Option<String>,
}

/// Urls in a registration: a single shared url or one per year.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum UrlsField {
    /// One url shared by every year of the registration.
    Single(String),
    /// One url per year, paired positionally.
    PerYear(Vec<String>),
}

impl UrlsField {
    fn as_slice(&self) -> &[String] {
        match self {
            Self::Single(url) => std::slice::from_ref(url),
            Self::PerYear(urls) => urls,
        }
    }
}

/// Years in a registration: a sentinel string, a single year, or a list.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum YearsField {
    /// `"MULTI"` or `"NA"`.
    Sentinel(String),
    /// A single concrete year.
    Single(i32),
    /// Several concrete years, paired positionally with urls.
    List(Vec<i32>),
}

impl Default for YearsField {
    fn default() -> Self {
        Self::Sentinel("MULTI".to_owned())
    }
}

impl YearsField {
    fn to_year_specs(&self) -> Result<Vec<YearSpec>, CatalogError> {
        match self {
            Self::Sentinel(value) => match value.as_str() {
                "MULTI" => Ok(vec![YearSpec::Multi]),
                "NA" => Ok(vec![YearSpec::NotApplicable]),
                other => Err(CatalogError::InvalidYearSentinel {
                    value: other.to_owned(),
                }),
            },
            Self::Single(year) => Ok(vec![YearSpec::Exact(*year)]),
            Self::List(years) => Ok(years.iter().map(|y| YearSpec::Exact(*y)).collect()),
        }
    }
}

impl Registration {
    /// Expands this registration into one [`Descriptor`] per year.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] if the state is unrecognized, the year
    /// sentinel is invalid, or the url list cannot be paired with the years.
    pub fn expand(&self) -> Result<Vec<Descriptor>, CatalogError> {
        if !is_known_state(&self.state) {
            return Err(CatalogError::UnknownState {
                state: self.state.clone(),
            });
        }

        let years = self.years.to_year_specs()?;
        let urls = self.urls.as_slice();
        if urls.len() != years.len() && urls.len() != 1 {
            return Err(CatalogError::UrlYearMismatch {
                urls: urls.len(),
                years: years.len(),
            });
        }

        let agency = Agency::from_name(&self.agency);

        Ok(years
            .into_iter()
            .enumerate()
            .map(|(i, year)| {
                let url = urls.get(i).unwrap_or(&urls[0]);
                Descriptor {
                    id: derive_id(&self.state, &agency, self.table_type, &year),
                    state: self.state.clone(),
                    source_name: self.source_name.clone(),
                    agency: agency.clone(),
                    table_type: self.table_type,
                    year,
                    description: self.description.clone(),
                    backend: self.backend,
                    url: url.clone(),
                    dataset_id: self.dataset_id.clone(),
                    date_field: self.date_field.clone(),
                    agency_field: self.agency_field.clone(),
                }
            })
            .collect())
    }
}

/// Parses a [`Registration`] from a TOML document.
///
/// # Errors
///
/// Returns [`CatalogError::Parse`] if the TOML is malformed or missing
/// required fields.
pub fn parse_registration_toml(toml_str: &str) -> Result<Registration, CatalogError> {
    Ok(toml::de::from_str(toml_str)?)
}

/// The immutable set of dataset descriptors known to the system.
///
/// Built once at startup via [`build_catalog`]; safe to share across threads
/// by reference.
#[derive(Debug, Clone)]
pub struct Catalog {
    descriptors: Vec<Descriptor>,
}

impl Catalog {
    /// Builds a catalog from expanded descriptor rows.
    ///
    /// Rows with a duplicate identity tuple (state, agency, table type,
    /// year) are dropped, keeping the first occurrence. Surviving rows are
    /// sorted by that tuple.
    #[must_use]
    pub fn from_descriptors(rows: Vec<Descriptor>) -> Self {
        let mut seen = HashSet::new();
        let mut descriptors: Vec<Descriptor> = Vec::with_capacity(rows.len());
        for row in rows {
            if seen.insert(row.id.clone()) {
                descriptors.push(row);
            } else {
                log::debug!(
                    "Dropping duplicate registration: {} / {} / {} / {}",
                    row.state,
                    row.agency,
                    row.table_type,
                    row.year
                );
            }
        }
        descriptors.sort_by(|a, b| a.identity().cmp(&b.identity()));
        Self { descriptors }
    }

    /// Returns descriptors matching the given filters. Filters are
    /// conjunctive; an absent filter imposes no constraint.
    #[must_use]
    pub fn query(&self, source_name: Option<&str>, state: Option<&str>) -> Vec<Descriptor> {
        self.descriptors
            .iter()
            .filter(|d| source_name.is_none_or(|name| d.source_name == name))
            .filter(|d| state.is_none_or(|s| d.state == s))
            .cloned()
            .collect()
    }

    /// Looks up a descriptor by its synthetic id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Descriptor> {
        self.descriptors.iter().find(|d| d.id == id)
    }

    /// Returns every descriptor in the catalog.
    #[must_use]
    pub fn all(&self) -> &[Descriptor] {
        &self.descriptors
    }

    /// Returns the number of descriptors in the catalog.
    #[must_use]
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    /// Returns `true` if the catalog holds no descriptors.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registration(years: YearsField, urls: UrlsField) -> Registration {
        Registration {
            state: "Virginia".to_owned(),
            source_name: "Fairfax County Police Department".to_owned(),
            agency: "Fairfax County Police Department".to_owned(),
            table_type: TableType::Arrests,
            backend: BackendType::GeoJson,
            urls,
            years,
            description: String::new(),
            dataset_id: None,
            date_field: None,
            agency_field: None,
        }
    }

    #[test]
    fn expands_years_paired_with_urls() {
        let reg = registration(
            YearsField::List(vec![2019, 2020]),
            UrlsField::PerYear(vec!["https://a/2019.geojson".into(), "https://a/2020.geojson".into()]),
        );
        let rows = reg.expand().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].year, YearSpec::Exact(2019));
        assert_eq!(rows[0].url, "https://a/2019.geojson");
        assert_eq!(rows[1].year, YearSpec::Exact(2020));
        assert_eq!(rows[1].url, "https://a/2020.geojson");
    }

    #[test]
    fn shares_single_url_across_years() {
        let reg = registration(
            YearsField::List(vec![2019, 2020]),
            UrlsField::Single("https://a/all.csv".into()),
        );
        let rows = reg.expand().unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.url == "https://a/all.csv"));
    }

    #[test]
    fn rejects_mismatched_url_count() {
        let reg = registration(
            YearsField::List(vec![2018, 2019, 2020]),
            UrlsField::PerYear(vec!["https://a".into(), "https://b".into()]),
        );
        assert!(matches!(
            reg.expand(),
            Err(CatalogError::UrlYearMismatch { urls: 2, years: 3 })
        ));
    }

    #[test]
    fn rejects_unknown_state() {
        let mut reg = registration(
            YearsField::Single(2020),
            UrlsField::Single("https://a".into()),
        );
        reg.state = "Atlantis".to_owned();
        assert!(matches!(
            reg.expand(),
            Err(CatalogError::UnknownState { .. })
        ));
    }

    #[test]
    fn rejects_invalid_year_sentinel() {
        let reg = registration(
            YearsField::Sentinel("SOMETIME".to_owned()),
            UrlsField::Single("https://a".into()),
        );
        assert!(matches!(
            reg.expand(),
            Err(CatalogError::InvalidYearSentinel { .. })
        ));
    }

    #[test]
    fn duplicate_registrations_are_dropped_not_erred() {
        let reg = registration(
            YearsField::Single(2020),
            UrlsField::Single("https://a".into()),
        );
        let mut rows = reg.expand().unwrap();
        rows.extend(reg.expand().unwrap());
        let catalog = Catalog::from_descriptors(rows);
        assert_eq!(catalog.len(), 1);
    }

    #[test]
    fn descriptors_sort_by_identity_tuple() {
        let b = registration(
            YearsField::Single(2020),
            UrlsField::Single("https://b".into()),
        );
        let a = registration(
            YearsField::Single(2019),
            UrlsField::Single("https://a".into()),
        );
        let mut rows = b.expand().unwrap();
        rows.extend(a.expand().unwrap());
        let catalog = Catalog::from_descriptors(rows);
        assert_eq!(catalog.all()[0].year, YearSpec::Exact(2019));
        assert_eq!(catalog.all()[1].year, YearSpec::Exact(2020));
    }

    #[test]
    fn query_filters_conjunctively() {
        let mut rows = registration(
            YearsField::Single(2020),
            UrlsField::Single("https://a".into()),
        )
        .expand()
        .unwrap();
        let mut other = registration(
            YearsField::Single(2020),
            UrlsField::Single("https://b".into()),
        );
        other.state = "Maryland".to_owned();
        other.source_name = "Montgomery County Police Department".to_owned();
        rows.extend(other.expand().unwrap());
        let catalog = Catalog::from_descriptors(rows);

        assert_eq!(catalog.query(None, None).len(), 2);
        assert_eq!(catalog.query(None, Some("Maryland")).len(), 1);
        assert_eq!(
            catalog
                .query(Some("Fairfax County Police Department"), Some("Virginia"))
                .len(),
            1
        );
        assert!(
            catalog
                .query(Some("Fairfax County Police Department"), Some("Maryland"))
                .is_empty()
        );
    }

    #[test]
    fn looks_up_descriptors_by_id() {
        let rows = registration(
            YearsField::Single(2020),
            UrlsField::Single("https://a".into()),
        )
        .expand()
        .unwrap();
        let id = rows[0].id.clone();
        let catalog = Catalog::from_descriptors(rows);
        assert_eq!(catalog.get(&id).unwrap().year, YearSpec::Exact(2020));
        assert!(catalog.get("00000000").is_none());
    }

    #[test]
    fn parses_registration_toml() {
        let toml_str = r#"
            state = "Virginia"
            source_name = "Virginia"
            agency = "MULTI"
            table_type = "STOPS"
            backend = "Socrata"
            urls = "data.virginia.gov"
            years = "MULTI"
            dataset_id = "segb-5y2c"
            date_field = "incident_date"
        "#;
        let reg = parse_registration_toml(toml_str).unwrap();
        assert_eq!(reg.table_type, TableType::Stops);
        assert_eq!(reg.backend, BackendType::Socrata);
        let rows = reg.expand().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].year, YearSpec::Multi);
        assert_eq!(rows[0].agency, Agency::Multi);
        assert_eq!(rows[0].dataset_id.as_deref(), Some("segb-5y2c"));
    }
}
