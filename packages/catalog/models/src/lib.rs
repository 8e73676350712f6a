#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Dataset descriptor types for the police data catalog.
//!
//! Every dataset known to the system is described by a [`Descriptor`]: which
//! state and agency it covers, what kind of table it is, which year(s) it
//! spans, and which backend serves it. Descriptors are built once at startup
//! and never mutated.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use strum_macros::{AsRefStr, Display, EnumString};

/// The kind of data a table contains.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
pub enum TableType {
    /// Arrest records.
    #[serde(rename = "ARRESTS")]
    #[strum(serialize = "ARRESTS")]
    Arrests,
    /// Traffic stops (vehicle stops by law enforcement).
    #[serde(rename = "TRAFFIC STOPS")]
    #[strum(serialize = "TRAFFIC STOPS")]
    TrafficStops,
    /// All stops, both pedestrian and vehicular.
    #[serde(rename = "STOPS")]
    #[strum(serialize = "STOPS")]
    Stops,
    /// Warnings issued during traffic stops.
    #[serde(rename = "TRAFFIC WARNINGS")]
    #[strum(serialize = "TRAFFIC WARNINGS")]
    TrafficWarnings,
    /// Citations issued during traffic stops.
    #[serde(rename = "TRAFFIC CITATIONS")]
    #[strum(serialize = "TRAFFIC CITATIONS")]
    TrafficCitations,
}

/// The remote technology a dataset is served from.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
pub enum BackendType {
    /// Flat CSV file download.
    #[serde(rename = "CSV")]
    #[strum(serialize = "CSV")]
    Csv,
    /// `GeoJSON` `FeatureCollection` file download.
    #[serde(rename = "GeoJSON")]
    #[strum(serialize = "GeoJSON")]
    GeoJson,
    /// Socrata SODA open-data API.
    #[serde(rename = "Socrata")]
    #[strum(serialize = "Socrata")]
    Socrata,
    /// `ArcGIS` REST feature service.
    #[serde(rename = "ArcGIS")]
    #[strum(serialize = "ArcGIS")]
    ArcGis,
}

/// Year coverage of a dataset or a year criterion in a query.
///
/// Catalog rows only carry `Exact`, `Multi`, or `NotApplicable`; `Range`
/// appears in queries ("years X through Y") and in resolved table metadata.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum YearSpec {
    /// A single concrete year.
    Exact(i32),
    /// An inclusive range of years.
    Range(i32, i32),
    /// The dataset spans many years behind one endpoint; the backend must be
    /// queried to enumerate them.
    Multi,
    /// Year does not apply to this dataset.
    NotApplicable,
}

impl std::fmt::Display for YearSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Exact(year) => write!(f, "{year}"),
            Self::Range(start, end) => write!(f, "{start}-{end}"),
            Self::Multi => write!(f, "MULTI"),
            Self::NotApplicable => write!(f, "NA"),
        }
    }
}

/// The agency a dataset covers.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Agency {
    /// A single named agency.
    Named(String),
    /// Many agencies share the endpoint; the backend's agency field must be
    /// queried to enumerate them.
    Multi,
}

impl Agency {
    /// Parses an agency name, mapping the `"MULTI"` sentinel to
    /// [`Agency::Multi`].
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        if name == MULTI {
            Self::Multi
        } else {
            Self::Named(name.to_owned())
        }
    }

    /// Returns the agency name when this is a single named agency.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Named(name) => Some(name),
            Self::Multi => None,
        }
    }
}

impl std::fmt::Display for Agency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Named(name) => f.write_str(name),
            Self::Multi => f.write_str(MULTI),
        }
    }
}

/// Sentinel string used in catalog registrations for attributes that span
/// multiple concrete values.
pub const MULTI: &str = "MULTI";

/// One row of the catalog: a dataset (or dataset family) at a remote backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descriptor {
    /// Synthetic identifier derived from the identity tuple.
    pub id: String,
    /// State the covered agencies belong to.
    pub state: String,
    /// Name of the originating source (often the publishing agency or the
    /// state itself for statewide collections).
    pub source_name: String,
    /// Agency covered, or [`Agency::Multi`] for shared endpoints.
    pub agency: Agency,
    /// Kind of data in the table.
    pub table_type: TableType,
    /// Year coverage.
    pub year: YearSpec,
    /// Human-readable description of the dataset.
    pub description: String,
    /// Backend technology serving the data.
    pub backend: BackendType,
    /// URL (or host, for Socrata) where the data is accessed.
    pub url: String,
    /// Backend-specific dataset identifier (required by Socrata).
    pub dataset_id: Option<String>,
    /// Name of the date column, when one is known. Required for year
    /// filtering and year enumeration on multi-year datasets.
    pub date_field: Option<String>,
    /// Name of the agency column, when one is known. Required for agency
    /// filtering on multi-agency datasets.
    pub agency_field: Option<String>,
}

impl Descriptor {
    /// The identity tuple this descriptor is unique by.
    #[must_use]
    pub fn identity(&self) -> (&str, &Agency, TableType, &YearSpec) {
        (&self.state, &self.agency, self.table_type, &self.year)
    }
}

/// Number of hex characters in a synthetic descriptor id.
const ID_LENGTH: usize = 8;

/// Derives the deterministic synthetic id for a descriptor identity tuple.
///
/// The id is the first [`ID_LENGTH`] hex characters of the SHA-256 digest
/// over the tuple fields, so identical registrations always produce the same
/// id across runs and platforms.
#[must_use]
pub fn derive_id(state: &str, agency: &Agency, table_type: TableType, year: &YearSpec) -> String {
    let mut hasher = Sha256::new();
    hasher.update(state.as_bytes());
    hasher.update(b"|");
    hasher.update(agency.to_string().as_bytes());
    hasher.update(b"|");
    hasher.update(table_type.as_ref().as_bytes());
    hasher.update(b"|");
    hasher.update(year.to_string().as_bytes());
    let digest = hasher.finalize();
    hex::encode(digest)[..ID_LENGTH].to_owned()
}

/// The closed set of recognized jurisdiction names: the 50 states, the
/// District of Columbia, and the inhabited territories.
pub const ALL_STATES: [&str; 56] = [
    "Alabama",
    "Alaska",
    "American Samoa",
    "Arizona",
    "Arkansas",
    "California",
    "Colorado",
    "Connecticut",
    "Delaware",
    "District Of Columbia",
    "Florida",
    "Georgia",
    "Guam",
    "Hawaii",
    "Idaho",
    "Illinois",
    "Indiana",
    "Iowa",
    "Kansas",
    "Kentucky",
    "Louisiana",
    "Maine",
    "Maryland",
    "Massachusetts",
    "Michigan",
    "Minnesota",
    "Mississippi",
    "Missouri",
    "Montana",
    "Nebraska",
    "Nevada",
    "New Hampshire",
    "New Jersey",
    "New Mexico",
    "New York",
    "North Carolina",
    "North Dakota",
    "Northern Mariana Islands",
    "Ohio",
    "Oklahoma",
    "Oregon",
    "Pennsylvania",
    "Puerto Rico",
    "Rhode Island",
    "South Carolina",
    "South Dakota",
    "Tennessee",
    "Texas",
    "Utah",
    "Vermont",
    "Virgin Islands",
    "Virginia",
    "Washington",
    "West Virginia",
    "Wisconsin",
    "Wyoming",
];

/// Returns `true` if `state` is one of the recognized jurisdiction names.
#[must_use]
pub fn is_known_state(state: &str) -> bool {
    ALL_STATES.contains(&state)
}

#[cfg(test)]
mod tests {
    use std::str::FromStr as _;

    use super::*;

    #[test]
    fn table_type_round_trips_canonical_strings() {
        assert_eq!(TableType::TrafficStops.to_string(), "TRAFFIC STOPS");
        assert_eq!(
            TableType::from_str("TRAFFIC STOPS").unwrap(),
            TableType::TrafficStops
        );
        assert_eq!(TableType::Arrests.to_string(), "ARRESTS");
    }

    #[test]
    fn backend_type_round_trips() {
        assert_eq!(BackendType::GeoJson.to_string(), "GeoJSON");
        assert_eq!(
            BackendType::from_str("ArcGIS").unwrap(),
            BackendType::ArcGis
        );
    }

    #[test]
    fn year_spec_displays_sentinels() {
        assert_eq!(YearSpec::Exact(2020).to_string(), "2020");
        assert_eq!(YearSpec::Range(2016, 2020).to_string(), "2016-2020");
        assert_eq!(YearSpec::Multi.to_string(), "MULTI");
        assert_eq!(YearSpec::NotApplicable.to_string(), "NA");
    }

    #[test]
    fn agency_from_name_maps_sentinel() {
        assert_eq!(Agency::from_name("MULTI"), Agency::Multi);
        assert_eq!(
            Agency::from_name("Fairfax County Police Department"),
            Agency::Named("Fairfax County Police Department".to_owned())
        );
    }

    #[test]
    fn derive_id_is_stable() {
        let agency = Agency::Multi;
        let a = derive_id("Virginia", &agency, TableType::Stops, &YearSpec::Multi);
        let b = derive_id("Virginia", &agency, TableType::Stops, &YearSpec::Multi);
        assert_eq!(a, b);
        assert_eq!(a.len(), 8);
    }

    #[test]
    fn derive_id_differs_per_tuple() {
        let agency = Agency::Multi;
        let a = derive_id("Virginia", &agency, TableType::Stops, &YearSpec::Multi);
        let b = derive_id("Maryland", &agency, TableType::Stops, &YearSpec::Multi);
        assert_ne!(a, b);
    }

    #[test]
    fn recognizes_known_states() {
        assert!(is_known_state("Virginia"));
        assert!(is_known_state("District Of Columbia"));
        assert!(!is_known_state("Atlantis"));
    }
}
