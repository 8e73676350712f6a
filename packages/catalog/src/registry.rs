//! Dataset registry: loads all catalog registrations from embedded TOML.
//!
//! Each `.toml` file in `packages/catalog/datasets/` is baked into the binary
//! at compile time via [`include_str!`]. Adding a dataset is as simple as
//! creating a new TOML file and adding it to the list below.

use crate::{Catalog, parse_registration_toml};

/// TOML registrations embedded at compile time.
const DATASET_TOMLS: &[(&str, &str)] = &[
    // ── Socrata datasets ─────────────────────────────────────────────
    (
        "virginia_stops",
        include_str!("../datasets/virginia_stops.toml"),
    ),
    (
        "montgomery_county_md_traffic",
        include_str!("../datasets/montgomery_county_md_traffic.toml"),
    ),
    // ── GeoJSON datasets ─────────────────────────────────────────────
    (
        "fairfax_va_traffic_warnings",
        include_str!("../datasets/fairfax_va_traffic_warnings.toml"),
    ),
    (
        "fairfax_va_traffic_citations",
        include_str!("../datasets/fairfax_va_traffic_citations.toml"),
    ),
    (
        "fairfax_va_arrests",
        include_str!("../datasets/fairfax_va_arrests.toml"),
    ),
];

/// Number of descriptor rows the registrations expand to (used in tests).
#[cfg(test)]
const EXPECTED_DESCRIPTOR_COUNT: usize = 11;

/// Builds the catalog from the embedded registrations.
///
/// Intended to be called once during process setup; the returned [`Catalog`]
/// is immutable and safe to share by reference.
///
/// # Panics
///
/// Panics if any embedded registration is malformed (the registrations are
/// compile-time data, so this is caught by the test suite, not at a
/// customer's machine).
#[must_use]
pub fn build_catalog() -> Catalog {
    let mut rows = Vec::new();
    for (name, toml_str) in DATASET_TOMLS {
        let registration = parse_registration_toml(toml_str)
            .unwrap_or_else(|e| panic!("Failed to parse {name}.toml: {e}"));
        let expanded = registration
            .expand()
            .unwrap_or_else(|e| panic!("Invalid registration {name}.toml: {e}"));
        rows.extend(expanded);
    }
    Catalog::from_descriptors(rows)
}
