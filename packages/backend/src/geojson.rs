//! `GeoJSON` file backend.
//!
//! Downloads a `FeatureCollection` in one request and flattens each
//! feature's `properties` object into a plain record; the geometry is
//! dropped, since this layer only deals in tabular data. Year and agency
//! filters are applied row-wise after parsing, like the CSV backend.

use std::collections::BTreeSet;

use async_trait::async_trait;
use police_data_catalog_models::{BackendType, YearSpec};

use crate::parsing::apply_row_filters;
use crate::{BackendError, DataBackend, DatasetRef, FieldFilter, RecordSet};

/// Backend that downloads `GeoJSON` `FeatureCollection` files.
#[derive(Debug, Clone, Default)]
pub struct GeoJsonBackend {
    client: reqwest::Client,
}

impl GeoJsonBackend {
    /// Creates a `GeoJSON` backend with a default HTTP client.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

/// Flattens a `FeatureCollection` body into one record per feature's
/// `properties`. `limit` caps the number of extracted features.
///
/// # Errors
///
/// Returns [`BackendError::Parse`] if the body has no `features` array.
pub fn flatten_features(
    body: &serde_json::Value,
    limit: Option<u64>,
) -> Result<Vec<serde_json::Value>, BackendError> {
    let features = body
        .get("features")
        .and_then(serde_json::Value::as_array)
        .ok_or_else(|| BackendError::Parse {
            message: "GeoJSON body has no features array".to_owned(),
        })?;

    let mut records: Vec<serde_json::Value> = Vec::new();
    for feature in features {
        if let Some(properties) = feature.get("properties")
            && properties.is_object()
        {
            records.push(properties.clone());
        }
        if let Some(max) = limit
            && records.len() as u64 >= max
        {
            log::info!("Reached record limit ({max}), stopping GeoJSON parse");
            break;
        }
    }

    Ok(records)
}

#[async_trait]
impl DataBackend for GeoJsonBackend {
    fn backend_type(&self) -> BackendType {
        BackendType::GeoJson
    }

    async fn fetch_filtered(
        &self,
        dataset: &DatasetRef<'_>,
        date_field: Option<&str>,
        year: Option<&YearSpec>,
        field_filter: Option<&FieldFilter>,
        limit: Option<u64>,
    ) -> Result<RecordSet, BackendError> {
        log::info!("Downloading GeoJSON: {}", dataset.url);
        let response = self
            .client
            .get(dataset.url)
            .send()
            .await?
            .error_for_status()?;
        let body: serde_json::Value = response.json().await?;

        let flattened = flatten_features(&body, limit)?;
        let total = flattened.len();
        let records = apply_row_filters(flattened, date_field, year, field_filter);
        log::info!(
            "Parsed {total} features from {} ({} after filtering)",
            dataset.url,
            records.len()
        );

        Ok(RecordSet::from_records(records))
    }

    async fn enumerate_years(
        &self,
        _dataset: &DatasetRef<'_>,
        _date_field: &str,
    ) -> Result<BTreeSet<i32>, BackendError> {
        // Answering would require downloading the entire file; loading the
        // table is the better option.
        Err(BackendError::Unsupported {
            backend: BackendType::GeoJson,
            operation: "year enumeration".to_owned(),
        })
    }

    async fn enumerate_distinct(
        &self,
        _dataset: &DatasetRef<'_>,
        _select_field: &str,
        _date_field: Option<&str>,
        _year: Option<&YearSpec>,
        _partial: Option<&str>,
    ) -> Result<BTreeSet<String>, BackendError> {
        Err(BackendError::Unsupported {
            backend: BackendType::GeoJson,
            operation: "distinct-value queries".to_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collection() -> serde_json::Value {
        serde_json::json!({
            "type": "FeatureCollection",
            "features": [
                {
                    "type": "Feature",
                    "geometry": {"type": "Point", "coordinates": [-77.3, 38.8]},
                    "properties": {"arrest_date": "2019-04-02", "charge": "DUI"}
                },
                {
                    "type": "Feature",
                    "geometry": null,
                    "properties": {"arrest_date": "2019-09-15", "charge": "Theft"}
                }
            ]
        })
    }

    #[test]
    fn flattens_feature_properties() {
        let records = flatten_features(&collection(), None).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["charge"], "DUI");
        assert!(records[0].get("geometry").is_none());
    }

    #[test]
    fn limit_caps_features() {
        let records = flatten_features(&collection(), Some(1)).unwrap();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn rejects_body_without_features() {
        let body = serde_json::json!({"type": "Feature"});
        assert!(matches!(
            flatten_features(&body, None),
            Err(BackendError::Parse { .. })
        ));
    }
}
