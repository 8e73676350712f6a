//! `ArcGIS` REST feature service backend.
//!
//! Handles paginated fetching from `FeatureServer`/`MapServer` layer
//! endpoints. Feature `attributes` are flattened into plain records; the
//! geometry is dropped, since this layer only deals in tabular data.
//!
//! Agency filtering is not pushed into the `where` clause: feature services
//! routinely index their date columns but not free-text agency names.
//! Callers filter agencies from the returned rows; this is a known
//! limitation, not something this backend papers over.

use std::collections::BTreeSet;

use async_trait::async_trait;
use police_data_catalog_models::{BackendType, YearSpec};

use crate::parsing::{epoch_ms_datetime, format_datetime, value_year, year_bounds};
use crate::{BackendError, DataBackend, DatasetRef, FieldFilter, RecordSet};

/// Max records per request (common server-side cap).
const PAGE_SIZE: u64 = 1000;

/// Backend for `ArcGIS` REST feature services.
#[derive(Debug, Clone, Default)]
pub struct ArcGisBackend {
    client: reqwest::Client,
}

impl ArcGisBackend {
    /// Creates an `ArcGIS` backend with a default HTTP client.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

/// Returns the layer query endpoint for a dataset URL, appending `/query`
/// when the catalog stores the bare layer URL.
fn query_url(url: &str) -> String {
    let trimmed = url.trim_end_matches('/');
    if trimmed.ends_with("/query") {
        trimmed.to_owned()
    } else {
        format!("{trimmed}/query")
    }
}

/// Builds the `where` clause for an inclusive year range on a date column.
/// Without bounds the match-everything clause `1=1` is used.
fn where_clause(date_field: Option<&str>, bounds: Option<(i32, i32)>) -> String {
    match date_field.zip(bounds) {
        Some((field, (start, end))) => {
            format!(
                "{field} >= '{start}-01-01' AND {field} < '{}-01-01'",
                end + 1
            )
        }
        None => "1=1".to_owned(),
    }
}

/// Flattens `features[].attributes` objects out of a query response body.
fn flatten_attributes(body: &serde_json::Value) -> Vec<serde_json::Value> {
    body.get("features")
        .and_then(serde_json::Value::as_array)
        .map(|features| {
            features
                .iter()
                .filter_map(|feature| feature.get("attributes"))
                .cloned()
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait]
impl DataBackend for ArcGisBackend {
    fn backend_type(&self) -> BackendType {
        BackendType::ArcGis
    }

    async fn fetch_filtered(
        &self,
        dataset: &DatasetRef<'_>,
        date_field: Option<&str>,
        year: Option<&YearSpec>,
        _field_filter: Option<&FieldFilter>,
        limit: Option<u64>,
    ) -> Result<RecordSet, BackendError> {
        let query_url = query_url(dataset.url);
        let bounds = year.and_then(year_bounds);
        let where_clause = where_clause(date_field, bounds);
        let fetch_limit = limit.unwrap_or(u64::MAX);

        let mut all_records: Vec<serde_json::Value> = Vec::new();
        let mut offset: u64 = 0;

        loop {
            let total_fetched = all_records.len() as u64;
            let remaining = fetch_limit.saturating_sub(total_fetched);
            if remaining == 0 {
                break;
            }
            let page_limit = remaining.min(PAGE_SIZE);

            let url = format!(
                "{query_url}?where={where_clause}&outFields=*&f=json&resultRecordCount={page_limit}&resultOffset={offset}"
            );

            log::info!("Fetching ArcGIS data: offset={offset}, limit={page_limit}");
            let response = self.client.get(&url).send().await?.error_for_status()?;
            let body: serde_json::Value = response.json().await?;

            let records = flatten_attributes(&body);
            let count = records.len() as u64;
            if count == 0 {
                break;
            }

            all_records.extend(records);
            offset += count;

            // `exceededTransferLimit: true` is the canonical "more pages"
            // signal; `count < page_limit` is unreliable because servers
            // silently cap results at their own maxRecordCount.
            let exceeded = body
                .get("exceededTransferLimit")
                .and_then(serde_json::Value::as_bool)
                .unwrap_or(false);
            if !exceeded {
                break;
            }
        }

        // Feature services report date columns as epoch milliseconds;
        // normalize them to the canonical datetime string form.
        if let Some(field) = date_field {
            for record in &mut all_records {
                if let Some(value) = record.get_mut(field)
                    && let Some(dt) = epoch_ms_datetime(value)
                {
                    *value = serde_json::Value::String(format_datetime(dt));
                }
            }
        }

        log::info!("Downloaded {} ArcGIS records total", all_records.len());
        Ok(RecordSet::from_records(all_records))
    }

    async fn enumerate_years(
        &self,
        dataset: &DatasetRef<'_>,
        date_field: &str,
    ) -> Result<BTreeSet<i32>, BackendError> {
        let query_url = query_url(dataset.url);
        let url = format!(
            "{query_url}?where=1=1&outFields={date_field}&returnDistinctValues=true&f=json"
        );

        log::info!("Enumerating years for {query_url}");
        let response = self.client.get(&url).send().await?.error_for_status()?;
        let body: serde_json::Value = response.json().await?;

        Ok(flatten_attributes(&body)
            .iter()
            .filter_map(|record| record.get(date_field).and_then(value_year))
            .collect())
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
            backend: BackendType::ArcGis,
            operation: "distinct-value queries".to_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appends_query_segment_once() {
        assert_eq!(
            query_url("https://services.arcgis.com/x/FeatureServer/0"),
            "https://services.arcgis.com/x/FeatureServer/0/query"
        );
        assert_eq!(
            query_url("https://services.arcgis.com/x/FeatureServer/0/query"),
            "https://services.arcgis.com/x/FeatureServer/0/query"
        );
    }

    #[test]
    fn where_clause_brackets_years() {
        assert_eq!(
            where_clause(Some("ARREST_DATE"), Some((2019, 2020))),
            "ARREST_DATE >= '2019-01-01' AND ARREST_DATE < '2021-01-01'"
        );
        assert_eq!(where_clause(None, None), "1=1");
    }

    #[test]
    fn flattens_feature_attributes() {
        let body = serde_json::json!({
            "features": [
                {"attributes": {"ARREST_DATE": 1_577_923_200_000_i64, "CHARGE": "DUI"},
                 "geometry": {"x": -77.3, "y": 38.8}},
                {"attributes": {"ARREST_DATE": null, "CHARGE": "Theft"}}
            ],
            "exceededTransferLimit": false
        });
        let records = flatten_attributes(&body);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["CHARGE"], "DUI");
        assert!(records[0].get("geometry").is_none());
    }

    #[test]
    fn empty_body_flattens_to_no_records() {
        assert!(flatten_attributes(&serde_json::json!({})).is_empty());
    }
}
