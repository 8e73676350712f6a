//! Socrata SODA API backend.
//!
//! Handles paginated fetching from any Socrata dataset using the `$limit`,
//! `$offset`, `$order`, and `$where` query parameters. Catalog rows store
//! the portal host (e.g., `data.virginia.gov`) plus a dataset id; the
//! resource URL is assembled here. Socrata is the only backend with a
//! distinct-values query, which is what makes multi-agency enumeration
//! possible.

use std::collections::BTreeSet;
use std::fmt::Write as _;

use async_trait::async_trait;
use police_data_catalog_models::{BackendType, YearSpec};

use crate::parsing::{value_year, year_bounds};
use crate::{BackendError, DataBackend, DatasetRef, FieldFilter, RecordSet};

/// Records per page (the SODA maximum).
const PAGE_SIZE: u64 = 50_000;

/// Backend for Socrata SODA APIs.
#[derive(Debug, Clone, Default)]
pub struct SocrataBackend {
    client: reqwest::Client,
}

impl SocrataBackend {
    /// Creates a Socrata backend with a default HTTP client.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

/// Assembles the SODA resource URL from a portal host and dataset id.
///
/// Accepts a bare host (`data.virginia.gov`) or a full `http(s)` URL.
///
/// # Errors
///
/// Returns [`BackendError::Parse`] if the dataset has no dataset id.
pub fn resource_url(dataset: &DatasetRef<'_>) -> Result<String, BackendError> {
    let dataset_id = dataset.dataset_id.ok_or_else(|| BackendError::Parse {
        message: format!("Socrata dataset at {} has no dataset id", dataset.url),
    })?;
    let host = dataset
        .url
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .trim_end_matches('/');
    Ok(format!("https://{host}/resource/{dataset_id}.json"))
}

/// Escapes a string literal for a SoQL `$where` clause.
fn escape_soql(value: &str) -> String {
    value.replace('\'', "''")
}

/// Builds the `$where` condition for an inclusive year range on a date
/// column.
fn year_condition(date_field: &str, bounds: (i32, i32)) -> String {
    format!(
        "{date_field} >= '{}-01-01T00:00:00' AND {date_field} <= '{}-12-31T23:59:59'",
        bounds.0, bounds.1
    )
}

/// Combines optional `$where` conditions with `AND`.
fn build_where(conditions: &[Option<String>]) -> Option<String> {
    let present: Vec<&str> = conditions
        .iter()
        .filter_map(|c| c.as_deref())
        .collect();
    if present.is_empty() {
        None
    } else {
        Some(present.join(" AND "))
    }
}

#[async_trait]
impl DataBackend for SocrataBackend {
    fn backend_type(&self) -> BackendType {
        BackendType::Socrata
    }

    async fn fetch_filtered(
        &self,
        dataset: &DatasetRef<'_>,
        date_field: Option<&str>,
        year: Option<&YearSpec>,
        field_filter: Option<&FieldFilter>,
        limit: Option<u64>,
    ) -> Result<RecordSet, BackendError> {
        let api_url = resource_url(dataset)?;
        let bounds = year.and_then(year_bounds);

        let where_clause = build_where(&[
            date_field
                .zip(bounds)
                .map(|(field, bounds)| year_condition(field, bounds)),
            field_filter.map(|f| format!("{} = '{}'", f.field, escape_soql(&f.value))),
        ]);

        let order = date_field.unwrap_or(":id");
        let fetch_limit = limit.unwrap_or(u64::MAX);
        let mut all_records: Vec<serde_json::Value> = Vec::new();
        let mut offset: u64 = 0;

        loop {
            let remaining = fetch_limit.saturating_sub(offset);
            if remaining == 0 {
                break;
            }
            let page_limit = remaining.min(PAGE_SIZE);

            let mut url = format!("{api_url}?$limit={page_limit}&$offset={offset}&$order={order}");
            if let Some(clause) = &where_clause {
                write!(url, "&$where={clause}").unwrap();
            }

            log::info!("Fetching Socrata data: offset={offset}, limit={page_limit}");
            let response = self.client.get(&url).send().await?.error_for_status()?;
            let records: Vec<serde_json::Value> = response.json().await?;

            let count = records.len() as u64;
            if count == 0 {
                break;
            }

            all_records.extend(records);
            offset += count;

            if count < page_limit {
                break;
            }
        }

        log::info!("Downloaded {} Socrata records total", all_records.len());
        Ok(RecordSet::from_records(all_records))
    }

    async fn enumerate_years(
        &self,
        dataset: &DatasetRef<'_>,
        date_field: &str,
    ) -> Result<BTreeSet<i32>, BackendError> {
        let api_url = resource_url(dataset)?;
        let url = format!(
            "{api_url}?$select=DISTINCT date_extract_y({date_field}) AS year&$limit={PAGE_SIZE}"
        );

        log::info!("Enumerating years for {api_url}");
        let response = self.client.get(&url).send().await?.error_for_status()?;
        let records: Vec<serde_json::Value> = response.json().await?;

        Ok(records
            .iter()
            .filter_map(|record| record.get("year").and_then(value_year))
            .collect())
    }

    async fn enumerate_distinct(
        &self,
        dataset: &DatasetRef<'_>,
        select_field: &str,
        date_field: Option<&str>,
        year: Option<&YearSpec>,
        partial: Option<&str>,
    ) -> Result<BTreeSet<String>, BackendError> {
        let api_url = resource_url(dataset)?;
        let bounds = year.and_then(year_bounds);

        let where_clause = build_where(&[
            date_field
                .zip(bounds)
                .map(|(field, bounds)| year_condition(field, bounds)),
            partial.map(|p| format!("{select_field} LIKE '%{}%'", escape_soql(p))),
        ]);

        let mut url = format!("{api_url}?$select=DISTINCT {select_field}&$limit={PAGE_SIZE}");
        if let Some(clause) = &where_clause {
            write!(url, "&$where={clause}").unwrap();
        }

        log::info!("Enumerating distinct {select_field} values for {api_url}");
        let response = self.client.get(&url).send().await?.error_for_status()?;
        let records: Vec<serde_json::Value> = response.json().await?;

        Ok(records
            .iter()
            .filter_map(|record| record.get(select_field))
            .filter_map(serde_json::Value::as_str)
            .map(ToOwned::to_owned)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_resource_url_from_bare_host() {
        let dataset = DatasetRef {
            url: "data.virginia.gov",
            dataset_id: Some("segb-5y2c"),
        };
        assert_eq!(
            resource_url(&dataset).unwrap(),
            "https://data.virginia.gov/resource/segb-5y2c.json"
        );
    }

    #[test]
    fn builds_resource_url_from_full_url() {
        let dataset = DatasetRef {
            url: "https://data.montgomerycountymd.gov/",
            dataset_id: Some("4mse-ku6q"),
        };
        assert_eq!(
            resource_url(&dataset).unwrap(),
            "https://data.montgomerycountymd.gov/resource/4mse-ku6q.json"
        );
    }

    #[test]
    fn requires_dataset_id() {
        let dataset = DatasetRef {
            url: "data.virginia.gov",
            dataset_id: None,
        };
        assert!(matches!(
            resource_url(&dataset),
            Err(BackendError::Parse { .. })
        ));
    }

    #[test]
    fn year_condition_covers_whole_years() {
        assert_eq!(
            year_condition("incident_date", (2016, 2020)),
            "incident_date >= '2016-01-01T00:00:00' AND incident_date <= '2020-12-31T23:59:59'"
        );
    }

    #[test]
    fn escapes_single_quotes() {
        assert_eq!(escape_soql("O'Fallon"), "O''Fallon");
    }

    #[test]
    fn combines_where_conditions() {
        assert_eq!(build_where(&[None, None]), None);
        assert_eq!(
            build_where(&[
                Some("a = 'x'".to_owned()),
                None,
                Some("b LIKE '%y%'".to_owned())
            ]),
            Some("a = 'x' AND b LIKE '%y%'".to_owned())
        );
    }
}
