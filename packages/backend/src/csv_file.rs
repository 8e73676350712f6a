//! Flat CSV file backend.
//!
//! Downloads the whole file in one request, parses it with the `csv` crate,
//! and returns every row as a JSON object keyed by the column headers in the
//! first row. Year and agency filters are applied row-wise after parsing,
//! since a flat file has no query language.

use std::collections::BTreeSet;

use async_trait::async_trait;
use police_data_catalog_models::{BackendType, YearSpec};

use crate::parsing::apply_row_filters;
use crate::{BackendError, DataBackend, DatasetRef, FieldFilter, RecordSet};

/// Backend that downloads and parses flat CSV files.
#[derive(Debug, Clone, Default)]
pub struct CsvBackend {
    client: reqwest::Client,
}

impl CsvBackend {
    /// Creates a CSV backend with a default HTTP client.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

/// Parses CSV bytes into a [`RecordSet`], keeping the header order as the
/// column order. `limit` caps the number of parsed records.
///
/// # Errors
///
/// Returns [`BackendError`] if the file has no header row or a record fails
/// to parse.
pub fn parse_csv_records(bytes: &[u8], limit: Option<u64>) -> Result<RecordSet, BackendError> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(bytes);

    let columns: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim().to_owned())
        .collect();

    if columns.is_empty() {
        return Err(BackendError::Parse {
            message: "CSV file contains no header row".to_owned(),
        });
    }

    let mut records: Vec<serde_json::Value> = Vec::new();
    for result in reader.records() {
        let record = result?;

        let mut map = serde_json::Map::new();
        for (i, column) in columns.iter().enumerate() {
            let value = record.get(i).unwrap_or("").trim().to_owned();
            map.insert(column.clone(), serde_json::Value::String(value));
        }
        records.push(serde_json::Value::Object(map));

        if let Some(max) = limit
            && records.len() as u64 >= max
        {
            log::info!("Reached record limit ({max}), stopping CSV parse");
            break;
        }
    }

    Ok(RecordSet::new(columns, records))
}

#[async_trait]
impl DataBackend for CsvBackend {
    fn backend_type(&self) -> BackendType {
        BackendType::Csv
    }

    async fn fetch_filtered(
        &self,
        dataset: &DatasetRef<'_>,
        date_field: Option<&str>,
        year: Option<&YearSpec>,
        field_filter: Option<&FieldFilter>,
        limit: Option<u64>,
    ) -> Result<RecordSet, BackendError> {
        log::info!("Downloading CSV: {}", dataset.url);
        let response = self
            .client
            .get(dataset.url)
            .send()
            .await?
            .error_for_status()?;
        let bytes = response.bytes().await?;
        log::debug!("Downloaded {} bytes from {}", bytes.len(), dataset.url);

        let parsed = parse_csv_records(&bytes, limit)?;
        let total = parsed.len();
        let records = apply_row_filters(parsed.records, date_field, year, field_filter);
        log::info!(
            "Parsed {total} records from CSV at {} ({} after filtering)",
            dataset.url,
            records.len()
        );

        Ok(RecordSet::new(parsed.columns, records))
    }

    async fn enumerate_years(
        &self,
        _dataset: &DatasetRef<'_>,
        _date_field: &str,
    ) -> Result<BTreeSet<i32>, BackendError> {
        // Answering would require downloading and parsing the entire file;
        // loading the table is the better option.
        Err(BackendError::Unsupported {
            backend: BackendType::Csv,
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
            backend: BackendType::Csv,
            operation: "distinct-value queries".to_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &[u8] =
        b"stop_date,agency,outcome\n2020-01-05,Alpha PD,warning\n2019-03-09,Beta PD,citation\n";

    #[test]
    fn parses_headers_as_columns() {
        let set = parse_csv_records(SAMPLE, None).unwrap();
        assert_eq!(set.columns, vec!["stop_date", "agency", "outcome"]);
        assert_eq!(set.len(), 2);
        assert_eq!(set.records[0]["agency"], "Alpha PD");
    }

    #[test]
    fn limit_caps_parsed_records() {
        let set = parse_csv_records(SAMPLE, Some(1)).unwrap();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn pads_short_rows_with_empty_strings() {
        let set = parse_csv_records(b"a,b,c\n1,2\n", None).unwrap();
        assert_eq!(set.records[0]["c"], "");
    }

    #[test]
    fn rejects_empty_input() {
        let result = parse_csv_records(b"", None);
        assert!(matches!(result, Err(BackendError::Parse { .. })));
    }
}
