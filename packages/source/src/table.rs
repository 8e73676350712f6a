//! Resolved dataset results.
//!
//! A [`Table`] bundles the metadata of the descriptor it was resolved from
//! with the fetched rows (which may be attached later, for deferred loads).
//! The canonical export filename is derived from the metadata so that an
//! exported table can be reloaded without re-resolving anything.

use std::path::{Path, PathBuf};

use police_data_backend::RecordSet;
use police_data_catalog_models::{Agency, Descriptor, TableType, YearSpec};

use crate::SourceError;

/// A resolved, loaded (or load-pending) dataset.
#[derive(Debug, Clone)]
pub struct Table {
    /// State the covered agencies belong to.
    pub state: String,
    /// Name of the originating source.
    pub source_name: String,
    /// Agency the rows cover. Reflects the effective agency filter when one
    /// was applied at fetch time.
    pub agency: Agency,
    /// Kind of data in the table.
    pub table_type: TableType,
    /// Year coverage. Reflects the effective year filter when one was
    /// applied at fetch time.
    pub year: YearSpec,
    /// Human-readable description of the dataset.
    pub description: String,
    /// URL the table was accessed from.
    pub url: String,
    /// Backend-specific dataset identifier.
    pub dataset_id: Option<String>,
    /// Name of the date column, when known.
    pub date_field: Option<String>,
    /// Name of the agency column, when known.
    pub agency_field: Option<String>,
    /// The fetched rows. `None` until a deferred load is fulfilled.
    pub records: Option<RecordSet>,
}

impl Table {
    /// Builds a table from a resolved descriptor. `year_filter` and
    /// `agency_filter` are the effective post-fetch filter values, recorded
    /// in place of the descriptor's own coverage when present.
    #[must_use]
    pub fn new(
        descriptor: Descriptor,
        records: Option<RecordSet>,
        year_filter: Option<YearSpec>,
        agency_filter: Option<&str>,
    ) -> Self {
        Self {
            state: descriptor.state,
            source_name: descriptor.source_name,
            agency: agency_filter
                .map_or(descriptor.agency, |name| Agency::Named(name.to_owned())),
            table_type: descriptor.table_type,
            year: year_filter.unwrap_or(descriptor.year),
            description: descriptor.description,
            url: descriptor.url,
            dataset_id: descriptor.dataset_id,
            date_field: descriptor.date_field,
            agency_field: descriptor.agency_field,
            records,
        }
    }

    /// Attaches rows to a table created by a deferred load.
    pub fn attach_records(&mut self, records: RecordSet) {
        self.records = Some(records);
    }

    /// Derives the canonical export filename for this table.
    #[must_use]
    pub fn export_filename(&self) -> String {
        csv_filename(
            &self.state,
            &self.source_name,
            &self.agency,
            self.table_type,
            &self.year,
        )
    }

    /// Exports the rows as a flat CSV file: header row matching the column
    /// names, one row per record, no index column. Returns the written path.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::NoRecords`] when no rows are attached, or an
    /// I/O/CSV error if writing fails.
    pub fn export(
        &self,
        directory: Option<&Path>,
        filename: Option<&str>,
    ) -> Result<PathBuf, SourceError> {
        let records = self.records.as_ref().ok_or(SourceError::NoRecords)?;

        let filename = filename.map_or_else(|| self.export_filename(), ToOwned::to_owned);
        let path = directory.map_or_else(|| PathBuf::from(&filename), |dir| dir.join(&filename));

        let mut writer = csv::Writer::from_path(&path)?;
        writer.write_record(&records.columns)?;
        for record in &records.records {
            let row: Vec<String> = records
                .columns
                .iter()
                .map(|column| cell_text(record.get(column)))
                .collect();
            writer.write_record(&row)?;
        }
        writer.flush()?;

        log::info!("Exported {} records to {}", records.len(), path.display());
        Ok(path)
    }
}

/// Renders one JSON value as CSV cell text. Missing values and nulls become
/// empty cells.
fn cell_text(value: Option<&serde_json::Value>) -> String {
    match value {
        None | Some(serde_json::Value::Null) => String::new(),
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Reads a previously exported CSV file back into a [`RecordSet`].
///
/// # Errors
///
/// Returns an I/O error if the file cannot be opened or a CSV error if a
/// row fails to parse.
pub fn read_csv_export(path: &Path) -> Result<RecordSet, SourceError> {
    let mut reader = csv::Reader::from_path(path)?;
    let columns: Vec<String> = reader.headers()?.iter().map(ToOwned::to_owned).collect();

    let mut records = Vec::new();
    for result in reader.records() {
        let record = result?;
        let mut map = serde_json::Map::new();
        for (i, column) in columns.iter().enumerate() {
            let text = record.get(i).unwrap_or("");
            let value = if text.is_empty() {
                serde_json::Value::Null
            } else {
                serde_json::Value::String(text.to_owned())
            };
            map.insert(column.clone(), value);
        }
        records.push(serde_json::Value::Object(map));
    }

    log::info!("Read {} records from {}", records.len(), path.display());
    Ok(RecordSet::new(columns, records))
}

/// Derives the canonical export filename for the given table parameters.
///
/// The agency segment is omitted when it matches the source name; range
/// years are joined with an underscore; commas, spaces, slashes, and double
/// underscores are normalized away.
#[must_use]
pub fn csv_filename(
    state: &str,
    source_name: &str,
    agency: &Agency,
    table_type: TableType,
    year: &YearSpec,
) -> String {
    let mut filename = format!("{state}_{source_name}");

    let agency_name = agency.to_string();
    if agency_name != source_name {
        filename.push('_');
        filename.push_str(&agency_name);
    }

    filename.push('_');
    filename.push_str(table_type.as_ref());

    filename.push('_');
    match year {
        YearSpec::Range(start, end) => filename.push_str(&format!("{start}_{end}")),
        other => filename.push_str(&other.to_string()),
    }

    filename = filename
        .replace(',', "_")
        .replace(' ', "_")
        .replace("__", "_")
        .replace('/', "_");

    filename.push_str(".csv");
    filename
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn omits_agency_segment_matching_source_name() {
        let agency = Agency::Named("Montgomery County Police Department".to_owned());
        let filename = csv_filename(
            "Maryland",
            "Montgomery County Police Department",
            &agency,
            TableType::TrafficStops,
            &YearSpec::Exact(2021),
        );
        assert_eq!(
            filename,
            "Maryland_Montgomery_County_Police_Department_TRAFFIC_STOPS_2021.csv"
        );
    }

    #[test]
    fn includes_agency_segment_when_distinct() {
        let agency = Agency::Named("Fairfax County Police Department".to_owned());
        let filename = csv_filename(
            "Virginia",
            "Virginia",
            &agency,
            TableType::Stops,
            &YearSpec::Exact(2020),
        );
        assert_eq!(
            filename,
            "Virginia_Virginia_Fairfax_County_Police_Department_STOPS_2020.csv"
        );
    }

    #[test]
    fn joins_range_years_with_underscore() {
        let agency = Agency::Multi;
        let filename = csv_filename(
            "Virginia",
            "Virginia",
            &agency,
            TableType::Arrests,
            &YearSpec::Range(2016, 2020),
        );
        assert_eq!(filename, "Virginia_Virginia_MULTI_ARRESTS_2016_2020.csv");
    }

    #[test]
    fn filename_contains_no_raw_separators() {
        let agency = Agency::Named("A/B, C Dept".to_owned());
        let filename = csv_filename(
            "New York",
            "Some Source",
            &agency,
            TableType::TrafficCitations,
            &YearSpec::Multi,
        );
        assert!(!filename.contains(','));
        assert!(!filename.contains(' '));
        assert!(!filename.contains('/'));
    }

    #[test]
    fn filename_is_stable_across_calls() {
        let agency = Agency::Named("Agency".to_owned());
        let a = csv_filename(
            "Texas",
            "Source",
            &agency,
            TableType::Arrests,
            &YearSpec::Exact(2019),
        );
        let b = csv_filename(
            "Texas",
            "Source",
            &agency,
            TableType::Arrests,
            &YearSpec::Exact(2019),
        );
        assert_eq!(a, b);
    }

    #[test]
    fn export_requires_attached_records() {
        let descriptor = Descriptor {
            id: "abcd1234".to_owned(),
            state: "Texas".to_owned(),
            source_name: "Source".to_owned(),
            agency: Agency::Named("Source".to_owned()),
            table_type: TableType::Arrests,
            year: YearSpec::Exact(2019),
            description: String::new(),
            backend: police_data_catalog_models::BackendType::Csv,
            url: "https://example.com/data.csv".to_owned(),
            dataset_id: None,
            date_field: None,
            agency_field: None,
        };
        let table = Table::new(descriptor, None, None, None);
        assert!(matches!(
            table.export(None, None),
            Err(SourceError::NoRecords)
        ));
    }

    #[test]
    fn export_round_trips_through_csv() {
        let descriptor = Descriptor {
            id: "abcd1234".to_owned(),
            state: "Texas".to_owned(),
            source_name: "Source".to_owned(),
            agency: Agency::Named("Source".to_owned()),
            table_type: TableType::Arrests,
            year: YearSpec::Exact(2019),
            description: String::new(),
            backend: police_data_catalog_models::BackendType::Csv,
            url: "https://example.com/data.csv".to_owned(),
            dataset_id: None,
            date_field: None,
            agency_field: None,
        };
        let records = RecordSet::new(
            vec!["arrest_date".to_owned(), "charge".to_owned()],
            vec![
                serde_json::json!({"arrest_date": "2019-02-03T00:00:00", "charge": "DUI"}),
                serde_json::json!({"arrest_date": null, "charge": "Theft"}),
            ],
        );
        let table = Table::new(descriptor, Some(records), None, None);

        let dir = tempfile::tempdir().unwrap();
        let path = table.export(Some(dir.path()), None).unwrap();

        let reloaded = read_csv_export(&path).unwrap();
        assert_eq!(reloaded.columns, vec!["arrest_date", "charge"]);
        assert_eq!(reloaded.len(), 2);
        assert_eq!(reloaded.records[0]["charge"], "DUI");
        assert_eq!(reloaded.records[1]["arrest_date"], serde_json::Value::Null);
    }
}
