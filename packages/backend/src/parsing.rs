//! Shared parsing and row-filtering helpers.
//!
//! Flat-file backends (CSV, `GeoJSON`) have no query language, so year and
//! field filters are applied row-wise after parsing. Query backends reuse
//! [`year_bounds`] to translate a [`YearSpec`] into inclusive year bounds
//! for their native filter syntax.

use chrono::{Datelike as _, NaiveDate, NaiveDateTime};
use police_data_catalog_models::YearSpec;

use crate::FieldFilter;

/// Datetime formats accepted from remote date columns, tried in order.
const DATETIME_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
];

/// Date-only formats accepted from remote date columns, tried in order.
const DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%m/%d/%Y"];

/// Canonical string form date columns are normalized to.
pub const CANONICAL_DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Formats a datetime in the canonical column form.
#[must_use]
pub fn format_datetime(dt: NaiveDateTime) -> String {
    dt.format(CANONICAL_DATETIME_FORMAT).to_string()
}

/// Parses a datetime string in any of the accepted formats. Date-only
/// values parse to midnight.
#[must_use]
pub fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, format) {
            return Some(dt);
        }
    }
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(s, format) {
            return date.and_hms_opt(0, 0, 0);
        }
    }
    None
}

/// Smallest absolute value treated as an epoch-milliseconds timestamp
/// rather than a bare year.
const EPOCH_MS_THRESHOLD: i64 = 100_000_000_000;

/// Converts an epoch-milliseconds JSON number to a datetime. Values below
/// the epoch threshold are not timestamps (they are bare years or ids).
#[must_use]
pub fn epoch_ms_datetime(value: &serde_json::Value) -> Option<NaiveDateTime> {
    let n = value.as_i64()?;
    if n.abs() < EPOCH_MS_THRESHOLD {
        return None;
    }
    chrono::DateTime::from_timestamp_millis(n).map(|dt| dt.naive_utc())
}

/// Extracts the calendar year from a date-column JSON value.
///
/// Strings are parsed as datetimes (or bare 4-digit years); numbers are
/// interpreted as epoch milliseconds (the `ArcGIS` export convention) or as
/// bare years.
#[must_use]
pub fn value_year(value: &serde_json::Value) -> Option<i32> {
    match value {
        serde_json::Value::String(s) => {
            if let Some(dt) = parse_datetime(s) {
                return Some(dt.year());
            }
            s.parse::<i32>().ok().filter(|y| (1000..=9999).contains(y))
        }
        serde_json::Value::Number(_) => {
            if let Some(dt) = epoch_ms_datetime(value) {
                return Some(dt.year());
            }
            let n = value.as_i64()?;
            i32::try_from(n).ok().filter(|y| (1000..=9999).contains(y))
        }
        _ => None,
    }
}

/// Translates a [`YearSpec`] into inclusive `(start, end)` year bounds.
/// `Multi` and `NotApplicable` impose no bounds.
#[must_use]
pub const fn year_bounds(year: &YearSpec) -> Option<(i32, i32)> {
    match year {
        YearSpec::Exact(y) => Some((*y, *y)),
        YearSpec::Range(start, end) => Some((*start, *end)),
        YearSpec::Multi | YearSpec::NotApplicable => None,
    }
}

/// Returns `true` if the record's date column falls within the bounds.
/// Records with a missing or unparseable date are excluded.
#[must_use]
pub fn record_matches_year(
    record: &serde_json::Value,
    date_field: &str,
    bounds: (i32, i32),
) -> bool {
    record
        .get(date_field)
        .and_then(value_year)
        .is_some_and(|year| year >= bounds.0 && year <= bounds.1)
}

/// Returns `true` if the record's field equals the filter value. Numeric
/// values compare by their canonical string form.
#[must_use]
pub fn record_matches_field(record: &serde_json::Value, filter: &FieldFilter) -> bool {
    match record.get(&filter.field) {
        Some(serde_json::Value::String(s)) => *s == filter.value,
        Some(serde_json::Value::Number(n)) => n.to_string() == filter.value,
        _ => false,
    }
}

/// Applies year and field filters row-wise, for backends without a native
/// query language.
#[must_use]
pub fn apply_row_filters(
    records: Vec<serde_json::Value>,
    date_field: Option<&str>,
    year: Option<&YearSpec>,
    field_filter: Option<&FieldFilter>,
) -> Vec<serde_json::Value> {
    let bounds = year.and_then(year_bounds);
    records
        .into_iter()
        .filter(|record| match (date_field, bounds) {
            (Some(field), Some(bounds)) => record_matches_year(record, field, bounds),
            _ => true,
        })
        .filter(|record| field_filter.is_none_or(|f| record_matches_field(record, f)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_iso_datetime_with_fractional() {
        let dt = parse_datetime("2020-06-01T14:30:00.000").unwrap();
        assert_eq!(dt.to_string(), "2020-06-01 14:30:00");
    }

    #[test]
    fn parses_space_separated_datetime() {
        assert!(parse_datetime("2020-06-01 14:30:00").is_some());
    }

    #[test]
    fn parses_bare_date_to_midnight() {
        let dt = parse_datetime("2020-06-01").unwrap();
        assert_eq!(dt.to_string(), "2020-06-01 00:00:00");
    }

    #[test]
    fn parses_mdy_date() {
        let dt = parse_datetime("06/01/2020").unwrap();
        assert_eq!(dt.date().to_string(), "2020-06-01");
    }

    #[test]
    fn rejects_garbage_datetime() {
        assert!(parse_datetime("not-a-date").is_none());
    }

    #[test]
    fn year_from_string_date() {
        assert_eq!(
            value_year(&serde_json::json!("2019-03-04T08:00:00")),
            Some(2019)
        );
    }

    #[test]
    fn year_from_bare_year_string() {
        assert_eq!(value_year(&serde_json::json!("2019")), Some(2019));
    }

    #[test]
    fn year_from_epoch_millis() {
        // 2020-06-01T00:00:00Z
        assert_eq!(value_year(&serde_json::json!(1_590_969_600_000_i64)), Some(2020));
    }

    #[test]
    fn year_from_bare_year_number() {
        assert_eq!(value_year(&serde_json::json!(2018)), Some(2018));
    }

    #[test]
    fn no_year_from_null() {
        assert_eq!(value_year(&serde_json::Value::Null), None);
    }

    #[test]
    fn bounds_for_exact_and_range() {
        assert_eq!(year_bounds(&YearSpec::Exact(2020)), Some((2020, 2020)));
        assert_eq!(
            year_bounds(&YearSpec::Range(2016, 2020)),
            Some((2016, 2020))
        );
        assert_eq!(year_bounds(&YearSpec::Multi), None);
    }

    #[test]
    fn filters_rows_by_year_and_field() {
        let records = vec![
            serde_json::json!({"stop_date": "2019-05-01", "agency": "A"}),
            serde_json::json!({"stop_date": "2020-05-01", "agency": "A"}),
            serde_json::json!({"stop_date": "2020-07-01", "agency": "B"}),
            serde_json::json!({"stop_date": null, "agency": "A"}),
        ];
        let filter = FieldFilter {
            field: "agency".to_owned(),
            value: "A".to_owned(),
        };
        let kept = apply_row_filters(
            records,
            Some("stop_date"),
            Some(&YearSpec::Exact(2020)),
            Some(&filter),
        );
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0]["stop_date"], "2020-05-01");
    }

    #[test]
    fn range_filter_keeps_inclusive_bounds() {
        let records = vec![
            serde_json::json!({"d": "2015-01-01"}),
            serde_json::json!({"d": "2016-01-01"}),
            serde_json::json!({"d": "2020-12-31"}),
            serde_json::json!({"d": "2021-01-01"}),
        ];
        let kept = apply_row_filters(records, Some("d"), Some(&YearSpec::Range(2016, 2020)), None);
        assert_eq!(kept.len(), 2);
    }
}
