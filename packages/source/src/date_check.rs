//! Post-fetch validation and repair of the designated date column.
//!
//! Remote datasets ship date columns in whatever shape their portal emits:
//! ISO strings, `MM/DD/YYYY` text, bare integer years, or a `1900-01-01`
//! placeholder for "unknown date". [`sanitize`] normalizes the column to
//! canonical datetime strings and rejects values that can only come from an
//! upstream unit or format conversion bug. Downstream statistical use makes
//! silent corruption worse than a crash, so the failure is loud.

use chrono::Datelike as _;
use police_data_backend::RecordSet;
use police_data_backend::parsing::{format_datetime, parse_datetime};

/// Earliest plausible year for a record in any covered dataset.
const EARLIEST_YEAR: i32 = 1995;

/// Placeholder timestamp some portals emit for "unknown date".
const SENTINEL_DATE: &str = "1900-01-01T00:00:00";

/// Errors signalling a corrupted date column.
#[derive(Debug, thiserror::Error)]
pub enum DateError {
    /// The date column holds values that cannot be interpreted as dates.
    #[error("Unknown data type for date value: {value}")]
    UnknownType {
        /// The offending value, rendered as JSON.
        value: String,
    },

    /// A column named `year` holds a non-numeric value.
    #[error("Year column contains a non-numeric value: {value}")]
    NonNumericYear {
        /// The offending value, rendered as JSON.
        value: String,
    },

    /// The first date is outside the plausible range. There was likely an
    /// issue in the date conversion.
    #[error(
        "Date year {year} is outside {EARLIEST_YEAR}-{current}. There was likely an issue in the date conversion"
    )]
    OutOfRange {
        /// Year found in the data.
        year: i32,
        /// Current calendar year at the time of the check.
        current: i32,
    },
}

/// Validates and repairs the date column of a fetched record set.
///
/// A pure, idempotent transformation: no-op when `date_field` is absent, the
/// record set is empty, or the column is entirely null.
///
/// # Errors
///
/// Returns [`DateError`] when the column cannot be coerced to dates or the
/// first date falls outside `[1995, current year]`.
pub fn sanitize(
    mut records: RecordSet,
    date_field: Option<&str>,
) -> Result<RecordSet, DateError> {
    let Some(field) = date_field else {
        return Ok(records);
    };
    if records.is_empty() {
        return Ok(records);
    }

    let Some(first) = first_non_null(&records, field) else {
        return Ok(records);
    };

    if first.is_string() {
        coerce_textual(&mut records, field)?;
    } else if field.eq_ignore_ascii_case("year") {
        coerce_bare_years(&mut records, field)?;
    }

    // Replace the "unknown date" placeholder with a missing marker.
    for record in &mut records.records {
        if let Some(value) = record.get_mut(field)
            && value.as_str() == Some(SENTINEL_DATE)
        {
            *value = serde_json::Value::Null;
        }
    }

    if let Some(first) = first_non_null(&records, field) {
        let Some(dt) = first.as_str().and_then(parse_datetime) else {
            return Err(DateError::UnknownType {
                value: first.to_string(),
            });
        };
        let year = dt.year();
        let current = chrono::Utc::now().year();
        if year < EARLIEST_YEAR || year > current {
            return Err(DateError::OutOfRange { year, current });
        }
    }

    Ok(records)
}

/// Returns the first non-null value of the column, if any.
fn first_non_null<'a>(records: &'a RecordSet, field: &str) -> Option<&'a serde_json::Value> {
    records
        .records
        .iter()
        .filter_map(|record| record.get(field))
        .find(|value| !value.is_null())
}

/// Coerces every non-null value of a textual date column to the canonical
/// datetime string form.
fn coerce_textual(records: &mut RecordSet, field: &str) -> Result<(), DateError> {
    for record in &mut records.records {
        let Some(value) = record.get_mut(field) else {
            continue;
        };
        if value.is_null() {
            continue;
        }
        let parsed = value
            .as_str()
            .and_then(parse_datetime)
            .ok_or_else(|| DateError::UnknownType {
                value: value.to_string(),
            })?;
        *value = serde_json::Value::String(format_datetime(parsed));
    }
    Ok(())
}

/// Coerces every non-null value of a bare-year column to January 1st of
/// that year. Sub-year precision never existed in such columns, so none is
/// lost.
fn coerce_bare_years(records: &mut RecordSet, field: &str) -> Result<(), DateError> {
    for record in &mut records.records {
        let Some(value) = record.get_mut(field) else {
            continue;
        };
        if value.is_null() {
            continue;
        }
        let year = value
            .as_i64()
            .and_then(|y| i32::try_from(y).ok())
            .ok_or_else(|| DateError::NonNumericYear {
                value: value.to_string(),
            })?;
        *value = serde_json::Value::String(format!("{year:04}-01-01T00:00:00"));
    }
    Ok(())
}
