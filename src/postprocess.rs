//! Post-processing of raw model output into a fixed-schema output row.
//!
//! Tolerates markdown-fenced JSON, preserves unparseable output in a
//! fallback column, derives the contract end date from the start date
//! and duration strings, and flattens the nested Location field into
//! its three row columns.

use chrono::{Datelike, Duration, NaiveDate};
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;
use thiserror::Error;

use crate::schema::{
    ExtractionSchema, DURATION_FIELD, END_DATE_COLUMN, FILE_NAME_COLUMN, LOCATION_COLUMNS,
    LOCATION_FIELD, RAW_RESPONSE_COLUMN, START_DATE_FIELD,
};

/// Authoritative output date format (ISO).
pub const OUTPUT_DATE_FORMAT: &str = "%Y-%m-%d";

/// Placeholder when start date or duration is missing from the result.
const END_DATE_NOT_FOUND: &str = "Not Found";

/// Date derivation failures. Display strings are the sentinel values
/// written into the output row; derivation never panics on bad input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DateError {
    #[error("Invalid Start Date Format")]
    InvalidStartDate,

    #[error("Invalid Duration Format")]
    InvalidDurationFormat,

    #[error("Invalid Duration Unit")]
    InvalidDurationUnit,

    #[error("Date Out of Range")]
    OutOfRange,
}

static ORDINAL_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\d+)(st|nd|rd|th)\b").unwrap());

static DURATION_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(\d+)\s*([A-Za-z]+)").unwrap());

/// Normalize a date string before format matching: strip ordinal
/// suffixes ("1st" -> "1") and commas, collapse surrounding whitespace.
fn normalize_date_input(raw: &str) -> String {
    let without_ordinals = ORDINAL_SUFFIX.replace_all(raw, "$1");
    without_ordinals.replace(',', "").trim().to_string()
}

/// Parse a start date, trying each known format in order.
///
/// Formats: `DD-MM-YYYY`, `D Month YYYY`, `Month YYYY` (day defaults
/// to 1), `YYYY-MM-DD`. First hit wins.
pub fn parse_start_date(raw: &str) -> Result<NaiveDate, DateError> {
    let s = normalize_date_input(raw);

    if let Ok(d) = NaiveDate::parse_from_str(&s, "%d-%m-%Y") {
        return Ok(d);
    }
    if let Ok(d) = NaiveDate::parse_from_str(&s, "%d %B %Y") {
        return Ok(d);
    }
    // Month + year only: day defaults to the first
    if let Ok(d) = NaiveDate::parse_from_str(&format!("1 {}", s), "%d %B %Y") {
        return Ok(d);
    }
    if let Ok(d) = NaiveDate::parse_from_str(&s, "%Y-%m-%d") {
        return Ok(d);
    }

    Err(DateError::InvalidStartDate)
}

/// Duration in days or months.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DurationSpec {
    Days(u32),
    Months(u32),
}

/// Parse a duration string such as "730 days" or "24 months".
fn parse_duration(raw: &str) -> Result<DurationSpec, DateError> {
    let caps = DURATION_PATTERN
        .captures(raw)
        .ok_or(DateError::InvalidDurationFormat)?;

    let value: u32 = caps[1]
        .parse()
        .map_err(|_| DateError::InvalidDurationFormat)?;
    let unit = caps[2].to_lowercase();
    let unit = unit.strip_suffix('s').unwrap_or(&unit);

    match unit {
        "day" => Ok(DurationSpec::Days(value)),
        "month" => Ok(DurationSpec::Months(value)),
        _ => Err(DateError::InvalidDurationUnit),
    }
}

/// Number of days in a given month, leap-year aware.
fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|d| d.pred_opt())
        .map(|d| d.day())
        .unwrap_or(28)
}

/// Add months with year carry, clamping the day to the target month's
/// length. A month shorter than the start day truncates, it does not
/// roll into the next month. None when the target year is not
/// representable.
fn add_months_clamped(start: NaiveDate, months: u32) -> Option<NaiveDate> {
    let total = start.month0() as i64 + months as i64;
    let year = i32::try_from(start.year() as i64 + total / 12).ok()?;
    let month = (total % 12 + 1) as u32;
    let day = start.day().min(days_in_month(year, month));
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Compute the contract end date from a start-date string and a
/// duration string. The single canonical derivation used everywhere.
pub fn derive_end_date(start: &str, duration: &str) -> Result<NaiveDate, DateError> {
    let start_date = parse_start_date(start)?;

    match parse_duration(duration)? {
        DurationSpec::Days(n) => start_date
            .checked_add_signed(Duration::days(n as i64))
            .ok_or(DateError::OutOfRange),
        DurationSpec::Months(n) => add_months_clamped(start_date, n).ok_or(DateError::OutOfRange),
    }
}

/// End date as a row value: a formatted date on success, the sentinel
/// message on failure.
pub fn derive_end_date_value(start: &str, duration: &str) -> String {
    match derive_end_date(start, duration) {
        Ok(date) => date.format(OUTPUT_DATE_FORMAT).to_string(),
        Err(e) => e.to_string(),
    }
}

/// Strip a matched ```json fence pair from model output.
///
/// Only removes the fence when both the opening tag and the closing
/// backticks are present; anything else is returned untouched.
pub fn strip_json_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    if let Some(inner) = trimmed.strip_prefix("```json") {
        if let Some(inner) = inner.strip_suffix("```") {
            return inner.trim();
        }
    }
    trimmed
}

/// Parsed model output: a field map, or the raw text when the output
/// was not a JSON object.
#[derive(Debug)]
pub struct ExtractionResult {
    fields: serde_json::Map<String, Value>,
    raw_fallback: Option<String>,
}

impl ExtractionResult {
    /// Parse raw model output, unwrapping a code fence first. Decode
    /// failure keeps the raw text so the row can still be emitted for
    /// manual review.
    pub fn parse(raw: &str) -> Self {
        let unfenced = strip_json_fence(raw);
        match serde_json::from_str::<Value>(unfenced) {
            Ok(Value::Object(fields)) => Self {
                fields,
                raw_fallback: None,
            },
            _ => {
                tracing::warn!("Model output is not a JSON object; keeping raw text");
                Self {
                    fields: serde_json::Map::new(),
                    raw_fallback: Some(raw.to_string()),
                }
            }
        }
    }

    pub fn is_parsed(&self) -> bool {
        self.raw_fallback.is_none()
    }

    fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// A field's value rendered as a cell string. Absent and null are
    /// both the empty string; lists join with commas.
    fn cell(&self, field: &str) -> String {
        self.get(field).map(render_value).unwrap_or_default()
    }

    /// A column's value, falling back to the column name with a
    /// trailing unit suffix removed: a column named
    /// "Contract Value (₹ Cr)" is keyed as "Contract Value" by the
    /// model more often than not.
    fn column_cell(&self, column: &str) -> String {
        if let Some(value) = self.get(column) {
            return render_value(value);
        }
        if column.ends_with(')') {
            if let Some((base, _)) = column.rsplit_once(" (") {
                return self.cell(base.trim_end());
            }
        }
        String::new()
    }
}

/// Render a JSON value as a flat cell string.
fn render_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Array(items) => items
            .iter()
            .map(render_value)
            .collect::<Vec<_>>()
            .join(", "),
        Value::Object(_) => value.to_string(),
    }
}

/// Build the output row for one document.
///
/// The column set is fixed by the schema regardless of what the model
/// returned: absent fields become empty strings, a nested Location
/// expands into its three columns, and the end date is derived from
/// start date plus duration when both are present.
pub fn build_row(schema: &ExtractionSchema, file_name: &str, result: &ExtractionResult) -> Vec<String> {
    schema
        .output_columns()
        .iter()
        .map(|column| match column.as_str() {
            FILE_NAME_COLUMN => file_name.to_string(),
            RAW_RESPONSE_COLUMN => result.raw_fallback.clone().unwrap_or_default(),
            END_DATE_COLUMN => end_date_cell(result),
            _ if LOCATION_COLUMNS.contains(&column.as_str()) => {
                location_cell(result, column)
            }
            column => result.column_cell(column),
        })
        .collect()
}

fn end_date_cell(result: &ExtractionResult) -> String {
    // Derived unconditionally from start date plus duration; a
    // model-supplied End Date never overrides the derivation.
    let start = result.cell(START_DATE_FIELD);
    let duration = result.cell(DURATION_FIELD);
    if start.is_empty() || duration.is_empty() {
        return END_DATE_NOT_FOUND.to_string();
    }
    derive_end_date_value(&start, &duration)
}

fn location_cell(result: &ExtractionResult, column: &str) -> String {
    let key = if column == LOCATION_COLUMNS[0] {
        "State"
    } else if column == LOCATION_COLUMNS[1] {
        "District"
    } else {
        "Towns covered"
    };

    match result.get(LOCATION_FIELD) {
        Some(Value::Object(location)) => {
            location.get(key).map(render_value).unwrap_or_default()
        }
        // A plain-text location goes verbatim into the state column.
        Some(Value::String(s)) if column == LOCATION_COLUMNS[0] => s.clone(),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_days() {
        let end = derive_end_date("2018-10-15", "730 days").unwrap();
        let expected = NaiveDate::from_ymd_opt(2018, 10, 15).unwrap() + Duration::days(730);
        assert_eq!(end, expected);
        assert_eq!(end.format(OUTPUT_DATE_FORMAT).to_string(), "2020-10-14");
    }

    #[test]
    fn test_derive_single_day() {
        let end = derive_end_date("2020-01-01", "1 day").unwrap();
        assert_eq!(end, NaiveDate::from_ymd_opt(2020, 1, 2).unwrap());
    }

    #[test]
    fn test_month_end_clamping_leap_year() {
        // January 31 + 1 month lands on leap-year February 29
        let end = derive_end_date("31 January 2020", "1 month").unwrap();
        assert_eq!(end, NaiveDate::from_ymd_opt(2020, 2, 29).unwrap());
    }

    #[test]
    fn test_month_end_clamping_non_leap() {
        let end = derive_end_date("31 January 2021", "1 month").unwrap();
        assert_eq!(end, NaiveDate::from_ymd_opt(2021, 2, 28).unwrap());
    }

    #[test]
    fn test_month_year_carry() {
        let end = derive_end_date("2018-10-15", "24 months").unwrap();
        assert_eq!(end, NaiveDate::from_ymd_opt(2020, 10, 15).unwrap());

        let end = derive_end_date("2018-10-15", "3 months").unwrap();
        assert_eq!(end, NaiveDate::from_ymd_opt(2019, 1, 15).unwrap());
    }

    #[test]
    fn test_start_date_formats() {
        assert_eq!(
            parse_start_date("15-10-2018").unwrap(),
            NaiveDate::from_ymd_opt(2018, 10, 15).unwrap()
        );
        assert_eq!(
            parse_start_date("5 October 2018").unwrap(),
            NaiveDate::from_ymd_opt(2018, 10, 5).unwrap()
        );
        // Month-year only defaults to the first
        assert_eq!(
            parse_start_date("October 2018").unwrap(),
            NaiveDate::from_ymd_opt(2018, 10, 1).unwrap()
        );
        assert_eq!(
            parse_start_date("2018-10-15").unwrap(),
            NaiveDate::from_ymd_opt(2018, 10, 15).unwrap()
        );
    }

    #[test]
    fn test_start_date_ordinals_and_commas() {
        assert_eq!(
            parse_start_date("1st October 2018").unwrap(),
            NaiveDate::from_ymd_opt(2018, 10, 1).unwrap()
        );
        assert_eq!(
            parse_start_date("23rd March 2019").unwrap(),
            NaiveDate::from_ymd_opt(2019, 3, 23).unwrap()
        );
    }

    #[test]
    fn test_malformed_inputs_are_sentinels() {
        assert_eq!(
            derive_end_date_value("not a date", "3 months"),
            "Invalid Start Date Format"
        );
        assert_eq!(
            derive_end_date_value("2020-01-01", "three months"),
            "Invalid Duration Format"
        );
        assert_eq!(
            derive_end_date_value("2020-01-01", "5 years"),
            "Invalid Duration Unit"
        );
    }

    #[test]
    fn test_out_of_range_durations_are_sentinels() {
        // Well-formed grammar, unrepresentable target date
        assert_eq!(
            derive_end_date_value("2020-01-01", "99999999 months"),
            "Date Out of Range"
        );
        assert_eq!(
            derive_end_date_value("2020-01-01", "4000000000 days"),
            "Date Out of Range"
        );
    }

    #[test]
    fn test_duration_unit_variants() {
        assert_eq!(parse_duration("730 days").unwrap(), DurationSpec::Days(730));
        assert_eq!(parse_duration("1 day").unwrap(), DurationSpec::Days(1));
        assert_eq!(
            parse_duration("24 MONTHS").unwrap(),
            DurationSpec::Months(24)
        );
        assert_eq!(parse_duration("18months").unwrap(), DurationSpec::Months(18));
    }

    #[test]
    fn test_strip_json_fence() {
        assert_eq!(strip_json_fence("```json\n{\"a\": 1}\n```"), "{\"a\": 1}");
        // No closing fence: untouched
        assert_eq!(strip_json_fence("```json\n{\"a\": 1}"), "```json\n{\"a\": 1}");
        assert_eq!(strip_json_fence("{\"a\": 1}"), "{\"a\": 1}");
    }

    #[test]
    fn test_parse_fenced_output() {
        let result = ExtractionResult::parse("```json\n{\"Project Name\": \"NH-44\"}\n```");
        assert!(result.is_parsed());
        assert_eq!(result.cell("Project Name"), "NH-44");
    }

    #[test]
    fn test_unparseable_output_keeps_raw_text() {
        let raw = "I could not find the requested fields.";
        let result = ExtractionResult::parse(raw);
        assert!(!result.is_parsed());

        let schema = ExtractionSchema::builtin();
        let row = build_row(&schema, "contract.pdf", &result);
        let columns = schema.output_columns();

        // Raw text preserved in the fallback column, everything else empty
        let raw_idx = columns.iter().position(|c| c == RAW_RESPONSE_COLUMN).unwrap();
        assert_eq!(row[raw_idx], raw);
        let name_idx = columns.iter().position(|c| c == "Project Name").unwrap();
        assert_eq!(row[name_idx], "");
        assert_eq!(row[0], "contract.pdf");
    }

    #[test]
    fn test_row_has_fixed_columns_and_derived_end_date() {
        let raw = r#"{
            "Name of the Authority": "NHAI",
            "Start Date": "2018-10-15",
            "Project Duration": "730 days"
        }"#;
        let result = ExtractionResult::parse(raw);
        let schema = ExtractionSchema::builtin();
        let columns = schema.output_columns();
        let row = build_row(&schema, "contract.pdf", &result);

        assert_eq!(row.len(), columns.len());

        let end_idx = columns.iter().position(|c| c == END_DATE_COLUMN).unwrap();
        assert_eq!(row[end_idx], "2020-10-14");

        // Absent schema field maps to an empty string, never a missing column
        let contractor_idx = columns
            .iter()
            .position(|c| c == "Name of the Contractor")
            .unwrap();
        assert_eq!(row[contractor_idx], "");
    }

    #[test]
    fn test_end_date_derivation_ignores_model_supplied_value() {
        let raw = r#"{
            "End Date": "sometime in 2099",
            "Start Date": "2018-10-15",
            "Project Duration": "730 days"
        }"#;
        let result = ExtractionResult::parse(raw);
        let schema = ExtractionSchema::builtin();
        let columns = schema.output_columns();
        let row = build_row(&schema, "c.pdf", &result);

        let end_idx = columns.iter().position(|c| c == END_DATE_COLUMN).unwrap();
        assert_eq!(row[end_idx], "2020-10-14");
    }

    #[test]
    fn test_end_date_not_found_without_inputs() {
        let result = ExtractionResult::parse(r#"{"Project Name": "NH-44"}"#);
        let schema = ExtractionSchema::builtin();
        let columns = schema.output_columns();
        let row = build_row(&schema, "c.pdf", &result);

        let end_idx = columns.iter().position(|c| c == END_DATE_COLUMN).unwrap();
        assert_eq!(row[end_idx], END_DATE_NOT_FOUND);
    }

    #[test]
    fn test_location_mapping_expands() {
        let raw = r#"{
            "Location": {
                "State": "Maharashtra",
                "District": "Nagpur",
                "Towns covered": "Nagpur, Wardha"
            }
        }"#;
        let result = ExtractionResult::parse(raw);
        let schema = ExtractionSchema::builtin();
        let columns = schema.output_columns();
        let row = build_row(&schema, "c.pdf", &result);

        let idx = |name: &str| columns.iter().position(|c| c == name).unwrap();
        assert_eq!(row[idx("Location - State")], "Maharashtra");
        assert_eq!(row[idx("Location - District")], "Nagpur");
        assert_eq!(row[idx("Location - Towns covered")], "Nagpur, Wardha");
    }

    #[test]
    fn test_location_plain_string_goes_to_state() {
        let result = ExtractionResult::parse(r#"{"Location": "Maharashtra"}"#);
        let schema = ExtractionSchema::builtin();
        let columns = schema.output_columns();
        let row = build_row(&schema, "c.pdf", &result);

        let idx = |name: &str| columns.iter().position(|c| c == name).unwrap();
        assert_eq!(row[idx("Location - State")], "Maharashtra");
        assert_eq!(row[idx("Location - District")], "");
        assert_eq!(row[idx("Location - Towns covered")], "");
    }

    #[test]
    fn test_location_absent_leaves_all_empty() {
        let result = ExtractionResult::parse(r#"{"Project Name": "NH-44"}"#);
        let schema = ExtractionSchema::builtin();
        let columns = schema.output_columns();
        let row = build_row(&schema, "c.pdf", &result);

        for col in LOCATION_COLUMNS {
            let idx = columns.iter().position(|c| c == col).unwrap();
            assert_eq!(row[idx], "");
        }
    }

    #[test]
    fn test_unit_suffix_column_falls_back_to_bare_field() {
        let result = ExtractionResult::parse(r#"{"Contract Value": "Rs. 120 Cr"}"#);
        assert_eq!(result.column_cell("Contract Value (₹ Cr)"), "Rs. 120 Cr");
        assert_eq!(result.column_cell("Contract Value"), "Rs. 120 Cr");
        // An exact key still wins over the stripped alias
        let exact =
            ExtractionResult::parse(r#"{"Contract Value (₹ Cr)": "120", "Contract Value": "x"}"#);
        assert_eq!(exact.column_cell("Contract Value (₹ Cr)"), "120");
    }

    #[test]
    fn test_unit_suffix_column_in_full_row() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fields.csv");
        std::fs::write(
            &path,
            "Field Name,Description / Example\nContract Value (₹ Cr),from Article 19\n",
        )
        .unwrap();
        let schema = ExtractionSchema::from_csv(&path).unwrap();

        let result = ExtractionResult::parse(r#"{"Contract Value": "Rs. 120 Cr"}"#);
        let columns = schema.output_columns();
        let row = build_row(&schema, "c.pdf", &result);

        let idx = columns
            .iter()
            .position(|c| c == "Contract Value (₹ Cr)")
            .unwrap();
        assert_eq!(row[idx], "Rs. 120 Cr");
    }

    #[test]
    fn test_list_values_join() {
        let raw = r#"{"Project Milestones List": ["COD", "Completion"]}"#;
        let result = ExtractionResult::parse(raw);
        assert_eq!(result.cell("Project Milestones List"), "COD, Completion");
    }
}
