use crate::config::AppConfig;
use crate::error::{DashboardError, Result};
use crate::types::{Gender, Record, RecordTable, UNKNOWN_COUNTRY};
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime};
use serde::Deserialize;
use serde_json::Value;
use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// Layout of a record source on disk.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RecordFormat {
    /// Pick from the file extension and first byte.
    #[default]
    Auto,
    /// One JSON object per line.
    Lines,
    /// A single JSON document: an array of rows or a column-oriented object.
    Array,
    /// Headered CSV.
    Csv,
}

impl RecordFormat {
    fn resolve(self, path: Option<&Path>, content: &str) -> RecordFormat {
        if self != RecordFormat::Auto {
            return self;
        }
        let is_csv = path
            .and_then(|p| p.extension())
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("csv"))
            .unwrap_or(false);
        if is_csv {
            return RecordFormat::Csv;
        }
        let trimmed = content.trim_start();
        if trimmed.starts_with('[') || is_columnar_document(trimmed) {
            RecordFormat::Array
        } else {
            RecordFormat::Lines
        }
    }
}

fn is_columnar_document(content: &str) -> bool {
    match serde_json::from_str::<Value>(content) {
        Ok(Value::Object(map)) => !map.is_empty() && map.values().all(Value::is_object),
        _ => false,
    }
}

/// A scalar as it arrives from JSON or CSV.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum RawValue {
    Int(i64),
    Float(f64),
    Text(String),
}

impl RawValue {
    fn display(&self) -> String {
        match self {
            RawValue::Int(n) => n.to_string(),
            RawValue::Float(f) => f.to_string(),
            RawValue::Text(s) => s.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawRecord {
    #[serde(rename = "Rank", alias = "rank", default)]
    rank: Option<RawValue>,
    #[serde(rename = "Mark", alias = "mark")]
    mark: RawValue,
    #[serde(rename = "Competitor", alias = "competitor")]
    competitor: String,
    #[serde(rename = "DOB", alias = "dob", alias = "dateOfBirth", alias = "date_of_birth", default)]
    date_of_birth: Option<RawValue>,
    #[serde(rename = "Nat", alias = "nat", alias = "nationalityCode", alias = "nationality_code")]
    nationality_code: String,
    #[serde(rename = "Venue", alias = "venue")]
    venue: String,
    #[serde(rename = "Date", alias = "date", alias = "competitionDate", alias = "competition_date")]
    competition_date: Option<RawValue>,
}

/// Loads the configured source for `gender`.
pub fn load_table(config: &AppConfig, gender: Gender) -> Result<RecordTable> {
    let source = config.source(gender);
    load_records(&source.path, source.format, gender)
}

pub fn load_records(path: &Path, format: RecordFormat, gender: Gender) -> Result<RecordTable> {
    let content = fs::read_to_string(path).map_err(|e| DashboardError::io(path, e))?;
    let format = format.resolve(Some(path), &content);
    debug!(?path, ?format, "reading record source");
    parse_resolved(&content, format, gender)
}

/// Parses records already held in memory. `Auto` sniffs the content only.
pub fn parse_records(content: &str, format: RecordFormat, gender: Gender) -> Result<RecordTable> {
    let format = format.resolve(None, content);
    parse_resolved(content, format, gender)
}

fn parse_resolved(content: &str, format: RecordFormat, gender: Gender) -> Result<RecordTable> {
    let rows = match format {
        RecordFormat::Lines => read_lines(content)?,
        RecordFormat::Array | RecordFormat::Auto => read_document(content)?,
        RecordFormat::Csv => read_csv(content)?,
    };

    let mut records = Vec::with_capacity(rows.len());
    for (row, raw) in rows {
        records.push(normalize(row, raw)?);
    }

    let before = records.len();
    let records = dedup_records(records);
    info!(
        %gender,
        rows = records.len(),
        duplicates = before - records.len(),
        "loaded record table"
    );

    Ok(RecordTable::new(gender, records))
}

fn read_lines(content: &str) -> Result<Vec<(usize, RawRecord)>> {
    let mut rows = Vec::new();
    for (i, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let raw: RawRecord = serde_json::from_str(line)
            .map_err(|e| DashboardError::parse(i + 1, "row", truncate(line), e.to_string()))?;
        rows.push((i + 1, raw));
    }
    Ok(rows)
}

fn read_document(content: &str) -> Result<Vec<(usize, RawRecord)>> {
    let document: Value = serde_json::from_str(content)
        .map_err(|e| DashboardError::parse(0, "document", truncate(content), e.to_string()))?;

    let values = match document {
        Value::Array(values) => values,
        Value::Object(columns) => transpose_columns(columns),
        other => {
            return Err(DashboardError::parse(
                0,
                "document",
                truncate(&other.to_string()),
                "expected an array of rows or an object of columns",
            ))
        }
    };

    values
        .into_iter()
        .enumerate()
        .map(|(i, value)| {
            let text = value.to_string();
            serde_json::from_value::<RawRecord>(value)
                .map(|raw| (i + 1, raw))
                .map_err(|e| DashboardError::parse(i + 1, "row", truncate(&text), e.to_string()))
        })
        .collect()
}

/// Turns `{"Mark": {"0": 9.58, "1": 9.69}, ...}` into one object per row index.
fn transpose_columns(columns: serde_json::Map<String, Value>) -> Vec<Value> {
    let mut index_keys = BTreeSet::new();
    for column in columns.values() {
        if let Value::Object(cells) = column {
            index_keys.extend(cells.keys().cloned());
        }
    }

    let mut keys: Vec<String> = index_keys.into_iter().collect();
    if keys.iter().all(|k| k.parse::<u64>().is_ok()) {
        keys.sort_by_key(|k| k.parse::<u64>().unwrap_or(u64::MAX));
    }

    keys.iter()
        .map(|key| {
            let row: serde_json::Map<String, Value> = columns
                .iter()
                .map(|(name, column)| {
                    let cell = column.get(key).cloned().unwrap_or(Value::Null);
                    (name.clone(), cell)
                })
                .collect();
            Value::Object(row)
        })
        .collect()
}

fn read_csv(content: &str) -> Result<Vec<(usize, RawRecord)>> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());
    let mut rows = Vec::new();
    for (i, result) in rdr.deserialize::<RawRecord>().enumerate() {
        let raw = result.map_err(|e| DashboardError::parse(i + 1, "row", "", e.to_string()))?;
        rows.push((i + 1, raw));
    }
    Ok(rows)
}

fn normalize(row: usize, raw: RawRecord) -> Result<Record> {
    let rank = parse_rank(row, raw.rank.as_ref())?;
    let mark = parse_mark(row, &raw.mark)?;
    let date_of_birth = match raw.date_of_birth.as_ref() {
        Some(value) => parse_optional_date(row, "DOB", value)?,
        None => None,
    };
    let competition_date = match raw.competition_date.as_ref() {
        Some(value) => parse_optional_date(row, "Date", value)?,
        None => None,
    }
    .ok_or_else(|| DashboardError::parse(row, "Date", "", "competition date is required"))?;

    let age = match date_of_birth {
        Some(dob) => Some(whole_years(dob, competition_date).ok_or_else(|| {
            DashboardError::parse(
                row,
                "DOB",
                dob.to_string(),
                format!("inconsistent dates: born after the competition on {competition_date}"),
            )
        })?),
        None => None,
    };

    Ok(Record {
        rank,
        mark,
        competitor: raw.competitor.trim().to_string(),
        date_of_birth,
        nationality_code: raw.nationality_code.trim().to_string(),
        venue: raw.venue.trim().to_string(),
        competition_date,
        age,
        country_name: UNKNOWN_COUNTRY.to_string(),
    })
}

fn parse_rank(row: usize, value: Option<&RawValue>) -> Result<Option<u32>> {
    let number = match value {
        None => return Ok(None),
        Some(RawValue::Int(n)) => *n as f64,
        Some(RawValue::Float(f)) => *f,
        Some(RawValue::Text(s)) if s.trim().is_empty() => return Ok(None),
        Some(RawValue::Text(s)) => s
            .trim()
            .parse::<f64>()
            .map_err(|e| DashboardError::parse(row, "Rank", s.as_str(), e.to_string()))?,
    };

    if number.fract() != 0.0 || number < 1.0 || number > u32::MAX as f64 {
        return Err(DashboardError::parse(
            row,
            "Rank",
            number.to_string(),
            "rank must be a positive integer",
        ));
    }
    Ok(Some(number as u32))
}

fn parse_mark(row: usize, value: &RawValue) -> Result<f64> {
    let mark = match value {
        RawValue::Int(n) => *n as f64,
        RawValue::Float(f) => *f,
        RawValue::Text(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|e| DashboardError::parse(row, "Mark", s.as_str(), e.to_string()))?,
    };
    if !mark.is_finite() || mark <= 0.0 {
        return Err(DashboardError::parse(
            row,
            "Mark",
            value.display(),
            "mark must be a positive number",
        ));
    }
    Ok(mark)
}

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d %b %Y", "%d.%m.%Y", "%d/%m/%Y", "%Y/%m/%d"];
const DATETIME_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

fn parse_optional_date(
    row: usize,
    field: &'static str,
    value: &RawValue,
) -> Result<Option<NaiveDate>> {
    match value {
        RawValue::Int(millis) => DateTime::from_timestamp_millis(*millis)
            .map(|dt| Some(dt.date_naive()))
            .ok_or_else(|| {
                DashboardError::parse(row, field, millis.to_string(), "timestamp out of range")
            }),
        RawValue::Float(_) => Err(DashboardError::parse(
            row,
            field,
            value.display(),
            "expected a date or epoch milliseconds",
        )),
        RawValue::Text(text) => {
            let text = text.trim();
            if text.is_empty() {
                return Ok(None);
            }
            parse_date_text(text)
                .map(Some)
                .ok_or_else(|| DashboardError::parse(row, field, text, "unrecognized date format"))
        }
    }
}

/// Parses the textual date layouts found in scraped ranking lists.
pub fn parse_date_text(text: &str) -> Option<NaiveDate> {
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(text, format) {
            return Some(date);
        }
    }
    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, format) {
            return Some(dt.date());
        }
    }
    DateTime::parse_from_rfc3339(text)
        .ok()
        .map(|dt| dt.date_naive())
}

/// Whole calendar years from `from` to `to`; `None` when `to` precedes `from`.
pub fn whole_years(from: NaiveDate, to: NaiveDate) -> Option<u32> {
    if to < from {
        return None;
    }
    let mut years = to.year() - from.year();
    if (to.month(), to.day()) < (from.month(), from.day()) {
        years -= 1;
    }
    u32::try_from(years).ok()
}

/// Drops rows equal in every field to an earlier row. Order is otherwise kept.
pub fn dedup_records(records: Vec<Record>) -> Vec<Record> {
    let mut seen = HashSet::with_capacity(records.len());
    records
        .into_iter()
        .filter(|record| seen.insert(record.key()))
        .collect()
}

fn truncate(text: &str) -> String {
    text.chars().take(80).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    const LINES: &str = r#"{"Rank": 1, "Mark": 10.49, "Competitor": "Florence GRIFFITH-JOYNER", "DOB": "21 DEC 1959", "Nat": "USA", "Venue": "Indianapolis, IN (USA)", "Date": "16 JUL 1988"}
{"Rank": 2, "Mark": 10.6, "Competitor": "Shelly-Ann FRASER-PRYCE", "DOB": "27 DEC 1986", "Nat": "JAM", "Venue": "Lausanne (SUI)", "Date": "26 AUG 2021"}
{"Rank": 2, "Mark": 10.6, "Competitor": "Shelly-Ann FRASER-PRYCE", "DOB": "27 DEC 1986", "Nat": "JAM", "Venue": "Lausanne (SUI)", "Date": "26 AUG 2021"}
"#;

    #[test]
    fn newline_delimited_source_is_normalized() {
        let table = parse_records(LINES, RecordFormat::Lines, Gender::Women).unwrap();
        assert_eq!(table.len(), 2);
        let first = &table.records[0];
        assert_eq!(first.rank, Some(1));
        assert_eq!(first.date_of_birth, Some(date(1959, 12, 21)));
        assert_eq!(first.competition_date, date(1988, 7, 16));
        assert_eq!(first.age, Some(28));
        assert_eq!(first.country_name, UNKNOWN_COUNTRY);
    }

    #[test]
    fn array_and_columnar_documents_match() {
        let array = r#"[
            {"Rank": 1, "Mark": 9.58, "Competitor": "Usain BOLT", "DOB": "1986-08-21", "Nat": "JAM", "Venue": "Olympiastadion, Berlin (GER)", "Date": "2009-08-16"},
            {"Rank": null, "Mark": "9.69", "Competitor": "Tyson GAY", "DOB": null, "Nat": "USA", "Venue": "Shanghai (CHN)", "Date": "2009-09-20"}
        ]"#;
        let columnar = r#"{
            "Rank": {"0": 1, "1": null},
            "Mark": {"0": 9.58, "1": 9.69},
            "Competitor": {"0": "Usain BOLT", "1": "Tyson GAY"},
            "DOB": {"0": "1986-08-21", "1": null},
            "Nat": {"0": "JAM", "1": "USA"},
            "Venue": {"0": "Olympiastadion, Berlin (GER)", "1": "Shanghai (CHN)"},
            "Date": {"0": "2009-08-16", "1": "2009-09-20"}
        }"#;

        let from_array = parse_records(array, RecordFormat::Auto, Gender::Men).unwrap();
        let from_columns = parse_records(columnar, RecordFormat::Auto, Gender::Men).unwrap();
        assert_eq!(from_array, from_columns);
        assert_eq!(from_array.records[1].rank, None);
        assert_eq!(from_array.records[1].age, None);
        assert_eq!(from_array.records[0].age, Some(22));
    }

    #[test]
    fn lines_array_and_csv_sources_match() {
        let lines = r#"{"Rank": 1, "Mark": 10.49, "Competitor": "Florence GRIFFITH-JOYNER", "DOB": "21 DEC 1959", "Nat": "USA", "Venue": "Indianapolis, IN (USA)", "Date": "16 JUL 1988"}
{"Rank": null, "Mark": 10.61, "Competitor": "Elaine THOMPSON-HERAH", "DOB": null, "Nat": "JAM", "Venue": "Tokyo (JPN)", "Date": "31 JUL 2021"}
{"Rank": 3, "Mark": 10.6, "Competitor": "Shelly-Ann FRASER-PRYCE", "DOB": "27 DEC 1986", "Nat": "JAM", "Venue": "Lausanne (SUI)", "Date": "26 AUG 2021"}
"#;
        let array = r#"[
            {"Rank": 1, "Mark": 10.49, "Competitor": "Florence GRIFFITH-JOYNER", "DOB": "21 DEC 1959", "Nat": "USA", "Venue": "Indianapolis, IN (USA)", "Date": "16 JUL 1988"},
            {"Rank": null, "Mark": 10.61, "Competitor": "Elaine THOMPSON-HERAH", "DOB": null, "Nat": "JAM", "Venue": "Tokyo (JPN)", "Date": "31 JUL 2021"},
            {"Rank": 3, "Mark": 10.6, "Competitor": "Shelly-Ann FRASER-PRYCE", "DOB": "27 DEC 1986", "Nat": "JAM", "Venue": "Lausanne (SUI)", "Date": "26 AUG 2021"}
        ]"#;
        let csv = "Rank,Mark,Competitor,DOB,Nat,Venue,Date\n\
                   1,10.49,Florence GRIFFITH-JOYNER,21 DEC 1959,USA,\"Indianapolis, IN (USA)\",16 JUL 1988\n\
                   ,10.61,Elaine THOMPSON-HERAH,,JAM,Tokyo (JPN),31 JUL 2021\n\
                   3,10.6,Shelly-Ann FRASER-PRYCE,27 DEC 1986,JAM,Lausanne (SUI),26 AUG 2021\n";

        let from_lines = parse_records(lines, RecordFormat::Lines, Gender::Women).unwrap();
        let from_array = parse_records(array, RecordFormat::Array, Gender::Women).unwrap();
        let from_csv = parse_records(csv, RecordFormat::Csv, Gender::Women).unwrap();

        assert_eq!(from_lines.len(), 3);
        assert_eq!(from_lines, from_array);
        assert_eq!(from_lines, from_csv);
        assert_eq!(from_csv.records[1].rank, None);
        assert_eq!(from_csv.records[1].date_of_birth, None);
        assert_eq!(from_csv.records[1].age, None);
        assert_eq!(from_csv.records[0].age, Some(28));
    }

    #[test]
    fn columnar_rows_follow_numeric_index_order() {
        let mut columns = serde_json::Map::new();
        let cells: serde_json::Map<String, Value> = (0..12)
            .map(|i| (i.to_string(), Value::from(i)))
            .collect();
        columns.insert("Rank".into(), Value::Object(cells));
        let rows = transpose_columns(columns);
        let ranks: Vec<i64> = rows.iter().map(|r| r["Rank"].as_i64().unwrap()).collect();
        assert_eq!(ranks, (0..12).collect::<Vec<_>>());
    }

    #[test]
    fn csv_source_is_normalized() {
        let csv = "Rank,Mark,Competitor,DOB,Nat,Venue,Date\n\
                   1,9.58,Usain BOLT,21 AUG 1986,JAM,\"Olympiastadion, Berlin (GER)\",16 AUG 2009\n\
                   ,9.69,Tyson GAY,,USA,Shanghai (CHN),20 SEP 2009\n";
        let table = parse_records(csv, RecordFormat::Csv, Gender::Men).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.records[0].venue, "Olympiastadion, Berlin (GER)");
        assert_eq!(table.records[1].rank, None);
        assert_eq!(table.records[1].date_of_birth, None);
    }

    #[test]
    fn malformed_date_is_a_parse_error() {
        let line = r#"{"Rank": 1, "Mark": 9.58, "Competitor": "X", "DOB": "yesterday", "Nat": "JAM", "Venue": "Y", "Date": "2009-08-16"}"#;
        let err = parse_records(line, RecordFormat::Lines, Gender::Men).unwrap_err();
        match err {
            DashboardError::Parse { row, field, value, .. } => {
                assert_eq!(row, 1);
                assert_eq!(field, "DOB");
                assert_eq!(value, "yesterday");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn missing_competition_date_is_rejected() {
        let line = r#"{"Rank": 1, "Mark": 9.58, "Competitor": "X", "Nat": "JAM", "Venue": "Y"}"#;
        let err = parse_records(line, RecordFormat::Lines, Gender::Men).unwrap_err();
        assert!(matches!(err, DashboardError::Parse { field: "Date", .. }));
    }

    #[test]
    fn rank_must_be_a_positive_integer() {
        let line = r#"{"Rank": 0, "Mark": 9.58, "Competitor": "X", "Nat": "JAM", "Venue": "Y", "Date": "2009-08-16"}"#;
        assert!(parse_records(line, RecordFormat::Lines, Gender::Men).is_err());
        let line = r#"{"Rank": 1.5, "Mark": 9.58, "Competitor": "X", "Nat": "JAM", "Venue": "Y", "Date": "2009-08-16"}"#;
        assert!(parse_records(line, RecordFormat::Lines, Gender::Men).is_err());
        let line = r#"{"Rank": 3.0, "Mark": 9.58, "Competitor": "X", "Nat": "JAM", "Venue": "Y", "Date": "2009-08-16"}"#;
        let table = parse_records(line, RecordFormat::Lines, Gender::Men).unwrap();
        assert_eq!(table.records[0].rank, Some(3));
    }

    #[test]
    fn non_positive_mark_is_rejected() {
        let line = r#"{"Rank": 1, "Mark": -9.58, "Competitor": "X", "Nat": "JAM", "Venue": "Y", "Date": "2009-08-16"}"#;
        assert!(matches!(
            parse_records(line, RecordFormat::Lines, Gender::Men),
            Err(DashboardError::Parse { field: "Mark", .. })
        ));
    }

    #[test]
    fn birth_after_competition_is_rejected() {
        let line = r#"{"Rank": 1, "Mark": 9.58, "Competitor": "X", "DOB": "2010-01-01", "Nat": "JAM", "Venue": "Y", "Date": "2009-08-16"}"#;
        let err = parse_records(line, RecordFormat::Lines, Gender::Men).unwrap_err();
        assert!(matches!(err, DashboardError::Parse { row: 1, field: "DOB", .. }));
        assert_eq!(
            err.to_string(),
            "row 1: invalid DOB \"2010-01-01\": inconsistent dates: born after the competition on 2009-08-16"
        );
    }

    #[test]
    fn epoch_millis_dates_are_accepted() {
        // 2009-08-16T00:00:00Z
        let line = r#"{"Rank": 1, "Mark": 9.58, "Competitor": "X", "DOB": 524966400000, "Nat": "JAM", "Venue": "Y", "Date": 1250380800000}"#;
        let table = parse_records(line, RecordFormat::Lines, Gender::Men).unwrap();
        assert_eq!(table.records[0].competition_date, date(2009, 8, 16));
        assert_eq!(table.records[0].date_of_birth, Some(date(1986, 8, 21)));
    }

    #[test]
    fn date_layouts() {
        assert_eq!(parse_date_text("16 AUG 2009"), Some(date(2009, 8, 16)));
        assert_eq!(parse_date_text("16.08.2009"), Some(date(2009, 8, 16)));
        assert_eq!(parse_date_text("2009-08-16T00:00:00.000"), Some(date(2009, 8, 16)));
        assert_eq!(parse_date_text("2009-08-16T00:00:00Z"), Some(date(2009, 8, 16)));
        assert_eq!(parse_date_text("not a date"), None);
    }

    #[test]
    fn whole_years_counts_completed_birthdays() {
        assert_eq!(whole_years(date(1986, 8, 21), date(2009, 8, 16)), Some(22));
        assert_eq!(whole_years(date(1986, 8, 21), date(2009, 8, 21)), Some(23));
        assert_eq!(whole_years(date(2000, 1, 1), date(2000, 1, 1)), Some(0));
        assert_eq!(whole_years(date(2000, 1, 2), date(2000, 1, 1)), None);
    }

    #[test]
    fn dedup_keeps_first_occurrence_and_order() {
        let table = parse_records(LINES, RecordFormat::Lines, Gender::Women).unwrap();
        let again = dedup_records(table.records.clone());
        assert_eq!(again, table.records);
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = load_records(Path::new("/nonexistent/men.json"), RecordFormat::Auto, Gender::Men)
            .unwrap_err();
        assert!(matches!(err, DashboardError::Io { .. }));
    }
}
