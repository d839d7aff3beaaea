//! Derived views over a loaded [`RecordTable`].
//!
//! Every function here is pure and never fails: empty input yields empty
//! sequences or NaN statistics.

use crate::country::{venue_country_code, UNRECOGNIZED_VENUE};
use crate::types::{Record, RecordTable};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

/// Numeric columns that can be summarised or averaged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NumericField {
    Rank,
    Mark,
    Age,
}

impl NumericField {
    pub const ALL: [NumericField; 3] = [NumericField::Rank, NumericField::Mark, NumericField::Age];

    pub fn as_str(&self) -> &'static str {
        match self {
            NumericField::Rank => "rank",
            NumericField::Mark => "mark",
            NumericField::Age => "age",
        }
    }

    pub fn value(&self, record: &Record) -> Option<f64> {
        match self {
            NumericField::Rank => record.rank.map(f64::from),
            NumericField::Mark => Some(record.mark),
            NumericField::Age => record.age.map(f64::from),
        }
    }
}

/// Text columns that can be grouped on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupField {
    Country,
    Nationality,
    Venue,
    Competitor,
}

impl GroupField {
    pub fn key<'a>(&self, record: &'a Record) -> &'a str {
        match self {
            GroupField::Country => &record.country_name,
            GroupField::Nationality => &record.nationality_code,
            GroupField::Venue => &record.venue,
            GroupField::Competitor => &record.competitor,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnSummary {
    pub column: NumericField,
    pub count: usize,
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub max: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Frequency {
    pub label: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MissingCount {
    pub column: &'static str,
    pub missing: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressionEntry {
    pub date: NaiveDate,
    pub mark: f64,
    pub competitor: String,
    pub country_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupMean {
    pub group: String,
    pub mean: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankingPoint {
    pub rank: Option<u32>,
    pub mark: f64,
    pub competitor: String,
    pub country_name: String,
}

/// Descriptive statistics for rank, mark and age. Nulls are left out of every figure.
pub fn summary_statistics(table: &RecordTable) -> Vec<ColumnSummary> {
    NumericField::ALL
        .iter()
        .map(|field| {
            let values: Vec<f64> = table.iter().filter_map(|r| field.value(r)).collect();
            summarize(*field, values)
        })
        .collect()
}

fn summarize(column: NumericField, mut values: Vec<f64>) -> ColumnSummary {
    let count = values.len();
    if count == 0 {
        return ColumnSummary {
            column,
            count,
            mean: f64::NAN,
            std: f64::NAN,
            min: f64::NAN,
            q1: f64::NAN,
            median: f64::NAN,
            q3: f64::NAN,
            max: f64::NAN,
        };
    }

    values.sort_by(f64::total_cmp);
    let n = count as f64;
    let mean = values.iter().sum::<f64>() / n;
    let std = if count > 1 {
        let ss: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
        (ss / (n - 1.0)).sqrt()
    } else {
        f64::NAN
    };

    ColumnSummary {
        column,
        count,
        mean,
        std,
        min: values[0],
        q1: quantile(&values, 0.25),
        median: quantile(&values, 0.5),
        q3: quantile(&values, 0.75),
        max: values[count - 1],
    }
}

/// Linear-interpolated quantile of sorted, non-empty `values`.
fn quantile(values: &[f64], p: f64) -> f64 {
    let pos = p * (values.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    values[lo] + (values[hi] - values[lo]) * (pos - lo as f64)
}

pub fn missing_values(table: &RecordTable) -> Vec<MissingCount> {
    let count = |f: fn(&Record) -> bool| table.iter().filter(|r| f(r)).count();
    vec![
        MissingCount {
            column: "rank",
            missing: count(|r| r.rank.is_none()),
        },
        MissingCount {
            column: "date_of_birth",
            missing: count(|r| r.date_of_birth.is_none()),
        },
        MissingCount {
            column: "age",
            missing: count(|r| r.age.is_none()),
        },
    ]
}

/// Counts labels, most frequent first. Ties keep the order in which labels were first seen.
pub fn frequencies<I, S>(labels: I) -> Vec<Frequency>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut counts: Vec<Frequency> = Vec::new();
    for label in labels {
        let label = label.as_ref();
        match index.get(label) {
            Some(&i) => counts[i].count += 1,
            None => {
                index.insert(label.to_string(), counts.len());
                counts.push(Frequency {
                    label: label.to_string(),
                    count: 1,
                });
            }
        }
    }
    // Stable sort keeps first-seen order among equal counts.
    counts.sort_by(|a, b| b.count.cmp(&a.count));
    counts
}

pub fn count_by_country(table: &RecordTable) -> Vec<Frequency> {
    frequencies(table.iter().map(|r| r.country_name.as_str()))
}

pub fn count_by_nationality(table: &RecordTable) -> Vec<Frequency> {
    frequencies(table.iter().map(|r| r.nationality_code.as_str()))
}

pub fn count_by_venue(table: &RecordTable) -> Vec<Frequency> {
    frequencies(table.iter().map(|r| r.venue.as_str()))
}

/// Counts per venue country code; venues without a code land in [`UNRECOGNIZED_VENUE`].
pub fn count_by_venue_country(table: &RecordTable) -> Vec<Frequency> {
    frequencies(table.iter().map(|r| {
        venue_country_code(&r.venue).unwrap_or_else(|| UNRECOGNIZED_VENUE.to_string())
    }))
}

pub fn top(frequencies: &[Frequency], limit: usize) -> &[Frequency] {
    &frequencies[..limit.min(frequencies.len())]
}

/// All-time-best progression.
///
/// Takes the minimum mark of each competition date in ascending date order and keeps a
/// date when its minimum is no worse than every earlier date's minimum. Each kept
/// `(date, mark)` is joined back to the table, so ties on the same date yield several rows.
pub fn historic_progression(table: &RecordTable) -> Vec<ProgressionEntry> {
    let mut daily_best: BTreeMap<NaiveDate, f64> = BTreeMap::new();
    for record in table.iter() {
        daily_best
            .entry(record.competition_date)
            .and_modify(|best| *best = best.min(record.mark))
            .or_insert(record.mark);
    }

    let mut kept: Vec<(NaiveDate, f64)> = Vec::new();
    let mut best_so_far = f64::INFINITY;
    for (date, mark) in daily_best {
        if mark <= best_so_far {
            kept.push((date, mark));
        }
        best_so_far = best_so_far.min(mark);
    }

    kept.into_iter()
        .flat_map(|(date, mark)| {
            table
                .iter()
                .filter(move |r| r.competition_date == date && r.mark == mark)
                .map(|r| ProgressionEntry {
                    date: r.competition_date,
                    mark: r.mark,
                    competitor: r.competitor.clone(),
                    country_name: r.country_name.clone(),
                })
        })
        .collect()
}

/// Mean of `value` per `group`, ordered by group key. Nulls are skipped; a group with no
/// values has a NaN mean.
pub fn average_by_group(
    table: &RecordTable,
    group: GroupField,
    value: NumericField,
) -> Vec<GroupMean> {
    let mut sums: BTreeMap<&str, (f64, usize)> = BTreeMap::new();
    for record in table.iter() {
        let entry = sums.entry(group.key(record)).or_insert((0.0, 0));
        if let Some(v) = value.value(record) {
            entry.0 += v;
            entry.1 += 1;
        }
    }

    sums.into_iter()
        .map(|(group, (sum, n))| GroupMean {
            group: group.to_string(),
            mean: if n == 0 { f64::NAN } else { sum / n as f64 },
        })
        .collect()
}

/// The first `limit` rows, as plotted on the rank/mark scatter.
pub fn ranking(table: &RecordTable, limit: usize) -> Vec<RankingPoint> {
    table
        .iter()
        .take(limit)
        .map(|r| RankingPoint {
            rank: r.rank,
            mark: r.mark,
            competitor: r.competitor.clone(),
            country_name: r.country_name.clone(),
        })
        .collect()
}

/// Counts keyed by label, for joining onto boundary features.
pub fn count_map(frequencies: &[Frequency]) -> HashMap<String, u64> {
    frequencies
        .iter()
        .map(|f| (f.label.clone(), f.count))
        .collect()
}
