use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Country name used when a nationality code has no reference entry.
pub const UNKNOWN_COUNTRY: &str = "Unknown";

/// Selectbox values are matched ignoring case, so `Men`, `men` and `MEN` all parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum Gender {
    Men,
    Women,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Men => "men",
            Gender::Women => "women",
        }
    }
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Dashboard tab selected in the sidebar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum Tab {
    Intro,
    Data,
    Eda,
    Plots,
    Maps,
}

/// Which count feeds a choropleth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum MapLayer {
    /// Marks per athlete nationality.
    Nationality,
    /// Marks per country inferred from the competition venue.
    Venue,
}

impl MapLayer {
    pub fn as_str(&self) -> &'static str {
        match self {
            MapLayer::Nationality => "nationality",
            MapLayer::Venue => "venue",
        }
    }
}

impl fmt::Display for MapLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Case-insensitive `TryFrom<String>` backing the serde impls, shared with the clap parser.
macro_rules! impl_try_from_ignore_case {
    ($($ty:ty),*) => {
        $(
            impl TryFrom<String> for $ty {
                type Error = String;

                fn try_from(value: String) -> Result<Self, Self::Error> {
                    <$ty as clap::ValueEnum>::from_str(value.trim(), true)
                }
            }
        )*
    };
}

impl_try_from_ignore_case!(Gender, Tab, MapLayer);

/// One historic performance entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Record {
    pub rank: Option<u32>,
    /// Seconds. Smaller is better.
    pub mark: f64,
    pub competitor: String,
    pub date_of_birth: Option<NaiveDate>,
    pub nationality_code: String,
    pub venue: String,
    pub competition_date: NaiveDate,
    /// Whole years between birth and competition.
    pub age: Option<u32>,
    pub country_name: String,
}

/// Hashable projection of every field of a [`Record`], used for exact-duplicate detection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct RecordKey {
    rank: Option<u32>,
    mark_bits: u64,
    competitor: String,
    date_of_birth: Option<NaiveDate>,
    nationality_code: String,
    venue: String,
    competition_date: NaiveDate,
    age: Option<u32>,
    country_name: String,
}

impl Record {
    pub(crate) fn key(&self) -> RecordKey {
        RecordKey {
            rank: self.rank,
            mark_bits: self.mark.to_bits(),
            competitor: self.competitor.clone(),
            date_of_birth: self.date_of_birth,
            nationality_code: self.nationality_code.clone(),
            venue: self.venue.clone(),
            competition_date: self.competition_date,
            age: self.age,
            country_name: self.country_name.clone(),
        }
    }
}

/// The loaded record set for one gender, in source order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordTable {
    pub gender: Gender,
    pub records: Vec<Record>,
}

impl RecordTable {
    pub fn new(gender: Gender, records: Vec<Record>) -> Self {
        Self { gender, records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Record> {
        self.records.iter()
    }
}
