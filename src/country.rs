use crate::config::{MissingReference, ReferenceConfig};
use crate::error::{DashboardError, Result};
use crate::types::{RecordTable, UNKNOWN_COUNTRY};
use csv::ReaderBuilder;
use std::collections::HashMap;
use std::fs::File;
use std::path::Path;
use tracing::{info, warn};

/// Bucket for venues whose text carries no recognizable country code.
pub const UNRECOGNIZED_VENUE: &str = "unrecognized";

/// Country code to display name, keyed by the last three characters of the source code column.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CountryReference {
    names: HashMap<String, String>,
}

impl CountryReference {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let names = pairs
            .into_iter()
            .filter_map(|(code, name)| code_suffix(code.as_ref()).map(|code| (code, name.into())))
            .collect();
        Self { names }
    }

    pub fn from_csv(path: &Path, code_column: &str, name_column: &str) -> Result<Self> {
        let unavailable = |reason: String| DashboardError::ReferenceUnavailable { reason };

        let file = File::open(path)
            .map_err(|e| unavailable(format!("failed to open {:?}: {}", path, e)))?;
        let mut rdr = ReaderBuilder::new().trim(csv::Trim::All).from_reader(file);
        let headers = rdr
            .headers()
            .map_err(|e| unavailable(format!("failed to read header of {:?}: {}", path, e)))?
            .clone();

        let code_idx = headers
            .iter()
            .position(|h| h == code_column)
            .ok_or_else(|| unavailable(format!("code column '{}' not found", code_column)))?;
        let name_idx = headers
            .iter()
            .position(|h| h == name_column)
            .ok_or_else(|| unavailable(format!("name column '{}' not found", name_column)))?;

        let mut names = HashMap::new();
        for result in rdr.records() {
            let record = result.map_err(|e| unavailable(e.to_string()))?;
            let (Some(code), Some(name)) = (record.get(code_idx), record.get(name_idx)) else {
                continue;
            };
            if let Some(code) = code_suffix(code) {
                names.insert(code, name.to_string());
            }
        }

        info!(entries = names.len(), ?path, "loaded country reference");
        Ok(Self { names })
    }

    /// Loads the reference, applying the configured policy on failure.
    pub fn load(config: &ReferenceConfig, policy: MissingReference) -> Result<Self> {
        match Self::from_csv(&config.path, &config.code_column, &config.name_column) {
            Ok(reference) => Ok(reference),
            Err(err) if policy == MissingReference::Degrade => {
                warn!(error = %err, "country names degrade to \"{}\"", UNKNOWN_COUNTRY);
                Ok(Self::empty())
            }
            Err(err) => Err(err),
        }
    }

    pub fn name_for(&self, code: &str) -> &str {
        self.names
            .get(code.trim())
            .map(String::as_str)
            .unwrap_or(UNKNOWN_COUNTRY)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Last three characters of a code field. Some reference tables carry a prefix before the code.
fn code_suffix(code: &str) -> Option<String> {
    let chars: Vec<char> = code.trim().chars().collect();
    if chars.len() < 3 {
        return None;
    }
    Some(chars[chars.len() - 3..].iter().collect())
}

/// Returns a copy of `table` with every `country_name` resolved from the nationality code.
pub fn resolve(table: &RecordTable, reference: &CountryReference) -> RecordTable {
    let records = table
        .iter()
        .map(|record| {
            let mut record = record.clone();
            record.country_name = reference.name_for(&record.nationality_code).to_string();
            record
        })
        .collect();
    RecordTable::new(table.gender, records)
}

/// Best-effort country code from a venue such as `"Olympiastadion, Berlin (GER)"`.
///
/// Only a trailing parenthesised group of three ASCII uppercase letters is accepted;
/// anything else yields `None`, which callers bucket as [`UNRECOGNIZED_VENUE`].
pub fn venue_country_code(venue: &str) -> Option<String> {
    let inner = venue.trim().strip_suffix(')')?;
    let open = inner.rfind('(')?;
    let code = inner[open + 1..].trim();
    if code.len() == 3 && code.bytes().all(|b| b.is_ascii_uppercase()) {
        Some(code.to_string())
    } else {
        None
    }
}
