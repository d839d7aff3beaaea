//! Request/response pipeline behind each dashboard tab.
//!
//! Every call reloads the record table for the selected gender and recomputes the
//! views from scratch. Only the country reference and the boundary template are
//! held across calls, both read-only.

use crate::aggregation::{
    average_by_group, count_by_country, count_by_nationality, count_by_venue,
    count_by_venue_country, count_map, historic_progression, missing_values, ranking,
    summary_statistics, top, ColumnSummary, Frequency, GroupField, GroupMean, MissingCount,
    NumericField, ProgressionEntry, RankingPoint,
};
use crate::config::AppConfig;
use crate::country::{resolve, CountryReference, UNRECOGNIZED_VENUE};
use crate::data::load_table;
use crate::error::{DashboardError, Result};
use crate::geo_join::{hex, load_boundaries, BoundaryFeature, Choropleth, PALETTE};
use crate::types::{Gender, MapLayer, Record, RecordTable, Tab};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Bounds of the rank and venue sliders.
pub const SLIDER_MIN: usize = 1;
pub const SLIDER_MAX: usize = 100;

const LEADERS: usize = 3;

/// Widget state for one interaction.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub gender: Gender,
    pub tab: Tab,
    pub rank_limit: usize,
    pub venue_limit: usize,
    /// Countries picked in the average-age multiselect.
    pub countries: Vec<String>,
}

impl Selection {
    /// Defaults from the dashboard config for `gender` and `tab`.
    pub fn new(config: &AppConfig, gender: Gender, tab: Tab) -> Self {
        Self {
            gender,
            tab,
            rank_limit: config.dashboard.default_rank_limit,
            venue_limit: config.dashboard.default_venue_limit,
            countries: config.dashboard.default_countries.clone(),
        }
        .clamped()
    }

    pub fn clamped(mut self) -> Self {
        self.rank_limit = self.rank_limit.clamp(SLIDER_MIN, SLIDER_MAX);
        self.venue_limit = self.venue_limit.clamp(SLIDER_MIN, SLIDER_MAX);
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ColumnDoc {
    pub column: &'static str,
    pub description: &'static str,
}

pub const COLUMN_DOCS: &[ColumnDoc] = &[
    ColumnDoc {
        column: "rank",
        description: "position in the all-time top list",
    },
    ColumnDoc {
        column: "mark",
        description: "time in seconds to complete the 100m",
    },
    ColumnDoc {
        column: "competitor",
        description: "full name of the athlete",
    },
    ColumnDoc {
        column: "date_of_birth",
        description: "date of birth of the athlete",
    },
    ColumnDoc {
        column: "nationality_code",
        description: "nationality of the athlete",
    },
    ColumnDoc {
        column: "venue",
        description: "location of the competition",
    },
    ColumnDoc {
        column: "competition_date",
        description: "date of the competition",
    },
    ColumnDoc {
        column: "age",
        description: "age of the athlete when the mark was set (derived)",
    },
    ColumnDoc {
        column: "country_name",
        description: "country of nationality (derived)",
    },
];

#[derive(Debug, Clone, Serialize)]
pub struct IntroView {
    pub title: &'static str,
    pub description: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct DataView {
    pub gender: Gender,
    pub records: Vec<Record>,
    pub columns: &'static [ColumnDoc],
}

#[derive(Debug, Clone, Serialize)]
pub struct EdaView {
    pub gender: Gender,
    pub summary: Vec<ColumnSummary>,
    pub missing: Vec<MissingCount>,
    pub countries: Vec<Frequency>,
    /// Countries with the most marks, at most three.
    pub leaders: Vec<Frequency>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlotsView {
    pub gender: Gender,
    pub progression: Vec<ProgressionEntry>,
    pub ranking: Vec<RankingPoint>,
    pub average_age: Vec<GroupMean>,
    /// Every country offered by the multiselect.
    pub country_options: Vec<String>,
    pub venues: Vec<Frequency>,
    pub busiest_venue: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MapSummary {
    pub layer: MapLayer,
    pub domain: Option<(u64, u64)>,
    pub palette: Vec<String>,
    pub matched_features: usize,
    pub total_features: usize,
    /// Marks whose venue carried no country code. Always zero for the nationality layer.
    pub unrecognized: u64,
    pub leaders: Vec<Frequency>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MapsView {
    pub gender: Gender,
    pub layers: Vec<MapSummary>,
}

/// What the presentation layer draws for one selection.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "tab", rename_all = "lowercase")]
pub enum View {
    Intro(IntroView),
    Data(DataView),
    Eda(EdaView),
    Plots(PlotsView),
    Maps(MapsView),
    /// Zero-state render for a view with nothing to show.
    Empty { message: String },
}

pub struct Dashboard {
    config: AppConfig,
    reference: Arc<CountryReference>,
    boundaries: Option<Arc<Vec<BoundaryFeature>>>,
}

impl Dashboard {
    /// Loads the country reference and boundary template once.
    pub fn open(config: AppConfig) -> Result<Self> {
        let reference = CountryReference::load(
            &config.input.country_reference,
            config.input.missing_reference,
        )?;
        let boundaries = config.input.boundaries.as_ref().map(load_boundaries).transpose()?;
        Ok(Self::with_parts(config, reference, boundaries))
    }

    pub fn with_parts(
        config: AppConfig,
        reference: CountryReference,
        boundaries: Option<Vec<BoundaryFeature>>,
    ) -> Self {
        Self {
            config,
            reference: Arc::new(reference),
            boundaries: boundaries.map(Arc::new),
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn reference(&self) -> &CountryReference {
        &self.reference
    }

    /// Fresh, resolved table for `gender`.
    pub fn table(&self, gender: Gender) -> Result<RecordTable> {
        let table = load_table(&self.config, gender)?;
        Ok(resolve(&table, &self.reference))
    }

    pub fn render(&self, selection: &Selection) -> Result<View> {
        debug!(?selection, "rendering view");
        let view = match selection.tab {
            Tab::Intro => Ok(View::Intro(intro())),
            Tab::Data => self.table(selection.gender).and_then(|t| data_view(t).map(View::Data)),
            Tab::Eda => self.table(selection.gender).and_then(|t| eda_view(&t).map(View::Eda)),
            Tab::Plots => self
                .table(selection.gender)
                .and_then(|t| plots_view(&t, selection).map(View::Plots)),
            Tab::Maps => self.maps_view(selection.gender).map(View::Maps),
        };

        match view {
            Err(DashboardError::EmptyResult { view }) => {
                info!(%view, gender = %selection.gender, "rendering zero state");
                Ok(View::Empty {
                    message: format!("No {} marks to display for {}.", selection.gender, view),
                })
            }
            other => other,
        }
    }

    /// Map export needs a boundary template; without one this fails with `Boundary`.
    pub fn choropleth(&self, gender: Gender, layer: MapLayer) -> Result<Choropleth> {
        let boundaries = self.boundaries.as_deref().ok_or_else(|| DashboardError::Boundary {
            reason: "no boundary file configured".to_string(),
        })?;
        let table = self.table(gender)?;
        Ok(choropleth_for(&table, layer, boundaries).0)
    }

    /// Without a boundary template the summaries still carry counts and domain,
    /// with no features to match.
    fn maps_view(&self, gender: Gender) -> Result<MapsView> {
        let table = self.table(gender)?;
        require_rows(&table, "maps")?;

        let boundaries: &[BoundaryFeature] = match self.boundaries.as_deref() {
            Some(features) => features.as_slice(),
            None => {
                warn!(%gender, "no boundary file configured, map layers have no features");
                &[]
            }
        };

        let mut layers = Vec::new();
        for layer in [MapLayer::Nationality, MapLayer::Venue] {
            let unrecognized = match layer {
                MapLayer::Venue => count_by_venue_country(&table)
                    .iter()
                    .find(|f| f.label == UNRECOGNIZED_VENUE)
                    .map(|f| f.count)
                    .unwrap_or(0),
                MapLayer::Nationality => 0,
            };
            let (choropleth, frequencies) = choropleth_for(&table, layer, boundaries);
            layers.push(MapSummary {
                layer,
                domain: choropleth.scale.domain,
                palette: PALETTE.iter().map(|c| hex(*c)).collect(),
                matched_features: choropleth.matched(),
                total_features: choropleth.features.len(),
                unrecognized,
                leaders: top(&frequencies, LEADERS).to_vec(),
            });
        }

        Ok(MapsView { gender, layers })
    }
}

fn choropleth_for(
    table: &RecordTable,
    layer: MapLayer,
    boundaries: &[BoundaryFeature],
) -> (Choropleth, Vec<Frequency>) {
    let frequencies = layer_frequencies(table, layer);
    let counts = count_map(&frequencies);
    (Choropleth::build(table.gender, layer, &counts, boundaries), frequencies)
}

/// Counts feeding a map layer. The venue layer leaves out the unrecognized bucket.
pub fn layer_frequencies(table: &RecordTable, layer: MapLayer) -> Vec<Frequency> {
    match layer {
        MapLayer::Nationality => count_by_nationality(table),
        MapLayer::Venue => count_by_venue_country(table)
            .into_iter()
            .filter(|f| f.label != UNRECOGNIZED_VENUE)
            .collect(),
    }
}

fn require_rows(table: &RecordTable, view: &str) -> Result<()> {
    if table.is_empty() {
        return Err(DashboardError::EmptyResult {
            view: view.to_string(),
        });
    }
    Ok(())
}

fn intro() -> IntroView {
    IntroView {
        title: "World Athletics: all-time top 100 metres",
        description: "Explore the fastest 100m marks ever recorded: the raw list, \
                      descriptive statistics, the world record progression, \
                      rankings, ages, venues and where the sprinters come from.",
    }
}

pub fn data_view(table: RecordTable) -> Result<DataView> {
    require_rows(&table, "data")?;
    Ok(DataView {
        gender: table.gender,
        records: table.records,
        columns: COLUMN_DOCS,
    })
}

pub fn eda_view(table: &RecordTable) -> Result<EdaView> {
    require_rows(table, "exploratory analysis")?;
    let countries = count_by_country(table);
    Ok(EdaView {
        gender: table.gender,
        summary: summary_statistics(table),
        missing: missing_values(table),
        leaders: top(&countries, LEADERS).to_vec(),
        countries,
    })
}

pub fn plots_view(table: &RecordTable, selection: &Selection) -> Result<PlotsView> {
    require_rows(table, "plots")?;

    let averages = average_by_group(table, GroupField::Country, NumericField::Age);
    let country_options = averages.iter().map(|g| g.group.clone()).collect();
    let average_age = averages
        .into_iter()
        .filter(|g| selection.countries.iter().any(|c| c == &g.group))
        .collect();

    let venues = count_by_venue(table);
    let busiest_venue = venues.first().map(|f| f.label.clone());

    Ok(PlotsView {
        gender: table.gender,
        progression: historic_progression(table),
        ranking: ranking(table, selection.rank_limit),
        average_age,
        country_options,
        venues: top(&venues, selection.venue_limit).to_vec(),
        busiest_venue,
    })
}
