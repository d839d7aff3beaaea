use sprint_atlas::config::AppConfig;
use sprint_atlas::dashboard::layer_frequencies;
use sprint_atlas::{Dashboard, DashboardError, Gender, MapLayer, Selection, Tab, View};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const MEN: &str = r#"[
  {"Rank": 1, "Mark": 9.58, "Competitor": "Usain BOLT", "DOB": "21 AUG 1986", "Nat": "JAM", "Venue": "Olympiastadion, Berlin (GER)", "Date": "16 AUG 2009"},
  {"Rank": 2, "Mark": 9.63, "Competitor": "Usain BOLT", "DOB": "21 AUG 1986", "Nat": "JAM", "Venue": "Olympic Stadium, London (GBR)", "Date": "05 AUG 2012"},
  {"Rank": 3, "Mark": 9.69, "Competitor": "Tyson GAY", "DOB": "09 AUG 1982", "Nat": "USA", "Venue": "Shanghai (CHN)", "Date": "20 SEP 2009"},
  {"Rank": 4, "Mark": 9.72, "Competitor": "Asafa POWELL", "DOB": "23 NOV 1982", "Nat": "JAM", "Venue": "Lausanne (SUI)", "Date": "02 SEP 2008"},
  {"Rank": 5, "Mark": 9.74, "Competitor": "Justin GATLIN", "DOB": "10 FEB 1982", "Nat": "USA", "Venue": "Doha (QAT)", "Date": "15 MAY 2015"},
  {"Rank": 5, "Mark": 9.74, "Competitor": "Justin GATLIN", "DOB": "10 FEB 1982", "Nat": "USA", "Venue": "Doha (QAT)", "Date": "15 MAY 2015"},
  {"Rank": null, "Mark": 9.77, "Competitor": "Unknown ATHLETE", "DOB": null, "Nat": "XXX", "Venue": "Somewhere", "Date": "01 JUN 2006"}
]"#;

const WOMEN: &str = r#"{"Rank": 1, "Mark": 10.49, "Competitor": "Florence GRIFFITH-JOYNER", "DOB": "21 DEC 1959", "Nat": "USA", "Venue": "Indianapolis, IN (USA)", "Date": "16 JUL 1988"}
{"Rank": 2, "Mark": 10.54, "Competitor": "Elaine THOMPSON-HERAH", "DOB": "28 JUN 1992", "Nat": "JAM", "Venue": "Eugene, OR (USA)", "Date": "21 AUG 2021"}
{"Rank": 3, "Mark": 10.60, "Competitor": "Shelly-Ann FRASER-PRYCE", "DOB": "27 DEC 1986", "Nat": "JAM", "Venue": "Lausanne (SUI)", "Date": "26 AUG 2021"}
"#;

const REFERENCE: &str = "Code,National Olympic Committee\nJAM,Jamaica\nUSA,United States\n";

const BOUNDARIES: &str = r#"{
  "type": "FeatureCollection",
  "features": [
    {"type": "Feature", "properties": {"ISO_A3": "USA", "ADMIN": "United States of America"},
     "geometry": {"type": "Polygon", "coordinates": [[[-120,30],[-80,30],[-80,45],[-120,45],[-120,30]]]}},
    {"type": "Feature", "properties": {"ISO_A3": "JAM", "ADMIN": "Jamaica"},
     "geometry": {"type": "Polygon", "coordinates": [[[-78,17],[-76,17],[-76,19],[-78,19],[-78,17]]]}},
    {"type": "Feature", "properties": {"ISO_A3": "FRA", "ADMIN": "France"},
     "geometry": {"type": "Polygon", "coordinates": [[[-4,43],[7,43],[7,50],[-4,50],[-4,43]]]}},
    {"type": "Feature", "properties": {"ISO_A3": "SUI", "ADMIN": "Switzerland"},
     "geometry": {"type": "Polygon", "coordinates": [[[6,46],[10,46],[10,48],[6,48],[6,46]]]}}
  ]
}"#;

fn fixture(women: &str, reference: Option<&str>, policy: &str) -> (TempDir, AppConfig) {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    fs::write(root.join("men.json"), MEN).unwrap();
    fs::write(root.join("women.json"), women).unwrap();
    if let Some(reference) = reference {
        fs::write(root.join("ioc.csv"), reference).unwrap();
    }
    fs::write(root.join("countries.geojson"), BOUNDARIES).unwrap();

    let config = format!(
        r#"
[input]
men = {{ path = "men.json", format = "array" }}
women = {{ path = "women.json", format = "lines" }}
country_reference = {{ path = "ioc.csv" }}
boundaries = {{ path = "countries.geojson" }}
missing_reference = "{policy}"

[output]
width = 72
height = 36
"#
    );
    let path = root.join("config.toml");
    fs::write(&path, config).unwrap();
    let config = AppConfig::load_from_file(&path).unwrap();
    (dir, config)
}

fn open(women: &str) -> (TempDir, Dashboard) {
    let (dir, config) = fixture(women, Some(REFERENCE), "degrade");
    (dir, Dashboard::open(config).unwrap())
}

#[test]
fn tables_are_deduplicated_and_resolved() {
    let (_dir, dashboard) = open(WOMEN);
    let men = dashboard.table(Gender::Men).unwrap();
    assert_eq!(men.len(), 6);
    assert_eq!(men.records[0].country_name, "Jamaica");
    assert_eq!(men.records[0].age, Some(22));
    assert_eq!(men.records[5].country_name, "Unknown");
    assert_eq!(men.records[5].age, None);

    let women = dashboard.table(Gender::Women).unwrap();
    assert_eq!(women.len(), 3);
    assert!(women.records.iter().all(|r| r.country_name != "Unknown"));
}

#[test]
fn reloading_gives_the_same_table() {
    let (_dir, dashboard) = open(WOMEN);
    assert_eq!(
        dashboard.table(Gender::Men).unwrap(),
        dashboard.table(Gender::Men).unwrap()
    );
}

#[test]
fn plots_tab_builds_progression() {
    let (_dir, dashboard) = open(WOMEN);
    let selection = Selection::new(dashboard.config(), Gender::Men, Tab::Plots);
    let View::Plots(plots) = dashboard.render(&selection).unwrap() else {
        panic!("expected plots view");
    };

    let progression: Vec<(String, f64)> = plots
        .progression
        .iter()
        .map(|e| (e.date.to_string(), e.mark))
        .collect();
    assert_eq!(
        progression,
        vec![
            ("2006-06-01".to_string(), 9.77),
            ("2008-09-02".to_string(), 9.72),
            ("2009-08-16".to_string(), 9.58),
        ]
    );
    assert_eq!(plots.ranking.len(), 6);
    assert_eq!(plots.average_age.len(), 2);
}

#[test]
fn maps_tab_summarizes_both_layers() {
    let (_dir, dashboard) = open(WOMEN);
    let selection = Selection::new(dashboard.config(), Gender::Men, Tab::Maps);
    let View::Maps(maps) = dashboard.render(&selection).unwrap() else {
        panic!("expected maps view");
    };

    let nationality = &maps.layers[0];
    assert_eq!(nationality.layer, MapLayer::Nationality);
    assert_eq!(nationality.domain, Some((1, 3)));
    assert_eq!(nationality.matched_features, 2);
    assert_eq!(nationality.total_features, 4);

    let venue = &maps.layers[1];
    assert_eq!(venue.unrecognized, 1);
    assert_eq!(venue.matched_features, 1);
}

#[test]
fn choropleth_is_a_left_join_over_boundaries() {
    let (_dir, dashboard) = open(WOMEN);
    let choropleth = dashboard.choropleth(Gender::Men, MapLayer::Nationality).unwrap();
    let by_code: Vec<(&str, u64)> = choropleth
        .features
        .iter()
        .map(|f| (f.code.as_str(), f.frequency))
        .collect();
    assert_eq!(by_code, vec![("USA", 2), ("JAM", 3), ("FRA", 0), ("SUI", 0)]);

    let table = dashboard.table(Gender::Men).unwrap();
    let counts = layer_frequencies(&table, MapLayer::Nationality);
    assert_eq!(counts.iter().map(|f| f.count).sum::<u64>(), table.len() as u64);
}

#[test]
fn maps_tab_without_boundaries_still_counts() {
    let (_dir, mut config) = fixture(WOMEN, Some(REFERENCE), "degrade");
    config.input.boundaries = None;
    let dashboard = Dashboard::open(config).unwrap();

    let selection = Selection::new(dashboard.config(), Gender::Men, Tab::Maps);
    let View::Maps(maps) = dashboard.render(&selection).unwrap() else {
        panic!("expected maps view");
    };
    let nationality = &maps.layers[0];
    assert_eq!(nationality.domain, Some((1, 3)));
    assert_eq!(nationality.matched_features, 0);
    assert_eq!(nationality.total_features, 0);
    assert_eq!(nationality.leaders[0].label, "JAM");

    assert!(matches!(
        dashboard.choropleth(Gender::Men, MapLayer::Nationality),
        Err(DashboardError::Boundary { .. })
    ));
}

#[test]
fn maps_are_written_to_disk() {
    let (dir, dashboard) = open(WOMEN);
    let choropleth = dashboard.choropleth(Gender::Women, MapLayer::Venue).unwrap();
    let out = dir.path().join("maps");
    let (png, geojson) = sprint_atlas::render::write_map(&choropleth, &out, 72, 36).unwrap();
    assert!(Path::new(&png).exists());
    let text = fs::read_to_string(geojson).unwrap();
    let collection: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(collection["features"].as_array().unwrap().len(), 4);
}

#[test]
fn empty_source_renders_zero_state() {
    let (_dir, dashboard) = open("");
    let selection = Selection::new(dashboard.config(), Gender::Women, Tab::Data);
    assert!(matches!(dashboard.render(&selection).unwrap(), View::Empty { .. }));
}

#[test]
fn malformed_source_aborts_the_render() {
    let broken = r#"{"Rank": 1, "Mark": 10.49, "Competitor": "X", "DOB": "??", "Nat": "USA", "Venue": "Y", "Date": "16 JUL 1988"}"#;
    let (_dir, dashboard) = open(broken);
    let selection = Selection::new(dashboard.config(), Gender::Women, Tab::Eda);
    assert!(matches!(dashboard.render(&selection), Err(DashboardError::Parse { .. })));
    // The other gender is unaffected.
    let selection = Selection::new(dashboard.config(), Gender::Men, Tab::Eda);
    assert!(matches!(dashboard.render(&selection).unwrap(), View::Eda(_)));
}

#[test]
fn missing_reference_follows_policy() {
    let (_dir, config) = fixture(WOMEN, None, "degrade");
    let dashboard = Dashboard::open(config).unwrap();
    let men = dashboard.table(Gender::Men).unwrap();
    assert!(men.records.iter().all(|r| r.country_name == "Unknown"));

    let (_dir, config) = fixture(WOMEN, None, "abort");
    assert!(matches!(
        Dashboard::open(config),
        Err(DashboardError::ReferenceUnavailable { .. })
    ));
}
