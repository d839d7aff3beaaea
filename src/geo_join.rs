use crate::config::BoundaryConfig;
use crate::error::{DashboardError, Result};
use crate::types::{Gender, MapLayer};
use geo::MultiPolygon;
use geojson::{Feature, FeatureCollection, GeoJson, JsonObject};
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::info;

pub type Rgb = [u8; 3];

/// Fill for features with no marks. Not part of the palette.
pub const UNMATCHED: Rgb = [128, 128, 128];

/// lightcyan, lightblue, steelblue, blue.
pub const PALETTE: [Rgb; 4] = [[224, 255, 255], [173, 216, 230], [70, 130, 180], [0, 0, 255]];

/// A country boundary. `frequency` is zero until [`join_frequencies`] annotates it.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundaryFeature {
    pub code: String,
    pub name: String,
    pub geometry: MultiPolygon<f64>,
    pub frequency: u64,
}

pub fn load_boundaries(config: &BoundaryConfig) -> Result<Vec<BoundaryFeature>> {
    let extension = config
        .path
        .extension()
        .and_then(|e| e.to_str())
        .map(|s| s.to_lowercase())
        .ok_or_else(|| boundary_error(format!("{:?} has no extension", config.path)))?;

    let features = match extension.as_str() {
        "shp" => load_shapefile(&config.path, &config.code_property, &config.name_property)?,
        "json" | "geojson" => {
            load_geojson(&config.path, &config.code_property, &config.name_property)?
        }
        _ => return Err(boundary_error(format!("unsupported geometry format: {}", extension))),
    };

    info!(features = features.len(), path = ?config.path, "loaded boundary features");
    Ok(features)
}

fn boundary_error(reason: impl Into<String>) -> DashboardError {
    DashboardError::Boundary {
        reason: reason.into(),
    }
}

fn load_geojson(
    path: &Path,
    code_property: &str,
    name_property: &str,
) -> Result<Vec<BoundaryFeature>> {
    let file = File::open(path).map_err(|e| DashboardError::io(path, e))?;
    let geojson = GeoJson::from_reader(BufReader::new(file))
        .map_err(|e| boundary_error(format!("failed to parse {:?}: {}", path, e)))?;
    features_from_geojson(geojson, code_property, name_property)
}

/// Every feature is kept, including those without polygons, so the join covers the whole map.
pub fn features_from_geojson(
    geojson: GeoJson,
    code_property: &str,
    name_property: &str,
) -> Result<Vec<BoundaryFeature>> {
    let collection = match geojson {
        GeoJson::FeatureCollection(fc) => fc,
        _ => return Err(boundary_error("boundary GeoJSON must be a FeatureCollection")),
    };

    let mut features = Vec::with_capacity(collection.features.len());
    for feature in collection.features {
        let code = property_text(&feature, code_property).unwrap_or_default();
        let name = property_text(&feature, name_property).unwrap_or_else(|| code.clone());

        let geometry = match feature.geometry {
            Some(geom) => {
                let geometry: geo::Geometry<f64> = geom.value.try_into().map_err(|e| {
                    boundary_error(format!("failed to convert geometry of {}: {:?}", code, e))
                })?;
                match geometry {
                    geo::Geometry::MultiPolygon(mp) => mp,
                    geo::Geometry::Polygon(p) => MultiPolygon::new(vec![p]),
                    _ => MultiPolygon::new(vec![]),
                }
            }
            None => MultiPolygon::new(vec![]),
        };

        features.push(BoundaryFeature {
            code,
            name,
            geometry,
            frequency: 0,
        });
    }
    Ok(features)
}

fn property_text(feature: &Feature, key: &str) -> Option<String> {
    match feature.properties.as_ref()?.get(key)? {
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn load_shapefile(
    path: &Path,
    code_property: &str,
    name_property: &str,
) -> Result<Vec<BoundaryFeature>> {
    let mut reader = shapefile::Reader::from_path(path)
        .map_err(|e| boundary_error(format!("failed to open shapefile {:?}: {}", path, e)))?;

    let mut features = Vec::new();
    for result in reader.iter_shapes_and_records() {
        let (shape, record) = result.map_err(|e| boundary_error(e.to_string()))?;

        let text = |key: &str| match record.get(key) {
            Some(shapefile::dbase::FieldValue::Character(Some(s))) => Some(s.trim().to_string()),
            _ => None,
        };
        let code = text(code_property).unwrap_or_default();
        let name = text(name_property).unwrap_or_else(|| code.clone());

        let geometry: MultiPolygon<f64> = match shape {
            shapefile::Shape::Polygon(polygon) => polygon
                .try_into()
                .map_err(|e| boundary_error(format!("failed to convert polygon: {:?}", e)))?,
            shapefile::Shape::PolygonM(polygon) => polygon
                .try_into()
                .map_err(|e| boundary_error(format!("failed to convert polygonM: {:?}", e)))?,
            shapefile::Shape::PolygonZ(polygon) => polygon
                .try_into()
                .map_err(|e| boundary_error(format!("failed to convert polygonZ: {:?}", e)))?,
            _ => MultiPolygon::new(vec![]),
        };

        features.push(BoundaryFeature {
            code,
            name,
            geometry,
            frequency: 0,
        });
    }
    Ok(features)
}

/// Left join of `counts` onto `features`: every feature appears once, in input order,
/// with its count or zero.
pub fn join_frequencies(
    counts: &HashMap<String, u64>,
    features: &[BoundaryFeature],
) -> Vec<BoundaryFeature> {
    features
        .iter()
        .map(|feature| BoundaryFeature {
            frequency: counts.get(&feature.code).copied().unwrap_or(0),
            ..feature.clone()
        })
        .collect()
}

/// Linear colour scale over the counts that fed the join.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ColorScale {
    /// `[min, max]` of the input counts; `None` when there were none.
    pub domain: Option<(u64, u64)>,
}

impl ColorScale {
    pub fn from_counts(counts: &HashMap<String, u64>) -> Self {
        let min = counts.values().copied().min();
        let max = counts.values().copied().max();
        Self {
            domain: min.zip(max),
        }
    }

    /// Zero is unmatched and painted [`UNMATCHED`]; other values are clamped into the
    /// domain. A single-valued domain paints the first palette stop.
    pub fn color_for(&self, frequency: u64) -> Rgb {
        let Some((min, max)) = self.domain else {
            return UNMATCHED;
        };
        if frequency == 0 {
            return UNMATCHED;
        }
        if max == min {
            return PALETTE[0];
        }

        let clamped = frequency.clamp(min, max);
        let t = (clamped - min) as f64 / (max - min) as f64;
        let segments = (PALETTE.len() - 1) as f64;
        let pos = t * segments;
        let i = (pos.floor() as usize).min(PALETTE.len() - 2);
        let local = pos - i as f64;

        let (a, b) = (PALETTE[i], PALETTE[i + 1]);
        let mut out = [0u8; 3];
        for c in 0..3 {
            out[c] = (a[c] as f64 + (b[c] as f64 - a[c] as f64) * local).round() as u8;
        }
        out
    }
}

pub fn hex(rgb: Rgb) -> String {
    format!("#{:02x}{:02x}{:02x}", rgb[0], rgb[1], rgb[2])
}

/// Boundary features annotated for one map render.
#[derive(Debug, Clone)]
pub struct Choropleth {
    pub gender: Gender,
    pub layer: MapLayer,
    pub features: Vec<BoundaryFeature>,
    pub scale: ColorScale,
}

impl Choropleth {
    pub fn build(
        gender: Gender,
        layer: MapLayer,
        counts: &HashMap<String, u64>,
        boundaries: &[BoundaryFeature],
    ) -> Self {
        Self {
            gender,
            layer,
            features: join_frequencies(counts, boundaries),
            scale: ColorScale::from_counts(counts),
        }
    }

    pub fn matched(&self) -> usize {
        self.features.iter().filter(|f| f.frequency > 0).count()
    }

    pub fn fill(&self, feature: &BoundaryFeature) -> Rgb {
        self.scale.color_for(feature.frequency)
    }

    pub fn to_geojson(&self) -> FeatureCollection {
        let features = self
            .features
            .iter()
            .map(|f| {
                let mut properties = JsonObject::new();
                properties.insert("code".into(), JsonValue::from(f.code.clone()));
                properties.insert("name".into(), JsonValue::from(f.name.clone()));
                properties.insert("frequency".into(), JsonValue::from(f.frequency));
                properties.insert("fill".into(), JsonValue::from(hex(self.fill(f))));
                properties.insert("matched".into(), JsonValue::from(f.frequency > 0));

                let geometry = if f.geometry.0.is_empty() {
                    None
                } else {
                    Some(geojson::Geometry::new(geojson::Value::from(&f.geometry)))
                };

                Feature {
                    bbox: None,
                    geometry,
                    id: None,
                    properties: Some(properties),
                    foreign_members: None,
                }
            })
            .collect();

        FeatureCollection {
            bbox: None,
            features,
            foreign_members: None,
        }
    }
}
