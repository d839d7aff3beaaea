use crate::error::{DashboardError, Result};
use crate::geo_join::{Choropleth, Rgb};
use geo::algorithm::bounding_rect::BoundingRect;
use geo::algorithm::contains::Contains;
use geo::Point;
use image::{ImageBuffer, ImageFormat, Rgba, RgbaImage};
use rayon::prelude::*;
use rstar::{RTree, RTreeObject, AABB};
use std::fs::{self, File};
use std::io::{BufWriter, Cursor};
use std::path::{Path, PathBuf};
use tracing::info;

const BACKGROUND: Rgba<u8> = Rgba([255, 255, 255, 255]);
const FILL_OPACITY: f64 = 0.8;

// Wrapper for RTree indexing
struct FeatureIndex {
    index: usize,
    aabb: AABB<[f64; 2]>,
}

impl RTreeObject for FeatureIndex {
    type Envelope = AABB<[f64; 2]>;
    fn envelope(&self) -> Self::Envelope {
        self.aabb
    }
}

/// Rasterises the choropleth onto an equirectangular world map.
pub fn render_png(choropleth: &Choropleth, width: u32, height: u32) -> Result<RgbaImage> {
    if width == 0 || height == 0 {
        return Err(DashboardError::Render {
            reason: format!("invalid image size {}x{}", width, height),
        });
    }

    let items: Vec<FeatureIndex> = choropleth
        .features
        .iter()
        .enumerate()
        .filter_map(|(index, feature)| {
            let rect = feature.geometry.bounding_rect()?;
            Some(FeatureIndex {
                index,
                aabb: AABB::from_corners(
                    [rect.min().x, rect.min().y],
                    [rect.max().x, rect.max().y],
                ),
            })
        })
        .collect();
    let tree = RTree::bulk_load(items);

    let rows: Vec<Vec<Rgba<u8>>> = (0..height)
        .into_par_iter()
        .map(|py| {
            (0..width)
                .map(|px| {
                    let (lon, lat) = pixel_to_lon_lat(px, py, width, height);
                    let point = Point::new(lon, lat);
                    tree.locate_in_envelope_intersecting(&AABB::from_point([lon, lat]))
                        .map(|candidate| &choropleth.features[candidate.index])
                        .find(|feature| feature.geometry.contains(&point))
                        .map(|feature| blend(choropleth.fill(feature)))
                        .unwrap_or(BACKGROUND)
                })
                .collect()
        })
        .collect();

    let mut img: RgbaImage = ImageBuffer::from_pixel(width, height, BACKGROUND);
    for (py, row) in rows.into_iter().enumerate() {
        for (px, pixel) in row.into_iter().enumerate() {
            img.put_pixel(px as u32, py as u32, pixel);
        }
    }
    Ok(img)
}

pub fn encode_png(img: &RgbaImage) -> Result<Vec<u8>> {
    let mut bytes = Cursor::new(Vec::new());
    img.write_to(&mut bytes, ImageFormat::Png)
        .map_err(|e| DashboardError::Render { reason: e.to_string() })?;
    Ok(bytes.into_inner())
}

/// Writes `<gender>_<layer>.png` and `<gender>_<layer>.geojson` into `dir`.
pub fn write_map(
    choropleth: &Choropleth,
    dir: &Path,
    width: u32,
    height: u32,
) -> Result<(PathBuf, PathBuf)> {
    fs::create_dir_all(dir).map_err(|e| DashboardError::io(dir, e))?;
    let stem = format!("{}_{}", choropleth.gender, choropleth.layer);

    let png_path = dir.join(format!("{}.png", stem));
    let img = render_png(choropleth, width, height)?;
    img.save(&png_path).map_err(|e| DashboardError::Render {
        reason: format!("failed to save {:?}: {}", png_path, e),
    })?;

    let geojson_path = dir.join(format!("{}.geojson", stem));
    let file = File::create(&geojson_path).map_err(|e| DashboardError::io(&geojson_path, e))?;
    serde_json::to_writer(BufWriter::new(file), &choropleth.to_geojson()).map_err(|e| {
        DashboardError::Render {
            reason: format!("failed to write {:?}: {}", geojson_path, e),
        }
    })?;

    info!(png = ?png_path, geojson = ?geojson_path, matched = choropleth.matched(), "wrote map");
    Ok((png_path, geojson_path))
}

/// Pixel centre to (lon, lat) in an equirectangular projection.
fn pixel_to_lon_lat(px: u32, py: u32, width: u32, height: u32) -> (f64, f64) {
    let lon = -180.0 + (px as f64 + 0.5) / width as f64 * 360.0;
    let lat = 90.0 - (py as f64 + 0.5) / height as f64 * 180.0;
    (lon, lat)
}

fn blend(rgb: Rgb) -> Rgba<u8> {
    let mix = |c: u8| (c as f64 * FILL_OPACITY + 255.0 * (1.0 - FILL_OPACITY)).round() as u8;
    Rgba([mix(rgb[0]), mix(rgb[1]), mix(rgb[2]), 255])
}
