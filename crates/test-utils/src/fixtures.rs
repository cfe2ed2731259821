//! Tile fixtures for tests.
//!
//! Tiles built here sit on a regular grid: sample centers start at the given
//! origin and step by the given resolution. Descriptor bounding boxes span
//! the sample centers.

use tam_common::{
    BoundingBox, MaskedCube, Tile, TileDescriptor, TileStats, TimeRange, SECONDS_PER_DAY,
};

use crate::generators::{constant_cube, regular_axis};

/// Dataset name used throughout the test suite.
pub const ALPHA: &str = "alpha";

/// Midnight 2016-01-01 UTC.
pub const EPOCH_2016: i64 = 1_451_606_400;

pub const DAY: i64 = SECONDS_PER_DAY;

/// Geometry of a synthetic tile.
#[derive(Debug, Clone, Copy)]
pub struct TileGeometry {
    /// Center of the first (lowest) latitude sample.
    pub lat0: f64,
    /// Center of the first (lowest) longitude sample.
    pub lon0: f64,
    pub ny: usize,
    pub nx: usize,
    pub resolution: f64,
}

impl TileGeometry {
    pub fn new(lat0: f64, lon0: f64, ny: usize, nx: usize, resolution: f64) -> Self {
        Self {
            lat0,
            lon0,
            ny,
            nx,
            resolution,
        }
    }

    /// Extent of the sample centers.
    pub fn bbox(&self) -> BoundingBox {
        BoundingBox::new(
            self.lat0,
            self.lat0 + (self.ny.saturating_sub(1)) as f64 * self.resolution,
            self.lon0,
            self.lon0 + (self.nx.saturating_sub(1)) as f64 * self.resolution,
        )
    }
}

/// Build a tile from explicit samples laid out `[time, lat, lon]`.
pub fn tile_from_samples(
    id: &str,
    dataset: &str,
    geometry: TileGeometry,
    times: &[i64],
    samples: &[Option<f32>],
) -> Tile {
    let shape = [times.len(), geometry.ny, geometry.nx];
    let data = MaskedCube::from_options(shape, samples).expect("sample count matches geometry");

    let valid: Vec<f64> = samples.iter().flatten().map(|v| *v as f64).collect();
    let stats = if valid.is_empty() {
        TileStats::default()
    } else {
        TileStats {
            min: valid.iter().cloned().fold(f64::INFINITY, f64::min),
            max: valid.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
            mean: valid.iter().sum::<f64>() / valid.len() as f64,
            count: valid.len() as u64,
        }
    };

    let descriptor = TileDescriptor {
        tile_id: id.to_string(),
        dataset: dataset.to_string(),
        granule: Some(format!("{}_granule.nc", dataset)),
        section_spec: None,
        bbox: geometry.bbox(),
        time_range: TimeRange::new(
            times.iter().copied().min().unwrap_or(0),
            times.iter().copied().max().unwrap_or(0),
        ),
        stats,
    };

    Tile::new(
        descriptor,
        regular_axis(geometry.lat0, geometry.resolution, geometry.ny),
        regular_axis(geometry.lon0, geometry.resolution, geometry.nx),
        times.iter().map(|t| Some(*t)).collect(),
        data,
    )
    .expect("coordinate lengths match cube shape")
}

/// A single-time tile holding `value` in every sample.
pub fn uniform_tile(id: &str, dataset: &str, geometry: TileGeometry, time: i64, value: f32) -> Tile {
    let samples = constant_cube(geometry.ny * geometry.nx, value);
    tile_from_samples(id, dataset, geometry, &[time], &samples)
}

/// A single-time tile in which every sample is masked.
pub fn fully_masked_tile(id: &str, dataset: &str, geometry: TileGeometry, time: i64) -> Tile {
    let samples = vec![None; geometry.ny * geometry.nx];
    tile_from_samples(id, dataset, geometry, &[time], &samples)
}

/// The same spatial tile repeated once per entry of `times`, one value each.
///
/// Tile ids are `"{prefix}-{i}"`.
pub fn daily_series(
    prefix: &str,
    dataset: &str,
    geometry: TileGeometry,
    times: &[i64],
    values: &[f32],
) -> Vec<Tile> {
    times
        .iter()
        .zip(values)
        .enumerate()
        .map(|(i, (time, value))| {
            uniform_tile(&format!("{}-{}", prefix, i), dataset, geometry, *time, *value)
        })
        .collect()
}

/// A `rows x cols` mosaic of disjoint, single-time tiles covering a box whose
/// lower-left corner is `(lat_min, lon_min)`.
///
/// Each tile has `size x size` samples at `resolution`; the tile in row `r`,
/// column `c` holds value `r * cols + c`.
pub fn tile_mosaic(
    dataset: &str,
    lat_min: f64,
    lon_min: f64,
    rows: usize,
    cols: usize,
    size: usize,
    resolution: f64,
    time: i64,
) -> Vec<Tile> {
    let span = size as f64 * resolution;
    let mut tiles = Vec::with_capacity(rows * cols);
    for r in 0..rows {
        for c in 0..cols {
            let geometry = TileGeometry::new(
                lat_min + r as f64 * span + resolution / 2.0,
                lon_min + c as f64 * span + resolution / 2.0,
                size,
                size,
                resolution,
            );
            tiles.push(uniform_tile(
                &format!("mosaic-{}-{}-{}", r, c, time),
                dataset,
                geometry,
                time,
                (r * cols + c) as f32,
            ));
        }
    }
    tiles
}
