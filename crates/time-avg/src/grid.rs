//! The global output grid.

use serde::{Deserialize, Serialize};

use tam_common::BoundingBox;

use crate::resolution::Resolution;

/// Tolerance added before flooring a coordinate to a cell index.
const OFFSET_EPSILON: f64 = 1e-6;

/// Geometry of the global grid: cell centers at the native resolution
/// covering the request box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridSpec {
    pub bbox: BoundingBox,
    pub resolution: Resolution,
    /// Center of the first latitude row.
    pub min_lat_center: f64,
    /// Center of the first longitude column.
    pub min_lon_center: f64,
    pub nlats: usize,
    pub nlons: usize,
}

impl GridSpec {
    pub fn new(bbox: BoundingBox, resolution: Resolution) -> Self {
        let min_lat_center = bbox.min_lat + resolution.lat / 2.0;
        let min_lon_center = bbox.min_lon + resolution.lon / 2.0;
        let count = |max: f64, min_center: f64, res: f64| {
            ((max - min_center) / res).trunc().max(0.0) as usize + 1
        };

        Self {
            bbox,
            resolution,
            min_lat_center,
            min_lon_center,
            nlats: count(bbox.max_lat, min_lat_center, resolution.lat),
            nlons: count(bbox.max_lon, min_lon_center, resolution.lon),
        }
    }

    /// Shape `(rows, cols)`, latitude first.
    pub fn shape(&self) -> (usize, usize) {
        (self.nlats, self.nlons)
    }

    pub fn len(&self) -> usize {
        self.nlats * self.nlons
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Row offset of a latitude, possibly outside the grid.
    pub fn lat_offset(&self, lat: f64) -> i64 {
        ((lat - self.min_lat_center) / self.resolution.lat + OFFSET_EPSILON).floor() as i64
    }

    /// Column offset of a longitude, possibly outside the grid.
    pub fn lon_offset(&self, lon: f64) -> i64 {
        ((lon - self.min_lon_center) / self.resolution.lon + OFFSET_EPSILON).floor() as i64
    }

    /// Latitudes of the row centers, evenly spaced from the first to the last.
    pub fn latitudes(&self) -> Vec<f64> {
        linspace(self.min_lat_center, self.resolution.lat, self.nlats)
    }

    /// Longitudes of the column centers.
    pub fn longitudes(&self) -> Vec<f64> {
        linspace(self.min_lon_center, self.resolution.lon, self.nlons)
    }
}

fn linspace(first: f64, step: f64, n: usize) -> Vec<f64> {
    let last = first + (n.saturating_sub(1)) as f64 * step;
    if n <= 1 {
        return vec![first; n];
    }
    (0..n)
        .map(|i| first + (last - first) * i as f64 / (n - 1) as f64)
        .collect()
}

/// One output cell; `cnt == 0` marks an empty cell whose `avg` is 0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridCell {
    pub avg: f64,
    pub cnt: u64,
}

/// Dense `(average, count)` grid over the request box, row-major with
/// latitude rows.
#[derive(Debug, Clone, PartialEq)]
pub struct GlobalGrid {
    spec: GridSpec,
    averages: Vec<f64>,
    counts: Vec<u64>,
}

impl GlobalGrid {
    /// An all-empty grid.
    pub fn new(spec: GridSpec) -> Self {
        Self {
            spec,
            averages: vec![0.0; spec.len()],
            counts: vec![0; spec.len()],
        }
    }

    pub fn spec(&self) -> &GridSpec {
        &self.spec
    }

    pub fn shape(&self) -> (usize, usize) {
        self.spec.shape()
    }

    fn offset(&self, row: usize, col: usize) -> Option<usize> {
        (row < self.spec.nlats && col < self.spec.nlons).then(|| row * self.spec.nlons + col)
    }

    pub fn get(&self, row: usize, col: usize) -> Option<GridCell> {
        self.offset(row, col).map(|i| GridCell {
            avg: self.averages[i],
            cnt: self.counts[i],
        })
    }

    /// Overwrite a cell. Out-of-range positions are ignored.
    pub fn set(&mut self, row: usize, col: usize, cell: GridCell) -> bool {
        match self.offset(row, col) {
            Some(i) => {
                self.averages[i] = cell.avg;
                self.counts[i] = cell.cnt;
                true
            }
            None => false,
        }
    }

    pub fn averages(&self) -> &[f64] {
        &self.averages
    }

    pub fn counts(&self) -> &[u64] {
        &self.counts
    }

    /// Averages with empty cells as NaN.
    pub fn masked_averages(&self) -> Vec<f64> {
        self.averages
            .iter()
            .zip(&self.counts)
            .map(|(avg, cnt)| if *cnt > 0 { *avg } else { f64::NAN })
            .collect()
    }

    /// Number of cells with at least one sample.
    pub fn filled_cells(&self) -> usize {
        self.counts.iter().filter(|c| **c > 0).count()
    }

    /// Cells as nested rows, one row per latitude.
    pub fn to_results(&self) -> Vec<Vec<GridCell>> {
        (0..self.spec.nlats)
            .map(|row| {
                (0..self.spec.nlons)
                    .filter_map(|col| self.get(row, col))
                    .collect()
            })
            .collect()
    }
}
