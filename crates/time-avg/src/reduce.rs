//! Partial sum/count grids and their combination.

use std::collections::HashMap;

use rayon::prelude::*;
use tracing::debug;

use tam_common::{Tile, TimeRange};

use crate::bounds::{BoundsKey, TileBounds};
use crate::error::{Result, TimeAverageError};
use crate::resolution::Resolution;

/// Running sum and count over the local grid of one set of tile bounds.
///
/// Row 0 is the minimum latitude of the bounds, column 0 the minimum
/// longitude.
#[derive(Debug, Clone, PartialEq)]
pub struct SumCountGrid {
    pub bounds: TileBounds,
    rows: usize,
    cols: usize,
    sum: Vec<f64>,
    count: Vec<u64>,
}

impl SumCountGrid {
    pub fn zeros(bounds: TileBounds, rows: usize, cols: usize) -> Self {
        Self {
            bounds,
            rows,
            cols,
            sum: vec![0.0; rows * cols],
            count: vec![0; rows * cols],
        }
    }

    pub fn key(&self) -> BoundsKey {
        self.bounds.key()
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn sum(&self) -> &[f64] {
        &self.sum
    }

    pub fn count(&self) -> &[u64] {
        &self.count
    }

    /// `(sum, count)` at a local cell.
    pub fn cell(&self, row: usize, col: usize) -> Option<(f64, u64)> {
        (row < self.rows && col < self.cols).then(|| {
            let i = row * self.cols + col;
            (self.sum[i], self.count[i])
        })
    }

    /// Add one valid sample to a local cell. Out-of-range cells are ignored.
    pub fn add(&mut self, row: usize, col: usize, value: f64) -> bool {
        if row >= self.rows || col >= self.cols {
            return false;
        }
        let i = row * self.cols + col;
        self.sum[i] += value;
        self.count[i] += 1;
        true
    }

    pub fn is_fully_masked(&self) -> bool {
        self.count.iter().all(|c| *c == 0)
    }

    /// Accumulate every valid sample of `tile` whose time stamp lies in `window`.
    ///
    /// Samples are placed by coordinate at
    /// `round((coord - bounds_min) / resolution)`; samples that land outside
    /// the local grid are skipped. Returns the number of samples added.
    pub fn accumulate(&mut self, tile: &Tile, window: &TimeRange, resolution: &Resolution) -> usize {
        let data = tile.data();
        let [nt, ny, nx] = data.shape();
        let place = |coord: Option<f64>, min: f64, res: f64, len: usize| {
            let index = ((coord? - min) / res).round();
            (index >= 0.0 && (index as usize) < len).then_some(index as usize)
        };

        let rows: Vec<Option<usize>> = tile
            .latitudes()
            .iter()
            .map(|lat| place(*lat, self.bounds.bbox.min_lat, resolution.lat, self.rows))
            .collect();
        let cols: Vec<Option<usize>> = tile
            .longitudes()
            .iter()
            .map(|lon| place(*lon, self.bounds.bbox.min_lon, resolution.lon, self.cols))
            .collect();

        let mut added = 0;
        for t in 0..nt {
            if !matches!(tile.times()[t], Some(ts) if window.contains(ts)) {
                continue;
            }
            for y in 0..ny {
                let Some(row) = rows[y] else { continue };
                for x in 0..nx {
                    let Some(col) = cols[x] else { continue };
                    if let Some(value) = data.get(t, y, x) {
                        self.add(row, col, value as f64);
                        added += 1;
                    }
                }
            }
        }
        added
    }

    /// Per-cell averages; empty cells are 0 with count 0.
    pub fn averages(&self) -> Vec<f64> {
        self.sum
            .iter()
            .zip(&self.count)
            .map(|(s, c)| if *c > 0 { s / *c as f64 } else { 0.0 })
            .collect()
    }
}

/// Merge two grids of the same bounds key by element-wise addition.
pub fn combine(mut a: SumCountGrid, b: SumCountGrid) -> Result<SumCountGrid> {
    if a.key() != b.key() {
        return Err(TimeAverageError::IncompatibleGrids(format!(
            "bounds {} and {} differ",
            a.bounds.bbox, b.bounds.bbox
        )));
    }
    if a.shape() != b.shape() {
        return Err(TimeAverageError::IncompatibleGrids(format!(
            "shapes {:?} and {:?} differ for bounds {}",
            a.shape(),
            b.shape(),
            a.bounds.bbox
        )));
    }

    for (s, t) in a.sum.iter_mut().zip(&b.sum) {
        *s += t;
    }
    for (c, d) in a.count.iter_mut().zip(&b.count) {
        *c += d;
    }
    Ok(a)
}

/// Combine grids sharing a bounds key, one output grid per distinct key.
///
/// Keys appear in the order they were first seen. Each group is reduced in
/// parallel, so the merge tree shape is left to the thread pool.
pub fn reduce_by_key(grids: Vec<SumCountGrid>) -> Result<Vec<SumCountGrid>> {
    let total = grids.len();
    let mut slots: HashMap<BoundsKey, usize> = HashMap::new();
    let mut groups: Vec<Vec<SumCountGrid>> = Vec::new();
    for grid in grids {
        let slot = *slots.entry(grid.key()).or_insert_with(|| {
            groups.push(Vec::new());
            groups.len() - 1
        });
        groups[slot].push(grid);
    }

    let reduced: Vec<SumCountGrid> = groups
        .into_par_iter()
        .filter_map(|group| {
            group
                .into_par_iter()
                .map(Ok::<_, TimeAverageError>)
                .reduce_with(|a, b| combine(a?, b?))
        })
        .collect::<Result<_>>()?;

    debug!(input = total, output = reduced.len(), "Reduced partial grids");
    Ok(reduced)
}
