//! Valid-sample bounds of a tile.

use serde::{Deserialize, Serialize};

use tam_common::{BoundingBox, Tile};

use crate::resolution::Resolution;

/// Bounding box and index extrema of a tile's valid samples.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TileBounds {
    /// Extent of the coordinates of valid samples.
    pub bbox: BoundingBox,
    /// First and last latitude index holding a valid sample.
    pub lat_index: (usize, usize),
    /// First and last longitude index holding a valid sample.
    pub lon_index: (usize, usize),
}

/// Exact identity of a [`TileBounds`] extent, usable as a map key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BoundsKey([u64; 4]);

impl TileBounds {
    /// Compute the valid-sample bounds of `tile`.
    ///
    /// Returns `None` when no latitude or no longitude holds a valid sample
    /// with a valid coordinate; such tiles must not be aggregated.
    pub fn extract(tile: &Tile) -> Option<TileBounds> {
        let data = tile.data();
        let [nt, ny, nx] = data.shape();
        let lats = tile.latitudes();
        let lons = tile.longitudes();

        let mut rows = vec![false; ny];
        let mut cols = vec![false; nx];
        for t in 0..nt {
            for y in 0..ny {
                for x in 0..nx {
                    if data.is_valid(t, y, x) {
                        rows[y] = true;
                        cols[x] = true;
                    }
                }
            }
        }

        let (min_row, max_row, min_lat, max_lat) = valid_extent(&rows, lats)?;
        let (min_col, max_col, min_lon, max_lon) = valid_extent(&cols, lons)?;

        Some(TileBounds {
            bbox: BoundingBox::new(min_lat, max_lat, min_lon, max_lon),
            lat_index: (min_row, max_row),
            lon_index: (min_col, max_col),
        })
    }

    pub fn key(&self) -> BoundsKey {
        BoundsKey([
            self.bbox.min_lat.to_bits(),
            self.bbox.max_lat.to_bits(),
            self.bbox.min_lon.to_bits(),
            self.bbox.max_lon.to_bits(),
        ])
    }

    /// Shape `(rows, cols)` of a grid at `resolution` covering the bounds,
    /// both end points included.
    pub fn local_shape(&self, resolution: &Resolution) -> (usize, usize) {
        let steps = |span: f64, res: f64| (span / res).round().max(0.0) as usize + 1;
        (
            steps(self.bbox.lat_span(), resolution.lat),
            steps(self.bbox.lon_span(), resolution.lon),
        )
    }
}

/// Index and coordinate extrema over positions flagged valid that also have
/// a valid coordinate.
fn valid_extent(flags: &[bool], coords: &[Option<f64>]) -> Option<(usize, usize, f64, f64)> {
    let mut extent: Option<(usize, usize, f64, f64)> = None;
    for (i, (flag, coord)) in flags.iter().zip(coords).enumerate() {
        let Some(c) = coord.filter(|_| *flag) else {
            continue;
        };
        extent = Some(match extent {
            None => (i, i, c, c),
            Some((lo, _, min, max)) => (lo, i, min.min(c), max.max(c)),
        });
    }
    extent
}
