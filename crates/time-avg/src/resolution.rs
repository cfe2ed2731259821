//! Native grid spacing and tile layout discovery.
//!
//! Both searches walk a fixed-length trailing window ending at the request's
//! end time and step one window further into the past until they find what
//! they need. The number of steps is bounded.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use tam_common::{BoundingBox, Tile, TimeRange};

use crate::config::TimeAverageConfig;
use crate::error::{Result, TimeAverageError};
use crate::partition::{AdaptivePartitioner, Axis};

/// Native latitude/longitude spacing of a dataset, in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    pub lat: f64,
    pub lon: f64,
}

impl Resolution {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} x {}", self.lat, self.lon)
    }
}

/// Spacing of the first adjacent pair of valid coordinates at least
/// `min_resolution` apart.
pub fn native_spacing(coords: &[Option<f64>], min_resolution: f64) -> Option<f64> {
    coords.windows(2).find_map(|pair| match pair {
        [Some(a), Some(b)] => {
            let step = (b - a).abs();
            (step >= min_resolution).then_some(step)
        }
        _ => None,
    })
}

/// Probes recent time windows of a dataset.
pub struct ResolutionDiscovery {
    partitioner: AdaptivePartitioner,
    window_secs: i64,
    max_lookback_windows: usize,
    min_resolution: f64,
}

impl ResolutionDiscovery {
    pub fn new(partitioner: AdaptivePartitioner, config: &TimeAverageConfig) -> Self {
        Self {
            partitioner,
            window_secs: config.discovery_window_secs,
            max_lookback_windows: config.max_lookback_windows,
            min_resolution: config.min_resolution,
        }
    }

    /// Windows visited by a search ending at `end_time`, newest first.
    pub fn search_windows(&self, end_time: i64) -> impl Iterator<Item = TimeRange> + '_ {
        let first = TimeRange::trailing(end_time, self.window_secs);
        (0..self.max_lookback_windows)
            .map(move |step| first.shifted_back(self.window_secs.saturating_mul(step as i64)))
    }

    /// Discover the native grid spacing near `region`.
    ///
    /// Each axis is resolved independently from the first tile that has two
    /// adjacent valid coordinates on it. Fails with `NoData` if the lookback
    /// is exhausted before both axes are resolved.
    #[instrument(skip(self, region), fields(region = %region))]
    pub async fn discover(
        &self,
        dataset: &str,
        region: &BoundingBox,
        end_time: i64,
    ) -> Result<Resolution> {
        let mut lat = None;
        let mut lon = None;

        for window in self.search_windows(end_time) {
            let tiles = self
                .partitioner
                .query(region, dataset, &window, Axis::Lat)
                .await?;
            debug!(window = %window, tiles = tiles.len(), "Probing window for resolution");

            for tile in &tiles {
                if lat.is_none() {
                    lat = native_spacing(tile.latitudes(), self.min_resolution);
                }
                if lon.is_none() {
                    lon = native_spacing(tile.longitudes(), self.min_resolution);
                }
            }

            if let (Some(lat), Some(lon)) = (lat, lon) {
                let resolution = Resolution::new(lat, lon);
                info!(resolution = %resolution, "Discovered native resolution");
                return Ok(resolution);
            }
        }

        Err(TimeAverageError::no_data(format!(
            "no tile of {} with two adjacent valid coordinates in {} windows before {}",
            dataset, self.max_lookback_windows, end_time
        )))
    }

    /// Find the spatial tile layout of `dataset` within `bounds`.
    ///
    /// Returns the tiles of the most recent window, ending at or before
    /// `end_time`, that holds any tile at all.
    #[instrument(skip(self, bounds), fields(bounds = %bounds))]
    pub async fn find_global_tile_set(
        &self,
        dataset: &str,
        bounds: &BoundingBox,
        end_time: i64,
    ) -> Result<Vec<Tile>> {
        for window in self.search_windows(end_time) {
            let tiles = self
                .partitioner
                .query(bounds, dataset, &window, Axis::Lat)
                .await?;
            if !tiles.is_empty() {
                info!(window = %window, tiles = tiles.len(), "Found global tile set");
                return Ok(tiles);
            }
        }

        Err(TimeAverageError::no_data(format!(
            "no tiles of {} in {} within {} windows before {}",
            dataset, bounds, self.max_lookback_windows, end_time
        )))
    }
}
