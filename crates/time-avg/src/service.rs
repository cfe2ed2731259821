//! High-level time-average service.
//!
//! # Example
//!
//! ```rust,ignore
//! use time_avg::{TimeAverageConfig, TimeAverageService};
//!
//! let service = TimeAverageService::new(index, fetcher, TimeAverageConfig::from_env());
//!
//! let bbox = BoundingBox::new(-10.0, 10.0, -20.0, 20.0);
//! let time = TimeRange::new(start, end);
//! let result = service.compute_time_average(&"sst".into(), bbox, time).await?;
//!
//! result.write_zarr(Path::new("/data/out/sst.zarr"), "val")?;
//! ```

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use serde_json::json;
use tracing::{info, instrument};
use uuid::Uuid;

use tam_common::{BoundingBox, DatasetRef, TimeRange};
use tile_store::{SpatialIndex, TileFetcher};

use crate::aggregate::{build_units, AggregationContext, ParallelAggregator};
use crate::config::TimeAverageConfig;
use crate::error::{Result, TimeAverageError};
use crate::grid::{GlobalGrid, GridSpec};
use crate::partition::{AdaptivePartitioner, QueryVolume};
use crate::prune::{mask_to_bounds, prune};
use crate::reduce::reduce_by_key;
use crate::resolution::{Resolution, ResolutionDiscovery};
use crate::stitch::stitch;
use crate::writer::{GridWriteResult, ZarrGridWriter};

/// Outcome of one time-average run.
#[derive(Debug, Clone)]
pub struct TimeAverageResult {
    pub run_id: Uuid,
    pub dataset: String,
    pub bbox: BoundingBox,
    pub time_range: TimeRange,
    pub grid: GlobalGrid,
    pub resolution: Resolution,
    /// Tiles in the discovered layout, before pruning.
    pub tiles_found: usize,
    pub tiles_after_prune: usize,
    pub compute_units: usize,
    pub elapsed_ms: u64,
}

impl TimeAverageResult {
    /// Write the grid as Zarr, tagging the root group with the run's identity.
    pub fn write_zarr(&self, path: &Path, variable: &str) -> Result<GridWriteResult> {
        ZarrGridWriter::new(variable)
            .with_attribute("run_id", json!(self.run_id.to_string()))
            .with_attribute("dataset", json!(self.dataset))
            .with_attribute("time_range", json!(self.time_range.to_string()))
            .write(&self.grid, path)
    }
}

/// Entry point for time-average computations.
pub struct TimeAverageService {
    index: Arc<dyn SpatialIndex>,
    fetcher: Arc<dyn TileFetcher>,
    config: TimeAverageConfig,
}

impl TimeAverageService {
    pub fn new(
        index: Arc<dyn SpatialIndex>,
        fetcher: Arc<dyn TileFetcher>,
        config: TimeAverageConfig,
    ) -> Self {
        Self {
            index,
            fetcher,
            config,
        }
    }

    pub fn config(&self) -> &TimeAverageConfig {
        &self.config
    }

    /// Write `result` as Zarr under the configured output variable.
    pub fn write_result(&self, result: &TimeAverageResult, path: &Path) -> Result<GridWriteResult> {
        result.write_zarr(path, &self.config.output_variable)
    }

    /// Compute the time-averaged map of `dataset` over `bbox` and `time_range`.
    ///
    /// Any failure aborts the whole computation; partial grids are never
    /// returned.
    #[instrument(skip(self, dataset, bbox, time_range), fields(bbox = %bbox, time = %time_range))]
    pub async fn compute_time_average(
        &self,
        dataset: &DatasetRef,
        bbox: BoundingBox,
        time_range: TimeRange,
    ) -> Result<TimeAverageResult> {
        let started = Instant::now();
        let run_id = Uuid::new_v4();

        self.config.validate().map_err(TimeAverageError::Config)?;
        let dataset = dataset
            .primary()
            .ok_or_else(|| TimeAverageError::invalid_query("empty dataset list"))?;
        QueryVolume::new(bbox, time_range).validate()?;

        info!(%run_id, dataset, "Starting time-average run");

        let partitioner = AdaptivePartitioner::new(self.index.clone(), self.fetcher.clone())
            .with_max_depth(self.config.max_bisection_depth);
        let discovery = ResolutionDiscovery::new(partitioner.clone(), &self.config);

        let resolution = discovery.discover(dataset, &bbox, time_range.end).await?;

        let mut tiles = discovery
            .find_global_tile_set(dataset, &bbox, time_range.end)
            .await?;
        let tiles_found = tiles.len();
        mask_to_bounds(&mut tiles, &bbox);
        let tiles = prune(tiles);
        if tiles.is_empty() {
            return Err(TimeAverageError::no_data(format!(
                "all {} tiles of {} are masked within {}",
                tiles_found, dataset, bbox
            )));
        }

        let units = build_units(&tiles, dataset, &time_range, self.config.num_time_parts);
        let compute_units = units.len();
        info!(
            tiles = tiles_found,
            kept = tiles.len(),
            units = compute_units,
            "Built compute units"
        );
        let tiles_after_prune = tiles.len();
        drop(tiles);

        let context = Arc::new(AggregationContext {
            partitioner,
            resolution,
            window_secs: self.config.unit_window_secs(),
        });
        let partials = ParallelAggregator::new(context, self.config.max_concurrent_units)
            .run(units)
            .await?;

        let reduced = reduce_by_key(partials)?;

        let mut grid = GlobalGrid::new(GridSpec::new(bbox, resolution));
        stitch(&reduced, &mut grid);

        let elapsed_ms = started.elapsed().as_millis() as u64;
        let (nlats, nlons) = grid.shape();
        info!(
            %run_id,
            nlats,
            nlons,
            filled = grid.filled_cells(),
            elapsed_ms,
            "Time-average run complete"
        );

        Ok(TimeAverageResult {
            run_id,
            dataset: dataset.to_string(),
            bbox,
            time_range,
            grid,
            resolution,
            tiles_found,
            tiles_after_prune,
            compute_units,
            elapsed_ms,
        })
    }
}
