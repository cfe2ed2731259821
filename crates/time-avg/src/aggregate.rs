//! The map step: independent compute units producing partial grids.
//!
//! Each unit covers the valid bounds of one tile layout position over one
//! coarse time partition. It walks its partition in sequential windows,
//! re-queries the store for each window and accumulates a local sum/count
//! grid. Units share nothing but a read-only [`AggregationContext`].

use std::collections::HashSet;
use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{debug, info, instrument};

use tam_common::{BoundingBox, Tile, TimeRange};

use crate::bounds::TileBounds;
use crate::error::Result;
use crate::partition::{AdaptivePartitioner, Axis};
use crate::reduce::SumCountGrid;
use crate::resolution::Resolution;

/// One schedulable (tile bounds x time partition) aggregation task.
#[derive(Debug, Clone, PartialEq)]
pub struct ComputeUnit {
    pub bounds: TileBounds,
    pub time_range: TimeRange,
    pub dataset: String,
}

impl ComputeUnit {
    /// Query box of the unit: its valid bounds widened by half a cell so
    /// that single-row or single-column bounds still enclose an area.
    pub fn query_bbox(&self, resolution: &Resolution) -> BoundingBox {
        let bbox = self.bounds.bbox;
        BoundingBox::new(
            bbox.min_lat - resolution.lat / 2.0,
            bbox.max_lat + resolution.lat / 2.0,
            bbox.min_lon - resolution.lon / 2.0,
            bbox.max_lon + resolution.lon / 2.0,
        )
    }
}

/// Build one unit per distinct tile bounds and time partition.
///
/// Tiles with no valid-sample bounds contribute no unit, and tiles sharing
/// identical bounds contribute one.
pub fn build_units(
    tiles: &[Tile],
    dataset: &str,
    time_range: &TimeRange,
    num_parts: usize,
) -> Vec<ComputeUnit> {
    let mut seen = HashSet::new();
    let layout: Vec<TileBounds> = tiles
        .iter()
        .filter_map(TileBounds::extract)
        .filter(|bounds| seen.insert(bounds.key()))
        .collect();

    let parts = time_range.split(num_parts);
    layout
        .iter()
        .flat_map(|bounds| {
            parts.iter().map(move |part| ComputeUnit {
                bounds: *bounds,
                time_range: *part,
                dataset: dataset.to_string(),
            })
        })
        .collect()
}

/// Read-only state shared by every unit of a run.
pub struct AggregationContext {
    pub partitioner: AdaptivePartitioner,
    pub resolution: Resolution,
    /// Length of the sequential windows walked inside a unit.
    pub window_secs: i64,
}

impl AggregationContext {
    /// Aggregate a single unit into its partial grid.
    #[instrument(skip(self, unit), fields(bounds = %unit.bounds.bbox, time = %unit.time_range))]
    pub async fn aggregate(&self, unit: &ComputeUnit) -> Result<SumCountGrid> {
        let (rows, cols) = unit.bounds.local_shape(&self.resolution);
        let mut grid = SumCountGrid::zeros(unit.bounds, rows, cols);
        let query_bbox = unit.query_bbox(&self.resolution);

        for window in unit.time_range.windows(self.window_secs) {
            let tiles = self
                .partitioner
                .query(&query_bbox, &unit.dataset, &window, Axis::Time)
                .await?;

            let added: usize = tiles
                .iter()
                .map(|tile| grid.accumulate(tile, &window, &self.resolution))
                .sum();
            debug!(window = %window, tiles = tiles.len(), samples = added, "Accumulated window");
        }

        Ok(grid)
    }
}

/// Runs compute units with a bounded number in flight.
pub struct ParallelAggregator {
    context: Arc<AggregationContext>,
    max_concurrent: usize,
}

impl ParallelAggregator {
    pub fn new(context: Arc<AggregationContext>, max_concurrent: usize) -> Self {
        Self {
            context,
            max_concurrent: max_concurrent.max(1),
        }
    }

    /// Run every unit, each on its own task, and collect their grids.
    ///
    /// Results arrive in completion order. The first failing unit fails
    /// the whole run, and units still in flight are aborted with it.
    pub async fn run(&self, units: Vec<ComputeUnit>) -> Result<Vec<SumCountGrid>> {
        let total = units.len();
        info!(units = total, max_concurrent = self.max_concurrent, "Running compute units");

        let mut pending = units.into_iter();
        let mut tasks = JoinSet::new();
        for unit in pending.by_ref().take(self.max_concurrent) {
            self.spawn_unit(&mut tasks, unit);
        }

        // Dropping `tasks` on an early return aborts every unit still running.
        let mut grids = Vec::with_capacity(total);
        while let Some(joined) = tasks.join_next().await {
            grids.push(joined??);
            if let Some(unit) = pending.next() {
                self.spawn_unit(&mut tasks, unit);
            }
        }

        debug!(grids = grids.len(), "All compute units finished");
        Ok(grids)
    }

    fn spawn_unit(&self, tasks: &mut JoinSet<Result<SumCountGrid>>, unit: ComputeUnit) {
        let context = Arc::clone(&self.context);
        tasks.spawn(async move { context.aggregate(&unit).await });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use tam_common::{StoreError, StoreResult, SECONDS_PER_DAY};
    use test_utils::{fully_masked_tile, uniform_tile, TileGeometry, ALPHA, DAY, EPOCH_2016};
    use tile_store::{IndexResponse, MemoryTileStore, SpatialIndex};

    use crate::error::TimeAverageError;

    /// Fails queries south of 5N at once; answers the rest after a delay.
    #[derive(Default)]
    struct SlowNorthIndex {
        completed: AtomicUsize,
    }

    #[async_trait]
    impl SpatialIndex for SlowNorthIndex {
        async fn query(
            &self,
            bbox: &BoundingBox,
            _dataset: &str,
            _time_range: &TimeRange,
        ) -> StoreResult<IndexResponse> {
            if bbox.max_lat < 5.0 {
                return Err(StoreError::Index("index unavailable".to_string()));
            }
            tokio::time::sleep(Duration::from_millis(200)).await;
            self.completed.fetch_add(1, Ordering::SeqCst);
            Ok(IndexResponse::Descriptors(Vec::new()))
        }

        fn max_results(&self) -> usize {
            100
        }
    }

    fn geometry() -> TileGeometry {
        TileGeometry::new(0.5, 0.5, 2, 2, 1.0)
    }

    fn context(store: MemoryTileStore, window_days: i64) -> Arc<AggregationContext> {
        let store = Arc::new(store);
        Arc::new(AggregationContext {
            partitioner: AdaptivePartitioner::new(store.clone(), store),
            resolution: Resolution::new(1.0, 1.0),
            window_secs: window_days * SECONDS_PER_DAY,
        })
    }

    #[test]
    fn test_build_units_dedupes_bounds() {
        let tiles = vec![
            uniform_tile("a", ALPHA, geometry(), EPOCH_2016, 1.0),
            uniform_tile("b", ALPHA, geometry(), EPOCH_2016 + DAY, 1.0),
            uniform_tile("c", ALPHA, TileGeometry::new(5.5, 0.5, 2, 2, 1.0), EPOCH_2016, 1.0),
            fully_masked_tile("d", ALPHA, TileGeometry::new(8.5, 8.5, 1, 1, 1.0), EPOCH_2016),
        ];
        let time = TimeRange::new(EPOCH_2016, EPOCH_2016 + 30 * DAY);

        let units = build_units(&tiles, ALPHA, &time, 3);

        assert_eq!(units.len(), 6);
        assert_eq!(units[0].time_range.start, EPOCH_2016);
        assert_eq!(units[2].time_range.end, EPOCH_2016 + 30 * DAY);
        assert_eq!(units[3].bounds.bbox.min_lat, 5.5);
    }

    #[test]
    fn test_query_bbox_encloses_single_column() {
        let tile = uniform_tile("a", ALPHA, TileGeometry::new(0.5, 3.5, 2, 1, 1.0), EPOCH_2016, 1.0);
        let unit = ComputeUnit {
            bounds: TileBounds::extract(&tile).unwrap(),
            time_range: TimeRange::new(0, 0),
            dataset: ALPHA.to_string(),
        };

        let bbox = unit.query_bbox(&Resolution::new(1.0, 1.0));

        assert_eq!(bbox, BoundingBox::new(0.0, 2.0, 3.0, 4.0));
        assert!(bbox.validate().is_ok());
    }

    #[tokio::test]
    async fn test_aggregate_sums_across_windows() {
        let tiles = vec![
            uniform_tile("d0", ALPHA, geometry(), EPOCH_2016, 1.0),
            uniform_tile("d1", ALPHA, geometry(), EPOCH_2016 + 2 * DAY, 2.0),
            uniform_tile("d2", ALPHA, geometry(), EPOCH_2016 + 5 * DAY, 6.0),
            // Outside the unit's time range.
            uniform_tile("late", ALPHA, geometry(), EPOCH_2016 + 40 * DAY, 100.0),
        ];
        let context = context(MemoryTileStore::with_tiles(tiles.clone()), 2);
        let unit = ComputeUnit {
            bounds: TileBounds::extract(&tiles[0]).unwrap(),
            time_range: TimeRange::new(EPOCH_2016, EPOCH_2016 + 10 * DAY),
            dataset: ALPHA.to_string(),
        };

        let grid = context.aggregate(&unit).await.unwrap();

        assert_eq!(grid.shape(), (2, 2));
        for cell in 0..4 {
            assert_eq!(grid.count()[cell], 3);
            assert_eq!(grid.sum()[cell], 9.0);
        }
    }

    #[tokio::test]
    async fn test_window_edges_count_once() {
        // Lands exactly on the boundary between two windows.
        let tiles = vec![uniform_tile("edge", ALPHA, geometry(), EPOCH_2016 + DAY, 4.0)];
        let context = context(MemoryTileStore::with_tiles(tiles.clone()), 1);
        let unit = ComputeUnit {
            bounds: TileBounds::extract(&tiles[0]).unwrap(),
            time_range: TimeRange::new(EPOCH_2016, EPOCH_2016 + 3 * DAY),
            dataset: ALPHA.to_string(),
        };

        let grid = context.aggregate(&unit).await.unwrap();

        assert_eq!(grid.count(), &[1, 1, 1, 1]);
    }

    #[tokio::test]
    async fn test_sequential_and_concurrent_agree() {
        let tiles: Vec<Tile> = (0..20)
            .flat_map(|d| {
                vec![
                    uniform_tile(&format!("w-{}", d), ALPHA, geometry(), EPOCH_2016 + d * DAY, d as f32),
                    uniform_tile(
                        &format!("e-{}", d),
                        ALPHA,
                        TileGeometry::new(0.5, 5.5, 2, 2, 1.0),
                        EPOCH_2016 + d * DAY,
                        (2 * d) as f32,
                    ),
                ]
            })
            .collect();
        let time = TimeRange::new(EPOCH_2016, EPOCH_2016 + 19 * DAY);
        let units = build_units(&tiles[..2], ALPHA, &time, 5);
        let context = context(MemoryTileStore::with_tiles(tiles), 3);

        let mut sequential = ParallelAggregator::new(context.clone(), 1)
            .run(units.clone())
            .await
            .unwrap();
        let mut concurrent = ParallelAggregator::new(context, 8)
            .run(units)
            .await
            .unwrap();

        let order = |grids: &mut Vec<SumCountGrid>| {
            grids.sort_by(|a, b| {
                a.key()
                    .cmp(&b.key())
                    .then(a.sum()[0].total_cmp(&b.sum()[0]))
            })
        };
        order(&mut sequential);
        order(&mut concurrent);

        assert_eq!(sequential.len(), 10);
        assert_eq!(sequential, concurrent);
    }

    /// Records every query before answering it from an in-memory store.
    struct RecordingIndex {
        inner: MemoryTileStore,
        queries: Mutex<Vec<(BoundingBox, TimeRange)>>,
    }

    #[async_trait]
    impl SpatialIndex for RecordingIndex {
        async fn query(
            &self,
            bbox: &BoundingBox,
            dataset: &str,
            time_range: &TimeRange,
        ) -> StoreResult<IndexResponse> {
            self.queries.lock().unwrap().push((*bbox, *time_range));
            self.inner.query(bbox, dataset, time_range).await
        }

        fn max_results(&self) -> usize {
            self.inner.max_results()
        }
    }

    #[tokio::test]
    async fn test_unit_overflow_splits_time_first() {
        let tiles: Vec<Tile> = (0..4)
            .map(|d| uniform_tile(&format!("d{}", d), ALPHA, geometry(), EPOCH_2016 + d * DAY, 2.0))
            .collect();
        let store = Arc::new(MemoryTileStore::with_tiles(tiles.clone()).with_max_results(2));
        let index = Arc::new(RecordingIndex {
            inner: MemoryTileStore::with_tiles(tiles.clone()).with_max_results(2),
            queries: Mutex::new(Vec::new()),
        });
        let context = AggregationContext {
            partitioner: AdaptivePartitioner::new(index.clone(), store),
            resolution: Resolution::new(1.0, 1.0),
            window_secs: 10 * SECONDS_PER_DAY,
        };
        let unit = ComputeUnit {
            bounds: TileBounds::extract(&tiles[0]).unwrap(),
            time_range: TimeRange::new(EPOCH_2016, EPOCH_2016 + 9 * DAY),
            dataset: ALPHA.to_string(),
        };

        let grid = context.aggregate(&unit).await.unwrap();

        assert_eq!(grid.count(), &[4, 4, 4, 4]);
        let queries = index.queries.lock().unwrap();
        let (first_bbox, first_time) = queries[0];
        let (second_bbox, second_time) = queries[1];
        assert_eq!(second_bbox, first_bbox);
        assert_eq!(second_time.start, first_time.start);
        assert!(second_time.end < first_time.end);
    }

    #[tokio::test]
    async fn test_failed_unit_aborts_units_in_flight() {
        let index = Arc::new(SlowNorthIndex::default());
        let context = Arc::new(AggregationContext {
            partitioner: AdaptivePartitioner::new(index.clone(), Arc::new(MemoryTileStore::default())),
            resolution: Resolution::new(1.0, 1.0),
            window_secs: SECONDS_PER_DAY,
        });
        let tiles = vec![
            uniform_tile("north", ALPHA, TileGeometry::new(6.5, 0.5, 2, 2, 1.0), EPOCH_2016, 1.0),
            uniform_tile("south", ALPHA, geometry(), EPOCH_2016, 1.0),
        ];
        let units = build_units(&tiles, ALPHA, &TimeRange::new(EPOCH_2016, EPOCH_2016), 1);

        let result = ParallelAggregator::new(context, 4).run(units).await;

        assert!(matches!(result, Err(TimeAverageError::Store(_))));
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(index.completed.load(Ordering::SeqCst), 0);
    }
}
