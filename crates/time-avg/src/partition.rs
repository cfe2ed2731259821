//! Adaptive query partitioning over a size-bounded index.
//!
//! The index refuses to answer queries whose result set would exceed its
//! cap. When that happens the query volume is bisected and both halves are
//! queried recursively, cycling the split axis Lat → Lon → Time at each
//! level, until every leaf volume answers under the cap.
//!
//! ```text
//! query(volume, Lat)
//!      │
//!      ├─► Descriptors ─► keep unseen ids
//!      │
//!      └─► Overflow ─► bisect along Lat
//!               ├─► query(lower, Lon)
//!               └─► query(upper, Lon)
//! ```

use std::collections::HashSet;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use tracing::{debug, instrument};

use tam_common::{BoundingBox, Tile, TileDescriptor, TimeRange};
use tile_store::{IndexResponse, SpatialIndex, TileFetcher};

use crate::error::{Result, TimeAverageError};

/// Spatial extent below which an axis is no longer split.
const MIN_SPLIT_WIDTH: f64 = 1e-9;

/// Default recursion limit for persistent overflow.
pub const DEFAULT_MAX_DEPTH: usize = 48;

/// Axis along which a query volume is bisected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    Lat,
    Lon,
    Time,
}

impl Axis {
    /// The axis used one recursion level deeper.
    pub fn next(self) -> Self {
        match self {
            Axis::Lat => Axis::Lon,
            Axis::Lon => Axis::Time,
            Axis::Time => Axis::Lat,
        }
    }
}

impl std::fmt::Display for Axis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Axis::Lat => "lat",
            Axis::Lon => "lon",
            Axis::Time => "time",
        };
        write!(f, "{}", name)
    }
}

/// A bounding box paired with a time range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QueryVolume {
    pub bbox: BoundingBox,
    pub time_range: TimeRange,
}

impl QueryVolume {
    pub fn new(bbox: BoundingBox, time_range: TimeRange) -> Self {
        Self { bbox, time_range }
    }

    /// Reject empty, inverted or non-finite volumes.
    ///
    /// A single time instant is accepted; a zero spatial width is not.
    pub fn validate(&self) -> Result<()> {
        self.bbox.validate()?;
        self.time_range.validate()?;
        Ok(())
    }

    /// Width of the volume along `axis` (seconds for time).
    pub fn extent(&self, axis: Axis) -> f64 {
        match axis {
            Axis::Lat => self.bbox.lat_span(),
            Axis::Lon => self.bbox.lon_span(),
            Axis::Time => self.time_range.span() as f64,
        }
    }

    pub fn can_split(&self, axis: Axis) -> bool {
        match axis {
            Axis::Lat => self.bbox.lat_span() > MIN_SPLIT_WIDTH,
            Axis::Lon => self.bbox.lon_span() > MIN_SPLIT_WIDTH,
            Axis::Time => self.time_range.end > self.time_range.start,
        }
    }

    /// The first splittable axis starting from `preferred`.
    pub fn split_axis(&self, preferred: Axis) -> Option<Axis> {
        [preferred, preferred.next(), preferred.next().next()]
            .into_iter()
            .find(|axis| self.can_split(*axis))
    }

    /// Split in two along `axis`.
    ///
    /// Spatial halves share the midline. Time halves are disjoint:
    /// `[start, mid]` and `[mid + 1, end]`.
    pub fn bisect(&self, axis: Axis) -> Option<(QueryVolume, QueryVolume)> {
        if !self.can_split(axis) {
            return None;
        }

        match axis {
            Axis::Lat => {
                let mid = self.bbox.mid_lat();
                if !(mid > self.bbox.min_lat && mid < self.bbox.max_lat) {
                    return None;
                }
                let mut lower = *self;
                let mut upper = *self;
                lower.bbox.max_lat = mid;
                upper.bbox.min_lat = mid;
                Some((lower, upper))
            }
            Axis::Lon => {
                let mid = self.bbox.mid_lon();
                if !(mid > self.bbox.min_lon && mid < self.bbox.max_lon) {
                    return None;
                }
                let mut lower = *self;
                let mut upper = *self;
                lower.bbox.max_lon = mid;
                upper.bbox.min_lon = mid;
                Some((lower, upper))
            }
            Axis::Time => {
                let TimeRange { start, end } = self.time_range;
                let mid = start + (end - start) / 2;
                Some((
                    QueryVolume::new(self.bbox, TimeRange::new(start, mid)),
                    QueryVolume::new(self.bbox, TimeRange::new(mid + 1, end)),
                ))
            }
        }
    }
}

impl std::fmt::Display for QueryVolume {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} time {}", self.bbox, self.time_range)
    }
}

/// Assembles complete tile sets from an index that caps its result size.
///
/// Tiles reported by more than one leaf volume are kept once, in the order
/// they were first seen.
#[derive(Clone)]
pub struct AdaptivePartitioner {
    index: Arc<dyn SpatialIndex>,
    fetcher: Arc<dyn TileFetcher>,
    max_depth: usize,
}

impl AdaptivePartitioner {
    pub fn new(index: Arc<dyn SpatialIndex>, fetcher: Arc<dyn TileFetcher>) -> Self {
        Self {
            index,
            fetcher,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Find and materialize every tile of `dataset` intersecting the volume.
    ///
    /// Each leaf's descriptors are bulk-fetched as soon as the leaf answers.
    /// A fetch that comes back short fails with `MissingTileData`.
    #[instrument(skip(self, bbox, time_range), fields(bbox = %bbox, time = %time_range))]
    pub async fn query(
        &self,
        bbox: &BoundingBox,
        dataset: &str,
        time_range: &TimeRange,
        axis: Axis,
    ) -> Result<Vec<Tile>> {
        let mut tiles = Vec::new();
        for batch in self.leaf_batches(bbox, dataset, time_range, axis).await? {
            tiles.extend(self.fetch_batch(&batch).await?);
        }

        debug!(tiles = tiles.len(), "Partitioned query complete");
        Ok(tiles)
    }

    async fn leaf_batches(
        &self,
        bbox: &BoundingBox,
        dataset: &str,
        time_range: &TimeRange,
        axis: Axis,
    ) -> Result<Vec<Vec<TileDescriptor>>> {
        let volume = QueryVolume::new(*bbox, *time_range);
        volume.validate()?;

        let mut seen = HashSet::new();
        let mut batches = Vec::new();
        self.partition(volume, dataset, axis, 0, &mut seen, &mut batches)
            .await?;
        Ok(batches)
    }

    fn partition<'a>(
        &'a self,
        volume: QueryVolume,
        dataset: &'a str,
        axis: Axis,
        depth: usize,
        seen: &'a mut HashSet<String>,
        batches: &'a mut Vec<Vec<TileDescriptor>>,
    ) -> BoxFuture<'a, Result<()>> {
        async move {
            match self
                .index
                .query(&volume.bbox, dataset, &volume.time_range)
                .await?
            {
                IndexResponse::Descriptors(descriptors) => {
                    let returned = descriptors.len();
                    let fresh: Vec<TileDescriptor> = descriptors
                        .into_iter()
                        .filter(|d| seen.insert(d.tile_id.clone()))
                        .collect();
                    debug!(
                        depth,
                        returned,
                        fresh = fresh.len(),
                        volume = %volume,
                        "Index query answered"
                    );
                    if !fresh.is_empty() {
                        batches.push(fresh);
                    }
                    Ok(())
                }
                IndexResponse::Overflow { limit } => {
                    let exhausted = || TimeAverageError::BisectionExhausted {
                        depth,
                        limit,
                        volume: volume.to_string(),
                    };

                    if depth >= self.max_depth {
                        return Err(exhausted());
                    }
                    let split = volume.split_axis(axis).ok_or_else(exhausted)?;
                    let (lower, upper) = volume.bisect(split).ok_or_else(exhausted)?;

                    debug!(depth, limit, axis = %split, volume = %volume, "Index overflow, bisecting");

                    let next = split.next();
                    self.partition(lower, dataset, next, depth + 1, seen, batches)
                        .await?;
                    self.partition(upper, dataset, next, depth + 1, seen, batches)
                        .await
                }
            }
        }
        .boxed()
    }

    async fn fetch_batch(&self, descriptors: &[TileDescriptor]) -> Result<Vec<Tile>> {
        if descriptors.is_empty() {
            return Ok(Vec::new());
        }

        let tiles = self.fetcher.fetch(descriptors).await?;

        let fetched: HashSet<&str> = tiles.iter().map(|t| t.id()).collect();
        let missing: Vec<String> = descriptors
            .iter()
            .filter(|d| !fetched.contains(d.tile_id.as_str()))
            .map(|d| d.tile_id.clone())
            .collect();
        if !missing.is_empty() {
            return Err(TimeAverageError::MissingTileData { missing });
        }

        Ok(tiles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use proptest::prelude::*;
    use tam_common::{StoreError, StoreResult};
    use tile_store::MemoryTileStore;
    use test_utils::{tile_mosaic, uniform_tile, TileGeometry, ALPHA, DAY, EPOCH_2016};

    fn partitioner(store: MemoryTileStore) -> (Arc<MemoryTileStore>, AdaptivePartitioner) {
        let store = Arc::new(store);
        let partitioner = AdaptivePartitioner::new(store.clone(), store.clone());
        (store, partitioner)
    }

    fn full_box() -> BoundingBox {
        BoundingBox::new(0.0, 10.0, 0.0, 10.0)
    }

    fn sorted_ids(tiles: &[Tile]) -> Vec<String> {
        let mut ids: Vec<String> = tiles.iter().map(|t| t.id().to_string()).collect();
        ids.sort();
        ids
    }

    #[test]
    fn test_axis_cycle() {
        assert_eq!(Axis::Lat.next(), Axis::Lon);
        assert_eq!(Axis::Lon.next(), Axis::Time);
        assert_eq!(Axis::Time.next(), Axis::Lat);
    }

    #[test]
    fn test_bisect_time_is_disjoint() {
        let volume = QueryVolume::new(full_box(), TimeRange::new(0, 9));
        let (lower, upper) = volume.bisect(Axis::Time).unwrap();
        assert_eq!(lower.time_range, TimeRange::new(0, 4));
        assert_eq!(upper.time_range, TimeRange::new(5, 9));
    }

    #[test]
    fn test_bisect_lat_shares_midline() {
        let volume = QueryVolume::new(full_box(), TimeRange::new(0, 0));
        let (lower, upper) = volume.bisect(Axis::Lat).unwrap();
        assert_eq!(lower.bbox.max_lat, 5.0);
        assert_eq!(upper.bbox.min_lat, 5.0);
        assert_eq!(lower.bbox.min_lon, 0.0);
        assert_eq!(upper.bbox.max_lon, 10.0);
    }

    #[test]
    fn test_instant_rotates_away_from_time() {
        let volume = QueryVolume::new(full_box(), TimeRange::new(5, 5));
        assert!(volume.bisect(Axis::Time).is_none());
        assert_eq!(volume.split_axis(Axis::Time), Some(Axis::Lat));
    }

    #[test]
    fn test_validate() {
        let time = TimeRange::new(0, 0);
        assert!(QueryVolume::new(full_box(), time).validate().is_ok());
        assert!(QueryVolume::new(BoundingBox::new(1.0, 1.0, 0.0, 10.0), time)
            .validate()
            .is_err());
        assert!(QueryVolume::new(BoundingBox::new(0.0, 10.0, 3.0, 2.0), time)
            .validate()
            .is_err());
        assert!(QueryVolume::new(full_box(), TimeRange::new(2, 1))
            .validate()
            .is_err());
    }

    #[tokio::test]
    async fn test_overflow_on_full_box_resolved_by_lat_halves() {
        let tiles = tile_mosaic(ALPHA, 0.0, 0.0, 2, 2, 5, 1.0, EPOCH_2016);
        let (store, partitioner) = partitioner(MemoryTileStore::with_tiles(tiles).with_max_results(3));
        let time = TimeRange::new(EPOCH_2016, EPOCH_2016);

        let result = partitioner
            .query(&full_box(), ALPHA, &time, Axis::Lat)
            .await
            .unwrap();

        assert_eq!(
            sorted_ids(&result),
            vec![
                format!("mosaic-0-0-{}", EPOCH_2016),
                format!("mosaic-0-1-{}", EPOCH_2016),
                format!("mosaic-1-0-{}", EPOCH_2016),
                format!("mosaic-1-1-{}", EPOCH_2016),
            ]
        );
        // Full box, lower half, upper half.
        assert_eq!(store.query_count(), 3);
    }

    #[tokio::test]
    async fn test_tile_on_midline_is_returned_once() {
        let mut tiles = tile_mosaic(ALPHA, 0.0, 0.0, 2, 2, 5, 1.0, EPOCH_2016);
        let straddle = TileGeometry::new(4.5, 0.5, 2, 2, 1.0);
        tiles.push(uniform_tile("straddle", ALPHA, straddle, EPOCH_2016, 1.0));
        let (_, partitioner) = partitioner(MemoryTileStore::with_tiles(tiles).with_max_results(3));

        let result = partitioner
            .query(&full_box(), ALPHA, &TimeRange::new(EPOCH_2016, EPOCH_2016), Axis::Lat)
            .await
            .unwrap();

        assert_eq!(result.len(), 5);
        assert_eq!(result.iter().filter(|t| t.id() == "straddle").count(), 1);
    }

    #[tokio::test]
    async fn test_bisection_matches_single_query() {
        let tiles: Vec<Tile> = (0..4)
            .flat_map(|d| tile_mosaic(ALPHA, 0.0, 0.0, 3, 3, 3, 1.0, EPOCH_2016 + d * DAY))
            .collect();
        let time = TimeRange::new(EPOCH_2016, EPOCH_2016 + 3 * DAY);
        let bbox = BoundingBox::new(0.0, 9.0, 0.0, 9.0);

        let (_, unbounded) = partitioner(MemoryTileStore::with_tiles(tiles.clone()));
        let (store, bounded) = partitioner(MemoryTileStore::with_tiles(tiles).with_max_results(4));

        let expected = unbounded.query(&bbox, ALPHA, &time, Axis::Lat).await.unwrap();
        let actual = bounded.query(&bbox, ALPHA, &time, Axis::Lat).await.unwrap();

        assert_eq!(expected.len(), 36);
        assert_eq!(sorted_ids(&expected), sorted_ids(&actual));
        assert!(store.query_count() > 1);
    }

    #[tokio::test]
    async fn test_instant_time_range_bisects_spatially() {
        let tiles = tile_mosaic(ALPHA, 0.0, 0.0, 2, 2, 5, 1.0, EPOCH_2016);
        let (_, partitioner) = partitioner(MemoryTileStore::with_tiles(tiles).with_max_results(1));

        let result = partitioner
            .query(&full_box(), ALPHA, &TimeRange::new(EPOCH_2016, EPOCH_2016), Axis::Time)
            .await
            .unwrap();

        assert_eq!(result.len(), 4);
    }

    #[tokio::test]
    async fn test_persistent_overflow_is_exhausted() {
        let geometry = TileGeometry::new(2.5, 2.5, 1, 1, 1.0);
        let tiles: Vec<Tile> = (0..3)
            .map(|i| uniform_tile(&format!("stacked-{}", i), ALPHA, geometry, EPOCH_2016, 1.0))
            .collect();
        let store = MemoryTileStore::with_tiles(tiles).with_max_results(2);
        let (_, partitioner) = partitioner(store);
        let partitioner = partitioner.with_max_depth(6);

        let result = partitioner
            .query(&full_box(), ALPHA, &TimeRange::new(EPOCH_2016, EPOCH_2016), Axis::Lat)
            .await;

        assert!(matches!(
            result,
            Err(TimeAverageError::BisectionExhausted { limit: 2, .. })
        ));
    }

    #[tokio::test]
    async fn test_invalid_query_never_reaches_index() {
        let (store, partitioner) = partitioner(MemoryTileStore::default());

        let result = partitioner
            .query(
                &BoundingBox::new(3.0, 3.0, 0.0, 10.0),
                ALPHA,
                &TimeRange::new(0, 10),
                Axis::Lat,
            )
            .await;

        assert!(matches!(result, Err(TimeAverageError::InvalidQuery(_))));
        assert_eq!(store.query_count(), 0);
    }

    #[tokio::test]
    async fn test_short_fetch_is_missing_tile_data() {
        let geometry = TileGeometry::new(0.5, 0.5, 2, 2, 1.0);
        let present = uniform_tile("present", ALPHA, geometry, EPOCH_2016, 1.0);
        let absent = uniform_tile("absent", ALPHA, geometry, EPOCH_2016, 1.0);
        let mut store = MemoryTileStore::with_tiles(vec![present]);
        store.insert_descriptor_only(absent.descriptor);
        let (_, partitioner) = partitioner(store);

        let result = partitioner
            .query(&full_box(), ALPHA, &TimeRange::new(EPOCH_2016, EPOCH_2016), Axis::Lat)
            .await;

        match result {
            Err(TimeAverageError::MissingTileData { missing }) => {
                assert_eq!(missing, vec!["absent".to_string()])
            }
            other => panic!("unexpected result: {:?}", other.map(|t| t.len())),
        }
    }

    struct FailingIndex;

    #[async_trait]
    impl SpatialIndex for FailingIndex {
        async fn query(
            &self,
            _bbox: &BoundingBox,
            _dataset: &str,
            _time_range: &TimeRange,
        ) -> StoreResult<IndexResponse> {
            Err(StoreError::Index("connection reset".to_string()))
        }

        fn max_results(&self) -> usize {
            100
        }
    }

    #[test]
    fn test_store_errors_propagate() {
        let partitioner =
            AdaptivePartitioner::new(Arc::new(FailingIndex), Arc::new(MemoryTileStore::default()));

        let result = tokio_test::block_on(partitioner.query(
            &full_box(),
            ALPHA,
            &TimeRange::new(0, 10),
            Axis::Lat,
        ));

        assert!(matches!(
            result,
            Err(TimeAverageError::Store(StoreError::Index(_)))
        ));
    }

    fn volume_strategy() -> impl Strategy<Value = QueryVolume> {
        (
            -90.0f64..90.0,
            0.0f64..90.0,
            -180.0f64..180.0,
            0.0f64..180.0,
            0i64..2_000_000_000,
            0i64..400 * DAY,
        )
            .prop_map(|(lat, dlat, lon, dlon, t, dt)| {
                QueryVolume::new(
                    BoundingBox::new(lat, lat + dlat, lon, lon + dlon),
                    TimeRange::new(t, t + dt),
                )
            })
    }

    fn axis_strategy() -> impl Strategy<Value = Axis> {
        prop_oneof![Just(Axis::Lat), Just(Axis::Lon), Just(Axis::Time)]
    }

    proptest! {
        #[test]
        fn prop_bisection_shrinks_split_axis(volume in volume_strategy(), axis in axis_strategy()) {
            if let Some(split) = volume.split_axis(axis) {
                let (lower, upper) = volume.bisect(split).unwrap();
                prop_assert!(lower.extent(split) < volume.extent(split));
                prop_assert!(upper.extent(split) < volume.extent(split));
                prop_assert_eq!(lower.extent(split.next()), volume.extent(split.next()));
            } else {
                for axis in [Axis::Lat, Axis::Lon, Axis::Time] {
                    prop_assert!(!volume.can_split(axis));
                }
            }
        }
    }
}
