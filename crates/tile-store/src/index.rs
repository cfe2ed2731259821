//! The metadata index interface.

use async_trait::async_trait;

use tam_common::{BoundingBox, StoreResult, TileDescriptor, TimeRange};

/// Outcome of a single index query.
///
/// The index caps the number of descriptors it will return; a query that
/// would exceed the cap yields `Overflow` instead of a truncated list.
#[derive(Debug, Clone, PartialEq)]
pub enum IndexResponse {
    Descriptors(Vec<TileDescriptor>),
    Overflow { limit: usize },
}

/// Tile metadata index queried by bounding box and time range.
///
/// Implementations must be safe for concurrent reads.
#[async_trait]
pub trait SpatialIndex: Send + Sync {
    /// Find descriptors of tiles of `dataset` intersecting `bbox` and `time_range`.
    ///
    /// Descriptors are returned in ascending start-time order.
    async fn query(
        &self,
        bbox: &BoundingBox,
        dataset: &str,
        time_range: &TimeRange,
    ) -> StoreResult<IndexResponse>;

    /// The maximum number of descriptors a single query may return.
    fn max_results(&self) -> usize;
}

/// Whether a descriptor falls inside a query volume, edges included.
pub(crate) fn descriptor_matches(
    descriptor: &TileDescriptor,
    bbox: &BoundingBox,
    dataset: &str,
    time_range: &TimeRange,
) -> bool {
    descriptor.dataset == dataset
        && descriptor.bbox.intersects(bbox)
        && descriptor.time_range.intersects(time_range)
}
