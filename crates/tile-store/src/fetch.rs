//! The bulk tile store interface.

use async_trait::async_trait;

use tam_common::{StoreResult, Tile, TileDescriptor};

/// Materializes bulk sample arrays for tile descriptors.
///
/// A fetcher may return fewer tiles than requested when the store has no
/// payload for some descriptors; callers decide whether that is fatal.
/// Returned tiles carry the descriptor they were fetched for.
#[async_trait]
pub trait TileFetcher: Send + Sync {
    async fn fetch(&self, descriptors: &[TileDescriptor]) -> StoreResult<Vec<Tile>>;
}
