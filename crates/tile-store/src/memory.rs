//! In-process tile index and bulk store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use tam_common::{BoundingBox, StoreResult, Tile, TileDescriptor, TimeRange};

use crate::fetch::TileFetcher;
use crate::index::{descriptor_matches, IndexResponse, SpatialIndex};

/// Configuration for [`MemoryTileStore`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryStoreConfig {
    /// Maximum number of descriptors a single query may return.
    pub max_results: usize,
}

impl Default for MemoryStoreConfig {
    fn default() -> Self {
        Self { max_results: 100 }
    }
}

/// Holds tiles in memory and serves both index queries and bulk fetches.
///
/// Queries whose match count exceeds `max_results` report overflow, the same
/// way a size-bounded search index does.
pub struct MemoryTileStore {
    tiles: HashMap<String, Tile>,
    descriptors: Vec<TileDescriptor>,
    config: MemoryStoreConfig,
    queries: AtomicUsize,
    fetched: AtomicUsize,
}

impl MemoryTileStore {
    pub fn new(config: MemoryStoreConfig) -> Self {
        Self {
            tiles: HashMap::new(),
            descriptors: Vec::new(),
            config,
            queries: AtomicUsize::new(0),
            fetched: AtomicUsize::new(0),
        }
    }

    /// Build a store holding `tiles` with the default result cap.
    pub fn with_tiles(tiles: impl IntoIterator<Item = Tile>) -> Self {
        let mut store = Self::new(MemoryStoreConfig::default());
        store.extend(tiles);
        store
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.config.max_results = max_results;
        self
    }

    /// Add a tile; a tile with the same id replaces the previous one.
    pub fn insert(&mut self, tile: Tile) {
        let id = tile.id().to_string();
        self.descriptors.retain(|d| d.tile_id != id);
        self.descriptors.push(tile.descriptor.clone());
        self.tiles.insert(id, tile);
    }

    pub fn extend(&mut self, tiles: impl IntoIterator<Item = Tile>) {
        for tile in tiles {
            self.insert(tile);
        }
    }

    /// Register a descriptor in the index without any bulk payload.
    pub fn insert_descriptor_only(&mut self, descriptor: TileDescriptor) {
        self.descriptors.retain(|d| d.tile_id != descriptor.tile_id);
        self.tiles.remove(&descriptor.tile_id);
        self.descriptors.push(descriptor);
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Number of index queries served so far, overflowing ones included.
    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::Relaxed)
    }

    /// Number of tiles materialized by bulk fetches so far.
    pub fn fetched_count(&self) -> usize {
        self.fetched.load(Ordering::Relaxed)
    }

    /// Every matching descriptor, ignoring the result cap.
    pub fn matching(
        &self,
        bbox: &BoundingBox,
        dataset: &str,
        time_range: &TimeRange,
    ) -> Vec<TileDescriptor> {
        let mut matches: Vec<TileDescriptor> = self
            .descriptors
            .iter()
            .filter(|d| descriptor_matches(d, bbox, dataset, time_range))
            .cloned()
            .collect();
        matches.sort_by(|a, b| {
            a.time_range
                .start
                .cmp(&b.time_range.start)
                .then_with(|| a.tile_id.cmp(&b.tile_id))
        });
        matches
    }
}

impl Default for MemoryTileStore {
    fn default() -> Self {
        Self::new(MemoryStoreConfig::default())
    }
}

#[async_trait]
impl SpatialIndex for MemoryTileStore {
    async fn query(
        &self,
        bbox: &BoundingBox,
        dataset: &str,
        time_range: &TimeRange,
    ) -> StoreResult<IndexResponse> {
        self.queries.fetch_add(1, Ordering::Relaxed);

        let matches = self.matching(bbox, dataset, time_range);
        if matches.len() > self.config.max_results {
            debug!(
                matches = matches.len(),
                limit = self.config.max_results,
                "Index query overflow"
            );
            return Ok(IndexResponse::Overflow {
                limit: self.config.max_results,
            });
        }

        Ok(IndexResponse::Descriptors(matches))
    }

    fn max_results(&self) -> usize {
        self.config.max_results
    }
}

#[async_trait]
impl TileFetcher for MemoryTileStore {
    async fn fetch(&self, descriptors: &[TileDescriptor]) -> StoreResult<Vec<Tile>> {
        let tiles: Vec<Tile> = descriptors
            .iter()
            .filter_map(|d| self.tiles.get(&d.tile_id).cloned())
            .collect();
        self.fetched.fetch_add(tiles.len(), Ordering::Relaxed);
        Ok(tiles)
    }
}
