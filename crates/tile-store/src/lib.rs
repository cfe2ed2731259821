//! Access to the tile metadata index and the bulk tile store.
//!
//! Provides:
//! - [`SpatialIndex`]: bounded bbox + time-range queries over tile metadata
//! - [`TileFetcher`]: bulk materialization of tile sample arrays
//! - [`MemoryTileStore`]: in-process index and store with a result cap
//! - [`PgTileIndex`]: PostgreSQL-backed metadata index
//! - [`ObjectStoreTileFetcher`]: tile payloads held in S3/MinIO or any `object_store` backend

pub mod catalog;
pub mod fetch;
pub mod index;
pub mod memory;
pub mod object_store;
pub mod payload;

pub use self::object_store::{ObjectStoreTileFetcher, TileObjectConfig};
pub use catalog::{PgIndexConfig, PgTileIndex};
pub use fetch::TileFetcher;
pub use index::{IndexResponse, SpatialIndex};
pub use memory::{MemoryStoreConfig, MemoryTileStore};
pub use payload::TilePayload;
