//! Common types shared across the time-average map workspace.

pub mod bbox;
pub mod dataset;
pub mod error;
pub mod tile;
pub mod time;

pub use bbox::{BboxError, BoundingBox};
pub use dataset::DatasetRef;
pub use error::{StoreError, StoreResult};
pub use tile::{MaskedCube, Tile, TileDescriptor, TileError, TileStats};
pub use time::{TimeRange, TimeRangeError, SECONDS_PER_DAY};
