//! Time-Averaged Maps over an Irregular Tile Store
//!
//! This crate computes per-cell time averages over large lat/lon/time
//! domains from a tile store whose metadata index caps the size of any
//! single result set. It provides:
//!
//! - **Adaptive partitioning**: overflowing index queries are bisected
//!   along lat, lon and time until every piece answers under the cap
//! - **Data-parallel aggregation**: independent compute units produce
//!   partial sum/count grids
//! - **Associative reduction**: partial grids are merged by exact bounds key
//! - **Deterministic stitching**: reduced grids are placed into a global
//!   grid at the discovered native resolution
//!
//! # Architecture
//!
//! ```text
//! compute_time_average(dataset, bbox, time)
//!      │
//!      ├─► ResolutionDiscovery::discover      (native lat/lon spacing)
//!      ├─► ResolutionDiscovery::find_global_tile_set
//!      ├─► mask_to_bounds + prune             (drop empty tiles)
//!      ├─► build_units                        (distinct bounds x time parts)
//!      ├─► ParallelAggregator::run            (map)
//!      ├─► reduce_by_key                      (combine)
//!      └─► stitch                             (GlobalGrid)
//! ```

pub mod aggregate;
pub mod bounds;
pub mod config;
pub mod error;
pub mod grid;
pub mod partition;
pub mod prune;
pub mod reduce;
pub mod resolution;
pub mod service;
pub mod stitch;
pub mod writer;

// Re-export commonly used types at crate root
pub use aggregate::{build_units, AggregationContext, ComputeUnit, ParallelAggregator};
pub use bounds::{BoundsKey, TileBounds};
pub use config::TimeAverageConfig;
pub use error::{Result, TimeAverageError};
pub use grid::{GlobalGrid, GridCell, GridSpec};
pub use partition::{AdaptivePartitioner, Axis, QueryVolume};
pub use prune::{mask_to_bounds, prune};
pub use reduce::{combine, reduce_by_key, SumCountGrid};
pub use resolution::{native_spacing, Resolution, ResolutionDiscovery};
pub use service::{TimeAverageResult, TimeAverageService};
pub use stitch::stitch;
pub use writer::{write_global_grid, GridWriteResult, ZarrGridWriter};
