//! Raster output of the global grid.
//!
//! Grids are written in Zarr V3 format with named `lat`/`lon` dimensions.

mod zarr_writer;

pub use zarr_writer::{write_global_grid, GridWriteResult, ZarrGridWriter, COUNT_ARRAY};
