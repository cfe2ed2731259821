//! Zarr V3 writer for global grids.
//!
//! Layout of the written hierarchy:
//!
//! ```text
//! <path>/
//!   zarr.json         root group, run attributes
//!   lat/              1-D latitude centers
//!   lon/              1-D longitude centers
//!   <variable>/       2-D averages [lat, lon], NaN where empty
//!   count/            2-D sample counts [lat, lon]
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use serde_json::{json, Map, Value};
use zarrs::array::{ArrayBuilder, DataType, Element, FillValue};
use zarrs::array_subset::ArraySubset;
use zarrs::group::GroupBuilder;
use zarrs_filesystem::FilesystemStore;

use crate::error::{Result, TimeAverageError};
use crate::grid::GlobalGrid;

/// Name of the per-cell sample count array.
pub const COUNT_ARRAY: &str = "count";

/// Summary of a completed write.
#[derive(Debug, Clone)]
pub struct GridWriteResult {
    pub path: PathBuf,
    pub variable: String,
    /// Shape `(lat, lon)` of the data variable.
    pub shape: (usize, usize),
    /// Approximate payload size before encoding.
    pub bytes_written: u64,
}

/// Writes a [`GlobalGrid`] as a self-describing Zarr hierarchy.
pub struct ZarrGridWriter {
    variable: String,
    attributes: Map<String, Value>,
}

impl ZarrGridWriter {
    pub fn new(variable: impl Into<String>) -> Self {
        Self {
            variable: variable.into(),
            attributes: Map::new(),
        }
    }

    /// Add an attribute to the root group.
    pub fn with_attribute(mut self, key: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    pub fn write(&self, grid: &GlobalGrid, path: &Path) -> Result<GridWriteResult> {
        if matches!(self.variable.as_str(), "" | "lat" | "lon" | COUNT_ARRAY) {
            return Err(TimeAverageError::write(format!(
                "'{}' cannot be used as the data variable name",
                self.variable
            )));
        }

        std::fs::create_dir_all(path)?;
        let store = Arc::new(
            FilesystemStore::new(path).map_err(|e| TimeAverageError::write(e.to_string()))?,
        );

        let spec = grid.spec();
        let (nlats, nlons) = spec.shape();

        let mut root_attrs = self.attributes.clone();
        root_attrs.insert(
            "bbox".to_string(),
            json!([spec.bbox.min_lon, spec.bbox.min_lat, spec.bbox.max_lon, spec.bbox.max_lat]),
        );
        root_attrs.insert(
            "resolution".to_string(),
            json!({ "lat": spec.resolution.lat, "lon": spec.resolution.lon }),
        );
        root_attrs.insert("created".to_string(), json!(Utc::now().to_rfc3339()));

        GroupBuilder::new()
            .attributes(root_attrs)
            .build(store.clone(), "/")
            .map_err(|e| TimeAverageError::write(e.to_string()))?
            .store_metadata()
            .map_err(|e| TimeAverageError::write(e.to_string()))?;

        let coordinate = |name: &str, units: &str| {
            let mut attrs = Map::new();
            attrs.insert("_ARRAY_DIMENSIONS".to_string(), json!([name]));
            attrs.insert("units".to_string(), json!(units));
            attrs
        };
        let gridded = |extra: &[(&str, Value)]| {
            let mut attrs = Map::new();
            attrs.insert("_ARRAY_DIMENSIONS".to_string(), json!(["lat", "lon"]));
            for (key, value) in extra {
                attrs.insert(key.to_string(), value.clone());
            }
            attrs
        };

        write_array(
            &store,
            "/lat",
            vec![nlats as u64],
            DataType::Float64,
            FillValue::from(f64::NAN),
            coordinate("lat", "degrees_north"),
            &spec.latitudes(),
        )?;
        write_array(
            &store,
            "/lon",
            vec![nlons as u64],
            DataType::Float64,
            FillValue::from(f64::NAN),
            coordinate("lon", "degrees_east"),
            &spec.longitudes(),
        )?;
        write_array(
            &store,
            &format!("/{}", self.variable),
            vec![nlats as u64, nlons as u64],
            DataType::Float64,
            FillValue::from(f64::NAN),
            gridded(&[("long_name", json!("time average"))]),
            &grid.masked_averages(),
        )?;
        write_array(
            &store,
            &format!("/{}", COUNT_ARRAY),
            vec![nlats as u64, nlons as u64],
            DataType::UInt64,
            FillValue::from(0u64),
            gridded(&[("long_name", json!("number of samples"))]),
            grid.counts(),
        )?;

        let cells = (nlats * nlons) as u64;
        Ok(GridWriteResult {
            path: path.to_path_buf(),
            variable: self.variable.clone(),
            shape: (nlats, nlons),
            bytes_written: cells * 16 + (nlats + nlons) as u64 * 8,
        })
    }
}

/// Write `grid` under `path` with the averages stored as `variable`.
pub fn write_global_grid(grid: &GlobalGrid, path: &Path, variable: &str) -> Result<GridWriteResult> {
    ZarrGridWriter::new(variable).write(grid, path)
}

/// Create a single-chunk array and store all of `data` in it.
fn write_array<T: Element>(
    store: &Arc<FilesystemStore>,
    path: &str,
    shape: Vec<u64>,
    data_type: DataType,
    fill_value: FillValue,
    attrs: Map<String, Value>,
    data: &[T],
) -> Result<()> {
    let chunk_grid: zarrs::array::ChunkGrid = shape
        .clone()
        .try_into()
        .map_err(|e| TimeAverageError::write(format!("{:?}", e)))?;

    let array = ArrayBuilder::new(shape.clone(), data_type, chunk_grid, fill_value)
        .attributes(attrs)
        .build(store.clone(), path)
        .map_err(|e| TimeAverageError::write(e.to_string()))?;

    array
        .store_metadata()
        .map_err(|e| TimeAverageError::write(e.to_string()))?;

    let subset = ArraySubset::new_with_start_shape(vec![0; shape.len()], shape)
        .map_err(|e| TimeAverageError::write(e.to_string()))?;

    array
        .store_array_subset_elements(&subset, data)
        .map_err(|e| TimeAverageError::write(format!("{}: {}", path, e)))?;

    Ok(())
}
