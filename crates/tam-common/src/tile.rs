//! Tile descriptors and materialized tile data.

use serde::{Deserialize, Serialize};

use crate::bbox::BoundingBox;
use crate::time::TimeRange;

/// Summary statistics stored alongside a tile in the metadata index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TileStats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub count: u64,
}

/// Metadata-only view of a tile, as returned by the index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TileDescriptor {
    pub tile_id: String,
    pub dataset: String,
    pub granule: Option<String>,
    pub section_spec: Option<String>,
    pub bbox: BoundingBox,
    pub time_range: TimeRange,
    pub stats: TileStats,
}

/// A dense `[time, y, x]` cube of samples with a parallel validity mask.
///
/// Non-finite values are always stored as masked.
#[derive(Debug, Clone, PartialEq)]
pub struct MaskedCube {
    shape: [usize; 3],
    values: Vec<f32>,
    valid: Vec<bool>,
}

impl MaskedCube {
    pub fn new(shape: [usize; 3], values: Vec<f32>, valid: Vec<bool>) -> Result<Self, TileError> {
        let expected = shape.iter().product::<usize>();
        if values.len() != expected || valid.len() != expected {
            return Err(TileError::CubeSize {
                shape,
                values: values.len(),
                mask: valid.len(),
            });
        }

        let valid = values
            .iter()
            .zip(valid)
            .map(|(v, ok)| ok && v.is_finite())
            .collect();

        Ok(Self {
            shape,
            values,
            valid,
        })
    }

    /// Build a cube where `None` marks a masked sample.
    pub fn from_options(shape: [usize; 3], samples: &[Option<f32>]) -> Result<Self, TileError> {
        let values = samples.iter().map(|s| s.unwrap_or(0.0)).collect();
        let valid = samples.iter().map(Option::is_some).collect();
        Self::new(shape, values, valid)
    }

    /// A fully valid cube holding `value` everywhere.
    pub fn filled(shape: [usize; 3], value: f32) -> Self {
        let len = shape.iter().product::<usize>();
        Self {
            shape,
            values: vec![value; len],
            valid: vec![value.is_finite(); len],
        }
    }

    pub fn shape(&self) -> [usize; 3] {
        self.shape
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn offset(&self, t: usize, y: usize, x: usize) -> Option<usize> {
        let [nt, ny, nx] = self.shape;
        (t < nt && y < ny && x < nx).then(|| (t * ny + y) * nx + x)
    }

    /// The sample at `(t, y, x)`, or `None` if masked or out of range.
    pub fn get(&self, t: usize, y: usize, x: usize) -> Option<f32> {
        let i = self.offset(t, y, x)?;
        self.valid[i].then(|| self.values[i])
    }

    pub fn is_valid(&self, t: usize, y: usize, x: usize) -> bool {
        self.offset(t, y, x).map(|i| self.valid[i]).unwrap_or(false)
    }

    pub fn valid_count(&self) -> usize {
        self.valid.iter().filter(|v| **v).count()
    }

    pub fn is_fully_masked(&self) -> bool {
        !self.valid.iter().any(|v| *v)
    }

    /// Mask every sample for which `predicate(t, y, x)` holds.
    pub fn mask_where(&mut self, predicate: impl Fn(usize, usize, usize) -> bool) {
        let [nt, ny, nx] = self.shape;
        for t in 0..nt {
            for y in 0..ny {
                for x in 0..nx {
                    if predicate(t, y, x) {
                        self.valid[(t * ny + y) * nx + x] = false;
                    }
                }
            }
        }
    }

    /// Samples in storage order with masked entries as `None`.
    pub fn to_options(&self) -> Vec<Option<f32>> {
        self.values
            .iter()
            .zip(&self.valid)
            .map(|(v, ok)| ok.then_some(*v))
            .collect()
    }
}

/// A tile with its bulk data materialized.
///
/// Coordinate vectors use `None` for masked coordinates. The data cube is
/// indexed `[time, lat, lon]` against those vectors.
#[derive(Debug, Clone)]
pub struct Tile {
    pub descriptor: TileDescriptor,
    latitudes: Vec<Option<f64>>,
    longitudes: Vec<Option<f64>>,
    times: Vec<Option<i64>>,
    data: MaskedCube,
}

impl Tile {
    pub fn new(
        descriptor: TileDescriptor,
        latitudes: Vec<Option<f64>>,
        longitudes: Vec<Option<f64>>,
        times: Vec<Option<i64>>,
        data: MaskedCube,
    ) -> Result<Self, TileError> {
        let expected = [times.len(), latitudes.len(), longitudes.len()];
        if data.shape() != expected {
            return Err(TileError::ShapeMismatch {
                tile_id: descriptor.tile_id,
                cube: data.shape(),
                coords: expected,
            });
        }

        Ok(Self {
            descriptor,
            latitudes,
            longitudes,
            times,
            data,
        })
    }

    pub fn id(&self) -> &str {
        &self.descriptor.tile_id
    }

    pub fn latitudes(&self) -> &[Option<f64>] {
        &self.latitudes
    }

    pub fn longitudes(&self) -> &[Option<f64>] {
        &self.longitudes
    }

    pub fn times(&self) -> &[Option<i64>] {
        &self.times
    }

    pub fn data(&self) -> &MaskedCube {
        &self.data
    }

    pub fn has_valid_samples(&self) -> bool {
        !self.data.is_fully_masked()
    }

    /// Restrict the tile to `bbox`.
    ///
    /// Coordinates outside the box become masked, and the data mask absorbs
    /// the time, latitude and longitude masks.
    pub fn mask_to_bbox(&mut self, bbox: &BoundingBox) {
        for lat in self.latitudes.iter_mut() {
            if matches!(lat, Some(v) if !bbox.contains_lat(*v)) {
                *lat = None;
            }
        }
        for lon in self.longitudes.iter_mut() {
            if matches!(lon, Some(v) if !bbox.contains_lon(*v)) {
                *lon = None;
            }
        }

        let (times, lats, lons) = (&self.times, &self.latitudes, &self.longitudes);
        self.data
            .mask_where(|t, y, x| times[t].is_none() || lats[y].is_none() || lons[x].is_none());
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TileError {
    #[error("Cube of shape {shape:?} got {values} values and {mask} mask entries")]
    CubeSize {
        shape: [usize; 3],
        values: usize,
        mask: usize,
    },

    #[error("Tile {tile_id}: cube shape {cube:?} does not match coordinate lengths {coords:?}")]
    ShapeMismatch {
        tile_id: String,
        cube: [usize; 3],
        coords: [usize; 3],
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor() -> TileDescriptor {
        TileDescriptor {
            tile_id: "t-1".to_string(),
            dataset: "alpha".to_string(),
            granule: None,
            section_spec: None,
            bbox: BoundingBox::new(0.0, 2.0, 0.0, 2.0),
            time_range: TimeRange::new(0, 0),
            stats: TileStats::default(),
        }
    }

    #[test]
    fn test_non_finite_values_are_masked() {
        let cube = MaskedCube::new([1, 1, 3], vec![1.0, f32::NAN, 3.0], vec![true; 3]).unwrap();
        assert_eq!(cube.valid_count(), 2);
        assert_eq!(cube.get(0, 0, 1), None);
        assert_eq!(cube.get(0, 0, 2), Some(3.0));
        assert_eq!(cube.get(0, 1, 0), None);
    }

    #[test]
    fn test_cube_size_mismatch() {
        assert!(MaskedCube::new([1, 2, 2], vec![0.0; 3], vec![true; 4]).is_err());
    }

    #[test]
    fn test_tile_shape_mismatch() {
        let result = Tile::new(
            descriptor(),
            vec![Some(0.5), Some(1.5)],
            vec![Some(0.5)],
            vec![Some(0)],
            MaskedCube::filled([1, 2, 2], 1.0),
        );
        assert!(matches!(result, Err(TileError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_mask_to_bbox() {
        let mut tile = Tile::new(
            descriptor(),
            vec![Some(0.5), Some(1.5)],
            vec![Some(0.5), Some(1.5)],
            vec![Some(0)],
            MaskedCube::filled([1, 2, 2], 1.0),
        )
        .unwrap();

        tile.mask_to_bbox(&BoundingBox::new(0.0, 1.0, 0.0, 2.0));

        assert_eq!(tile.latitudes(), &[Some(0.5), None]);
        assert_eq!(tile.data().valid_count(), 2);
        assert!(tile.data().is_valid(0, 0, 1));
        assert!(!tile.data().is_valid(0, 1, 0));
    }
}
