//! JSON encoding of bulk tile payloads.

use serde::{Deserialize, Serialize};

use tam_common::{MaskedCube, StoreResult, Tile, TileDescriptor};

/// The bulk portion of a tile as stored in the object store.
///
/// `null` entries mark masked coordinates or samples. `values` is laid out
/// `[time, lat, lon]` in row-major order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TilePayload {
    pub latitudes: Vec<Option<f64>>,
    pub longitudes: Vec<Option<f64>>,
    pub times: Vec<Option<i64>>,
    pub shape: [usize; 3],
    pub values: Vec<Option<f32>>,
}

impl TilePayload {
    pub fn from_tile(tile: &Tile) -> Self {
        Self {
            latitudes: tile.latitudes().to_vec(),
            longitudes: tile.longitudes().to_vec(),
            times: tile.times().to_vec(),
            shape: tile.data().shape(),
            values: tile.data().to_options(),
        }
    }

    /// Attach this payload to its descriptor.
    pub fn into_tile(self, descriptor: TileDescriptor) -> StoreResult<Tile> {
        let data = MaskedCube::from_options(self.shape, &self.values)?;
        Ok(Tile::new(
            descriptor,
            self.latitudes,
            self.longitudes,
            self.times,
            data,
        )?)
    }

    pub fn to_json_bytes(&self) -> StoreResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_json_bytes(bytes: &[u8]) -> StoreResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tam_common::{BoundingBox, StoreError, TileStats, TimeRange};

    fn descriptor() -> TileDescriptor {
        TileDescriptor {
            tile_id: "p-1".to_string(),
            dataset: "alpha".to_string(),
            granule: Some("granule.nc".to_string()),
            section_spec: None,
            bbox: BoundingBox::new(0.0, 1.0, 0.0, 2.0),
            time_range: TimeRange::new(100, 100),
            stats: TileStats::default(),
        }
    }

    #[test]
    fn test_null_values_decode_as_masked() {
        let json = r#"{
            "latitudes": [0.5],
            "longitudes": [0.5, null],
            "times": [100],
            "shape": [1, 1, 2],
            "values": [4.0, null]
        }"#;

        let tile = TilePayload::from_json_bytes(json.as_bytes())
            .unwrap()
            .into_tile(descriptor())
            .unwrap();

        assert_eq!(tile.data().get(0, 0, 0), Some(4.0));
        assert_eq!(tile.data().get(0, 0, 1), None);
        assert_eq!(tile.longitudes()[1], None);
    }

    #[test]
    fn test_inconsistent_shape_is_decode_error() {
        let payload = TilePayload {
            latitudes: vec![Some(0.5)],
            longitudes: vec![Some(0.5)],
            times: vec![Some(100)],
            shape: [1, 1, 2],
            values: vec![Some(1.0), Some(2.0)],
        };

        assert!(matches!(
            payload.into_tile(descriptor()),
            Err(StoreError::Decode(_))
        ));
    }
}
