//! Bounding box types and operations.

use serde::{Deserialize, Serialize};

/// A geographic bounding box in degrees.
///
/// Both edges are inclusive. A well-formed box has `min <= max` on each axis;
/// see [`BoundingBox::validate`] for the stricter check applied to queries.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl BoundingBox {
    /// Create a new bounding box from its latitude and longitude extents.
    pub fn new(min_lat: f64, max_lat: f64, min_lon: f64, max_lon: f64) -> Self {
        Self {
            min_lat,
            max_lat,
            min_lon,
            max_lon,
        }
    }

    /// Height of the box in degrees of latitude.
    pub fn lat_span(&self) -> f64 {
        self.max_lat - self.min_lat
    }

    /// Width of the box in degrees of longitude.
    pub fn lon_span(&self) -> f64 {
        self.max_lon - self.min_lon
    }

    /// Latitude of the horizontal midline.
    pub fn mid_lat(&self) -> f64 {
        (self.min_lat + self.max_lat) / 2.0
    }

    /// Longitude of the vertical midline.
    pub fn mid_lon(&self) -> f64 {
        (self.min_lon + self.max_lon) / 2.0
    }

    /// Check that the box encloses a positive area.
    ///
    /// Rejects non-finite coordinates, inverted axes and zero-width axes.
    pub fn validate(&self) -> Result<(), BboxError> {
        let coords = [self.min_lat, self.max_lat, self.min_lon, self.max_lon];
        if coords.iter().any(|c| !c.is_finite()) {
            return Err(BboxError::NonFinite(*self));
        }
        for (axis, min, max) in [
            ("latitude", self.min_lat, self.max_lat),
            ("longitude", self.min_lon, self.max_lon),
        ] {
            if min > max {
                return Err(BboxError::Inverted { axis, min, max });
            }
            if min == max {
                return Err(BboxError::ZeroWidth { axis, value: min });
            }
        }
        Ok(())
    }

    /// Check if this box intersects another, edges included.
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        !(self.max_lat < other.min_lat
            || self.min_lat > other.max_lat
            || self.max_lon < other.min_lon
            || self.min_lon > other.max_lon)
    }

    /// Check if a point is contained within this box, edges included.
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        self.contains_lat(lat) && self.contains_lon(lon)
    }

    pub fn contains_lat(&self, lat: f64) -> bool {
        lat >= self.min_lat && lat <= self.max_lat
    }

    pub fn contains_lon(&self, lon: f64) -> bool {
        lon >= self.min_lon && lon <= self.max_lon
    }
}

impl std::fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "lat [{}, {}] lon [{}, {}]",
            self.min_lat, self.max_lat, self.min_lon, self.max_lon
        )
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BboxError {
    #[error("Bounding box has non-finite coordinates: {0}")]
    NonFinite(BoundingBox),

    #[error("Inverted {axis} range: min {min} > max {max}")]
    Inverted {
        axis: &'static str,
        min: f64,
        max: f64,
    },

    #[error("Zero-width {axis} range at {value}")]
    ZeroWidth { axis: &'static str, value: f64 },
}
