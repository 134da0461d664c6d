use ndarray::Array3;

use crate::geometry::{Geometry, GeometryError};

/// Scalar voxel data with its physical frame.
///
/// Voxels are stored `(depth, height, width)` = `(z, y, x)`.
#[derive(Clone, Debug)]
pub struct Volume {
    data: Array3<f32>,
    geometry: Geometry,
}

impl Volume {
    /// # Errors
    ///
    /// Returns [`GeometryError::ShapeMismatch`] if the array shape does not match the geometry size.
    pub fn new(data: Array3<f32>, geometry: Geometry) -> Result<Self, GeometryError> {
        if data.dim() != geometry.shape() {
            return Err(GeometryError::ShapeMismatch {
                expected: geometry.shape(),
                found: data.dim(),
            });
        }
        Ok(Self { data, geometry })
    }

    /// Shape already guaranteed by construction from `geometry.shape()`.
    pub(crate) fn from_resampled(data: Array3<f32>, geometry: Geometry) -> Self {
        debug_assert_eq!(data.dim(), geometry.shape());
        Self { data, geometry }
    }

    /// Get the dimensions of the volume (depth, height, width)
    pub fn dim(&self) -> (usize, usize, usize) {
        self.data.dim()
    }

    /// Get a reference to the underlying data
    pub fn data(&self) -> &Array3<f32> {
        &self.data
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }
}
