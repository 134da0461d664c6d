//! Physical frame of a volume.
//!
//! Index order follows the DICOM/ITK convention `(x, y, z)` = (column, row, slice);
//! voxel arrays themselves are stored `(z, y, x)`, see [`crate::volume::Volume`].

use std::fmt;

use nalgebra::{Matrix3, Vector3};
use thiserror::Error;

/// Relative tolerance used when comparing two geometries, scaled by voxel spacing.
pub const COORDINATE_TOLERANCE: f64 = 1e-6;
/// Absolute tolerance on direction cosines.
pub const DIRECTION_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Error, PartialEq)]
pub enum GeometryError {
    #[error("spacing must be positive and finite, got {0:?}")]
    InvalidSpacing([f64; 3]),

    #[error("direction matrix is singular")]
    SingularDirection,

    #[error("voxel array shape {found:?} differs from geometry shape {expected:?}")]
    ShapeMismatch {
        expected: (usize, usize, usize),
        found: (usize, usize, usize),
    },
}

#[derive(Clone, Debug, PartialEq)]
pub struct Geometry {
    origin: Vector3<f64>,
    spacing: Vector3<f64>,
    direction: Matrix3<f64>,
    size: [usize; 3],
    index_to_physical: Matrix3<f64>,
    physical_to_index: Matrix3<f64>,
}

impl Geometry {
    /// Build a geometry from origin, spacing, row-major direction cosines and size (x, y, z).
    ///
    /// # Errors
    ///
    /// Returns [`GeometryError`] for non-positive spacing or a singular direction matrix.
    pub fn new(
        origin: [f64; 3],
        spacing: [f64; 3],
        direction: [f64; 9],
        size: [usize; 3],
    ) -> Result<Self, GeometryError> {
        if spacing.iter().any(|s| !s.is_finite() || *s <= 0.0) {
            return Err(GeometryError::InvalidSpacing(spacing));
        }
        let direction = Matrix3::from_row_slice(&direction);
        let index_to_physical = direction * Matrix3::from_diagonal(&Vector3::from(spacing));
        let physical_to_index = index_to_physical
            .try_inverse()
            .ok_or(GeometryError::SingularDirection)?;

        Ok(Self {
            origin: Vector3::from(origin),
            spacing: Vector3::from(spacing),
            direction,
            size,
            index_to_physical,
            physical_to_index,
        })
    }

    /// Identity-oriented geometry.
    pub fn axis_aligned(origin: [f64; 3], spacing: [f64; 3], size: [usize; 3]) -> Result<Self, GeometryError> {
        Self::new(
            origin,
            spacing,
            [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0],
            size,
        )
    }

    pub fn origin(&self) -> [f64; 3] {
        self.origin.into()
    }

    pub fn spacing(&self) -> [f64; 3] {
        self.spacing.into()
    }

    /// Direction cosines, row-major.
    pub fn direction(&self) -> [f64; 9] {
        let d = &self.direction;
        [
            d[(0, 0)], d[(0, 1)], d[(0, 2)],
            d[(1, 0)], d[(1, 1)], d[(1, 2)],
            d[(2, 0)], d[(2, 1)], d[(2, 2)],
        ]
    }

    /// Number of voxels along x, y, z.
    pub fn size(&self) -> [usize; 3] {
        self.size
    }

    /// Array shape `(z, y, x)` of a volume in this geometry.
    pub fn shape(&self) -> (usize, usize, usize) {
        (self.size[2], self.size[1], self.size[0])
    }

    pub fn voxel_count(&self) -> usize {
        self.size.iter().product()
    }

    /// Physical point of the voxel centre at continuous index `(x, y, z)`.
    pub fn index_to_physical(&self, index: Vector3<f64>) -> Vector3<f64> {
        self.origin + self.index_to_physical * index
    }

    /// Continuous index `(x, y, z)` of a physical point.
    pub fn physical_to_index(&self, point: Vector3<f64>) -> Vector3<f64> {
        self.physical_to_index * (point - self.origin)
    }

    /// Affine map `index_other = m * index_self + t` taking indices of `self` to
    /// continuous indices of `other`.
    pub(crate) fn index_map_to(&self, other: &Geometry) -> (Matrix3<f64>, Vector3<f64>) {
        let m = other.physical_to_index * self.index_to_physical;
        let t = other.physical_to_index * (self.origin - other.origin);
        (m, t)
    }

    /// Whether both geometries describe the same physical voxel grid.
    pub fn is_same_as(&self, other: &Geometry) -> bool {
        if self.size != other.size {
            return false;
        }
        let coordinate_tolerance = COORDINATE_TOLERANCE * self.spacing[0];
        let spacing_ok = self
            .spacing
            .iter()
            .zip(other.spacing.iter())
            .all(|(a, b)| (a - b).abs() <= COORDINATE_TOLERANCE * a.abs());
        let origin_ok = self
            .origin
            .iter()
            .zip(other.origin.iter())
            .all(|(a, b)| (a - b).abs() <= coordinate_tolerance);
        let direction_ok = self
            .direction
            .iter()
            .zip(other.direction.iter())
            .all(|(a, b)| (a - b).abs() <= DIRECTION_TOLERANCE);
        spacing_ok && origin_ok && direction_ok
    }
}

impl fmt::Display for Geometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [sx, sy, sz] = self.size;
        write!(
            f,
            "size {sx}x{sy}x{sz}, spacing ({:.6}, {:.6}, {:.6}), origin ({:.6}, {:.6}, {:.6})",
            self.spacing[0],
            self.spacing[1],
            self.spacing[2],
            self.origin[0],
            self.origin[1],
            self.origin[2],
        )
    }
}
