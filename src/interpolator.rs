use nalgebra::Vector3;
use ndarray::Array3;

use crate::geometry::Geometry;
use crate::volume::Volume;

/// Value assigned to target voxels that fall outside the source grid.
pub const BACKGROUND: f32 = 0.0;

pub struct Interpolator;

impl Interpolator {
    /// Resample `source` onto `target` by nearest-neighbour lookup.
    ///
    /// The output geometry is exactly `target`. Discrete label values are
    /// preserved since no two source voxels are ever blended.
    pub fn resample(source: &Volume, target: &Geometry) -> Volume {
        if source.geometry() == target {
            return source.clone();
        }

        let (m, t) = target.index_map_to(source.geometry());
        let [sx, sy, sz] = source.geometry().size();
        let src = source.data();

        let data = Array3::from_shape_fn(target.shape(), |(k, j, i)| {
            let continuous = m * Vector3::new(i as f64, j as f64, k as f64) + t;
            match Self::nearest_index(continuous, [sx, sy, sz]) {
                Some([x, y, z]) => src[[z, y, x]],
                None => BACKGROUND,
            }
        });

        Volume::from_resampled(data, target.clone())
    }

    /// Round a continuous `(x, y, z)` index half-up and bounds-check it.
    #[inline]
    fn nearest_index(continuous: Vector3<f64>, size: [usize; 3]) -> Option<[usize; 3]> {
        let mut index = [0usize; 3];
        for axis in 0..3 {
            let rounded = (continuous[axis] + 0.5).floor();
            if !(rounded >= 0.0 && rounded < size[axis] as f64) {
                return None;
            }
            index[axis] = rounded as usize;
        }
        Some(index)
    }
}
