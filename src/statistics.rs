//! Per-label mean intensity of an image inside a label mask.

use std::collections::BTreeMap;

use crate::error::TacError;
use crate::volume::Volume;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
struct Accumulator {
    sum: f64,
    count: u64,
}

/// Sums and voxel counts of one image under every label of a ROI volume.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LabelStatistics {
    labels: BTreeMap<i64, Accumulator>,
}

impl LabelStatistics {
    /// Accumulate `image` under each distinct non-negative integer label of `roi`.
    ///
    /// Non-finite or negative ROI values do not form labels.
    ///
    /// # Errors
    ///
    /// [`TacError::GeometryMismatch`] if both volumes do not share a geometry.
    pub fn compute(image: &Volume, roi: &Volume) -> Result<Self, TacError> {
        if !image.geometry().is_same_as(roi.geometry()) {
            return Err(TacError::GeometryMismatch {
                expected: Box::new(roi.geometry().clone()),
                found: Box::new(image.geometry().clone()),
            });
        }

        let mut labels = BTreeMap::<i64, Accumulator>::new();
        for (&value, &label) in image.data().iter().zip(roi.data().iter()) {
            let Some(label) = Self::label_of(label) else {
                continue;
            };
            let acc = labels.entry(label).or_default();
            acc.sum += f64::from(value);
            acc.count += 1;
        }
        Ok(Self { labels })
    }

    #[inline]
    fn label_of(value: f32) -> Option<i64> {
        if !value.is_finite() {
            return None;
        }
        let label = value.round();
        (label >= 0.0).then_some(label as i64)
    }

    /// Labels present in the ROI, ascending.
    pub fn labels(&self) -> impl Iterator<Item = i64> + '_ {
        self.labels.keys().copied()
    }

    pub fn count(&self, label: i64) -> u64 {
        self.labels.get(&label).map_or(0, |acc| acc.count)
    }

    /// Mean image value under `label`.
    ///
    /// # Errors
    ///
    /// [`TacError::LabelNotFound`] when the label covers no voxel.
    pub fn mean(&self, label: i64) -> Result<f64, TacError> {
        self.labels
            .get(&label)
            .map(|acc| acc.sum / acc.count as f64)
            .ok_or(TacError::LabelNotFound { label })
    }

    /// `(label, mean)` for every present label, ascending by label.
    pub fn means(&self) -> impl Iterator<Item = (i64, f64)> + '_ {
        self.labels
            .iter()
            .map(|(&label, acc)| (label, acc.sum / acc.count as f64))
    }
}

/// Mean image value for every label present in `roi`.
pub fn label_means(image: &Volume, roi: &Volume) -> Result<BTreeMap<i64, f64>, TacError> {
    Ok(LabelStatistics::compute(image, roi)?.means().collect())
}
