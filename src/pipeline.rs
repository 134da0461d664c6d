//! Streaming extraction of time-activity curves.

use log::{debug, info, warn};

use crate::enums::ResampleStrategy;
use crate::error::TacError;
use crate::geometry::Geometry;
use crate::interpolator::Interpolator;
use crate::roi::{RoiRegistry, RoiSpec};
use crate::series::{Frame, SeriesReader, VolumeSource};
use crate::statistics::LabelStatistics;
use crate::table::{ResultTable, TIME_COLUMN};
use crate::volume::Volume;

/// Resampled copies of one time point's image, one per distinct ROI geometry.
///
/// Lives for a single time point so several ROIs in the same space share one resample.
#[derive(Default)]
struct ResampleCache {
    volumes: Vec<Volume>,
    hits: usize,
}

impl ResampleCache {
    fn get_or_resample(&mut self, image: &Volume, target: &Geometry) -> &Volume {
        if let Some(i) = self
            .volumes
            .iter()
            .position(|v| v.geometry().is_same_as(target))
        {
            self.hits += 1;
            return &self.volumes[i];
        }
        let i = self.volumes.len();
        self.volumes.push(Interpolator::resample(image, target));
        &self.volumes[i]
    }
}

/// Mean ROI intensities over a dynamic series, one time point at a time.
pub struct Pipeline<'a, S: VolumeSource + ?Sized> {
    source: &'a S,
}

impl<'a, S: VolumeSource + ?Sized> Pipeline<'a, S> {
    pub fn new(source: &'a S) -> Self {
        Self { source }
    }

    /// Run the extraction.
    ///
    /// The first volume in acquisition order is the reference geometry for
    /// ROI-side resampling. Only one series volume is resident at a time.
    ///
    /// # Errors
    ///
    /// Fails on the first unreadable series file, malformed timestamp, unreadable
    /// ROI, or geometry mismatch. A missing single label is logged and skipped.
    pub fn extract(&self, specs: &[RoiSpec]) -> Result<ResultTable, TacError> {
        let mut reader = SeriesReader::open(self.source)?;
        let total = reader.len();
        info!("Extracting {} ROI(s) over {total} time point(s)", specs.len());

        let first = reader.next().ok_or(TacError::EmptySeries)??;
        let registry = RoiRegistry::resolve(specs, first.volume.geometry(), self.source)?;

        let mut table = ResultTable::new();
        Self::process(&registry, first, &mut table)?;
        for frame in reader {
            Self::process(&registry, frame?, &mut table)?;
        }

        info!("Extracted {} column(s) over {} time point(s)", table.columns().len(), table.rows());
        Ok(table)
    }

    fn process(registry: &RoiRegistry, frame: Frame, table: &mut ResultTable) -> Result<(), TacError> {
        let Frame {
            index,
            path,
            elapsed,
            volume,
        } = frame;
        debug!("Time point {index} at {elapsed:.3} s: {}", path.display());

        let mut row = vec![(TIME_COLUMN.to_string(), elapsed)];
        let mut cache = ResampleCache::default();

        for roi in registry.iter() {
            let stats = match roi.strategy() {
                ResampleStrategy::None | ResampleStrategy::ResampleRoiToImage => {
                    LabelStatistics::compute(&volume, roi.volume())?
                }
                ResampleStrategy::ResampleImageToRoi => {
                    let target = roi.volume().geometry();
                    if volume.geometry().is_same_as(target) {
                        LabelStatistics::compute(&volume, roi.volume())?
                    } else {
                        LabelStatistics::compute(cache.get_or_resample(&volume, target), roi.volume())?
                    }
                }
            };

            match roi.spec().selection.values(&stats) {
                Ok(values) => row.extend(values),
                Err(TacError::LabelNotFound { label }) => warn!(
                    "Label {label} absent from {} at time point {index}; no value recorded",
                    roi.spec().path.display()
                ),
                Err(e) => return Err(e),
            }
        }

        if cache.hits > 0 {
            debug!("Reused {} resampled image(s) at time point {index}", cache.hits);
        }
        table.append_row(row);
        Ok(())
    }
}

/// Extract time-activity curves for `specs` from the series provided by `source`.
pub fn extract<S: VolumeSource + ?Sized>(source: &S, specs: &[RoiSpec]) -> Result<ResultTable, TacError> {
    Pipeline::new(source).extract(specs)
}
