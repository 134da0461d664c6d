//! Region-of-interest definitions and their one-time resolution against the series.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::rc::Rc;

use log::{debug, info};

use crate::enums::ResampleStrategy;
use crate::error::TacError;
use crate::geometry::Geometry;
use crate::interpolator::Interpolator;
use crate::series::VolumeSource;
use crate::statistics::LabelStatistics;
use crate::volume::Volume;

/// Which labels of a ROI volume become output columns.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RoiSelection {
    /// A single label written to a named column.
    Label { value: i64, column: String },
    /// Every label present, keyed by its decimal form unless renamed or ignored.
    AllLabels {
        ignore: BTreeSet<i64>,
        rename: BTreeMap<i64, String>,
    },
}

impl RoiSelection {
    /// Output `(column, mean)` pairs for one time point, in label order.
    ///
    /// # Errors
    ///
    /// [`TacError::LabelNotFound`] when a single selected label is absent.
    pub fn values(&self, stats: &LabelStatistics) -> Result<Vec<(String, f64)>, TacError> {
        match self {
            Self::Label { value, column } => Ok(vec![(column.clone(), stats.mean(*value)?)]),
            Self::AllLabels { ignore, rename } => Ok(stats
                .means()
                .filter(|(label, _)| !ignore.contains(label))
                .map(|(label, mean)| {
                    let column = rename.get(&label).cloned().unwrap_or_else(|| label.to_string());
                    (column, mean)
                })
                .collect()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoiSpec {
    pub path: PathBuf,
    pub selection: RoiSelection,
    pub strategy: ResampleStrategy,
}

impl RoiSpec {
    /// One label of the ROI file, reported under `column`.
    pub fn label(
        path: impl Into<PathBuf>,
        value: i64,
        column: impl Into<String>,
        strategy: ResampleStrategy,
    ) -> Self {
        Self {
            path: path.into(),
            selection: RoiSelection::Label {
                value,
                column: column.into(),
            },
            strategy,
        }
    }

    /// All labels of the ROI file.
    pub fn all_labels(path: impl Into<PathBuf>, strategy: ResampleStrategy) -> Self {
        Self {
            path: path.into(),
            selection: RoiSelection::AllLabels {
                ignore: BTreeSet::new(),
                rename: BTreeMap::new(),
            },
            strategy,
        }
    }

    /// Skip `labels` in whole-mask mode. No effect on a single-label spec.
    pub fn ignoring(mut self, labels: impl IntoIterator<Item = i64>) -> Self {
        if let RoiSelection::AllLabels { ignore, .. } = &mut self.selection {
            ignore.extend(labels);
        }
        self
    }

    /// Report `label` under `column` in whole-mask mode. No effect on a single-label spec.
    pub fn renaming(mut self, label: i64, column: impl Into<String>) -> Self {
        if let RoiSelection::AllLabels { rename, .. } = &mut self.selection {
            rename.insert(label, column.into());
        }
        self
    }
}

/// A ROI spec with its volume, ready for statistics.
#[derive(Clone, Debug)]
pub struct ResolvedRoi {
    spec: RoiSpec,
    volume: Rc<Volume>,
}

impl ResolvedRoi {
    pub fn spec(&self) -> &RoiSpec {
        &self.spec
    }

    pub fn strategy(&self) -> ResampleStrategy {
        self.spec.strategy
    }

    /// The ROI volume; already in the reference geometry for
    /// [`ResampleStrategy::ResampleRoiToImage`].
    pub fn volume(&self) -> &Volume {
        &self.volume
    }
}

/// ROI volumes held for the whole extraction.
#[derive(Debug, Default)]
pub struct RoiRegistry {
    rois: Vec<ResolvedRoi>,
}

impl RoiRegistry {
    /// Load every ROI once and apply ROI-side resampling into `reference`.
    ///
    /// Specs naming the same file with the same strategy share one volume.
    ///
    /// # Errors
    ///
    /// [`TacError::RoiLoad`] for the first ROI file that cannot be read.
    pub fn resolve<S: VolumeSource + ?Sized>(
        specs: &[RoiSpec],
        reference: &Geometry,
        source: &S,
    ) -> Result<Self, TacError> {
        let mut loaded: Vec<(PathBuf, ResampleStrategy, Rc<Volume>)> = Vec::new();
        let mut rois = Vec::with_capacity(specs.len());

        for spec in specs {
            let shared = loaded
                .iter()
                .find(|(path, strategy, _)| *path == spec.path && *strategy == spec.strategy)
                .map(|(_, _, volume)| Rc::clone(volume));
            let volume = match shared {
                Some(volume) => volume,
                None => {
                    let volume = Rc::new(Self::load(spec, reference, source)?);
                    loaded.push((spec.path.clone(), spec.strategy, Rc::clone(&volume)));
                    volume
                }
            };
            rois.push(ResolvedRoi {
                spec: spec.clone(),
                volume,
            });
        }

        info!("Resolved {} ROI(s) from {} file(s)", rois.len(), loaded.len());
        Ok(Self { rois })
    }

    fn load<S: VolumeSource + ?Sized>(
        spec: &RoiSpec,
        reference: &Geometry,
        source: &S,
    ) -> Result<Volume, TacError> {
        let volume = source
            .load_volume(&spec.path)
            .map_err(|error| TacError::RoiLoad {
                path: spec.path.clone(),
                source: error,
            })?;
        debug!(
            "Loaded ROI {} ({}), strategy {}",
            spec.path.display(),
            volume.geometry(),
            spec.strategy
        );

        Ok(match spec.strategy {
            ResampleStrategy::None | ResampleStrategy::ResampleImageToRoi => volume,
            ResampleStrategy::ResampleRoiToImage => Interpolator::resample(&volume, reference),
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResolvedRoi> {
        self.rois.iter()
    }

    pub fn len(&self) -> usize {
        self.rois.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rois.is_empty()
    }
}
