//! # DICOM-TAC library
//!
//! This crate extracts time-activity curves (TACs) from a dynamic series of
//! DICOM volumes: for every acquisition it computes the mean voxel value
//! inside one or more region-of-interest (ROI) masks.
//!
//! The series is streamed. Files are ordered by their acquisition date and
//! time (`AcquisitionDate`, `AcquisitionTime`), then loaded one at a time;
//! only the current volume and the resolved ROI volumes are held in memory.
//! When a ROI and the dynamic images live in different physical spaces one
//! side is resampled with nearest-neighbour lookup, chosen per ROI:
//!  - `none`: both must already share a geometry
//!  - `img`: every image is resampled into the ROI geometry
//!  - `roi`: the ROI is resampled once into the geometry of the first image
//!
//! ROI files may be DICOM, NIfTI (`.nii`, `.nii.gz`) or NRRD (`.nrrd`). Every
//! series file is one time point: a multi-frame volume, or a single slice
//! taken as a one-slice volume.
//!
//! # Examples
//!
//! ## Mean of label 1 over a series
//!
//! ```no_run
//! # use dicom_tac::{DicomDirectory, ResampleStrategy, RoiSpec, extract};
//! let series = DicomDirectory::new("dynamic");
//! let rois = [RoiSpec::label("seg.nii.gz", 1, "liver", ResampleStrategy::ResampleImageToRoi)];
//! let mut table = extract(&series, &rois).expect("should have extracted curves");
//! table.scale("liver", "liver_kbq", 0.001).expect("column should exist");
//! table.write_to_path("tac.txt").expect("should have written table");
//! ```

pub mod enums;
pub mod error;
pub mod geometry;
pub mod interpolator;
mod nrrd;
pub mod pipeline;
pub mod roi;
pub mod series;
pub mod statistics;
pub mod table;
pub mod timestamp;
pub mod volume;
pub mod volume_loader;

pub use enums::ResampleStrategy;
pub use error::TacError;
pub use geometry::Geometry;
pub use interpolator::Interpolator;
pub use pipeline::{Pipeline, extract};
pub use roi::{RoiRegistry, RoiSelection, RoiSpec};
pub use series::{DicomDirectory, RawEntry, SeriesEntry, SeriesReader, VolumeSource};
pub use statistics::{LabelStatistics, label_means};
pub use table::{ResultTable, TIME_COLUMN};
pub use timestamp::AcquisitionTime;
pub use volume::Volume;
pub use volume_loader::{AcquisitionHeader, VolumeLoader, VolumeLoaderError};
