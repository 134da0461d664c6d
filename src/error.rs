use std::path::PathBuf;

use thiserror::Error;

use crate::geometry::Geometry;
use crate::volume_loader::VolumeLoaderError;

#[derive(Debug, Error)]
pub enum TacError {
    #[error("Malformed acquisition timestamp (date {date:?}, time {time:?}): {reason}")]
    MalformedTimestamp {
        date: String,
        time: String,
        reason: &'static str,
    },

    #[error("Image series contains no entries")]
    EmptySeries,

    #[error("Failed to load ROI from {path}: {source}")]
    RoiLoad {
        path: PathBuf,
        #[source]
        source: VolumeLoaderError,
    },

    #[error("Geometry mismatch: expected {expected}, found {found}")]
    GeometryMismatch {
        expected: Box<Geometry>,
        found: Box<Geometry>,
    },

    #[error("Label {label} not present in ROI")]
    LabelNotFound { label: i64 },

    #[error("Unknown column {0:?}")]
    UnknownColumn(String),

    #[error(transparent)]
    Load(#[from] VolumeLoaderError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Table write error: {0}")]
    Csv(#[from] csv::Error),
}
