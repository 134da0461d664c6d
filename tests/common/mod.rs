#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

use dicom_tac::{AcquisitionHeader, Geometry, RawEntry, TacError, Volume, VolumeLoaderError, VolumeSource};
use ndarray::Array3;

pub const DATE: &str = "20231201";

/// Series and ROI volumes held in memory, recording every load.
#[derive(Default)]
pub struct MemorySource {
    entries: Vec<RawEntry>,
    volumes: HashMap<PathBuf, Volume>,
    loads: RefCell<Vec<PathBuf>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a series file acquired at `time` on [`DATE`].
    pub fn frame(mut self, name: &str, time: &str, volume: Volume) -> Self {
        self.entries.push(RawEntry {
            path: PathBuf::from(name),
            header: AcquisitionHeader {
                date: DATE.to_string(),
                time: time.to_string(),
            },
        });
        self.volumes.insert(PathBuf::from(name), volume);
        self
    }

    /// Add a non-series file such as a ROI.
    pub fn file(mut self, name: &str, volume: Volume) -> Self {
        self.volumes.insert(PathBuf::from(name), volume);
        self
    }

    pub fn loads(&self) -> Vec<PathBuf> {
        self.loads.borrow().clone()
    }
}

impl VolumeSource for MemorySource {
    fn list_entries(&self) -> Result<Vec<RawEntry>, TacError> {
        Ok(self.entries.clone())
    }

    fn load_volume(&self, path: &Path) -> Result<Volume, VolumeLoaderError> {
        self.loads.borrow_mut().push(path.to_path_buf());
        self.volumes.get(path).cloned().ok_or_else(|| {
            VolumeLoaderError::Io(io::Error::new(io::ErrorKind::NotFound, path.display().to_string()))
        })
    }
}

pub fn geometry(size: [usize; 3], spacing: [f64; 3], origin: [f64; 3]) -> Geometry {
    Geometry::axis_aligned(origin, spacing, size).unwrap()
}

/// Volume with voxel `(z, y, x)` set by `f`.
pub fn volume(geometry: &Geometry, f: impl Fn((usize, usize, usize)) -> f32) -> Volume {
    Volume::new(Array3::from_shape_fn(geometry.shape(), f), geometry.clone()).unwrap()
}
