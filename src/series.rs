//! Time-ordered, streaming access to a dynamic image series.

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, warn};

use crate::error::TacError;
use crate::timestamp::AcquisitionTime;
use crate::volume::Volume;
use crate::volume_loader::{AcquisitionHeader, VolumeFormat, VolumeLoader, VolumeLoaderError};

/// One series file as reported by a [`VolumeSource`], before timestamp parsing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawEntry {
    pub path: PathBuf,
    pub header: AcquisitionHeader,
}

/// Provider of series files and of volume decoding.
///
/// `list_entries` must return one entry per acquisition file; its order is
/// advisory since entries are re-sorted by acquisition time.
pub trait VolumeSource {
    fn list_entries(&self) -> Result<Vec<RawEntry>, TacError>;

    /// Decode one volume. Used for series files and for ROI files alike.
    fn load_volume(&self, path: &Path) -> Result<Volume, VolumeLoaderError>;
}

/// A directory of DICOM files, one volume per file.
#[derive(Clone, Debug)]
pub struct DicomDirectory {
    path: PathBuf,
}

impl DicomDirectory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn is_candidate(path: &Path) -> bool {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            return false;
        };
        if name.starts_with('.') || name.eq_ignore_ascii_case("DICOMDIR") {
            return false;
        }
        matches!(VolumeFormat::from_path(path), Ok(VolumeFormat::Dicom))
    }
}

impl VolumeSource for DicomDirectory {
    fn list_entries(&self) -> Result<Vec<RawEntry>, TacError> {
        let mut paths: Vec<_> = fs::read_dir(&self.path)?
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.is_file() && Self::is_candidate(path))
            .collect();
        paths.sort();

        let mut entries = Vec::with_capacity(paths.len());
        for path in paths {
            match VolumeLoader::read_acquisition_header(&path) {
                Ok(header) => entries.push(RawEntry { path, header }),
                Err(VolumeLoaderError::Dicom(e)) => {
                    warn!("Skipping {}: not a readable DICOM file ({e})", path.display());
                }
                Err(e) => return Err(e.into()),
            }
        }
        debug!("Found {} series files in {}", entries.len(), self.path.display());
        Ok(entries)
    }

    fn load_volume(&self, path: &Path) -> Result<Volume, VolumeLoaderError> {
        VolumeLoader::load_from_path(path)
    }
}

/// A series file with its parsed acquisition instant.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SeriesEntry {
    pub path: PathBuf,
    pub acquired: AcquisitionTime,
}

/// Parse acquisition times and sort ascending; ties keep their listed order.
///
/// # Errors
///
/// [`TacError::EmptySeries`] for an empty listing, [`TacError::MalformedTimestamp`]
/// for the first unparseable header.
pub fn order_entries(raw: Vec<RawEntry>) -> Result<Vec<SeriesEntry>, TacError> {
    if raw.is_empty() {
        return Err(TacError::EmptySeries);
    }
    let mut entries = raw
        .into_iter()
        .map(|RawEntry { path, header }| {
            let acquired = AcquisitionTime::parse(&header.date, &header.time)?;
            Ok(SeriesEntry { path, acquired })
        })
        .collect::<Result<Vec<_>, TacError>>()?;
    entries.sort_by_key(|entry| entry.acquired);
    Ok(entries)
}

/// One loaded time point. Dropping it releases the volume.
#[derive(Debug)]
pub struct Frame {
    pub index: usize,
    pub path: PathBuf,
    /// Seconds since the first acquisition of the series.
    pub elapsed: f64,
    pub volume: Volume,
}

/// Iterator loading one series volume per step, in acquisition order.
pub struct SeriesReader<'a, S: VolumeSource + ?Sized> {
    source: &'a S,
    entries: Vec<SeriesEntry>,
    next: usize,
}

impl<'a, S: VolumeSource + ?Sized> SeriesReader<'a, S> {
    pub fn open(source: &'a S) -> Result<Self, TacError> {
        let entries = order_entries(source.list_entries()?)?;
        Ok(Self {
            source,
            entries,
            next: 0,
        })
    }

    pub fn entries(&self) -> &[SeriesEntry] {
        &self.entries
    }
}

impl<S: VolumeSource + ?Sized> Iterator for SeriesReader<'_, S> {
    type Item = Result<Frame, TacError>;

    fn next(&mut self) -> Option<Self::Item> {
        let index = self.next;
        let entry = self.entries.get(index)?;
        self.next += 1;

        let elapsed = entry.acquired.seconds_since(&self.entries[0].acquired);
        let frame = self.source.load_volume(&entry.path).map(|volume| Frame {
            index,
            path: entry.path.clone(),
            elapsed,
            volume,
        });
        Some(frame.map_err(TacError::from))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.entries.len() - self.next;
        (remaining, Some(remaining))
    }
}

impl<S: VolumeSource + ?Sized> ExactSizeIterator for SeriesReader<'_, S> {}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(name: &str, time: &str) -> RawEntry {
        RawEntry {
            path: PathBuf::from(name),
            header: AcquisitionHeader {
                date: "20231201".to_string(),
                time: time.to_string(),
            },
        }
    }

    #[test]
    fn empty_listing_is_rejected() {
        assert!(matches!(order_entries(Vec::new()), Err(TacError::EmptySeries)));
    }

    #[test]
    fn sorts_by_acquisition_not_name() {
        let entries = order_entries(vec![
            raw("Dyn_10.dcm", "133100"),
            raw("Dyn_2.dcm", "133031"),
            raw("Dyn_1.dcm", "133028"),
        ])
        .unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.path.to_str().unwrap()).collect();
        assert_eq!(names, ["Dyn_1.dcm", "Dyn_2.dcm", "Dyn_10.dcm"]);
    }

    #[test]
    fn ties_keep_listing_order() {
        let entries = order_entries(vec![
            raw("b.dcm", "133028"),
            raw("a.dcm", "133028"),
            raw("c.dcm", "133000"),
        ])
        .unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.path.to_str().unwrap()).collect();
        assert_eq!(names, ["c.dcm", "b.dcm", "a.dcm"]);
    }

    #[test]
    fn malformed_header_fails_ordering() {
        let result = order_entries(vec![raw("a.dcm", "133028"), raw("b.dcm", "13")]);
        assert!(matches!(result, Err(TacError::MalformedTimestamp { .. })));
    }

    #[test]
    fn directory_candidates() {
        assert!(DicomDirectory::is_candidate(Path::new("/d/Dyn_1.dcm")));
        assert!(DicomDirectory::is_candidate(Path::new("/d/IM00001")));
        assert!(!DicomDirectory::is_candidate(Path::new("/d/.DS_Store")));
        assert!(!DicomDirectory::is_candidate(Path::new("/d/DICOMDIR")));
        assert!(!DicomDirectory::is_candidate(Path::new("/d/seg.nii.gz")));
        assert!(!DicomDirectory::is_candidate(Path::new("/d/Segmentation.nrrd")));
    }

    #[test]
    fn uid_named_files_are_candidates() {
        assert!(DicomDirectory::is_candidate(Path::new("/d/1.3.12.2.1107.5.1.4.1001")));
        assert!(DicomDirectory::is_candidate(Path::new("/d/IM.0001")));
        // Header read decides; non-DICOM content is skipped while listing.
        assert!(DicomDirectory::is_candidate(Path::new("/d/notes.txt")));
    }
}
