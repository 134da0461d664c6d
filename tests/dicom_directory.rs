use std::fs;

use dicom_tac::{DicomDirectory, ResampleStrategy, RoiSpec, TacError, VolumeSource, extract};

#[test]
fn unreadable_and_foreign_files_are_skipped() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("Dyn_1.dcm"), b"not a dicom file").unwrap();
    fs::write(dir.path().join("notes.txt"), b"acquired on a tuesday").unwrap();
    fs::write(dir.path().join("1.3.12.2.1107.5.1.4.1001"), [0u8; 64]).unwrap();
    fs::write(dir.path().join(".hidden"), b"").unwrap();
    fs::create_dir(dir.path().join("sub")).unwrap();

    let series = DicomDirectory::new(dir.path());
    assert!(series.list_entries().unwrap().is_empty());
}

#[test]
fn directory_without_series_is_empty() {
    let dir = tempfile::tempdir().unwrap();
    let series = DicomDirectory::new(dir.path());
    let result = extract(&series, &[RoiSpec::all_labels("seg.nii", ResampleStrategy::None)]);
    assert!(matches!(result, Err(TacError::EmptySeries)));
}

#[test]
fn missing_directory_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let series = DicomDirectory::new(dir.path().join("absent"));
    assert!(matches!(series.list_entries(), Err(TacError::Io(_))));
}
