use crate::geometry::{Geometry, GeometryError};
use crate::nrrd;
use crate::volume::Volume;

use dicom::{
    core::Tag,
    object::{FileDicomObject, InMemDicomObject, OpenFileOptions, open_file},
    pixeldata::{ConvertOptions, ModalityLutOption, PixelDecoder, VoiLutOption},
};
use dicom_dictionary_std::tags;
use log::debug;
use nalgebra::{Matrix4, Vector3};
use ndarray::{Array3, s};
use nifti::{IntoNdArray, NiftiHeader, NiftiObject, ReaderOptions};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VolumeLoaderError {
    #[error("Missing attribute {0}")]
    MissingAttribute(&'static str),

    #[error("Missing spacing information")]
    MissingSpacing,

    #[error("Unsupported volume format: {0}")]
    UnsupportedFormat(String),

    #[error("Unsupported voxel array shape {0:?}")]
    InvalidShape(Vec<usize>),

    #[error("Pixel data error: {0}")]
    PixelData(String),

    #[error("NRRD error: {0}")]
    Nrrd(String),

    #[error(transparent)]
    Geometry(#[from] GeometryError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("DICOM error: {0}")]
    Dicom(#[from] dicom::object::ReadError),

    #[error("NIfTI error: {0}")]
    Nifti(#[from] nifti::NiftiError),
}

/// Acquisition date and time attributes exactly as stored in a DICOM header.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AcquisitionHeader {
    pub date: String,
    pub time: String,
}

/// Format of a single volume file, decided from its extension.
///
/// Anything that is not NIfTI or NRRD is read as DICOM, whatever its suffix.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VolumeFormat {
    Dicom,
    Nifti,
    Nrrd,
}

impl VolumeFormat {
    pub fn from_path(path: &Path) -> Result<Self, VolumeLoaderError> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        if name.ends_with(".nii") || name.ends_with(".nii.gz") {
            return Ok(Self::Nifti);
        }
        if name.ends_with(".nrrd") {
            return Ok(Self::Nrrd);
        }
        // Detached NRRD header; the payload lives in a separate file.
        if name.ends_with(".nhdr") {
            return Err(VolumeLoaderError::UnsupportedFormat("nhdr".to_string()));
        }
        Ok(Self::Dicom)
    }
}

const SHARED_GROUPS: Tag = tags::SHARED_FUNCTIONAL_GROUPS_SEQUENCE;
const PER_FRAME_GROUPS: Tag = tags::PER_FRAME_FUNCTIONAL_GROUPS_SEQUENCE;

pub struct VolumeLoader;

impl VolumeLoader {
    /// Load a single volume file, DICOM, NIfTI or NRRD depending on the file name.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Volume, VolumeLoaderError> {
        let path = path.as_ref();
        match VolumeFormat::from_path(path)? {
            VolumeFormat::Dicom => Self::load_dicom_file(path),
            VolumeFormat::Nifti => Self::load_nifti_file(path),
            VolumeFormat::Nrrd => Self::load_nrrd_file(path),
        }
    }

    /// Load a DICOM file as a volume.
    ///
    /// Multi-frame files become one slice per frame; a classic single-frame
    /// file becomes a one-slice volume.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be parsed, its pixel data cannot be
    /// decoded, or no pixel spacing is present.
    pub fn load_dicom_file(path: impl AsRef<Path>) -> Result<Volume, VolumeLoaderError> {
        let path = path.as_ref();
        let dicom_object = open_file(path)?;
        let data = Self::decode_frames(&dicom_object)?;
        let geometry = Self::dicom_geometry(&dicom_object, data.dim())?;
        debug!("Loaded DICOM volume {} ({geometry})", path.display());
        Ok(Volume::new(data, geometry)?)
    }

    /// Read only the acquisition date and time of a DICOM file, stopping before pixel data.
    pub fn read_acquisition_header(path: impl AsRef<Path>) -> Result<AcquisitionHeader, VolumeLoaderError> {
        let dicom_object = OpenFileOptions::new()
            .read_until(tags::PIXEL_DATA)
            .open_file(path.as_ref())?;
        Self::acquisition_header(&dicom_object)
    }

    pub(crate) fn acquisition_header(
        dicom_object: &InMemDicomObject,
    ) -> Result<AcquisitionHeader, VolumeLoaderError> {
        let date = Self::get_string(dicom_object, tags::ACQUISITION_DATE)
            .ok_or(VolumeLoaderError::MissingAttribute("AcquisitionDate"))?;
        let time = Self::get_string(dicom_object, tags::ACQUISITION_TIME)
            .ok_or(VolumeLoaderError::MissingAttribute("AcquisitionTime"))?;
        Ok(AcquisitionHeader { date, time })
    }

    /// Load a NIfTI file, converting its RAS world frame to the DICOM patient (LPS) frame.
    pub fn load_nifti_file(path: impl AsRef<Path>) -> Result<Volume, VolumeLoaderError> {
        let path = path.as_ref();
        let nifti_object = ReaderOptions::new().read_file(path)?;
        let header = nifti_object.header().clone();
        let array = nifti_object.into_volume().into_ndarray::<f32>()?;

        let shape = array.shape().to_vec();
        let (nx, ny, nz) = match shape.as_slice() {
            [x, y] => (*x, *y, 1),
            [x, y, z] => (*x, *y, *z),
            [x, y, z, 1] => (*x, *y, *z),
            _ => return Err(VolumeLoaderError::InvalidShape(shape)),
        };

        // NIfTI arrays are indexed (x, y, z); volumes are stored (z, y, x).
        let voxels: Vec<f32> = array.iter().copied().collect();
        let data = Array3::from_shape_vec((nx, ny, nz), voxels)
            .map_err(|_| VolumeLoaderError::InvalidShape(shape.clone()))?
            .reversed_axes()
            .as_standard_layout()
            .into_owned();

        let geometry = Self::nifti_geometry(&header, [nx, ny, nz])?;
        debug!("Loaded NIfTI volume {} ({geometry})", path.display());
        Ok(Volume::new(data, geometry)?)
    }

    /// Load a NRRD file with attached raw or gzip data.
    pub fn load_nrrd_file(path: impl AsRef<Path>) -> Result<Volume, VolumeLoaderError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        let volume = nrrd::read_volume(&bytes)?;
        debug!("Loaded NRRD volume {} ({})", path.display(), volume.geometry());
        Ok(volume)
    }

    fn decode_frames(
        dicom_object: &FileDicomObject<InMemDicomObject>,
    ) -> Result<Array3<f32>, VolumeLoaderError> {
        let pixel_data = dicom_object
            .decode_pixel_data()
            .map_err(|e| VolumeLoaderError::PixelData(e.to_string()))?;
        let options = ConvertOptions::new()
            .with_modality_lut(ModalityLutOption::Default)
            .with_voi_lut(VoiLutOption::Identity);
        pixel_data
            .to_ndarray_with_options::<f32>(&options)
            .map(|arr| arr.slice_move(s![.., .., .., 0]))
            .map_err(|e| VolumeLoaderError::PixelData(e.to_string()))
    }

    /// Geometry of a decoded `(frames, rows, columns)` block.
    pub(crate) fn dicom_geometry(
        dicom_object: &InMemDicomObject,
        (frames, rows, columns): (usize, usize, usize),
    ) -> Result<Geometry, VolumeLoaderError> {
        let orientation = Self::find_f64s(
            dicom_object,
            tags::IMAGE_ORIENTATION_PATIENT,
            &[
                &[SHARED_GROUPS, tags::PLANE_ORIENTATION_SEQUENCE],
                &[PER_FRAME_GROUPS, tags::PLANE_ORIENTATION_SEQUENCE],
            ],
        )
        .unwrap_or_else(|| vec![1.0, 0.0, 0.0, 0.0, 1.0, 0.0]);
        if orientation.len() != 6 {
            return Err(VolumeLoaderError::MissingAttribute("ImageOrientationPatient"));
        }

        let position = Self::find_f64s(
            dicom_object,
            tags::IMAGE_POSITION_PATIENT,
            &[&[PER_FRAME_GROUPS, tags::PLANE_POSITION_SEQUENCE]],
        )
        .unwrap_or_else(|| vec![0.0; 3]);
        if position.len() != 3 {
            return Err(VolumeLoaderError::MissingAttribute("ImagePositionPatient"));
        }

        let pixel_spacing = Self::find_f64s(
            dicom_object,
            tags::PIXEL_SPACING,
            &[&[SHARED_GROUPS, tags::PIXEL_MEASURES_SEQUENCE]],
        )
        .filter(|s| s.len() == 2)
        .ok_or(VolumeLoaderError::MissingSpacing)?;

        let slice_spacing = [tags::SPACING_BETWEEN_SLICES, tags::SLICE_THICKNESS]
            .into_iter()
            .find_map(|tag| {
                Self::find_f64s(dicom_object, tag, &[&[SHARED_GROUPS, tags::PIXEL_MEASURES_SEQUENCE]])
                    .and_then(|v| v.first().copied())
                    .filter(|v| *v > 0.0)
            })
            .unwrap_or(1.0);

        let row_dir = Vector3::new(orientation[0], orientation[1], orientation[2]).normalize();
        let col_dir = Vector3::new(orientation[3], orientation[4], orientation[5]).normalize();
        let normal = row_dir.cross(&col_dir);

        // Direction columns are the x, y and z axes.
        let direction = [
            row_dir.x, col_dir.x, normal.x,
            row_dir.y, col_dir.y, normal.y,
            row_dir.z, col_dir.z, normal.z,
        ];
        // PixelSpacing is (row spacing, column spacing) = (y, x).
        let spacing = [pixel_spacing[1], pixel_spacing[0], slice_spacing];

        Ok(Geometry::new(
            [position[0], position[1], position[2]],
            spacing,
            direction,
            [columns, rows, frames],
        )?)
    }

    /// Geometry from the sform, qform or pixdim of a NIfTI header, in LPS.
    pub(crate) fn nifti_geometry(header: &NiftiHeader, size: [usize; 3]) -> Result<Geometry, VolumeLoaderError> {
        let pixdim = |i: usize| f64::from(header.pixdim[i]);
        let affine = if header.sform_code > 0 {
            let row = |r: [f32; 4]| r.map(f64::from);
            let (x, y, z) = (row(header.srow_x), row(header.srow_y), row(header.srow_z));
            Matrix4::new(
                x[0], x[1], x[2], x[3],
                y[0], y[1], y[2], y[3],
                z[0], z[1], z[2], z[3],
                0.0, 0.0, 0.0, 1.0,
            )
        } else if header.qform_code > 0 {
            let b = f64::from(header.quatern_b);
            let c = f64::from(header.quatern_c);
            let d = f64::from(header.quatern_d);
            let a = (1.0 - (b * b + c * c + d * d).min(1.0)).sqrt();
            let qfac = if pixdim(0) < 0.0 { -1.0 } else { 1.0 };
            let (dx, dy, dz) = (pixdim(1), pixdim(2), pixdim(3) * qfac);
            Matrix4::new(
                (a * a + b * b - c * c - d * d) * dx,
                2.0 * (b * c - a * d) * dy,
                2.0 * (b * d + a * c) * dz,
                f64::from(header.quatern_x),
                2.0 * (b * c + a * d) * dx,
                (a * a + c * c - b * b - d * d) * dy,
                2.0 * (c * d - a * b) * dz,
                f64::from(header.quatern_y),
                2.0 * (b * d - a * c) * dx,
                2.0 * (c * d + a * b) * dy,
                (a * a + d * d - b * b - c * c) * dz,
                f64::from(header.quatern_z),
                0.0, 0.0, 0.0, 1.0,
            )
        } else {
            Matrix4::from_diagonal(&nalgebra::Vector4::new(pixdim(1), pixdim(2), pixdim(3), 1.0))
        };

        // RAS to LPS: flip the first two world axes.
        let ras_to_lps = Matrix4::from_diagonal(&nalgebra::Vector4::new(-1.0, -1.0, 1.0, 1.0));
        let affine = ras_to_lps * affine;

        let mut spacing = [0.0; 3];
        let mut direction = [0.0; 9];
        for axis in 0..3 {
            let column = Vector3::new(affine[(0, axis)], affine[(1, axis)], affine[(2, axis)]);
            let norm = column.norm();
            spacing[axis] = norm;
            for r in 0..3 {
                direction[r * 3 + axis] = if norm > 0.0 { column[r] / norm } else { 0.0 };
            }
        }
        let origin = [affine[(0, 3)], affine[(1, 3)], affine[(2, 3)]];

        Ok(Geometry::new(origin, spacing, direction, size)?)
    }

    /// Look up a numeric attribute at top level, then inside the first item of each
    /// functional group path in turn.
    fn find_f64s(dicom_object: &InMemDicomObject, tag: Tag, groups: &[&[Tag]]) -> Option<Vec<f64>> {
        Self::nested_f64s(dicom_object, &[], tag)
            .or_else(|| groups.iter().find_map(|path| Self::nested_f64s(dicom_object, path, tag)))
    }

    fn nested_f64s(dicom_object: &InMemDicomObject, path: &[Tag], tag: Tag) -> Option<Vec<f64>> {
        let mut current = dicom_object;
        for sequence in path {
            current = current.element(*sequence).ok()?.items()?.first()?;
        }
        current.element(tag).ok()?.to_multi_float64().ok()
    }

    fn get_string(dicom_object: &InMemDicomObject, tag: Tag) -> Option<String> {
        let value = dicom_object.element(tag).ok()?.to_str().ok()?;
        let trimmed = value.trim_matches(|c: char| c.is_whitespace() || c == '\0');
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    }
}
