//! Reader for NRRD volumes with attached raw or gzip data.
//!
//! Only scalar 3D images are read. A 4D file is accepted when its extra axis
//! has size 1 and no space direction, which is how single-layer segmentations
//! are often stored.

use std::borrow::Cow;
use std::collections::HashMap;
use std::io::Read;

use flate2::read::GzDecoder;
use nalgebra::Vector3;
use ndarray::Array3;

use crate::geometry::Geometry;
use crate::volume::Volume;
use crate::volume_loader::VolumeLoaderError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ScalarType {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    F32,
    F64,
}

impl ScalarType {
    fn parse(name: &str) -> Option<Self> {
        let scalar = match name {
            "signed char" | "int8" | "int8_t" => Self::I8,
            "uchar" | "unsigned char" | "uint8" | "uint8_t" => Self::U8,
            "short" | "short int" | "signed short" | "signed short int" | "int16" | "int16_t" => Self::I16,
            "ushort" | "unsigned short" | "unsigned short int" | "uint16" | "uint16_t" => Self::U16,
            "int" | "signed int" | "int32" | "int32_t" => Self::I32,
            "uint" | "unsigned int" | "uint32" | "uint32_t" => Self::U32,
            "longlong" | "long long" | "long long int" | "signed long long" | "signed long long int"
            | "int64" | "int64_t" => Self::I64,
            "ulonglong" | "unsigned long long" | "unsigned long long int" | "uint64" | "uint64_t" => {
                Self::U64
            }
            "float" => Self::F32,
            "double" => Self::F64,
            _ => return None,
        };
        Some(scalar)
    }

    fn size(self) -> usize {
        match self {
            Self::I8 | Self::U8 => 1,
            Self::I16 | Self::U16 => 2,
            Self::I32 | Self::U32 | Self::F32 => 4,
            Self::I64 | Self::U64 | Self::F64 => 8,
        }
    }

    fn decode(self, payload: &[u8], big_endian: bool) -> Vec<f32> {
        let size = self.size();
        payload
            .chunks_exact(size)
            .map(|chunk| {
                let mut b = [0u8; 8];
                b[..size].copy_from_slice(chunk);
                if big_endian {
                    b[..size].reverse();
                }
                match self {
                    Self::I8 => b[0] as i8 as f32,
                    Self::U8 => b[0] as f32,
                    Self::I16 => i16::from_le_bytes([b[0], b[1]]) as f32,
                    Self::U16 => u16::from_le_bytes([b[0], b[1]]) as f32,
                    Self::I32 => i32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f32,
                    Self::U32 => u32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f32,
                    Self::F32 => f32::from_le_bytes([b[0], b[1], b[2], b[3]]),
                    Self::I64 => i64::from_le_bytes(b) as f32,
                    Self::U64 => u64::from_le_bytes(b) as f32,
                    Self::F64 => f64::from_le_bytes(b) as f32,
                }
            })
            .collect()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Encoding {
    Raw,
    Gzip,
}

#[derive(Clone, Debug, PartialEq)]
struct NrrdHeader {
    scalar: ScalarType,
    sizes: Vec<usize>,
    /// One entry per axis, `None` for non-spatial axes. Empty without `space directions`.
    directions: Vec<Option<[f64; 3]>>,
    spacings: Vec<f64>,
    origin: [f64; 3],
    /// Per-axis sign taking world coordinates of the file's space to LPS.
    to_lps: [f64; 3],
    big_endian: bool,
    encoding: Encoding,
}

fn invalid(message: impl Into<String>) -> VolumeLoaderError {
    VolumeLoaderError::Nrrd(message.into())
}

/// Decode a complete `.nrrd` file into an LPS volume.
pub(crate) fn read_volume(bytes: &[u8]) -> Result<Volume, VolumeLoaderError> {
    let (lines, payload) = split_header(bytes)?;
    let header = parse_header(&lines)?;
    let (size, geometry) = header.geometry()?;

    let count: usize = header.sizes.iter().product();
    let expected = count * header.scalar.size();
    let payload = match header.encoding {
        Encoding::Raw => Cow::Borrowed(payload),
        Encoding::Gzip => {
            let mut inflated = Vec::with_capacity(expected);
            GzDecoder::new(payload).read_to_end(&mut inflated)?;
            Cow::Owned(inflated)
        }
    };
    if payload.len() < expected {
        return Err(invalid(format!(
            "data holds {} bytes, {expected} expected",
            payload.len()
        )));
    }

    let voxels = header.scalar.decode(&payload[..expected], header.big_endian);
    // Fastest NRRD axis first, so (x, y, z) sizes give a (z, y, x) standard layout.
    let data = Array3::from_shape_vec((size[2], size[1], size[0]), voxels)
        .map_err(|_| VolumeLoaderError::InvalidShape(header.sizes.clone()))?;
    Ok(Volume::new(data, geometry)?)
}

/// Header lines after splitting at the first blank line, and the attached data.
fn split_header(bytes: &[u8]) -> Result<(Vec<&str>, &[u8]), VolumeLoaderError> {
    let mut lines = Vec::new();
    let mut start = 0;
    while let Some(offset) = bytes[start..].iter().position(|&b| b == b'\n') {
        let line = &bytes[start..start + offset];
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        start += offset + 1;
        if line.is_empty() {
            return Ok((lines, &bytes[start..]));
        }
        lines.push(std::str::from_utf8(line).map_err(|_| invalid("header is not valid UTF-8"))?);
    }
    Err(invalid("header is not terminated by a blank line"))
}

fn parse_header(lines: &[&str]) -> Result<NrrdHeader, VolumeLoaderError> {
    let (magic, lines) = lines.split_first().ok_or_else(|| invalid("empty header"))?;
    if !magic.starts_with("NRRD") {
        return Err(invalid(format!("not a NRRD file (magic {magic:?})")));
    }

    let mut fields = HashMap::new();
    for line in lines {
        if line.starts_with('#') {
            continue;
        }
        match line.split_once(": ") {
            Some((key, value)) if !key.contains(":=") => {
                fields.insert(key.trim().to_ascii_lowercase(), value.trim());
            }
            // key:=value pairs carry application metadata only
            _ if line.contains(":=") => continue,
            _ => return Err(invalid(format!("malformed header line {line:?}"))),
        }
    }
    let field = |key: &'static str| {
        fields
            .get(key)
            .copied()
            .ok_or_else(|| invalid(format!("missing field '{key}'")))
    };

    if fields.contains_key("data file") || fields.contains_key("datafile") {
        return Err(VolumeLoaderError::UnsupportedFormat("detached NRRD data".to_string()));
    }

    let scalar = ScalarType::parse(&field("type")?.to_ascii_lowercase())
        .ok_or_else(|| invalid(format!("unsupported type '{}'", fields["type"])))?;
    let dimension: usize = field("dimension")?
        .parse()
        .map_err(|_| invalid("dimension is not an integer"))?;
    let sizes = field("sizes")?
        .split_whitespace()
        .map(|s| s.parse::<usize>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| invalid("sizes are not integers"))?;
    if sizes.len() != dimension {
        return Err(invalid(format!("{} sizes for dimension {dimension}", sizes.len())));
    }

    let encoding = match field("encoding")? {
        "raw" => Encoding::Raw,
        "gzip" | "gz" => Encoding::Gzip,
        other => return Err(VolumeLoaderError::UnsupportedFormat(format!("NRRD encoding '{other}'"))),
    };
    let big_endian = fields.get("endian").is_some_and(|e| *e == "big");

    let to_lps = match fields.get("space").map(|s| s.to_ascii_lowercase()) {
        None => [1.0, 1.0, 1.0],
        Some(space) => match space.as_str() {
            "left-posterior-superior" | "lps" => [1.0, 1.0, 1.0],
            "right-anterior-superior" | "ras" => [-1.0, -1.0, 1.0],
            "left-anterior-superior" | "las" => [1.0, -1.0, 1.0],
            _ => return Err(invalid(format!("unsupported space '{space}'"))),
        },
    };

    let directions = match fields.get("space directions") {
        Some(value) => {
            let directions = parse_vectors(value)?;
            if directions.len() != dimension {
                return Err(invalid("space directions do not match dimension"));
            }
            directions
        }
        None => Vec::new(),
    };

    let spacings = match fields.get("spacings") {
        Some(value) => value
            .split_whitespace()
            .map(|s| s.parse::<f64>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| invalid("spacings are not numbers"))?,
        None => Vec::new(),
    };

    let origin = match fields.get("space origin") {
        Some(value) => match parse_vectors(value)?.as_slice() {
            [Some(origin)] => *origin,
            _ => return Err(invalid("space origin must be one vector")),
        },
        None => [0.0; 3],
    };

    Ok(NrrdHeader {
        scalar,
        sizes,
        directions,
        spacings,
        origin,
        to_lps,
        big_endian,
        encoding,
    })
}

/// Parse `(a,b,c) none (d,e,f)` style vector lists.
fn parse_vectors(value: &str) -> Result<Vec<Option<[f64; 3]>>, VolumeLoaderError> {
    let mut vectors = Vec::new();
    let mut rest = value.trim();
    while !rest.is_empty() {
        if let Some(inner) = rest.strip_prefix('(') {
            let end = inner.find(')').ok_or_else(|| invalid("unterminated vector"))?;
            let components = inner[..end]
                .split(',')
                .map(|c| c.trim().parse::<f64>())
                .collect::<Result<Vec<_>, _>>()
                .map_err(|_| invalid(format!("invalid vector ({})", &inner[..end])))?;
            match components.as_slice() {
                [x, y, z] => vectors.push(Some([*x, *y, *z])),
                _ => return Err(invalid("only 3D space vectors are supported")),
            }
            rest = inner[end + 1..].trim_start();
        } else {
            let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
            if &rest[..end] != "none" {
                return Err(invalid(format!("unexpected token '{}'", &rest[..end])));
            }
            vectors.push(None);
            rest = rest[end..].trim_start();
        }
    }
    Ok(vectors)
}

impl NrrdHeader {
    /// Spatial size `(x, y, z)` and LPS geometry.
    fn geometry(&self) -> Result<([usize; 3], Geometry), VolumeLoaderError> {
        let flip = Vector3::from(self.to_lps);
        let mut size = [0usize; 3];
        let mut spacing = [1.0; 3];
        let mut direction = [0.0; 9];

        if self.directions.is_empty() {
            if self.sizes.len() != 3 {
                return Err(invalid("a non-3D image needs space directions"));
            }
            size.copy_from_slice(&self.sizes);
            for axis in 0..3 {
                direction[axis * 3 + axis] = 1.0;
                if let Some(s) = self.spacings.get(axis).filter(|s| s.is_finite() && **s > 0.0) {
                    spacing[axis] = *s;
                }
            }
        } else {
            let mut axis = 0;
            for (&n, vector) in self.sizes.iter().zip(&self.directions) {
                let Some(vector) = vector else {
                    if n != 1 {
                        return Err(invalid("multi-component images are not supported"));
                    }
                    continue;
                };
                if axis == 3 {
                    return Err(invalid("more than three spatial axes"));
                }
                let v = Vector3::from(*vector).component_mul(&flip);
                let norm = v.norm();
                if norm == 0.0 {
                    return Err(invalid("zero-length space direction"));
                }
                size[axis] = n;
                spacing[axis] = norm;
                for row in 0..3 {
                    direction[row * 3 + axis] = v[row] / norm;
                }
                axis += 1;
            }
            if axis != 3 {
                return Err(invalid(format!("{axis} spatial axes, 3 expected")));
            }
        }

        let origin: [f64; 3] = Vector3::from(self.origin).component_mul(&flip).into();
        Ok((size, Geometry::new(origin, spacing, direction, size)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::io::Write;

    fn nrrd(fields: &[&str], payload: &[u8]) -> Vec<u8> {
        let mut bytes = b"NRRD0004\n# Complete NRRD file format specification at:\n".to_vec();
        for field in fields {
            bytes.extend_from_slice(field.as_bytes());
            bytes.push(b'\n');
        }
        bytes.push(b'\n');
        bytes.extend_from_slice(payload);
        bytes
    }

    #[test]
    fn raw_segmentation_in_lps() {
        let payload: Vec<u8> = (0..12).collect();
        let bytes = nrrd(
            &[
                "type: unsigned char",
                "dimension: 3",
                "space: left-posterior-superior",
                "sizes: 3 2 2",
                "space directions: (2,0,0) (0,3,0) (0,0,4)",
                "kinds: domain domain domain",
                "encoding: raw",
                "space origin: (1,2,3)",
                "Segment0_Name:=Segment_1",
                "Segment0_Extent:=0 2 0 1 0 1",
            ],
            &payload,
        );
        let volume = read_volume(&bytes).unwrap();
        assert_eq!(volume.dim(), (2, 2, 3));
        assert_eq!(volume.data()[[1, 1, 2]], 11.0);
        assert_eq!(volume.data()[[0, 1, 0]], 3.0);
        assert_eq!(volume.geometry().spacing(), [2.0, 3.0, 4.0]);
        assert_eq!(volume.geometry().origin(), [1.0, 2.0, 3.0]);
    }

    #[test]
    fn ras_space_is_flipped_to_lps() {
        let bytes = nrrd(
            &[
                "type: uchar",
                "dimension: 3",
                "space: right-anterior-superior",
                "sizes: 1 1 1",
                "space directions: (1.5,0,0) (0,1.5,0) (0,0,2)",
                "encoding: raw",
                "space origin: (10, 20, 30)",
            ],
            &[7],
        );
        let geometry = read_volume(&bytes).unwrap().geometry().clone();
        assert_relative_eq!(geometry.origin()[..], [-10.0, -20.0, 30.0][..]);
        assert_relative_eq!(geometry.spacing()[..], [1.5, 1.5, 2.0][..]);
        assert_relative_eq!(
            geometry.direction()[..],
            [-1.0, 0.0, 0.0, 0.0, -1.0, 0.0, 0.0, 0.0, 1.0][..]
        );
    }

    #[test]
    fn gzip_big_endian_shorts() {
        let raw: Vec<u8> = [-2i16, 300].iter().flat_map(|v| v.to_be_bytes()).collect();
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&raw).unwrap();
        let bytes = nrrd(
            &[
                "type: short",
                "dimension: 3",
                "sizes: 2 1 1",
                "endian: big",
                "encoding: gzip",
                "spacings: 0.5 0.5 1",
            ],
            &encoder.finish().unwrap(),
        );
        let volume = read_volume(&bytes).unwrap();
        assert_eq!(volume.data().iter().copied().collect::<Vec<_>>(), [-2.0, 300.0]);
        assert_eq!(volume.geometry().spacing(), [0.5, 0.5, 1.0]);
    }

    #[test]
    fn single_layer_list_axis_is_dropped() {
        let payload: Vec<u8> = [0.0f32, 1.0, 2.0, 3.0].iter().flat_map(|v| v.to_le_bytes()).collect();
        let bytes = nrrd(
            &[
                "type: float",
                "dimension: 4",
                "space: left-posterior-superior",
                "sizes: 1 2 2 1",
                "space directions: none (1,0,0) (0,1,0) (0,0,1)",
                "kinds: list domain domain domain",
                "endian: little",
                "encoding: raw",
            ],
            &payload,
        );
        let volume = read_volume(&bytes).unwrap();
        assert_eq!(volume.geometry().size(), [2, 2, 1]);
        assert_eq!(volume.data()[[0, 1, 0]], 2.0);
    }

    #[test]
    fn crlf_header_is_accepted() {
        let bytes = b"NRRD0004\r\ntype: uchar\r\ndimension: 3\r\nsizes: 1 1 1\r\nencoding: raw\r\n\r\n\x05";
        let volume = read_volume(bytes).unwrap();
        assert_eq!(volume.data()[[0, 0, 0]], 5.0);
    }

    #[test]
    fn rejects_unreadable_files() {
        let base = ["type: uchar", "dimension: 3", "sizes: 2 2 1", "encoding: raw"];

        let truncated = nrrd(&base, &[1, 2, 3]);
        assert!(matches!(read_volume(&truncated), Err(VolumeLoaderError::Nrrd(_))));

        let detached = nrrd(&[&base[..], &["data file: seg.raw"][..]].concat(), &[]);
        assert!(matches!(
            read_volume(&detached),
            Err(VolumeLoaderError::UnsupportedFormat(_))
        ));

        let layers = nrrd(
            &[
                "type: uchar",
                "dimension: 4",
                "sizes: 2 1 1 1",
                "space directions: none (1,0,0) (0,1,0) (0,0,1)",
                "encoding: raw",
            ],
            &[0, 1],
        );
        assert!(matches!(read_volume(&layers), Err(VolumeLoaderError::Nrrd(_))));

        assert!(matches!(read_volume(b"P5\n2 2\n\n"), Err(VolumeLoaderError::Nrrd(_))));
    }
}
