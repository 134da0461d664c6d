use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// How a ROI and the dynamic images are brought into the same physical space.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ResampleStrategy {
    /// No resampling; ROI and images must already share a geometry.
    #[default]
    None,
    /// Each dynamic image is resampled into the ROI geometry.
    ResampleImageToRoi,
    /// The ROI is resampled once into the geometry of the first series image.
    ResampleRoiToImage,
}

#[derive(Debug, Error)]
#[error("Unknown resample strategy {0:?} (expected 'none', 'img' or 'roi')")]
pub struct ParseStrategyError(String);

impl FromStr for ResampleStrategy {
    type Err = ParseStrategyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "img" | "resample-image-to-roi" => Ok(Self::ResampleImageToRoi),
            "roi" | "resample-roi-to-image" => Ok(Self::ResampleRoiToImage),
            _ => Err(ParseStrategyError(s.to_string())),
        }
    }
}

impl fmt::Display for ResampleStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            Self::None => "none",
            Self::ResampleImageToRoi => "img",
            Self::ResampleRoiToImage => "roi",
        };
        f.write_str(tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_short_and_long_tags() {
        assert_eq!("none".parse::<ResampleStrategy>().unwrap(), ResampleStrategy::None);
        assert_eq!("IMG".parse::<ResampleStrategy>().unwrap(), ResampleStrategy::ResampleImageToRoi);
        assert_eq!(
            "resample-roi-to-image".parse::<ResampleStrategy>().unwrap(),
            ResampleStrategy::ResampleRoiToImage
        );
        assert!("bilinear".parse::<ResampleStrategy>().is_err());
    }

    #[test]
    fn display_round_trips() {
        for strategy in [
            ResampleStrategy::None,
            ResampleStrategy::ResampleImageToRoi,
            ResampleStrategy::ResampleRoiToImage,
        ] {
            assert_eq!(strategy.to_string().parse::<ResampleStrategy>().unwrap(), strategy);
        }
    }
}
