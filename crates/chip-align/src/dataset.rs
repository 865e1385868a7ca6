//! Supported imagery datasets and their band tables.

use std::fmt;
use std::str::FromStr;

use chip_common::ChipError;
use chip_raster::ResampleMethod;

/// An imagery dataset chips can be produced from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dataset {
    /// Sentinel-2 L2A surface reflectance.
    S2L2a,
    /// Harmonized Landsat Sentinel-2.
    Hls,
    /// Sentinel-1 radiometrically terrain corrected backscatter.
    S1Rtc,
}

impl Dataset {
    /// Band names, in storage order.
    pub fn bands(&self) -> &'static [&'static str] {
        match self {
            Dataset::S2L2a => &[
                "coastal", "blue", "green", "red", "rededge1", "rededge2", "rededge3", "nir",
                "nir08", "nir09", "swir16", "swir22",
            ],
            Dataset::Hls => &[
                "coastal", "blue", "green", "red", "nir08", "swir16", "swir22",
            ],
            Dataset::S1Rtc => &["vv", "vh"],
        }
    }

    /// Whether scenes carry a cloud-cover percentage worth filtering on.
    /// Radar sees through clouds.
    pub fn cloud_aware(&self) -> bool {
        !matches!(self, Dataset::S1Rtc)
    }

    /// Resampling used when imagery is regridded onto cell frames.
    pub fn resample(&self) -> ResampleMethod {
        ResampleMethod::Bilinear
    }
}

impl FromStr for Dataset {
    type Err = ChipError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "S2L2A" => Ok(Dataset::S2L2a),
            "HLS" => Ok(Dataset::Hls),
            "S1RTC" => Ok(Dataset::S1Rtc),
            other => Err(ChipError::input(format!(
                "unknown dataset {:?}, expected S2L2A, HLS or S1RTC",
                other
            ))),
        }
    }
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Dataset::S2L2a => "S2L2A",
            Dataset::Hls => "HLS",
            Dataset::S1Rtc => "S1RTC",
        };
        write!(f, "{}", name)
    }
}
