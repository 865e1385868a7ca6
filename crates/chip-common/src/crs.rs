//! Coordinate Reference System handling for zone-local UTM grids.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{ChipError, ChipResult};

/// EPSG code for WGS84 geographic coordinates.
pub const EPSG_WGS84: u32 = 4326;

/// A zone-local UTM coordinate reference system.
///
/// Wraps a validated EPSG code in the 326xx (northern hemisphere) or
/// 327xx (southern hemisphere) series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UtmCrs(u32);

impl UtmCrs {
    /// Validate and wrap a UTM EPSG code.
    pub fn from_epsg(epsg: u32) -> ChipResult<Self> {
        let zone = epsg % 100;
        let series = epsg / 100;
        if (series == 326 || series == 327) && (1..=60).contains(&zone) {
            Ok(Self(epsg))
        } else {
            Err(ChipError::grid(format!("not a UTM EPSG code: {}", epsg)))
        }
    }

    /// Parse a CRS string such as "EPSG:32633".
    pub fn parse(s: &str) -> ChipResult<Self> {
        let code = s
            .to_uppercase()
            .strip_prefix("EPSG:")
            .and_then(|c| c.parse::<u32>().ok())
            .ok_or_else(|| ChipError::grid(format!("unparseable CRS: {}", s)))?;
        Self::from_epsg(code)
    }

    /// Derive the UTM zone CRS for a geographic location.
    ///
    /// Applies the standard 6-degree zones plus the Norway and Svalbard
    /// exceptions, then selects the hemisphere series from the latitude.
    pub fn for_latlon(lat: f64, lon: f64) -> Self {
        let mut zone = ((lon + 180.0) / 6.0).floor() as i64 % 60 + 1;

        // Norway: zone 32 is widened westward
        if (56.0..64.0).contains(&lat) && (3.0..12.0).contains(&lon) {
            zone = 32;
        }
        // Svalbard: zones 32, 34 and 36 are not used
        if (72.0..84.0).contains(&lat) {
            zone = match lon {
                l if (0.0..9.0).contains(&l) => 31,
                l if (9.0..21.0).contains(&l) => 33,
                l if (21.0..33.0).contains(&l) => 35,
                l if (33.0..42.0).contains(&l) => 37,
                _ => zone,
            };
        }

        let series = if lat < 0.0 { 327 } else { 326 };
        Self(series * 100 + zone as u32)
    }

    /// The raw EPSG code.
    pub fn epsg(&self) -> u32 {
        self.0
    }

    /// UTM zone number, 1..=60.
    pub fn zone_number(&self) -> u32 {
        self.0 % 100
    }

    /// True for the northern-hemisphere (326xx) series.
    pub fn is_northern(&self) -> bool {
        self.0 / 100 == 326
    }

    /// Central meridian of the zone in degrees.
    pub fn central_meridian_deg(&self) -> f64 {
        (self.zone_number() as f64 - 1.0) * 6.0 - 180.0 + 3.0
    }
}

impl fmt::Display for UtmCrs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EPSG:{}", self.0)
    }
}
