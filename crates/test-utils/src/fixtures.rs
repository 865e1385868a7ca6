//! Pre-built frames and chips for tests.

use chrono::{DateTime, TimeZone, Utc};

use chip_common::{BoundingBox, GeoTransform};
use chip_grid::{CELL_SIZE_M, CHIP_SIZE, RESOLUTION_M};
use chip_raster::{Chip, ChipFrame};

/// Geographic test areas, `(min_lon, min_lat, max_lon, max_lat)`.
pub mod aoi {
    /// A few grid cells' worth of central Italy.
    pub const ITALY_SMALL: (f64, f64, f64, f64) = (10.20, 40.20, 10.28, 40.27);

    /// Single point (degenerate footprint).
    pub const POINT: (f64, f64, f64, f64) = (10.5, 40.5, 10.5, 40.5);
}

/// A deterministic acquisition timestamp.
pub fn test_acquired() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 10, 30, 0).unwrap()
}

/// A cell-sized UTM frame with its bottom-left corner at `(easting, northing)`.
pub fn utm_frame(cell_id: &str, epsg: u32, easting: f64, northing: f64) -> ChipFrame {
    ChipFrame {
        cell_id: cell_id.to_string(),
        epsg,
        bounds: BoundingBox::new(easting, northing, easting + CELL_SIZE_M, northing + CELL_SIZE_M),
        transform: GeoTransform::new(
            easting,
            northing + CELL_SIZE_M,
            RESOLUTION_M,
            -RESOLUTION_M,
        ),
    }
}

/// A single-band chip filled with `value`.
pub fn label_chip(frame: &ChipFrame, value: f32) -> Chip {
    Chip::new(
        frame,
        test_acquired(),
        vec!["labels".to_string()],
        vec![value; CHIP_SIZE * CHIP_SIZE],
    )
    .expect("chip shape is valid by construction")
}

/// A multi-band chip where band `i` is filled with `values[i]`.
pub fn multiband_chip(frame: &ChipFrame, bands: &[(&str, f32)]) -> Chip {
    let plane = CHIP_SIZE * CHIP_SIZE;
    let mut data = Vec::with_capacity(bands.len() * plane);
    for (_, value) in bands {
        data.extend(std::iter::repeat(*value).take(plane));
    }
    Chip::new(
        frame,
        test_acquired(),
        bands.iter().map(|(name, _)| name.to_string()).collect(),
        data,
    )
    .expect("chip shape is valid by construction")
}
