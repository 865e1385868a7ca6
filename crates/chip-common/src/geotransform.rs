//! Affine geotransform mapping pixel indices to projected coordinates.

use serde::{Deserialize, Serialize};

/// An axis-aligned affine transform for north-up rasters.
///
/// `origin_x`/`origin_y` locate the outer corner of the top-left pixel;
/// `pixel_height` is negative for north-up data.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    pub origin_x: f64,
    pub origin_y: f64,
    pub pixel_width: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    pub fn new(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self {
            origin_x,
            origin_y,
            pixel_width,
            pixel_height,
        }
    }

    /// Projected coordinates of a pixel center.
    pub fn pixel_center(&self, col: usize, row: usize) -> (f64, f64) {
        (
            self.origin_x + (col as f64 + 0.5) * self.pixel_width,
            self.origin_y + (row as f64 + 0.5) * self.pixel_height,
        )
    }

    /// Fractional (col, row) for a projected coordinate, relative to pixel
    /// centers so `(0.0, 0.0)` is the center of the top-left pixel.
    pub fn coord_to_pixel(&self, x: f64, y: f64) -> (f64, f64) {
        (
            (x - self.origin_x) / self.pixel_width - 0.5,
            (y - self.origin_y) / self.pixel_height - 0.5,
        )
    }

    /// Serialize as `[origin_x, origin_y, pixel_width, pixel_height]`.
    pub fn to_array(&self) -> [f64; 4] {
        [
            self.origin_x,
            self.origin_y,
            self.pixel_width,
            self.pixel_height,
        ]
    }

    /// Build from a `[origin_x, origin_y, pixel_width, pixel_height]` array.
    pub fn from_array(a: [f64; 4]) -> Self {
        Self::new(a[0], a[1], a[2], a[3])
    }
}
