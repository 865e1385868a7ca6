//! Synthetic raster generators.

use chip_common::GeoTransform;
use chip_raster::{ChipFrame, SourceArray};

/// Row-major plane where each value is `col * 1000 + row`, so misplaced
/// reads and writes are immediately visible in assertions.
pub fn ramp_plane(width: usize, height: usize) -> Vec<f32> {
    let mut data = Vec::with_capacity(width * height);
    for row in 0..height {
        for col in 0..width {
            data.push((col * 1000 + row) as f32);
        }
    }
    data
}

/// A plane with the leading `nan_fraction` of pixels set to NaN.
pub fn plane_with_nans(len: usize, value: f32, nan_fraction: f64) -> Vec<f32> {
    let nan_count = ((len as f64) * nan_fraction).round() as usize;
    let mut data = vec![value; len];
    for v in data.iter_mut().take(nan_count.min(len)) {
        *v = f32::NAN;
    }
    data
}

/// A constant-valued source on the frame's own grid, covering the frame
/// plus `margin_px` pixels on every side.
pub fn source_covering(frame: &ChipFrame, value: f32, margin_px: usize) -> SourceArray {
    let t = &frame.transform;
    let cols = (frame.bounds.width() / t.pixel_width).round() as usize + 2 * margin_px;
    let rows = (frame.bounds.height() / -t.pixel_height).round() as usize + 2 * margin_px;
    SourceArray::new(
        vec![value; cols * rows],
        cols,
        rows,
        frame.epsg,
        GeoTransform::new(
            t.origin_x - margin_px as f64 * t.pixel_width,
            t.origin_y - margin_px as f64 * t.pixel_height,
            t.pixel_width,
            t.pixel_height,
        ),
    )
}

/// Like [`source_covering`], but truncated to the western `fraction` of
/// the frame. Used to exercise partial-overlap behavior.
pub fn source_covering_west(frame: &ChipFrame, value: f32, fraction: f64) -> SourceArray {
    let t = &frame.transform;
    let full_cols = (frame.bounds.width() / t.pixel_width).round() as usize;
    let cols = ((full_cols as f64) * fraction).round() as usize;
    let rows = (frame.bounds.height() / -t.pixel_height).round() as usize;
    SourceArray::new(vec![value; cols * rows], cols, rows, frame.epsg, *t)
}
