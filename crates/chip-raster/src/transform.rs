//! Resampling and reprojection into chip frames.

use chip_common::{ChipResult, EPSG_WGS84};
use chip_grid::CHIP_SIZE;
use projection::UtmProjection;

use crate::chip::ChipFrame;
use crate::source::SourceArray;

/// Resampling method used when sampling the source raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResampleMethod {
    /// Nearest neighbor. Preserves categorical values exactly.
    Nearest,
    /// Bilinear over the four nearest samples.
    Bilinear,
    /// Catmull-Rom bicubic over a 4x4 neighborhood.
    Cubic,
}

/// Nearest neighbor sampling at fractional indices.
///
/// Returns the value of the nearest sample, NaN outside the array.
pub fn nearest_sample(data: &[f32], width: usize, height: usize, x: f64, y: f64) -> f32 {
    let col = x.round();
    let row = y.round();

    if col < 0.0 || row < 0.0 {
        return f32::NAN;
    }
    let (col, row) = (col as usize, row as usize);
    if col >= width || row >= height {
        return f32::NAN;
    }

    data[row * width + col]
}

/// Bilinear sampling between the four nearest samples.
pub fn bilinear_sample(data: &[f32], width: usize, height: usize, x: f64, y: f64) -> f32 {
    if x < 0.0 || y < 0.0 {
        return f32::NAN;
    }
    let x0 = x.floor() as usize;
    let y0 = y.floor() as usize;
    if x0 >= width || y0 >= height {
        return f32::NAN;
    }
    let x1 = (x0 + 1).min(width - 1);
    let y1 = (y0 + 1).min(height - 1);

    let xf = (x - x0 as f64) as f32;
    let yf = (y - y0 as f64) as f32;

    let v00 = data[y0 * width + x0];
    let v10 = data[y0 * width + x1];
    let v01 = data[y1 * width + x0];
    let v11 = data[y1 * width + x1];

    // Any NaN corner poisons the result
    if v00.is_nan() || v10.is_nan() || v01.is_nan() || v11.is_nan() {
        return f32::NAN;
    }

    let top = v00 * (1.0 - xf) + v10 * xf;
    let bottom = v01 * (1.0 - xf) + v11 * xf;
    top * (1.0 - yf) + bottom * yf
}

/// Bicubic sampling over a 4x4 neighborhood.
///
/// Falls back to bilinear when any neighbor is NaN.
pub fn cubic_sample(data: &[f32], width: usize, height: usize, x: f64, y: f64) -> f32 {
    if x < 0.0 || y < 0.0 || x > (width - 1) as f64 || y > (height - 1) as f64 {
        return f32::NAN;
    }

    let xi = x.floor() as i32;
    let yi = y.floor() as i32;
    let xf = (x - xi as f64) as f32;
    let yf = (y - yi as f64) as f32;

    let mut values = [[0.0f32; 4]; 4];
    for (j, row) in values.iter_mut().enumerate() {
        for (i, v) in row.iter_mut().enumerate() {
            let px = (xi + i as i32 - 1).clamp(0, width as i32 - 1) as usize;
            let py = (yi + j as i32 - 1).clamp(0, height as i32 - 1) as usize;
            *v = data[py * width + px];
            if v.is_nan() {
                return bilinear_sample(data, width, height, x, y);
            }
        }
    }

    let mut rows = [0.0f32; 4];
    for (j, r) in rows.iter_mut().enumerate() {
        *r = cubic_1d(values[j][0], values[j][1], values[j][2], values[j][3], xf);
    }
    cubic_1d(rows[0], rows[1], rows[2], rows[3], yf)
}

/// 1D Catmull-Rom spline.
fn cubic_1d(p0: f32, p1: f32, p2: f32, p3: f32, t: f32) -> f32 {
    let t2 = t * t;
    let t3 = t2 * t;

    let a = -0.5 * p0 + 1.5 * p1 - 1.5 * p2 + 0.5 * p3;
    let b = p0 - 2.5 * p1 + 2.0 * p2 - 0.5 * p3;
    let c = -0.5 * p0 + 0.5 * p2;
    let d = p1;

    a * t3 + b * t2 + c * t + d
}

fn sample(array: &SourceArray, x: f64, y: f64, method: ResampleMethod) -> f32 {
    match method {
        ResampleMethod::Nearest => nearest_sample(&array.data, array.width, array.height, x, y),
        ResampleMethod::Bilinear => bilinear_sample(&array.data, array.width, array.height, x, y),
        ResampleMethod::Cubic => cubic_sample(&array.data, array.width, array.height, x, y),
    }
}

/// How source coordinates relate to the chip frame's zone CRS.
enum SourcePath {
    /// Same EPSG code, no transform needed.
    Same,
    /// Source is geographic lat/lon.
    Geographic(UtmProjection),
    /// Source is a different UTM zone.
    Utm {
        frame_proj: UtmProjection,
        source_proj: UtmProjection,
    },
}

impl SourcePath {
    fn resolve(frame_epsg: u32, source_epsg: u32) -> ChipResult<Self> {
        if frame_epsg == source_epsg {
            return Ok(Self::Same);
        }
        let frame_proj = UtmProjection::for_epsg(frame_epsg)?;
        if source_epsg == EPSG_WGS84 {
            return Ok(Self::Geographic(frame_proj));
        }
        let source_proj = UtmProjection::for_epsg(source_epsg)?;
        Ok(Self::Utm {
            frame_proj,
            source_proj,
        })
    }

    /// Map a coordinate in the frame's CRS into the source's CRS.
    fn to_source(&self, x: f64, y: f64) -> (f64, f64) {
        match self {
            Self::Same => (x, y),
            Self::Geographic(frame_proj) => {
                let (lat, lon) = frame_proj.inverse(x, y);
                (lon, lat)
            }
            Self::Utm {
                frame_proj,
                source_proj,
            } => {
                let (lat, lon) = frame_proj.inverse(x, y);
                source_proj.forward(lat, lon)
            }
        }
    }
}

/// Resample a source window onto a chip frame's 264x264 pixel grid.
///
/// Walks the frame's pixel centers, inverse-maps each into the source CRS
/// and samples there. Pixels that land outside the source stay NaN, which
/// is how partial overlap surfaces downstream.
pub fn reproject_to_frame(
    frame: &ChipFrame,
    array: &SourceArray,
    method: ResampleMethod,
) -> ChipResult<Vec<f32>> {
    let path = SourcePath::resolve(frame.epsg, array.epsg)?;
    let mut output = vec![f32::NAN; CHIP_SIZE * CHIP_SIZE];

    for row in 0..CHIP_SIZE {
        for col in 0..CHIP_SIZE {
            let (x, y) = frame.transform.pixel_center(col, row);
            let (sx, sy) = path.to_source(x, y);
            let (sc, sr) = array.transform.coord_to_pixel(sx, sy);

            // Out-of-range indices fall straight through as NaN
            if sc < -0.5
                || sr < -0.5
                || sc > array.width as f64 - 0.5
                || sr > array.height as f64 - 0.5
            {
                continue;
            }
            let clamped_c = sc.clamp(0.0, (array.width - 1) as f64);
            let clamped_r = sr.clamp(0.0, (array.height - 1) as f64);
            output[row * CHIP_SIZE + col] = sample(array, clamped_c, clamped_r, method);
        }
    }

    Ok(output)
}
