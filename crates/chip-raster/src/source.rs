//! Raster sources and in-memory grids.

use chip_common::{BoundingBox, ChipResult, GeoTransform};

/// A decoded raster window: row-major samples plus georeferencing.
///
/// Nodata is normalized to NaN when a window is read, so downstream code
/// never sees a sentinel value.
#[derive(Debug, Clone)]
pub struct SourceArray {
    pub data: Vec<f32>,
    pub width: usize,
    pub height: usize,
    pub epsg: u32,
    pub transform: GeoTransform,
}

impl SourceArray {
    pub fn new(
        data: Vec<f32>,
        width: usize,
        height: usize,
        epsg: u32,
        transform: GeoTransform,
    ) -> Self {
        debug_assert_eq!(data.len(), width * height);
        Self {
            data,
            width,
            height,
            epsg,
            transform,
        }
    }

    /// Sample at integer pixel indices; NaN outside the array.
    pub fn get(&self, col: i64, row: i64) -> f32 {
        if col < 0 || row < 0 || col as usize >= self.width || row as usize >= self.height {
            return f32::NAN;
        }
        self.data[row as usize * self.width + col as usize]
    }

    /// Bounds of the array in its own CRS.
    pub fn bounds(&self) -> BoundingBox {
        let t = &self.transform;
        let x0 = t.origin_x;
        let y0 = t.origin_y;
        let x1 = t.origin_x + self.width as f64 * t.pixel_width;
        let y1 = t.origin_y + self.height as f64 * t.pixel_height;
        BoundingBox::new(x0.min(x1), y0.min(y1), x0.max(x1), y0.max(y1))
    }
}

/// Windowed access to one raster dataset.
///
/// Implementations hold a scoped dataset handle: acquired when the source
/// is opened, released when it is dropped, on every exit path. Reads are
/// windowed so very large rasters are never fully materialized.
pub trait RasterSource {
    /// CRS of the raster as an EPSG code.
    fn epsg(&self) -> u32;

    /// Full bounds of the raster in its own CRS.
    fn bounds(&self) -> BoundingBox;

    /// Read the pixels intersecting `window` (expressed in the raster's
    /// CRS). The returned array covers the intersection of the window and
    /// the raster; a window entirely outside yields an empty intersection
    /// error from the implementation.
    fn read_window(&mut self, window: &BoundingBox) -> ChipResult<SourceArray>;
}

/// A fully in-memory raster, used by tests and by scene compositing.
#[derive(Debug, Clone)]
pub struct MemoryRaster {
    array: SourceArray,
}

impl MemoryRaster {
    pub fn new(array: SourceArray) -> Self {
        Self { array }
    }

    pub fn array(&self) -> &SourceArray {
        &self.array
    }
}

impl RasterSource for MemoryRaster {
    fn epsg(&self) -> u32 {
        self.array.epsg
    }

    fn bounds(&self) -> BoundingBox {
        self.array.bounds()
    }

    fn read_window(&mut self, window: &BoundingBox) -> ChipResult<SourceArray> {
        // Clip the window to the raster and copy the covered rows/cols.
        let t = &self.array.transform;
        let (c0, r0) = t.coord_to_pixel(window.min_x, window.max_y);
        let (c1, r1) = t.coord_to_pixel(window.max_x, window.min_y);

        let col_start = c0.min(c1).floor().max(0.0) as usize;
        let row_start = r0.min(r1).floor().max(0.0) as usize;
        let col_end = (c0.max(c1).ceil() as usize + 1).min(self.array.width);
        let row_end = (r0.max(r1).ceil() as usize + 1).min(self.array.height);

        if col_start >= col_end || row_start >= row_end {
            return Err(chip_common::ChipError::extraction(
                "<window>",
                "read window does not intersect raster",
            ));
        }

        let width = col_end - col_start;
        let height = row_end - row_start;
        let mut data = Vec::with_capacity(width * height);
        for row in row_start..row_end {
            let off = row * self.array.width;
            data.extend_from_slice(&self.array.data[off + col_start..off + col_end]);
        }

        let transform = GeoTransform::new(
            t.origin_x + col_start as f64 * t.pixel_width,
            t.origin_y + row_start as f64 * t.pixel_height,
            t.pixel_width,
            t.pixel_height,
        );

        Ok(SourceArray::new(
            data,
            width,
            height,
            self.array.epsg,
            transform,
        ))
    }
}
