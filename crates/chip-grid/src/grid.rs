//! The immutable global grid definition.

use chip_common::BoundingBox;

use crate::cell::Cell;

/// Chip side length in pixels.
pub const CHIP_SIZE: usize = 264;
/// Pixel resolution in meters.
pub const RESOLUTION_M: f64 = 10.0;
/// Cell side length in projected meters (264 px at 10 m).
pub const CELL_SIZE_M: f64 = CHIP_SIZE as f64 * RESOLUTION_M;

/// Equatorial radius used for the spherical row/column spacing (meters).
const RADIUS_EQUATOR_M: f64 = 6_378_137.0;

/// One latitude row of the grid.
#[derive(Debug, Clone)]
pub struct GridRow {
    /// Row name: `"{n}U"` at/above the equator, `"{n}D"` below.
    pub name: String,
    /// Latitude of the row's bottom edge in degrees.
    pub lat: f64,
    /// Latitude of the row's top edge in degrees.
    pub top: f64,
}

/// One longitude column within a row.
#[derive(Debug, Clone)]
pub struct GridColumn {
    /// Column name: `"{n}R"` at/east of the prime meridian, `"{n}L"` west.
    pub name: String,
    /// Longitude of the column's left edge in degrees.
    pub lon: f64,
    /// Longitude of the column's right edge in degrees.
    pub right: f64,
}

/// Immutable global grid configuration.
///
/// Constructed once at startup and shared by reference; never mutated.
/// Row and column names are assigned on the full global lattice before any
/// range bounding, so ids are stable regardless of the extent a run uses.
#[derive(Debug, Clone)]
pub struct GlobalGrid {
    lon_range: (f64, f64),
    rows: Vec<GridRow>,
}

impl GlobalGrid {
    /// Grid bounded to the given latitude/longitude ranges (degrees).
    pub fn new(lat_range: (f64, f64), lon_range: (f64, f64)) -> Self {
        let rows = Self::build_rows()
            .into_iter()
            .filter(|r| r.lat >= lat_range.0 && r.lat <= lat_range.1)
            .collect();
        Self { lon_range, rows }
    }

    /// Grid covering the full supported extent.
    pub fn global() -> Self {
        Self::new((-85.0, 85.0), (-180.0, 180.0))
    }

    /// All rows inside the configured latitude range, south to north.
    pub fn rows(&self) -> &[GridRow] {
        &self.rows
    }

    /// Build the global latitude lattice with row names.
    fn build_rows() -> Vec<GridRow> {
        let arc_pole_to_pole = std::f64::consts::PI * RADIUS_EQUATOR_M;
        let divisions = (arc_pole_to_pole / CELL_SIZE_M).ceil() as usize;
        let step = 180.0 / divisions as f64;

        let lats: Vec<f64> = (0..divisions).map(|k| -90.0 + k as f64 * step).collect();
        let zeroth = lats.partition_point(|&l| l < 0.0);

        (0..divisions)
            .map(|i| {
                let name = if i >= zeroth {
                    format!("{}U", i - zeroth)
                } else {
                    format!("{}D", zeroth - i)
                };
                let top = if i + 1 < divisions {
                    lats[i + 1]
                } else {
                    lats[i] + step
                };
                GridRow {
                    name,
                    lat: lats[i],
                    top,
                }
            })
            .collect()
    }

    /// Columns of one row inside the configured longitude range, west to
    /// east. Column width follows the circumference at the row latitude.
    pub fn columns_for_row(&self, row: &GridRow) -> Vec<GridColumn> {
        let circumference =
            2.0 * std::f64::consts::PI * RADIUS_EQUATOR_M * row.lat.to_radians().cos();
        let divisions = ((circumference / CELL_SIZE_M).ceil() as usize).max(1);
        let step = 360.0 / divisions as f64;

        let lons: Vec<f64> = (0..divisions).map(|k| -180.0 + k as f64 * step).collect();
        let zeroth = lons.partition_point(|&l| l < 0.0);

        (0..divisions)
            .filter(|&i| lons[i] >= self.lon_range.0 && lons[i] <= self.lon_range.1)
            .map(|i| {
                let name = if i >= zeroth {
                    format!("{}R", i - zeroth)
                } else {
                    format!("{}L", zeroth - i)
                };
                let right = if i + 1 < divisions {
                    lons[i + 1]
                } else {
                    lons[i] + step
                };
                GridColumn {
                    name,
                    lon: lons[i],
                    right,
                }
            })
            .collect()
    }

    /// All cells whose geographic footprint intersects `bbox` (EPSG:4326).
    ///
    /// Cells are returned in row-major order (south to north, west to
    /// east), which fixes the stable enumeration order for a footprint.
    pub fn cells_for_bbox(&self, bbox: &BoundingBox) -> Vec<Cell> {
        let mut cells = Vec::new();
        for row in &self.rows {
            // outward snap: a row counts as soon as any part overlaps
            if row.top <= bbox.min_y || row.lat >= bbox.max_y {
                continue;
            }
            for col in self.columns_for_row(row) {
                if col.right <= bbox.min_x || col.lon >= bbox.max_x {
                    continue;
                }
                cells.push(Cell::new(row, &col));
            }
        }
        cells
    }

    /// The cell containing a geographic point (bottom-left corner rule).
    pub fn cell_containing(&self, lat: f64, lon: f64) -> Option<Cell> {
        let row_idx = self.rows.partition_point(|r| r.lat <= lat);
        let row = self.rows.get(row_idx.checked_sub(1)?)?;
        let cols = self.columns_for_row(row);
        let col_idx = cols.partition_point(|c| c.lon <= lon);
        let col = cols.get(col_idx.checked_sub(1)?)?;
        Some(Cell::new(row, col))
    }
}
