//! Grid cells: stable ids, zone CRS and canonical transforms.

use chip_common::{BoundingBox, GeoTransform, UtmCrs};
use projection::UtmProjection;

use crate::grid::{GridColumn, GridRow, CELL_SIZE_M, CHIP_SIZE, RESOLUTION_M};

/// One addressable grid cell.
///
/// The id is stable across runs for the same footprint. The projected
/// bounding box anchors at the projected bottom-left lattice point and the
/// canonical transform is derived from it, so every chip for this cell
/// shares pixel-identical georeferencing.
#[derive(Debug, Clone)]
pub struct Cell {
    /// Stable id, `"{row}_{col}"`.
    pub id: String,
    /// Bottom edge latitude (degrees).
    pub lat: f64,
    /// Left edge longitude (degrees).
    pub lon: f64,
    /// Top edge latitude of the lattice footprint (degrees).
    pub lat_top: f64,
    /// Right edge longitude of the lattice footprint (degrees).
    pub lon_right: f64,
    /// Zone-local CRS, chosen from the cell center.
    pub crs: UtmCrs,
    /// Bounding box in the zone CRS (meters).
    pub bounds: BoundingBox,
    /// Canonical affine transform for the 264x264 chip.
    pub transform: GeoTransform,
}

impl Cell {
    pub(crate) fn new(row: &GridRow, col: &GridColumn) -> Self {
        // Nearest-zone-centroid rule: the zone of the cell center decides,
        // so cells straddling a zone seam land in exactly one zone.
        let center_lat = (row.lat + row.top) / 2.0;
        let center_lon = (col.lon + col.right) / 2.0;
        let crs = UtmCrs::for_latlon(center_lat, center_lon);

        let proj = UtmProjection::for_crs(crs);
        let (easting, northing) = proj.forward(row.lat, col.lon);
        let bounds = BoundingBox::new(
            easting,
            northing,
            easting + CELL_SIZE_M,
            northing + CELL_SIZE_M,
        );
        let transform = GeoTransform::new(
            bounds.min_x,
            bounds.max_y,
            RESOLUTION_M,
            -RESOLUTION_M,
        );

        Self {
            id: format!("{}_{}", row.name, col.name),
            lat: row.lat,
            lon: col.lon,
            lat_top: row.top,
            lon_right: col.right,
            crs,
            bounds,
            transform,
        }
    }

    /// Chip side length in pixels.
    pub fn size(&self) -> usize {
        CHIP_SIZE
    }

    /// The cell's lattice footprint in EPSG:4326.
    pub fn geographic_footprint(&self) -> BoundingBox {
        BoundingBox::new(self.lon, self.lat, self.lon_right, self.lat_top)
    }

    /// Geographic bounds of the projected cell square (EPSG:4326).
    ///
    /// Need not coincide with the lattice footprint: the projected
    /// square's corners unproject off the graticule.
    pub fn geographic_bounds(&self) -> BoundingBox {
        let proj = UtmProjection::for_crs(self.crs);
        let corners = [
            (self.bounds.min_x, self.bounds.min_y),
            (self.bounds.min_x, self.bounds.max_y),
            (self.bounds.max_x, self.bounds.min_y),
            (self.bounds.max_x, self.bounds.max_y),
        ];
        let mut bbox = BoundingBox::new(f64::MAX, f64::MAX, f64::MIN, f64::MIN);
        for (e, n) in corners {
            let (lat, lon) = proj.inverse(e, n);
            bbox.min_x = bbox.min_x.min(lon);
            bbox.min_y = bbox.min_y.min(lat);
            bbox.max_x = bbox.max_x.max(lon);
            bbox.max_y = bbox.max_y.max(lat);
        }
        bbox
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::GlobalGrid;

    #[test]
    fn test_cell_geometry_invariants() {
        let grid = GlobalGrid::new((40.0, 41.0), (10.0, 11.0));
        let cell = grid.cell_containing(40.5, 10.5).unwrap();

        assert!((cell.bounds.width() - CELL_SIZE_M).abs() < 1e-6);
        assert!((cell.bounds.height() - CELL_SIZE_M).abs() < 1e-6);

        // Transform is derived from the bounds, never independent
        assert_eq!(cell.transform.origin_x, cell.bounds.min_x);
        assert_eq!(cell.transform.origin_y, cell.bounds.max_y);
        assert_eq!(cell.transform.pixel_width, RESOLUTION_M);
        assert_eq!(cell.transform.pixel_height, -RESOLUTION_M);

        // 264 pixels of 10 m span the bounds exactly
        let (x_last, y_last) = cell.transform.pixel_center(263, 263);
        assert!(x_last < cell.bounds.max_x && x_last > cell.bounds.min_x);
        assert!(y_last > cell.bounds.min_y && y_last < cell.bounds.max_y);
    }

    #[test]
    fn test_id_format() {
        let grid = GlobalGrid::new((40.0, 41.0), (10.0, 11.0));
        let cell = grid.cell_containing(40.5, 10.5).unwrap();
        let (row, col) = cell.id.split_once('_').unwrap();
        assert!(row.ends_with('U'));
        assert!(col.ends_with('R'));
    }

    #[test]
    fn test_geographic_bounds_contain_footprint() {
        let grid = GlobalGrid::new((40.0, 41.0), (10.0, 11.0));
        let cell = grid.cell_containing(40.5, 10.5).unwrap();
        let geo = cell.geographic_bounds();
        // The anchor corner round-trips through the projection, so allow
        // for floating-point slack at the exact boundary.
        let eps = 1e-6;
        assert!(geo.min_x - eps <= cell.lon && cell.lon <= geo.max_x + eps);
        assert!(geo.min_y - eps <= cell.lat && cell.lat <= geo.max_y + eps);
    }

    #[test]
    fn test_zone_from_center_is_deterministic() {
        // A cell whose left edge sits just west of a zone boundary still
        // gets one zone, decided by its center.
        let grid = GlobalGrid::new((40.0, 41.0), (11.9, 12.1));
        for cell in grid.cells_for_bbox(&chip_common::BoundingBox::new(11.9, 40.0, 12.1, 40.2)) {
            let center_lon = (cell.lon + cell.lon_right) / 2.0;
            let expected = UtmCrs::for_latlon((cell.lat + cell.lat_top) / 2.0, center_lon);
            assert_eq!(cell.crs, expected);
        }
    }
}
