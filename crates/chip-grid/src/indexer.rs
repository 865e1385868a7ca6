//! Footprint-to-cell enumeration.

use chip_common::{BoundingBox, ChipError, ChipResult, EPSG_WGS84};
use projection::UtmProjection;
use tracing::debug;

use crate::cell::Cell;
use crate::grid::GlobalGrid;

/// Geographic margin applied around footprints before enumeration, to
/// absorb reprojection edge effects (degrees).
const FOOTPRINT_BUFFER_DEG: f64 = 0.1;

/// A raster footprint: bounds plus the CRS they are expressed in.
#[derive(Debug, Clone)]
pub struct Footprint {
    pub bounds: BoundingBox,
    pub epsg: u32,
}

impl Footprint {
    pub fn new(bounds: BoundingBox, epsg: u32) -> Self {
        Self { bounds, epsg }
    }
}

/// Computes which cells of the global grid intersect a raster footprint.
pub struct GridIndexer<'a> {
    grid: &'a GlobalGrid,
}

impl<'a> GridIndexer<'a> {
    pub fn new(grid: &'a GlobalGrid) -> Self {
        Self { grid }
    }

    /// Ordered set of cells intersecting the footprint.
    ///
    /// Fatal errors: zero-area footprint, unsupported CRS, or an empty
    /// result — in all three cases there is nothing to produce.
    pub fn cells_for_footprint(&self, footprint: &Footprint) -> ChipResult<Vec<Cell>> {
        if footprint.bounds.area() <= 0.0 {
            return Err(ChipError::grid(format!(
                "footprint has zero area: {:?}",
                footprint.bounds
            )));
        }

        let geographic = self.to_geographic(footprint)?;
        let search = geographic.buffered(FOOTPRINT_BUFFER_DEG);

        let cells: Vec<Cell> = self
            .grid
            .cells_for_bbox(&search)
            .into_iter()
            .filter(|c| c.geographic_footprint().intersects(&geographic))
            .collect();

        debug!(
            count = cells.len(),
            bbox = ?geographic,
            "enumerated grid cells for footprint"
        );

        if cells.is_empty() {
            return Err(ChipError::grid(format!(
                "no grid cells intersect footprint {:?}",
                geographic
            )));
        }
        Ok(cells)
    }

    /// Express the footprint bounds in EPSG:4326.
    fn to_geographic(&self, footprint: &Footprint) -> ChipResult<BoundingBox> {
        if footprint.epsg == EPSG_WGS84 {
            return Ok(footprint.bounds);
        }

        let proj = UtmProjection::for_epsg(footprint.epsg)?;
        let b = &footprint.bounds;
        let corners = [
            (b.min_x, b.min_y),
            (b.min_x, b.max_y),
            (b.max_x, b.min_y),
            (b.max_x, b.max_y),
        ];
        let mut out = BoundingBox::new(f64::MAX, f64::MAX, f64::MIN, f64::MIN);
        for (e, n) in corners {
            let (lat, lon) = proj.inverse(e, n);
            out.min_x = out.min_x.min(lon);
            out.min_y = out.min_y.min(lat);
            out.max_x = out.max_x.max(lon);
            out.max_y = out.max_y.max(lat);
        }
        Ok(out)
    }
}
