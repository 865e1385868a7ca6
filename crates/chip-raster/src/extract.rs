//! Chip extraction: one cell frame plus one raster source in, one chip out.

use chrono::{DateTime, Utc};
use tracing::debug;

use chip_common::{BoundingBox, ChipError, ChipResult, EPSG_WGS84};
use chip_grid::CHIP_SIZE;
use projection::UtmProjection;

use crate::chip::{Chip, ChipFrame};
use crate::source::RasterSource;
use crate::transform::{reproject_to_frame, ResampleMethod};

/// Margin added around the cell bounds before the windowed read, in the
/// frame's units (meters). Covers resampling neighborhoods at the edges.
const WINDOW_MARGIN_M: f64 = 30.0;

/// Extraction policy.
#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    pub method: ResampleMethod,
    /// Minimum fraction of non-NaN pixels for a chip to be kept.
    pub min_valid_fraction: f64,
    /// Skip chips whose valid pixels are all zero. Used for label rasters,
    /// where an all-background chip carries no training signal.
    pub require_nonzero: bool,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            method: ResampleMethod::Bilinear,
            min_valid_fraction: 0.0,
            require_nonzero: false,
        }
    }
}

/// Produces chips from raster sources.
///
/// `Ok(None)` means the cell was skipped by policy (no overlap, too few
/// valid pixels, or all-zero labels); `Err` means extraction itself failed.
pub struct ChipExtractor {
    config: ExtractorConfig,
}

impl ChipExtractor {
    pub fn new(config: ExtractorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    /// Extract a single-band chip for `frame` from `source`.
    pub fn extract(
        &self,
        frame: &ChipFrame,
        source: &mut dyn RasterSource,
        acquired: DateTime<Utc>,
        band: &str,
    ) -> ChipResult<Option<Chip>> {
        let window = window_in_source_crs(frame, source.epsg())?;
        if !window.intersects(&source.bounds()) {
            debug!(cell = %frame.cell_id, "cell does not overlap source, skipping");
            return Ok(None);
        }

        // Read failures are scoped to this cell regardless of how the
        // source classified them; the batch continues without the cell.
        let array = source.read_window(&window).map_err(|e| match e {
            ChipError::Extraction { message, .. } => ChipError::extraction(&frame.cell_id, message),
            other => ChipError::extraction(&frame.cell_id, other.to_string()),
        })?;
        let plane = reproject_to_frame(frame, &array, self.config.method)?;

        self.finish(frame, acquired, vec![band.to_string()], plane)
    }

    /// Assemble a multi-band chip from planes already resampled onto the
    /// frame's pixel grid, applying the same keep/skip policy.
    pub fn assemble(
        &self,
        frame: &ChipFrame,
        acquired: DateTime<Utc>,
        bands: Vec<String>,
        planes: Vec<Vec<f32>>,
    ) -> ChipResult<Option<Chip>> {
        if bands.len() != planes.len() {
            return Err(ChipError::extraction(
                &frame.cell_id,
                format!("{} bands but {} planes", bands.len(), planes.len()),
            ));
        }
        let plane_len = CHIP_SIZE * CHIP_SIZE;
        let mut data = Vec::with_capacity(bands.len() * plane_len);
        for plane in planes {
            if plane.len() != plane_len {
                return Err(ChipError::extraction(
                    &frame.cell_id,
                    format!("band plane has {} values, expected {}", plane.len(), plane_len),
                ));
            }
            data.extend_from_slice(&plane);
        }
        self.finish(frame, acquired, bands, data)
    }

    fn finish(
        &self,
        frame: &ChipFrame,
        acquired: DateTime<Utc>,
        bands: Vec<String>,
        data: Vec<f32>,
    ) -> ChipResult<Option<Chip>> {
        let valid = data.iter().filter(|v| !v.is_nan()).count();
        let fraction = valid as f64 / data.len() as f64;

        if valid == 0 || fraction < self.config.min_valid_fraction {
            debug!(
                cell = %frame.cell_id,
                valid_fraction = fraction,
                "chip below valid-pixel threshold, skipping"
            );
            return Ok(None);
        }

        if self.config.require_nonzero && !data.iter().any(|v| !v.is_nan() && *v != 0.0) {
            debug!(cell = %frame.cell_id, "all-zero chip, skipping");
            return Ok(None);
        }

        Chip::new(frame, acquired, bands, data).map(Some)
    }
}

/// Express the frame's bounds (plus margin) in the source's CRS.
fn window_in_source_crs(frame: &ChipFrame, source_epsg: u32) -> ChipResult<BoundingBox> {
    let bounds = frame.bounds.buffered(WINDOW_MARGIN_M);
    if source_epsg == frame.epsg {
        return Ok(bounds);
    }

    let frame_proj = UtmProjection::for_epsg(frame.epsg)?;
    let source_proj = if source_epsg == EPSG_WGS84 {
        None
    } else {
        Some(UtmProjection::for_epsg(source_epsg)?)
    };

    let corners = [
        (bounds.min_x, bounds.min_y),
        (bounds.min_x, bounds.max_y),
        (bounds.max_x, bounds.min_y),
        (bounds.max_x, bounds.max_y),
    ];
    let mut out = BoundingBox::new(f64::MAX, f64::MAX, f64::MIN, f64::MIN);
    for (x, y) in corners {
        let (lat, lon) = frame_proj.inverse(x, y);
        let (sx, sy) = match &source_proj {
            None => (lon, lat),
            Some(p) => p.forward(lat, lon),
        };
        out.min_x = out.min_x.min(sx);
        out.min_y = out.min_y.min(sy);
        out.max_x = out.max_x.max(sx);
        out.max_y = out.max_y.max(sy);
    }
    Ok(out)
}
