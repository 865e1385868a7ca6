//! The chip data model.

use chrono::{DateTime, Utc};

use chip_common::{BoundingBox, ChipError, ChipResult, GeoTransform};
use chip_grid::{Cell, CHIP_SIZE};

/// The georeferencing frame a chip is produced into.
///
/// Carries exactly the per-cell coordinate metadata the archive persists,
/// so chips can be produced both from live [`Cell`]s (stage 1) and from
/// cell records read back out of a label store (stage 2).
#[derive(Debug, Clone)]
pub struct ChipFrame {
    pub cell_id: String,
    pub epsg: u32,
    pub bounds: BoundingBox,
    pub transform: GeoTransform,
}

impl From<&Cell> for ChipFrame {
    fn from(cell: &Cell) -> Self {
        Self {
            cell_id: cell.id.clone(),
            epsg: cell.crs.epsg(),
            bounds: cell.bounds,
            transform: cell.transform,
        }
    }
}

/// One extracted chip: a band-major 264x264 array plus metadata.
///
/// Nodata pixels are NaN, never zero.
#[derive(Debug, Clone)]
pub struct Chip {
    pub cell_id: String,
    pub epsg: u32,
    pub bounds: BoundingBox,
    pub transform: GeoTransform,
    pub acquired: DateTime<Utc>,
    pub bands: Vec<String>,
    /// Band-major, row-major pixel data; length `bands * 264 * 264`.
    pub data: Vec<f32>,
}

impl Chip {
    /// Assemble a chip, validating the array shape.
    pub fn new(
        frame: &ChipFrame,
        acquired: DateTime<Utc>,
        bands: Vec<String>,
        data: Vec<f32>,
    ) -> ChipResult<Self> {
        let expected = bands.len() * CHIP_SIZE * CHIP_SIZE;
        if data.len() != expected {
            return Err(ChipError::extraction(
                &frame.cell_id,
                format!(
                    "chip array has {} values, expected {} ({} bands of {}x{} px)",
                    data.len(),
                    expected,
                    bands.len(),
                    CHIP_SIZE,
                    CHIP_SIZE
                ),
            ));
        }
        Ok(Self {
            cell_id: frame.cell_id.clone(),
            epsg: frame.epsg,
            bounds: frame.bounds,
            transform: frame.transform,
            acquired,
            bands,
            data,
        })
    }

    /// Chip side length in pixels.
    pub fn size(&self) -> usize {
        CHIP_SIZE
    }

    /// One band's 264x264 plane.
    pub fn band(&self, name: &str) -> Option<&[f32]> {
        let idx = self.bands.iter().position(|b| b == name)?;
        let plane = CHIP_SIZE * CHIP_SIZE;
        Some(&self.data[idx * plane..(idx + 1) * plane])
    }

    /// Fraction of non-NaN pixels across all bands.
    pub fn valid_fraction(&self) -> f64 {
        if self.data.is_empty() {
            return 0.0;
        }
        let valid = self.data.iter().filter(|v| !v.is_nan()).count();
        valid as f64 / self.data.len() as f64
    }

    /// The frame this chip was produced into.
    pub fn frame(&self) -> ChipFrame {
        ChipFrame {
            cell_id: self.cell_id.clone(),
            epsg: self.epsg,
            bounds: self.bounds,
            transform: self.transform,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame() -> ChipFrame {
        ChipFrame {
            cell_id: "0U_0R".to_string(),
            epsg: 32631,
            bounds: BoundingBox::new(0.0, 0.0, 2640.0, 2640.0),
            transform: GeoTransform::new(0.0, 2640.0, 10.0, -10.0),
        }
    }

    #[test]
    fn test_shape_validation() {
        let ok = Chip::new(
            &frame(),
            Utc::now(),
            vec!["labels".to_string()],
            vec![1.0; CHIP_SIZE * CHIP_SIZE],
        );
        assert!(ok.is_ok());

        let err = Chip::new(
            &frame(),
            Utc::now(),
            vec!["labels".to_string()],
            vec![1.0; 100],
        )
        .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("100 values"), "{}", message);
        assert!(message.contains("264x264"), "{}", message);
    }

    #[test]
    fn test_band_lookup_and_valid_fraction() {
        let plane = CHIP_SIZE * CHIP_SIZE;
        let mut data = vec![1.0; plane * 2];
        for v in data.iter_mut().take(plane / 2) {
            *v = f32::NAN;
        }
        let chip = Chip::new(
            &frame(),
            Utc::now(),
            vec!["vv".to_string(), "vh".to_string()],
            data,
        )
        .unwrap();

        assert!(chip.band("vv").is_some());
        assert!(chip.band("vh").is_some());
        assert!(chip.band("red").is_none());
        assert!((chip.valid_fraction() - 0.75).abs() < 1e-9);
    }
}
