//! The store index: per-cell georeferencing records plus store metadata.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use chip_common::{BoundingBox, ChipError, ChipResult, GeoTransform};
use chip_grid::Cell;
use chip_raster::ChipFrame;

pub const FORMAT_VERSION: u32 = 1;

/// File name of the index inside the archive.
pub const INDEX_FILE: &str = "chipstore.json";

/// Georeferencing for one cell's array, as persisted in the index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CellRecord {
    pub id: String,
    pub epsg: u32,
    /// `[min_x, min_y, max_x, max_y]` in the cell's zone CRS.
    pub bounds: [f64; 4],
    /// `[origin_x, origin_y, pixel_width, pixel_height]`.
    pub transform: [f64; 4],
}

impl CellRecord {
    /// Rebuild the chip frame this record describes.
    pub fn frame(&self) -> ChipFrame {
        ChipFrame {
            cell_id: self.id.clone(),
            epsg: self.epsg,
            bounds: BoundingBox::from_array(self.bounds),
            transform: GeoTransform::from_array(self.transform),
        }
    }
}

impl From<&Cell> for CellRecord {
    fn from(cell: &Cell) -> Self {
        Self {
            id: cell.id.clone(),
            epsg: cell.crs.epsg(),
            bounds: cell.bounds.to_array(),
            transform: cell.transform.to_array(),
        }
    }
}

impl From<&ChipFrame> for CellRecord {
    fn from(frame: &ChipFrame) -> Self {
        Self {
            id: frame.cell_id.clone(),
            epsg: frame.epsg,
            bounds: frame.bounds.to_array(),
            transform: frame.transform.to_array(),
        }
    }
}

/// Root index of a chip store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreIndex {
    pub format_version: u32,
    pub created: DateTime<Utc>,
    /// Acquisition timestamp shared by the chips in the store.
    pub acquired: DateTime<Utc>,
    pub cells: Vec<CellRecord>,
}

impl StoreIndex {
    pub fn new(acquired: DateTime<Utc>) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            created: Utc::now(),
            acquired,
            cells: Vec::new(),
        }
    }

    pub fn record(&self, cell_id: &str) -> Option<&CellRecord> {
        self.cells.iter().find(|c| c.id == cell_id)
    }

    pub fn to_json(&self) -> ChipResult<String> {
        serde_json::to_string_pretty(self).map_err(ChipError::from)
    }

    pub fn from_json(raw: &str) -> ChipResult<Self> {
        let index: Self = serde_json::from_str(raw)?;
        if index.format_version != FORMAT_VERSION {
            return Err(ChipError::store(format!(
                "unsupported store format version {}",
                index.format_version
            )));
        }
        Ok(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> CellRecord {
        CellRecord {
            id: "3U_12R".to_string(),
            epsg: 32633,
            bounds: [500000.0, 100000.0, 502640.0, 102640.0],
            transform: [500000.0, 102640.0, 10.0, -10.0],
        }
    }

    #[test]
    fn test_index_json_round_trip() {
        let mut index = StoreIndex::new(Utc::now());
        index.cells.push(record());

        let json = index.to_json().unwrap();
        let back = StoreIndex::from_json(&json).unwrap();
        assert_eq!(back.cells.len(), 1);
        assert_eq!(back.cells[0].id, "3U_12R");
        assert_eq!(back.cells[0].epsg, 32633);
    }

    #[test]
    fn test_unknown_format_version_rejected() {
        let json = r#"{"format_version":99,"created":"2024-01-01T00:00:00Z","acquired":"2024-01-01T00:00:00Z","cells":[]}"#;
        assert!(StoreIndex::from_json(json).is_err());
    }

    #[test]
    fn test_record_frame_round_trip() {
        let r = record();
        let frame = r.frame();
        assert_eq!(frame.cell_id, "3U_12R");
        assert_eq!(CellRecord::from(&frame).bounds, r.bounds);
    }
}
