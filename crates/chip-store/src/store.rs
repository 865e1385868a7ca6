//! Read access to packed chip stores.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tempfile::TempDir;
use tracing::debug;
use zarrs::array::Array;
use zarrs::array_subset::ArraySubset;
use zarrs_filesystem::FilesystemStore;

use chip_common::{ChipError, ChipResult};
use chip_raster::{Chip, ChipFrame};

use crate::archive;
use crate::index::{CellRecord, StoreIndex, INDEX_FILE};

/// A chip store opened for reading.
///
/// The archive is unpacked into a scoped temp directory that lives as
/// long as the store value.
pub struct ChipStore {
    // Keeps the unpacked tree alive for the store's lifetime
    _workdir: TempDir,
    store: Arc<FilesystemStore>,
    index: StoreIndex,
}

impl ChipStore {
    /// Unpack and open an archive.
    pub fn open(path: &Path) -> ChipResult<Self> {
        let workdir = TempDir::new()?;
        archive::unpack(path, workdir.path())?;

        let raw = std::fs::read_to_string(workdir.path().join(INDEX_FILE)).map_err(|e| {
            ChipError::store(format!(
                "{} has no {}: {}",
                path.display(),
                INDEX_FILE,
                e
            ))
        })?;
        let index = StoreIndex::from_json(&raw)?;

        let store = Arc::new(
            FilesystemStore::new(workdir.path())
                .map_err(|e| ChipError::store(format!("open unpacked store: {}", e)))?,
        );

        debug!(path = %path.display(), cells = index.cells.len(), "opened chip store");
        Ok(Self {
            _workdir: workdir,
            store,
            index,
        })
    }

    /// Acquisition timestamp the store was produced for.
    pub fn acquired(&self) -> DateTime<Utc> {
        self.index.acquired
    }

    /// Cell ids present in the store, in index order (sorted at write time).
    pub fn cell_ids(&self) -> Vec<String> {
        self.index.cells.iter().map(|c| c.id.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.index.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.cells.is_empty()
    }

    pub fn record(&self, cell_id: &str) -> Option<&CellRecord> {
        self.index.record(cell_id)
    }

    pub fn records(&self) -> &[CellRecord] {
        &self.index.cells
    }

    /// The chip frame for a cell, from the index.
    pub fn frame(&self, cell_id: &str) -> ChipResult<ChipFrame> {
        self.record(cell_id)
            .map(CellRecord::frame)
            .ok_or_else(|| ChipError::store(format!("cell {} not in store index", cell_id)))
    }

    /// Read one cell's chip back out of the archive.
    pub fn read_chip(&self, cell_id: &str) -> ChipResult<Chip> {
        let frame = self.frame(cell_id)?;

        let path = format!("/cells/{}", cell_id);
        let array = Array::open(self.store.clone(), &path)
            .map_err(|e| ChipError::store(format!("open array {}: {}", path, e)))?;

        let attrs = array.attributes();
        let bands: Vec<String> = attrs
            .get("bands")
            .and_then(|v| v.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|b| b.as_str().map(str::to_string))
                    .collect()
            })
            .ok_or_else(|| ChipError::store(format!("{}: missing bands attribute", path)))?;
        let acquired = attrs
            .get("acquired")
            .and_then(|v| v.as_str())
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or(self.index.acquired);

        let shape = array.shape().to_vec();
        if shape.len() != 3 || shape[0] as usize != bands.len() {
            return Err(ChipError::store(format!(
                "{}: unexpected array shape {:?} for {} bands",
                path,
                shape,
                bands.len()
            )));
        }

        let subset = ArraySubset::new_with_start_shape(vec![0, 0, 0], shape)
            .map_err(|e| ChipError::store(e.to_string()))?;
        let data: Vec<f32> = array
            .retrieve_array_subset_elements(&subset)
            .map_err(|e| ChipError::store(format!("read array {}: {}", path, e)))?;

        Chip::new(&frame, acquired, bands, data)
    }
}
