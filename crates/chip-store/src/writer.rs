//! Single-writer store construction.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tempfile::TempDir;
use tracing::{debug, info};
use zarrs::array::{ArrayBuilder, DataType, FillValue};
use zarrs::array_subset::ArraySubset;
use zarrs_filesystem::FilesystemStore;

use chip_common::{ChipError, ChipResult};
use chip_grid::CHIP_SIZE;
use chip_raster::Chip;

use crate::archive;
use crate::index::{CellRecord, StoreIndex, INDEX_FILE};

/// Writes chips into a staging directory and packs the archive on finish.
///
/// Chips are accepted one at a time; concurrent producers funnel their
/// results through whoever owns the writer. Nothing appears at the
/// destination path until [`finish`](Self::finish) completes.
pub struct ChipStoreWriter {
    staging: TempDir,
    store: Arc<FilesystemStore>,
    index: StoreIndex,
    dest: PathBuf,
    /// When set, only these cells may be appended (stage-2 stores are
    /// bounded by the label store's cell set).
    allowed: Option<HashMap<String, CellRecord>>,
}

impl ChipStoreWriter {
    /// Start a new store destined for `dest`.
    pub fn create(dest: &Path, acquired: DateTime<Utc>) -> ChipResult<Self> {
        let staging = TempDir::new()?;
        let store = Arc::new(
            FilesystemStore::new(staging.path())
                .map_err(|e| ChipError::store(format!("create staging store: {}", e)))?,
        );
        Ok(Self {
            staging,
            store,
            index: StoreIndex::new(acquired),
            dest: dest.to_path_buf(),
            allowed: None,
        })
    }

    /// Restrict the writer to a known cell set, typically the cell records
    /// of the label store this store is being aligned against.
    pub fn seed_cells(&mut self, records: impl IntoIterator<Item = CellRecord>) {
        self.allowed = Some(records.into_iter().map(|r| (r.id.clone(), r)).collect());
    }

    /// Number of chips written so far.
    pub fn len(&self) -> usize {
        self.index.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.cells.is_empty()
    }

    /// Write a chip into the store.
    pub fn write_chip(&mut self, chip: &Chip) -> ChipResult<()> {
        if self.index.record(&chip.cell_id).is_some() {
            return Err(ChipError::store(format!(
                "cell {} already written to this store",
                chip.cell_id
            )));
        }
        self.write_array(chip)?;
        self.index.cells.push(CellRecord::from(&chip.frame()));
        debug!(cell = %chip.cell_id, bands = chip.bands.len(), "wrote chip");
        Ok(())
    }

    /// Write a chip, requiring its cell to be in the seeded cell set.
    pub fn append_chip(&mut self, chip: &Chip) -> ChipResult<()> {
        match &self.allowed {
            Some(allowed) if allowed.contains_key(&chip.cell_id) => self.write_chip(chip),
            Some(_) => Err(ChipError::store(format!(
                "cell {} is not part of this store's cell set",
                chip.cell_id
            ))),
            None => Err(ChipError::store(
                "append_chip called on a writer with no seeded cell set",
            )),
        }
    }

    fn write_array(&mut self, chip: &Chip) -> ChipResult<()> {
        let bands = chip.bands.len() as u64;
        let side = CHIP_SIZE as u64;

        let chunk_grid: zarrs::array::ChunkGrid = vec![1, side, side]
            .try_into()
            .map_err(|e| ChipError::store(format!("chunk grid: {:?}", e)))?;

        let mut attrs = serde_json::Map::new();
        attrs.insert("epsg".to_string(), serde_json::json!(chip.epsg));
        attrs.insert(
            "bounds".to_string(),
            serde_json::json!(chip.bounds.to_array()),
        );
        attrs.insert(
            "transform".to_string(),
            serde_json::json!(chip.transform.to_array()),
        );
        attrs.insert(
            "acquired".to_string(),
            serde_json::json!(chip.acquired.to_rfc3339()),
        );
        attrs.insert("bands".to_string(), serde_json::json!(chip.bands));

        let path = format!("/cells/{}", chip.cell_id);
        let mut builder = ArrayBuilder::new(
            vec![bands, side, side],
            DataType::Float32,
            chunk_grid,
            FillValue::from(f32::NAN),
        );
        let array = builder
            .attributes(attrs)
            .build(self.store.clone(), &path)
            .map_err(|e| ChipError::store(format!("build array {}: {}", path, e)))?;

        array
            .store_metadata()
            .map_err(|e| ChipError::store(format!("store metadata {}: {}", path, e)))?;

        let subset = ArraySubset::new_with_start_shape(vec![0, 0, 0], vec![bands, side, side])
            .map_err(|e| ChipError::store(e.to_string()))?;
        array
            .store_array_subset_elements(&subset, &chip.data)
            .map_err(|e| ChipError::store(format!("store data {}: {}", path, e)))?;

        Ok(())
    }

    /// Write the index, pack the archive and move it into place.
    pub fn finish(mut self) -> ChipResult<PathBuf> {
        if self.index.cells.is_empty() {
            return Err(ChipError::store("refusing to pack an empty store"));
        }
        self.index.cells.sort_by(|a, b| a.id.cmp(&b.id));

        std::fs::write(self.staging.path().join(INDEX_FILE), self.index.to_json()?)?;
        archive::pack(self.staging.path(), &self.dest)?;

        info!(
            dest = %self.dest.display(),
            cells = self.index.cells.len(),
            "finished chip store"
        );
        Ok(self.dest)
    }
}
