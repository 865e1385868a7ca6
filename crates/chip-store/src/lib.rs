//! Chip archives: zipped, chunked Zarr V3 stores with a cell-record index.
//!
//! A store holds one Zarr array per grid cell at `cells/{cell_id}`, shape
//! `[bands, 264, 264]` chunked `[1, 264, 264]` with NaN fill, plus a
//! `chipstore.json` index of cell records at the root. Stores are written
//! to a staging directory and packed into a single `.zarr.zip` atomically
//! on finish.

pub mod archive;
pub mod index;
pub mod store;
pub mod writer;

pub use index::{CellRecord, StoreIndex, FORMAT_VERSION};
pub use store::ChipStore;
pub use writer::ChipStoreWriter;
