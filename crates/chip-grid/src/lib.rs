//! Global grid addressing for ML chip generation.
//!
//! The grid partitions the Earth into rows of equal meridian-arc spacing;
//! each row is subdivided into columns of near-equal arc length at that
//! latitude. Every cell is addressed by a stable `"{row}_{col}"` id, owns a
//! zone-local UTM CRS, and represents exactly 264x264 pixels at 10 m.

pub mod cell;
pub mod grid;
pub mod indexer;

pub use cell::Cell;
pub use grid::{GlobalGrid, GridColumn, GridRow, CELL_SIZE_M, CHIP_SIZE, RESOLUTION_M};
pub use indexer::{Footprint, GridIndexer};
