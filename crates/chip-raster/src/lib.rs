//! Windowed raster access, reprojection and chip extraction.
//!
//! The pipeline here turns one source raster plus one grid cell into one
//! 264x264 chip: a scoped windowed read through [`RasterSource`], a
//! resample into the cell's zone CRS via [`reproject_to_frame`], and the
//! partial-overlap / nodata policy in [`ChipExtractor`].

pub mod chip;
pub mod extract;
pub mod geotiff;
pub mod source;
pub mod transform;

pub use chip::{Chip, ChipFrame};
pub use extract::{ChipExtractor, ExtractorConfig};
pub use geotiff::GeoTiffRaster;
pub use source::{MemoryRaster, RasterSource, SourceArray};
pub use transform::{reproject_to_frame, ResampleMethod};
