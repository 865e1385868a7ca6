//! Common types and utilities shared across all chipping crates.

pub mod bbox;
pub mod crs;
pub mod error;
pub mod geotransform;
pub mod time;

pub use bbox::BoundingBox;
pub use crs::{UtmCrs, EPSG_WGS84};
pub use error::{ChipError, ChipResult};
pub use geotransform::GeoTransform;
pub use time::{parse_utc_datetime, TimeWindow};
