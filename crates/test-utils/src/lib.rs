//! Shared test utilities for the chipping workspace.
//!
//! Frame and chip builders plus synthetic raster generators, used from
//! `[dev-dependencies]` across the workspace:
//!
//! ```toml
//! [dev-dependencies]
//! test-utils = { path = "../test-utils" }
//! ```

pub mod fixtures;
pub mod generators;
pub mod geotiff;

pub use fixtures::*;
pub use generators::*;
pub use geotiff::*;
