//! Projection math for zone-local UTM coordinate systems.
//!
//! Implements the ellipsoidal transverse Mercator forward and inverse
//! transforms on WGS84. No external projection library is used; the
//! series expansions here are accurate to well under a meter inside a
//! UTM zone, which is far below the 10 m grid resolution.

pub mod utm;

pub use utm::UtmProjection;
