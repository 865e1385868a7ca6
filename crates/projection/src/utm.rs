//! Transverse Mercator projection for UTM zones.
//!
//! The projection parameters are fixed by the UTM convention:
//! - Scale factor at the central meridian: 0.9996
//! - False easting: 500 000 m
//! - False northing: 0 m (north) or 10 000 000 m (south)
//! - WGS84 ellipsoid

use std::f64::consts::PI;

use chip_common::{ChipResult, UtmCrs};

/// WGS84 semi-major axis (meters).
const WGS84_A: f64 = 6_378_137.0;
/// WGS84 flattening.
const WGS84_F: f64 = 1.0 / 298.257_223_563;
/// UTM scale factor at the central meridian.
const K0: f64 = 0.9996;
/// UTM false easting (meters).
const FALSE_EASTING: f64 = 500_000.0;
/// UTM false northing for the southern series (meters).
const FALSE_NORTHING_SOUTH: f64 = 10_000_000.0;

/// Transverse Mercator projection for one UTM zone.
///
/// Construct with [`UtmProjection::for_crs`] or [`UtmProjection::for_epsg`]
/// and convert with [`forward`](UtmProjection::forward) /
/// [`inverse`](UtmProjection::inverse). Angles at the API boundary are in
/// degrees; radians are used internally.
#[derive(Debug, Clone)]
pub struct UtmProjection {
    crs: UtmCrs,
    /// Central meridian in radians.
    lon0: f64,
    /// First eccentricity squared.
    e2: f64,
    /// Second eccentricity squared.
    ep2: f64,
    /// e1 constant for the inverse footpoint-latitude series.
    e1: f64,
}

impl UtmProjection {
    /// Build the projection for a UTM CRS.
    pub fn for_crs(crs: UtmCrs) -> Self {
        let e2 = WGS84_F * (2.0 - WGS84_F);
        let ep2 = e2 / (1.0 - e2);
        let sqrt1me2 = (1.0 - e2).sqrt();
        let e1 = (1.0 - sqrt1me2) / (1.0 + sqrt1me2);
        Self {
            crs,
            lon0: crs.central_meridian_deg().to_radians(),
            e2,
            ep2,
            e1,
        }
    }

    /// Build the projection for a UTM EPSG code.
    pub fn for_epsg(epsg: u32) -> ChipResult<Self> {
        Ok(Self::for_crs(UtmCrs::from_epsg(epsg)?))
    }

    /// The CRS this projection realizes.
    pub fn crs(&self) -> UtmCrs {
        self.crs
    }

    /// Meridional arc length from the equator to latitude `lat` (radians).
    fn meridian_arc(&self, lat: f64) -> f64 {
        let e2 = self.e2;
        let e4 = e2 * e2;
        let e6 = e4 * e2;
        WGS84_A
            * ((1.0 - e2 / 4.0 - 3.0 * e4 / 64.0 - 5.0 * e6 / 256.0) * lat
                - (3.0 * e2 / 8.0 + 3.0 * e4 / 32.0 + 45.0 * e6 / 1024.0) * (2.0 * lat).sin()
                + (15.0 * e4 / 256.0 + 45.0 * e6 / 1024.0) * (4.0 * lat).sin()
                - (35.0 * e6 / 3072.0) * (6.0 * lat).sin())
    }

    /// Project geographic coordinates (degrees) to (easting, northing).
    pub fn forward(&self, lat_deg: f64, lon_deg: f64) -> (f64, f64) {
        let lat = lat_deg.to_radians();
        let lon = lon_deg.to_radians();

        let sin_lat = lat.sin();
        let cos_lat = lat.cos();
        let tan_lat = lat.tan();

        let n = WGS84_A / (1.0 - self.e2 * sin_lat * sin_lat).sqrt();
        let t = tan_lat * tan_lat;
        let c = self.ep2 * cos_lat * cos_lat;
        let a = cos_lat * normalize_lon(lon - self.lon0);
        let m = self.meridian_arc(lat);

        let a2 = a * a;
        let a3 = a2 * a;
        let a4 = a3 * a;
        let a5 = a4 * a;
        let a6 = a5 * a;

        let x = K0
            * n
            * (a + (1.0 - t + c) * a3 / 6.0
                + (5.0 - 18.0 * t + t * t + 72.0 * c - 58.0 * self.ep2) * a5 / 120.0);
        let y = K0
            * (m + n
                * tan_lat
                * (a2 / 2.0
                    + (5.0 - t + 9.0 * c + 4.0 * c * c) * a4 / 24.0
                    + (61.0 - 58.0 * t + t * t + 600.0 * c - 330.0 * self.ep2) * a6 / 720.0));

        let northing = if self.crs.is_northern() {
            y
        } else {
            y + FALSE_NORTHING_SOUTH
        };
        (x + FALSE_EASTING, northing)
    }

    /// Unproject (easting, northing) back to geographic degrees.
    pub fn inverse(&self, easting: f64, northing: f64) -> (f64, f64) {
        let x = easting - FALSE_EASTING;
        let y = if self.crs.is_northern() {
            northing
        } else {
            northing - FALSE_NORTHING_SOUTH
        };

        let e2 = self.e2;
        let e4 = e2 * e2;
        let e6 = e4 * e2;
        let e1 = self.e1;

        let m = y / K0;
        let mu = m / (WGS84_A * (1.0 - e2 / 4.0 - 3.0 * e4 / 64.0 - 5.0 * e6 / 256.0));

        // Footpoint latitude
        let phi1 = mu
            + (3.0 * e1 / 2.0 - 27.0 * e1.powi(3) / 32.0) * (2.0 * mu).sin()
            + (21.0 * e1 * e1 / 16.0 - 55.0 * e1.powi(4) / 32.0) * (4.0 * mu).sin()
            + (151.0 * e1.powi(3) / 96.0) * (6.0 * mu).sin()
            + (1097.0 * e1.powi(4) / 512.0) * (8.0 * mu).sin();

        let sin_phi1 = phi1.sin();
        let cos_phi1 = phi1.cos();
        let tan_phi1 = phi1.tan();

        let c1 = self.ep2 * cos_phi1 * cos_phi1;
        let t1 = tan_phi1 * tan_phi1;
        let n1 = WGS84_A / (1.0 - e2 * sin_phi1 * sin_phi1).sqrt();
        let r1 = WGS84_A * (1.0 - e2) / (1.0 - e2 * sin_phi1 * sin_phi1).powf(1.5);
        let d = x / (n1 * K0);

        let d2 = d * d;
        let d3 = d2 * d;
        let d4 = d3 * d;
        let d5 = d4 * d;
        let d6 = d5 * d;

        let lat = phi1
            - (n1 * tan_phi1 / r1)
                * (d2 / 2.0
                    - (5.0 + 3.0 * t1 + 10.0 * c1 - 4.0 * c1 * c1 - 9.0 * self.ep2) * d4 / 24.0
                    + (61.0 + 90.0 * t1 + 298.0 * c1 + 45.0 * t1 * t1
                        - 252.0 * self.ep2
                        - 3.0 * c1 * c1)
                        * d6
                        / 720.0);
        let lon = self.lon0
            + (d - (1.0 + 2.0 * t1 + c1) * d3 / 6.0
                + (5.0 - 2.0 * c1 + 28.0 * t1 - 3.0 * c1 * c1 + 8.0 * self.ep2 + 24.0 * t1 * t1)
                    * d5
                    / 120.0)
                / cos_phi1;

        (lat.to_degrees(), normalize_lon(lon).to_degrees())
    }
}

/// Wrap a longitude in radians into (-pi, pi].
fn normalize_lon(lon: f64) -> f64 {
    let mut l = lon;
    while l > PI {
        l -= 2.0 * PI;
    }
    while l <= -PI {
        l += 2.0 * PI;
    }
    l
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(proj: &UtmProjection, lat: f64, lon: f64) {
        let (e, n) = proj.forward(lat, lon);
        let (lat2, lon2) = proj.inverse(e, n);
        assert!(
            (lat - lat2).abs() < 1e-7,
            "lat {} -> {} (zone {})",
            lat,
            lat2,
            proj.crs()
        );
        assert!(
            (lon - lon2).abs() < 1e-7,
            "lon {} -> {} (zone {})",
            lon,
            lon2,
            proj.crs()
        );
    }

    #[test]
    fn test_central_meridian_maps_to_false_easting() {
        let proj = UtmProjection::for_epsg(32633).unwrap();
        let (e, n) = proj.forward(0.0, 15.0);
        assert!((e - 500_000.0).abs() < 1e-6);
        assert!(n.abs() < 1e-6);
    }

    #[test]
    fn test_known_point_berlin() {
        // Berlin, zone 33N. Reference values computed independently with
        // the Snyder series; sub-meter agreement expected.
        let proj = UtmProjection::for_epsg(32633).unwrap();
        let (e, n) = proj.forward(52.52, 13.405);
        assert!((e - 391_779.26).abs() < 1.0, "easting {}", e);
        assert!((n - 5_820_072.16).abs() < 1.0, "northing {}", n);
    }

    #[test]
    fn test_southern_hemisphere_false_northing() {
        let proj = UtmProjection::for_epsg(32734).unwrap();
        let (_, n) = proj.forward(-34.0, 21.0);
        assert!(n > 0.0 && n < FALSE_NORTHING_SOUTH);
        round_trip(&proj, -34.0, 21.0);
    }

    #[test]
    fn test_round_trip_across_zones() {
        for &(lat, lon, epsg) in &[
            (52.52, 13.405, 32633u32),
            (0.5, -0.5, 32630),
            (-36.0, 175.7, 32760),
            (71.0, -156.8, 32604),
            (-1.0, -174.34, 32701),
        ] {
            let proj = UtmProjection::for_epsg(epsg).unwrap();
            round_trip(&proj, lat, lon);
        }
    }

    #[test]
    fn test_edge_of_zone_round_trip() {
        // Points near the 3-degree half-width of the zone still round-trip.
        let proj = UtmProjection::for_epsg(32633).unwrap();
        round_trip(&proj, 45.0, 12.01);
        round_trip(&proj, 45.0, 17.99);
    }
}
