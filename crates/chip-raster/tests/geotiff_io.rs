//! GeoTIFF files through the full open, window and extract path.

use std::fs::OpenOptions;

use chip_common::ChipError;
use chip_grid::RESOLUTION_M;
use chip_raster::{
    ChipExtractor, ExtractorConfig, GeoTiffRaster, RasterSource, ResampleMethod,
};
use test_utils::{test_acquired, utm_frame, write_geotiff_covering};

#[test]
fn round_trip_produces_a_full_chip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("labels.tif");
    let frame = utm_frame("1U_4R", 32601, 500_000.0, 1_100_000.0);
    write_geotiff_covering(&path, &frame, 7.0, 6);

    let mut raster = GeoTiffRaster::open(&path).unwrap();
    assert_eq!(raster.epsg(), 32601);
    assert!((raster.transform().pixel_width - RESOLUTION_M).abs() < 1e-9);

    let footprint = raster.footprint();
    assert_eq!(footprint.epsg, 32601);
    assert!(footprint.bounds.min_x <= frame.bounds.min_x);
    assert!(footprint.bounds.max_y >= frame.bounds.max_y);

    let extractor = ChipExtractor::new(ExtractorConfig {
        method: ResampleMethod::Nearest,
        min_valid_fraction: 0.0,
        require_nonzero: true,
    });
    let chip = extractor
        .extract(&frame, &mut raster, test_acquired(), "labels")
        .unwrap()
        .expect("chip expected");

    assert_eq!(chip.cell_id, "1U_4R");
    assert!((chip.valid_fraction() - 1.0).abs() < 1e-9);
    assert!(chip.data.iter().all(|v| (*v - 7.0).abs() < 1e-6));
}

#[test]
fn decode_failure_after_open_is_not_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("labels.tif");
    let frame = utm_frame("1U_4R", 32601, 500_000.0, 1_100_000.0);
    write_geotiff_covering(&path, &frame, 2.0, 6);

    let mut raster = GeoTiffRaster::open(&path).unwrap();

    // Truncate the pixel data out from under the open handle, so the
    // first chunk decode fails mid-read.
    OpenOptions::new()
        .write(true)
        .open(&path)
        .unwrap()
        .set_len(8)
        .unwrap();

    let extractor = ChipExtractor::new(ExtractorConfig::default());
    let err = extractor
        .extract(&frame, &mut raster, test_acquired(), "labels")
        .unwrap_err();
    assert!(!err.is_fatal());
    assert!(matches!(err, ChipError::Extraction { .. }));
}
