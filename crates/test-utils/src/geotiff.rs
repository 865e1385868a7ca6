//! GeoTIFF fixtures written with the `tiff` encoder.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use tiff::encoder::colortype::Gray32Float;
use tiff::encoder::TiffEncoder;
use tiff::tags::Tag;

use chip_common::{GeoTransform, EPSG_WGS84};
use chip_grid::{CHIP_SIZE, RESOLUTION_M};
use chip_raster::ChipFrame;

const TAG_MODEL_PIXEL_SCALE: u16 = 33550;
const TAG_MODEL_TIEPOINT: u16 = 33922;
const TAG_GEO_KEY_DIRECTORY: u16 = 34735;

/// Write a single-band f32 GeoTIFF with georeferencing tags.
pub fn write_geotiff(
    path: &Path,
    width: u32,
    height: u32,
    epsg: u32,
    transform: &GeoTransform,
    data: &[f32],
) {
    assert_eq!(data.len(), (width as usize) * (height as usize));

    let file = File::create(path).expect("create fixture tiff");
    let mut encoder = TiffEncoder::new(BufWriter::new(file)).expect("tiff encoder");
    let mut image = encoder
        .new_image::<Gray32Float>(width, height)
        .expect("tiff image");

    let scale = [transform.pixel_width, -transform.pixel_height, 0.0];
    let tiepoint = [0.0, 0.0, 0.0, transform.origin_x, transform.origin_y, 0.0];
    // [version, revision, minor, key count], then 4-short key entries:
    // model type, raster type (pixel-is-area), CRS code
    let (model, cs_key) = if epsg == EPSG_WGS84 {
        (2u16, 2048u16)
    } else {
        (1u16, 3072u16)
    };
    let keys: [u16; 16] = [
        1, 1, 0, 3, 1024, 0, 1, model, 1025, 0, 1, 1, cs_key, 0, 1, epsg as u16,
    ];

    image
        .encoder()
        .write_tag(Tag::Unknown(TAG_MODEL_PIXEL_SCALE), &scale[..])
        .expect("pixel scale tag");
    image
        .encoder()
        .write_tag(Tag::Unknown(TAG_MODEL_TIEPOINT), &tiepoint[..])
        .expect("tiepoint tag");
    image
        .encoder()
        .write_tag(Tag::Unknown(TAG_GEO_KEY_DIRECTORY), &keys[..])
        .expect("geo key tag");
    image.write_data(data).expect("tiff pixel data");
}

/// Write a constant-valued GeoTIFF covering `frame` plus `margin_px`
/// pixels on every side, on the frame's own grid.
pub fn write_geotiff_covering(path: &Path, frame: &ChipFrame, value: f32, margin_px: usize) {
    let side = (CHIP_SIZE + 2 * margin_px) as u32;
    let t = GeoTransform::new(
        frame.transform.origin_x - margin_px as f64 * RESOLUTION_M,
        frame.transform.origin_y + margin_px as f64 * RESOLUTION_M,
        RESOLUTION_M,
        -RESOLUTION_M,
    );
    let data = vec![value; (side as usize) * (side as usize)];
    write_geotiff(path, side, side, frame.epsg, &t, &data);
}
