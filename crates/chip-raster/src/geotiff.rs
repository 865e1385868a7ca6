//! Windowed GeoTIFF reading.

use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::tags::Tag;
use tracing::debug;

use chip_common::{BoundingBox, ChipError, ChipResult, GeoTransform};
use chip_grid::Footprint;

use crate::source::{RasterSource, SourceArray};

const KEY_GEOGRAPHIC_TYPE: u16 = 2048;
const KEY_PROJECTED_CS_TYPE: u16 = 3072;

enum TiffLayout {
    Stripped { chunk_height: u32 },
    Tiled {
        tile_width: u32,
        tile_height: u32,
        tiles_per_row: u32,
    },
}

/// A GeoTIFF opened for windowed reads.
///
/// The file handle is held for the lifetime of the value and released on
/// drop. Chunks (strips or tiles) are decoded on demand and cached, so
/// overlapping windows pay the decode cost once. Nodata values are
/// normalized to NaN during decode.
pub struct GeoTiffRaster {
    path: PathBuf,
    decoder: Decoder<BufReader<File>>,
    width: u32,
    height: u32,
    layout: TiffLayout,
    epsg: u32,
    transform: GeoTransform,
    nodata: Option<f32>,
    // chunk index -> decoded pixels, nodata already mapped to NaN
    cache: HashMap<u32, Vec<f32>>,
}

impl GeoTiffRaster {
    /// Open a GeoTIFF and read its georeferencing metadata.
    pub fn open(path: &Path) -> ChipResult<Self> {
        let file = File::open(path).map_err(|e| {
            ChipError::input(format!("cannot open raster {}: {}", path.display(), e))
        })?;
        let mut decoder = Decoder::new(BufReader::new(file))
            .map_err(|e| {
                ChipError::input(format!("{} is not a readable TIFF: {}", path.display(), e))
            })?
            .with_limits(Limits::unlimited());

        let (width, height) = decoder
            .dimensions()
            .map_err(|e| ChipError::input(format!("{}: missing dimensions: {}", path.display(), e)))?;
        let (chunk_width, chunk_height) = decoder.chunk_dimensions();

        let layout = if chunk_width == width {
            TiffLayout::Stripped { chunk_height }
        } else {
            TiffLayout::Tiled {
                tile_width: chunk_width,
                tile_height: chunk_height,
                tiles_per_row: width.div_ceil(chunk_width),
            }
        };

        let epsg = read_epsg(&mut decoder, path)?;
        let transform = read_transform(&mut decoder, path)?;
        let nodata = read_nodata(&mut decoder);

        debug!(
            path = %path.display(),
            width,
            height,
            epsg,
            nodata = ?nodata,
            layout = if chunk_width == width { "stripped" } else { "tiled" },
            "opened geotiff"
        );

        Ok(Self {
            path: path.to_path_buf(),
            decoder,
            width,
            height,
            layout,
            epsg,
            transform,
            nodata,
            cache: HashMap::new(),
        })
    }

    /// Footprint of the raster in its own CRS.
    pub fn footprint(&self) -> Footprint {
        Footprint::new(self.bounds(), self.epsg)
    }

    pub fn transform(&self) -> GeoTransform {
        self.transform
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Decode (or fetch from cache) the chunk containing pixel (col, row)
    /// and return the sample there.
    fn pixel(&mut self, col: u32, row: u32) -> ChipResult<f32> {
        let (chunk_idx, local_row, local_col) = match &self.layout {
            TiffLayout::Stripped { chunk_height } => (row / chunk_height, row % chunk_height, col),
            TiffLayout::Tiled {
                tile_width,
                tile_height,
                tiles_per_row,
            } => {
                let chunk_idx = (row / tile_height) * tiles_per_row + col / tile_width;
                (chunk_idx, row % tile_height, col % tile_width)
            }
        };

        // Edge chunks are cropped, so the stride comes from the chunk itself
        let (chunk_w, _) = self.decoder.chunk_data_dimensions(chunk_idx);

        if !self.cache.contains_key(&chunk_idx) {
            // decode failures after open are per-cell, never fatal
            let result = self.decoder.read_chunk(chunk_idx).map_err(|e| {
                ChipError::extraction(
                    self.path.display().to_string(),
                    format!("failed to decode chunk {}: {}", chunk_idx, e),
                )
            })?;
            let decoded = decode_to_f32(result, self.nodata);
            self.cache.insert(chunk_idx, decoded);
        }

        let chunk = &self.cache[&chunk_idx];
        let idx = local_row as usize * chunk_w as usize + local_col as usize;
        Ok(chunk.get(idx).copied().unwrap_or(f32::NAN))
    }
}

impl RasterSource for GeoTiffRaster {
    fn epsg(&self) -> u32 {
        self.epsg
    }

    fn bounds(&self) -> BoundingBox {
        let t = &self.transform;
        let x0 = t.origin_x;
        let y0 = t.origin_y;
        let x1 = t.origin_x + self.width as f64 * t.pixel_width;
        let y1 = t.origin_y + self.height as f64 * t.pixel_height;
        BoundingBox::new(x0.min(x1), y0.min(y1), x0.max(x1), y0.max(y1))
    }

    fn read_window(&mut self, window: &BoundingBox) -> ChipResult<SourceArray> {
        let t = self.transform;
        let (c0, r0) = t.coord_to_pixel(window.min_x, window.max_y);
        let (c1, r1) = t.coord_to_pixel(window.max_x, window.min_y);

        let col_start = c0.min(c1).floor().max(0.0) as u32;
        let row_start = r0.min(r1).floor().max(0.0) as u32;
        let col_end = ((c0.max(c1).ceil() + 1.0).max(0.0) as u32).min(self.width);
        let row_end = ((r0.max(r1).ceil() + 1.0).max(0.0) as u32).min(self.height);

        if col_start >= col_end || row_start >= row_end {
            return Err(ChipError::input(format!(
                "{}: window {:?} does not intersect raster",
                self.path.display(),
                window
            )));
        }

        let width = (col_end - col_start) as usize;
        let height = (row_end - row_start) as usize;
        let mut data = Vec::with_capacity(width * height);
        for row in row_start..row_end {
            for col in col_start..col_end {
                data.push(self.pixel(col, row)?);
            }
        }

        let transform = GeoTransform::new(
            t.origin_x + col_start as f64 * t.pixel_width,
            t.origin_y + row_start as f64 * t.pixel_height,
            t.pixel_width,
            t.pixel_height,
        );

        Ok(SourceArray::new(data, width, height, self.epsg, transform))
    }
}

/// CRS from the GeoKey directory: projected CS first, geographic fallback.
fn read_epsg(decoder: &mut Decoder<BufReader<File>>, path: &Path) -> ChipResult<u32> {
    let keys: Vec<u16> = decoder
        .find_tag_unsigned_vec(Tag::GeoKeyDirectoryTag)
        .ok()
        .flatten()
        .ok_or_else(|| {
            ChipError::input(format!(
                "{}: missing GeoKeyDirectory, cannot determine CRS",
                path.display()
            ))
        })?;

    let lookup = |key: u16| -> Option<u16> {
        // Entries are 4-short records after the 4-short header
        keys.chunks_exact(4)
            .skip(1)
            .find(|entry| entry[0] == key && entry[1] == 0)
            .map(|entry| entry[3])
    };

    if let Some(code) = lookup(KEY_PROJECTED_CS_TYPE) {
        return Ok(code as u32);
    }
    if let Some(code) = lookup(KEY_GEOGRAPHIC_TYPE) {
        return Ok(code as u32);
    }
    Err(ChipError::input(format!(
        "{}: GeoKeyDirectory carries neither a projected nor a geographic CRS code",
        path.display()
    )))
}

/// Affine transform from ModelPixelScale + ModelTiepoint.
fn read_transform(decoder: &mut Decoder<BufReader<File>>, path: &Path) -> ChipResult<GeoTransform> {
    let scale = decoder
        .get_tag_f64_vec(Tag::ModelPixelScaleTag)
        .map_err(|e| {
            ChipError::input(format!("{}: missing ModelPixelScale: {}", path.display(), e))
        })?;
    let tiepoint = decoder
        .get_tag_f64_vec(Tag::ModelTiepointTag)
        .map_err(|e| {
            ChipError::input(format!("{}: missing ModelTiepoint: {}", path.display(), e))
        })?;

    if scale.len() < 2 || tiepoint.len() < 6 {
        return Err(ChipError::input(format!(
            "{}: malformed georeferencing tags",
            path.display()
        )));
    }

    // Tiepoint maps raster (i, j) to model (x, y); shift back to pixel (0, 0)
    let (i, j, x, y) = (tiepoint[0], tiepoint[1], tiepoint[3], tiepoint[4]);
    let pixel_width = scale[0];
    let pixel_height = -scale[1];
    Ok(GeoTransform::new(
        x - i * pixel_width,
        y - j * pixel_height,
        pixel_width,
        pixel_height,
    ))
}

/// GDAL_NODATA, when present. Absent or unparsable means no nodata.
fn read_nodata(decoder: &mut Decoder<BufReader<File>>) -> Option<f32> {
    let raw = decoder
        .get_tag_ascii_string(Tag::GdalNodata)
        .ok()?;
    raw.trim().trim_end_matches('\0').parse::<f32>().ok()
}

fn decode_to_f32(result: DecodingResult, nodata: Option<f32>) -> Vec<f32> {
    let mut out = match result {
        DecodingResult::U8(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::U16(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::U32(v) => v.into_iter().map(|x| x as f32).collect(),
        DecodingResult::U64(v) => v.into_iter().map(|x| x as f32).collect(),
        DecodingResult::I8(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::I16(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::I32(v) => v.into_iter().map(|x| x as f32).collect(),
        DecodingResult::I64(v) => v.into_iter().map(|x| x as f32).collect(),
        DecodingResult::F32(v) => v,
        DecodingResult::F64(v) => v.into_iter().map(|x| x as f32).collect(),
    };
    if let Some(nd) = nodata {
        for v in out.iter_mut() {
            if *v == nd {
                *v = f32::NAN;
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_is_input_error() {
        let err = match GeoTiffRaster::open(Path::new("/nonexistent/file.tif")) {
            Ok(_) => panic!("open succeeded for a missing file"),
            Err(err) => err,
        };
        assert!(err.is_fatal());
        assert!(err.to_string().contains("cannot open raster"));
    }

    #[test]
    fn test_decode_maps_nodata_to_nan() {
        let decoded = decode_to_f32(DecodingResult::U8(vec![0, 1, 2, 255]), Some(255.0));
        assert_eq!(decoded[0], 0.0);
        assert_eq!(decoded[2], 2.0);
        assert!(decoded[3].is_nan());
    }

    #[test]
    fn test_decode_without_nodata_keeps_values() {
        let decoded = decode_to_f32(DecodingResult::I16(vec![-1, 0, 7]), None);
        assert_eq!(decoded, vec![-1.0, 0.0, 7.0]);
    }
}
