//! Label chipping CLI.
//!
//! Chips a georeferenced label raster against the global grid and packs
//! the result into a zipped Zarr store next to the input's name.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::Parser;
use rayon::prelude::*;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use chip_common::{parse_utc_datetime, ChipResult};
use chip_grid::{Cell, GlobalGrid, GridIndexer};
use chip_raster::{
    Chip, ChipExtractor, ChipFrame, ExtractorConfig, GeoTiffRaster, RasterSource, ResampleMethod,
};
use chip_store::ChipStoreWriter;

#[derive(Parser, Debug)]
#[command(name = "chiplabel")]
#[command(about = "Chip a label raster against the global grid")]
struct Args {
    /// Path to the label raster (GeoTIFF)
    labelpath: PathBuf,

    /// Acquisition datetime of the labels (ISO 8601, UTC)
    date: String,

    /// Output directory for the chip store
    #[arg(long, default_value = ".")]
    outdir: PathBuf,

    /// Minimum fraction of valid pixels for a chip to be kept
    #[arg(long, default_value_t = 0.0)]
    min_valid_fraction: f64,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn init_tracing(log_level: &str) -> Result<()> {
    let level = match log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

/// Extract one chip per cell across a rayon pool.
///
/// Each worker chunk opens its own source handle; decode state is not
/// shared. A cell whose extraction fails is reported in the third tuple
/// slot and the batch continues; only a failed source open aborts.
fn extract_cells<S, F>(
    extractor: &ChipExtractor,
    cells: &[Cell],
    acquired: DateTime<Utc>,
    open: F,
) -> ChipResult<(Vec<Chip>, usize, Vec<(String, String)>)>
where
    S: RasterSource,
    F: Fn() -> ChipResult<S> + Sync,
{
    let chunk_size = cells.len().div_ceil(rayon::current_num_threads()).max(1);
    let outcomes: Vec<Vec<(String, ChipResult<Option<Chip>>)>> = cells
        .par_chunks(chunk_size)
        .map(|chunk| -> ChipResult<Vec<(String, ChipResult<Option<Chip>>)>> {
            let mut source = open()?;
            Ok(chunk
                .iter()
                .map(|cell| {
                    let frame = ChipFrame::from(cell);
                    let outcome = extractor.extract(&frame, &mut source, acquired, "labels");
                    (frame.cell_id, outcome)
                })
                .collect())
        })
        .collect::<ChipResult<_>>()?;

    let mut chips = Vec::new();
    let mut skipped = 0usize;
    let mut failed = Vec::new();
    for (cell_id, outcome) in outcomes.into_iter().flatten() {
        match outcome {
            Ok(Some(chip)) => chips.push(chip),
            Ok(None) => skipped += 1,
            Err(err) => {
                warn!(cell = %cell_id, error = %err, "cell failed");
                failed.push((cell_id, err.to_string()));
            }
        }
    }
    Ok((chips, skipped, failed))
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(&args.log_level)?;

    let acquired = parse_utc_datetime(&args.date)?;

    let raster = GeoTiffRaster::open(&args.labelpath)?;
    let footprint = raster.footprint();
    drop(raster);

    let grid = GlobalGrid::global();
    let indexer = GridIndexer::new(&grid);
    let cells = indexer.cells_for_footprint(&footprint)?;
    info!(
        label = %args.labelpath.display(),
        cells = cells.len(),
        "chipping label raster"
    );

    let extractor = ChipExtractor::new(ExtractorConfig {
        method: ResampleMethod::Nearest,
        min_valid_fraction: args.min_valid_fraction,
        require_nonzero: true,
    });

    let (chips, skipped, failed) = extract_cells(&extractor, &cells, acquired, || {
        GeoTiffRaster::open(&args.labelpath)
    })?;
    if chips.is_empty() {
        bail!(
            "no cells produced a chip ({} skipped, {} failed)",
            skipped,
            failed.len()
        );
    }

    let stem = args
        .labelpath
        .file_stem()
        .context("label path has no file name")?;
    let dest = args.outdir.join(format!("{}.zarr.zip", stem.to_string_lossy()));

    let mut writer = ChipStoreWriter::create(&dest, acquired)?;
    for chip in &chips {
        writer.write_chip(chip)?;
    }

    let written = writer.len();
    let path = writer.finish()?;
    info!(
        output = %path.display(),
        written,
        skipped,
        failed = failed.len(),
        "label chipping complete"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chip_common::{BoundingBox, ChipError, GeoTransform, EPSG_WGS84};
    use chip_grid::Footprint;
    use chip_raster::{MemoryRaster, SourceArray};

    /// Three neighboring cells in one grid row, all in the same zone.
    fn three_cells() -> Vec<Cell> {
        let grid = GlobalGrid::new((9.0, 11.0), (-180.0, -179.0));
        let c = grid.cell_containing(10.0, -179.9).unwrap();
        let w = c.lon_right - c.lon;
        let h = c.lat_top - c.lat;
        let footprint = Footprint::new(
            BoundingBox::new(
                c.lon - 0.5 * w,
                c.lat + 0.25 * h,
                c.lon_right + 0.5 * w,
                c.lat_top - 0.25 * h,
            ),
            EPSG_WGS84,
        );
        let cells = GridIndexer::new(&grid)
            .cells_for_footprint(&footprint)
            .unwrap();
        assert_eq!(cells.len(), 3);
        cells
    }

    fn covering_raster(cells: &[Cell]) -> SourceArray {
        let mut extent = cells[0].bounds;
        for cell in &cells[1..] {
            extent.min_x = extent.min_x.min(cell.bounds.min_x);
            extent.min_y = extent.min_y.min(cell.bounds.min_y);
            extent.max_x = extent.max_x.max(cell.bounds.max_x);
            extent.max_y = extent.max_y.max(cell.bounds.max_y);
        }
        let padded = extent.buffered(100.0);
        let width = (padded.width() / 10.0).ceil() as usize;
        let height = (padded.height() / 10.0).ceil() as usize;
        SourceArray::new(
            vec![1.0; width * height],
            width,
            height,
            cells[0].crs.epsg(),
            GeoTransform::new(padded.min_x, padded.max_y, 10.0, -10.0),
        )
    }

    /// Delegates to an in-memory raster, failing any window that touches
    /// the poisoned area.
    struct CorruptRegionSource {
        inner: MemoryRaster,
        broken: BoundingBox,
    }

    impl RasterSource for CorruptRegionSource {
        fn epsg(&self) -> u32 {
            self.inner.epsg()
        }
        fn bounds(&self) -> BoundingBox {
            self.inner.bounds()
        }
        fn read_window(&mut self, window: &BoundingBox) -> ChipResult<SourceArray> {
            if window.intersects(&self.broken) {
                return Err(ChipError::input("corrupt strip"));
            }
            self.inner.read_window(window)
        }
    }

    #[test]
    fn test_one_bad_cell_does_not_abort_the_batch() {
        let cells = three_cells();
        let array = covering_raster(&cells);
        // Well inside the middle cell, clear of the neighbors' read margins
        let broken = cells[1].bounds.buffered(-100.0);
        let acquired = parse_utc_datetime("2024-06-01").unwrap();
        let extractor = ChipExtractor::new(ExtractorConfig {
            method: ResampleMethod::Nearest,
            min_valid_fraction: 0.0,
            require_nonzero: true,
        });

        let (chips, skipped, failed) = extract_cells(&extractor, &cells, acquired, || {
            Ok(CorruptRegionSource {
                inner: MemoryRaster::new(array.clone()),
                broken,
            })
        })
        .unwrap();

        assert_eq!(skipped, 0);
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].0, cells[1].id);
        assert!(failed[0].1.contains("corrupt strip"));

        let ids: Vec<&str> = chips.iter().map(|c| c.cell_id.as_str()).collect();
        assert_eq!(ids, vec![cells[0].id.as_str(), cells[2].id.as_str()]);
        for chip in &chips {
            assert!((chip.valid_fraction() - 1.0).abs() < 1e-9);
        }
    }
}
