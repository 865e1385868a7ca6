//! End-to-end alignment runs against an in-memory scene source.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};

use chip_align::{
    AlignerConfig, CompositeStrategy, Dataset, SceneLocator, SceneMeta, SourceAligner,
};
use chip_common::{BoundingBox, ChipError, ChipResult, GeoTransform, TimeWindow, EPSG_WGS84};
use chip_grid::{Footprint, GlobalGrid, GridIndexer};
use chip_raster::{ChipFrame, SourceArray};
use chip_store::{ChipStore, ChipStoreWriter};
use projection::UtmProjection;
use test_utils::{fixtures::aoi, label_chip, test_acquired};

fn label_footprint() -> BoundingBox {
    let (min_lon, min_lat, max_lon, max_lat) = aoi::ITALY_SMALL;
    BoundingBox::new(min_lon, min_lat, max_lon, max_lat)
}

/// Build a label store covering the test footprint and return its path.
fn build_label_store(dir: &Path) -> (std::path::PathBuf, usize) {
    let grid = GlobalGrid::new((39.0, 42.0), (9.0, 12.0));
    let indexer = GridIndexer::new(&grid);
    let cells = indexer
        .cells_for_footprint(&Footprint::new(label_footprint(), EPSG_WGS84))
        .unwrap();

    let dest = dir.join("labels.zarr.zip");
    let mut writer = ChipStoreWriter::create(&dest, test_acquired()).unwrap();
    for cell in &cells {
        writer
            .write_chip(&label_chip(&ChipFrame::from(cell), 1.0))
            .unwrap();
    }
    let count = cells.len();
    (writer.finish().unwrap(), count)
}

/// Scene source serving constant-valued geographic rasters.
struct MemoryLocator {
    scenes: Vec<SceneMeta>,
    resolution_deg: f64,
}

impl MemoryLocator {
    fn band_value(band: &str) -> f32 {
        match band {
            "vv" => 0.5,
            "vh" => 0.25,
            _ => 1.0,
        }
    }
}

#[async_trait]
impl SceneLocator for MemoryLocator {
    async fn search(&self, roi: &BoundingBox, window: &TimeWindow) -> ChipResult<Vec<SceneMeta>> {
        Ok(self
            .scenes
            .iter()
            .filter(|s| window.contains(s.acquired) && s.footprint.intersects(roi))
            .cloned()
            .collect())
    }

    async fn fetch_band(
        &self,
        scene: &SceneMeta,
        band: &str,
        roi: &BoundingBox,
    ) -> ChipResult<SourceArray> {
        // Serve only the windowed part of the scene, like a real reader would
        let window = roi
            .buffered(4.0 * self.resolution_deg)
            .intersection(&scene.footprint)
            .ok_or_else(|| ChipError::source_fetch(&scene.id, "roi outside scene"))?;
        let width = (window.width() / self.resolution_deg).ceil() as usize;
        let height = (window.height() / self.resolution_deg).ceil() as usize;
        Ok(SourceArray::new(
            vec![Self::band_value(band); width * height],
            width,
            height,
            EPSG_WGS84,
            GeoTransform::new(
                window.min_x,
                window.max_y,
                self.resolution_deg,
                -self.resolution_deg,
            ),
        ))
    }
}

/// Fails the first `failures` fetches, then delegates.
struct FlakyLocator {
    inner: MemoryLocator,
    failures: AtomicUsize,
}

#[async_trait]
impl SceneLocator for FlakyLocator {
    async fn search(&self, roi: &BoundingBox, window: &TimeWindow) -> ChipResult<Vec<SceneMeta>> {
        self.inner.search(roi, window).await
    }

    async fn fetch_band(
        &self,
        scene: &SceneMeta,
        band: &str,
        roi: &BoundingBox,
    ) -> ChipResult<SourceArray> {
        if self.failures.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
            if n > 0 {
                Some(n - 1)
            } else {
                None
            }
        })
        .is_ok()
        {
            return Err(ChipError::source_fetch(&scene.id, "transient failure"));
        }
        self.inner.fetch_band(scene, band, roi).await
    }
}

/// Panics on any fetch whose ROI touches the broken area, so the worker
/// task for that cell is lost mid-flight.
struct CrashingLocator {
    inner: MemoryLocator,
    broken: BoundingBox,
}

#[async_trait]
impl SceneLocator for CrashingLocator {
    async fn search(&self, roi: &BoundingBox, window: &TimeWindow) -> ChipResult<Vec<SceneMeta>> {
        self.inner.search(roi, window).await
    }

    async fn fetch_band(
        &self,
        scene: &SceneMeta,
        band: &str,
        roi: &BoundingBox,
    ) -> ChipResult<SourceArray> {
        if roi.intersects(&self.broken) {
            panic!("simulated decoder crash");
        }
        self.inner.fetch_band(scene, band, roi).await
    }
}

fn scene(id: &str, footprint: BoundingBox) -> SceneMeta {
    SceneMeta {
        id: id.to_string(),
        acquired: Utc.with_ymd_and_hms(2024, 6, 3, 10, 0, 0).unwrap(),
        footprint,
        cloud_pct: None,
    }
}

fn fast_config() -> AlignerConfig {
    AlignerConfig {
        concurrency: 4,
        max_retries: 3,
        initial_retry_delay: Duration::from_millis(1),
        max_retry_delay: Duration::from_millis(10),
        fetch_timeout: Duration::from_secs(10),
        tolerance_days: 7,
        max_cloud_pct: None,
        strategy: CompositeStrategy::Best,
        min_valid_fraction: 0.0,
    }
}

/// Recompute a frame's geographic extent the way the aligner sees it.
fn frame_roi(frame: &ChipFrame) -> BoundingBox {
    let proj = UtmProjection::for_epsg(frame.epsg).unwrap();
    let b = &frame.bounds;
    let corners = [
        (b.min_x, b.min_y),
        (b.min_x, b.max_y),
        (b.max_x, b.min_y),
        (b.max_x, b.max_y),
    ];
    let mut out = BoundingBox::new(f64::MAX, f64::MAX, f64::MIN, f64::MIN);
    for (e, n) in corners {
        let (lat, lon) = proj.inverse(e, n);
        out.min_x = out.min_x.min(lon);
        out.min_y = out.min_y.min(lat);
        out.max_x = out.max_x.max(lon);
        out.max_y = out.max_y.max(lat);
    }
    out
}

#[tokio::test]
async fn partial_scene_coverage_writes_covered_cells_and_skips_the_rest() {
    let dir = tempfile::tempdir().unwrap();
    let (label_path, total) = build_label_store(dir.path());
    let labels = ChipStore::open(&label_path).unwrap();
    assert_eq!(labels.len(), total);
    assert!(total >= 4, "expected a multi-cell footprint, got {}", total);

    // Scene covers the western part of the footprint only
    let scene_bbox = BoundingBox::new(10.0, 40.0, 10.245, 41.0);
    let locator = Arc::new(MemoryLocator {
        scenes: vec![scene("west", scene_bbox)],
        resolution_deg: 0.0001,
    });

    let aligner = SourceAligner::new(locator, fast_config());
    let output = dir.path().join("labels_S1RTC.zarr.zip");
    let summary = aligner
        .run(&labels, Dataset::S1Rtc, &output)
        .await
        .unwrap();

    assert_eq!(summary.total_cells, total);
    assert_eq!(
        summary.written + summary.skipped.len() + summary.failed.len(),
        total
    );
    assert!(summary.failed.is_empty(), "failures: {:?}", summary.failed);
    assert!(summary.written >= 1);
    assert!(!summary.skipped.is_empty());

    // Cells comfortably inside the scene must be written, cells comfortably
    // outside must be skipped.
    let margin = 0.005;
    let inside = BoundingBox::new(
        scene_bbox.min_x + margin,
        scene_bbox.min_y + margin,
        scene_bbox.max_x - margin,
        scene_bbox.max_y - margin,
    );
    let outside = BoundingBox::new(
        scene_bbox.min_x - margin,
        scene_bbox.min_y - margin,
        scene_bbox.max_x + margin,
        scene_bbox.max_y + margin,
    );

    let data = ChipStore::open(&summary.output).unwrap();
    assert_eq!(data.len(), summary.written);
    for id in labels.cell_ids() {
        let roi = frame_roi(&labels.frame(&id).unwrap());
        if roi.intersects(&inside) {
            assert!(data.record(&id).is_some(), "cell {} should be written", id);
        } else if !roi.intersects(&outside) {
            assert!(
                summary.skipped.iter().any(|(c, _)| c == &id),
                "cell {} should be skipped",
                id
            );
        }
    }

    // Written chips carry both radar bands in table order
    let sample_id = data.cell_ids()[0].clone();
    let chip = data.read_chip(&sample_id).unwrap();
    assert_eq!(chip.bands, vec!["vv", "vh"]);
    let vv = chip.band("vv").unwrap();
    assert!(vv.iter().any(|v| (*v - 0.5).abs() < 1e-4));
}

#[tokio::test]
async fn transient_fetch_failures_are_retried() {
    let dir = tempfile::tempdir().unwrap();
    let (label_path, _) = build_label_store(dir.path());
    let labels = ChipStore::open(&label_path).unwrap();

    // Scene covers everything; the first two fetches fail
    let locator = Arc::new(FlakyLocator {
        inner: MemoryLocator {
            scenes: vec![scene("full", BoundingBox::new(10.0, 40.0, 11.0, 41.0))],
            resolution_deg: 0.0001,
        },
        failures: AtomicUsize::new(2),
    });

    let aligner = SourceAligner::new(locator, fast_config());
    let output = dir.path().join("labels_S1RTC.zarr.zip");
    let summary = aligner
        .run(&labels, Dataset::S1Rtc, &output)
        .await
        .unwrap();

    assert_eq!(summary.written, summary.total_cells);
    assert!(summary.skipped.is_empty());
    assert!(summary.failed.is_empty());
}

#[tokio::test]
async fn lost_worker_fails_one_cell_and_the_run_continues() {
    let dir = tempfile::tempdir().unwrap();
    let (label_path, total) = build_label_store(dir.path());
    let labels = ChipStore::open(&label_path).unwrap();
    assert!(total >= 2);

    // Crash only the fetches for the first cell
    let victim = labels.cell_ids()[0].clone();
    let roi = frame_roi(&labels.frame(&victim).unwrap());
    let cx = (roi.min_x + roi.max_x) / 2.0;
    let cy = (roi.min_y + roi.max_y) / 2.0;
    let locator = Arc::new(CrashingLocator {
        inner: MemoryLocator {
            scenes: vec![scene("full", BoundingBox::new(10.0, 40.0, 11.0, 41.0))],
            resolution_deg: 0.0001,
        },
        broken: BoundingBox::new(cx - 1e-4, cy - 1e-4, cx + 1e-4, cy + 1e-4),
    });

    let aligner = SourceAligner::new(locator, fast_config());
    let output = dir.path().join("labels_S1RTC.zarr.zip");
    let summary = aligner
        .run(&labels, Dataset::S1Rtc, &output)
        .await
        .unwrap();

    assert_eq!(summary.written, total - 1);
    assert!(summary.skipped.is_empty());
    assert_eq!(summary.failed.len(), 1);
    assert_eq!(summary.failed[0].0, victim);
    assert!(summary.failed[0].1.contains("worker panicked"));

    // The surviving cells are intact in the packed store
    let data = ChipStore::open(&summary.output).unwrap();
    assert_eq!(data.len(), total - 1);
    assert!(data.record(&victim).is_none());
}

#[tokio::test]
async fn no_matching_scenes_fails_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let (label_path, _) = build_label_store(dir.path());
    let labels = ChipStore::open(&label_path).unwrap();

    let locator = Arc::new(MemoryLocator {
        scenes: vec![scene("elsewhere", BoundingBox::new(50.0, 40.0, 51.0, 41.0))],
        resolution_deg: 0.0001,
    });

    let aligner = SourceAligner::new(locator, fast_config());
    let output = dir.path().join("labels_S1RTC.zarr.zip");
    let err = aligner
        .run(&labels, Dataset::S1Rtc, &output)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("no cells produced"));
    assert!(!output.exists());
}
