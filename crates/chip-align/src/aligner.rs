//! The alignment run: bounded workers, retrying fetches, one writer.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use chip_common::{BoundingBox, ChipError, ChipResult, TimeWindow, EPSG_WGS84};
use chip_grid::CHIP_SIZE;
use chip_raster::{reproject_to_frame, Chip, ChipExtractor, ChipFrame, ExtractorConfig};
use chip_store::{ChipStore, ChipStoreWriter};
use projection::UtmProjection;

use crate::composite::{merge_plane, rank_scenes, CompositeStrategy};
use crate::dataset::Dataset;
use crate::scene::{SceneLocator, SceneMeta};

/// Tuning for an alignment run.
#[derive(Debug, Clone)]
pub struct AlignerConfig {
    /// Concurrent cell workers.
    pub concurrency: usize,
    pub max_retries: u32,
    /// Doubles on each retry, capped at `max_retry_delay`.
    pub initial_retry_delay: Duration,
    pub max_retry_delay: Duration,
    /// Per-fetch deadline; an elapsed timeout counts as a fetch failure.
    pub fetch_timeout: Duration,
    /// Search window half-width around the label acquisition date.
    pub tolerance_days: i64,
    pub max_cloud_pct: Option<f64>,
    pub strategy: CompositeStrategy,
    pub min_valid_fraction: f64,
}

impl Default for AlignerConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            max_retries: 3,
            initial_retry_delay: Duration::from_secs(1),
            max_retry_delay: Duration::from_secs(30),
            fetch_timeout: Duration::from_secs(120),
            tolerance_days: 7,
            max_cloud_pct: None,
            strategy: CompositeStrategy::Best,
            min_valid_fraction: 0.0,
        }
    }
}

/// What happened across one run.
#[derive(Debug)]
pub struct RunSummary {
    pub output: PathBuf,
    pub total_cells: usize,
    pub written: usize,
    /// Cells skipped by policy, with the reason.
    pub skipped: Vec<(String, String)>,
    /// Cells that failed with an extraction error.
    pub failed: Vec<(String, String)>,
}

enum Outcome {
    Written(Box<Chip>),
    Skipped(String),
    Failed(ChipError),
}

/// Produces an imagery store aligned to a label store.
pub struct SourceAligner {
    locator: Arc<dyn SceneLocator>,
    config: AlignerConfig,
}

impl SourceAligner {
    pub fn new(locator: Arc<dyn SceneLocator>, config: AlignerConfig) -> Self {
        Self { locator, config }
    }

    /// Chip `dataset` imagery for every cell of `labels` into `output`.
    ///
    /// Cells are processed on a bounded worker pool; completed chips are
    /// appended by this task in label-store order, so output is
    /// deterministic for a given set of fetch results.
    pub async fn run(
        &self,
        labels: &ChipStore,
        dataset: Dataset,
        output: &Path,
    ) -> ChipResult<RunSummary> {
        let acquired = labels.acquired();
        let window = TimeWindow {
            start: acquired - chrono::Duration::days(self.config.tolerance_days),
            end: acquired + chrono::Duration::days(self.config.tolerance_days),
        };

        // One ROI per cell, plus their union for the scene search
        let mut cells: Vec<(ChipFrame, BoundingBox)> = Vec::with_capacity(labels.len());
        let mut union: Option<BoundingBox> = None;
        for record in labels.records() {
            let frame = record.frame();
            let roi = geographic_roi(&frame)?;
            union = Some(match union {
                None => roi,
                Some(u) => BoundingBox::new(
                    u.min_x.min(roi.min_x),
                    u.min_y.min(roi.min_y),
                    u.max_x.max(roi.max_x),
                    u.max_y.max(roi.max_y),
                ),
            });
            cells.push((frame, roi));
        }
        let union = union.ok_or_else(|| ChipError::input("label store has no cells"))?;

        let scenes = Arc::new(self.locator.search(&union, &window).await?);
        info!(
            dataset = %dataset,
            cells = cells.len(),
            scenes = scenes.len(),
            window_start = %window.start,
            window_end = %window.end,
            "starting alignment run"
        );

        let mut writer = ChipStoreWriter::create(output, acquired)?;
        writer.seed_cells(labels.records().to_vec());

        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let mut handles = Vec::with_capacity(cells.len());

        for (frame, roi) in cells {
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| ChipError::extraction(&frame.cell_id, e.to_string()))?;
            let locator = self.locator.clone();
            let config = self.config.clone();
            let scenes = Arc::clone(&scenes);

            let cell_id = frame.cell_id.clone();
            let handle = tokio::spawn(async move {
                let outcome = process_cell(locator, config, dataset, frame, roi, scenes).await;
                drop(permit);
                outcome
            });
            handles.push((cell_id, handle));
        }

        let total_cells = handles.len();
        let mut summary = RunSummary {
            output: output.to_path_buf(),
            total_cells,
            written: 0,
            skipped: Vec::new(),
            failed: Vec::new(),
        };

        for (cell_id, handle) in handles {
            // A lost worker or failed append spoils one cell, not the run;
            // cells already in the store stay intact.
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(e) => Outcome::Failed(ChipError::extraction(
                    &cell_id,
                    format!("worker panicked: {}", e),
                )),
            };
            match outcome {
                Outcome::Written(chip) => match writer.append_chip(&chip) {
                    Ok(()) => summary.written += 1,
                    Err(err) => {
                        warn!(cell = %cell_id, error = %err, "append failed");
                        summary.failed.push((cell_id, err.to_string()));
                    }
                },
                Outcome::Skipped(reason) => {
                    debug!(cell = %cell_id, reason = %reason, "cell skipped");
                    summary.skipped.push((cell_id, reason));
                }
                Outcome::Failed(err) => {
                    warn!(cell = %cell_id, error = %err, "cell failed");
                    summary.failed.push((cell_id, err.to_string()));
                }
            }
        }

        if summary.written == 0 {
            return Err(ChipError::extraction(
                "<run>",
                "no cells produced a data chip",
            ));
        }
        summary.output = writer.finish()?;

        info!(
            written = summary.written,
            skipped = summary.skipped.len(),
            failed = summary.failed.len(),
            "alignment run complete"
        );
        Ok(summary)
    }
}

async fn process_cell(
    locator: Arc<dyn SceneLocator>,
    config: AlignerConfig,
    dataset: Dataset,
    frame: ChipFrame,
    roi: BoundingBox,
    scenes: Arc<Vec<SceneMeta>>,
) -> Outcome {
    let cloud_limit = if dataset.cloud_aware() {
        config.max_cloud_pct
    } else {
        None
    };
    let ranked = rank_scenes(&scenes, &roi, cloud_limit);
    if ranked.is_empty() {
        return Outcome::Skipped("no candidate scenes".to_string());
    }
    let scene_limit = match config.strategy {
        CompositeStrategy::Best => 1,
        CompositeStrategy::All => ranked.len(),
    };
    let candidates = &ranked[..scene_limit.min(ranked.len())];

    let plane_len = CHIP_SIZE * CHIP_SIZE;
    let mut planes: Vec<Vec<f32>> = Vec::with_capacity(dataset.bands().len());
    let mut chip_time: Option<DateTime<Utc>> = None;

    for band in dataset.bands() {
        let mut plane = vec![f32::NAN; plane_len];

        for scene in candidates {
            let array = match fetch_with_retry(&*locator, &config, &frame.cell_id, scene, band, &roi)
                .await
            {
                Ok(array) => array,
                Err(err) => {
                    warn!(
                        cell = %frame.cell_id,
                        scene = %scene.id,
                        band = %band,
                        error = %err,
                        "scene fetch exhausted retries"
                    );
                    continue;
                }
            };

            let resampled = match reproject_to_frame(&frame, &array, dataset.resample()) {
                Ok(resampled) => resampled,
                Err(err) => return Outcome::Failed(err),
            };
            let gaps = merge_plane(&mut plane, &resampled);
            chip_time.get_or_insert(scene.acquired);
            if gaps == 0 {
                break;
            }
        }
        planes.push(plane);
    }

    let Some(acquired) = chip_time else {
        return Outcome::Skipped("all scene fetches failed".to_string());
    };

    let extractor = ChipExtractor::new(ExtractorConfig {
        method: dataset.resample(),
        min_valid_fraction: config.min_valid_fraction,
        require_nonzero: false,
    });
    let bands = dataset.bands().iter().map(|b| b.to_string()).collect();
    match extractor.assemble(&frame, acquired, bands, planes) {
        Ok(Some(chip)) => Outcome::Written(Box::new(chip)),
        Ok(None) => Outcome::Skipped("below valid-pixel threshold".to_string()),
        Err(err) => Outcome::Failed(err),
    }
}

/// Fetch one (scene, band) with timeout and capped exponential backoff.
async fn fetch_with_retry(
    locator: &dyn SceneLocator,
    config: &AlignerConfig,
    cell_id: &str,
    scene: &SceneMeta,
    band: &str,
    roi: &BoundingBox,
) -> ChipResult<chip_raster::SourceArray> {
    let mut attempt = 0;
    let mut delay = config.initial_retry_delay;

    loop {
        let result = tokio::time::timeout(config.fetch_timeout, locator.fetch_band(scene, band, roi))
            .await
            .unwrap_or_else(|_| {
                Err(ChipError::source_fetch(
                    cell_id,
                    format!("fetch of {} band {} timed out", scene.id, band),
                ))
            });

        match result {
            Ok(array) => return Ok(array),
            Err(err) => {
                attempt += 1;
                if attempt > config.max_retries {
                    return Err(err);
                }
                warn!(
                    cell = %cell_id,
                    scene = %scene.id,
                    band = %band,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "fetch failed, retrying"
                );
                tokio::time::sleep(delay).await;
                delay = std::cmp::min(delay * 2, config.max_retry_delay);
            }
        }
    }
}

/// A frame's bounds in EPSG:4326, via its four corners.
fn geographic_roi(frame: &ChipFrame) -> ChipResult<BoundingBox> {
    if frame.epsg == EPSG_WGS84 {
        return Ok(frame.bounds);
    }
    let proj = UtmProjection::for_epsg(frame.epsg)?;
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
    Ok(out)
}
