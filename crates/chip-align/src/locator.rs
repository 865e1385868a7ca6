//! Scene discovery over a local directory of GeoTIFF scenes.
//!
//! The directory carries a `scenes.json` manifest describing each scene's
//! footprint, acquisition time and per-band file paths. This is the
//! locator used for pre-staged scene collections; remote catalogs plug in
//! through the same [`SceneLocator`] trait.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use chip_common::{BoundingBox, ChipError, ChipResult, TimeWindow, EPSG_WGS84};
use chip_raster::{GeoTiffRaster, RasterSource, SourceArray};
use projection::UtmProjection;

use crate::scene::{SceneLocator, SceneMeta};

pub const MANIFEST_FILE: &str = "scenes.json";

#[derive(Debug, Deserialize)]
struct ManifestEntry {
    id: String,
    acquired: chrono::DateTime<chrono::Utc>,
    /// `[min_lon, min_lat, max_lon, max_lat]`.
    footprint: [f64; 4],
    #[serde(default)]
    cloud_pct: Option<f64>,
    /// Band name to file path, relative to the scene directory.
    bands: HashMap<String, PathBuf>,
}

/// Locator backed by GeoTIFFs on the local filesystem.
pub struct LocalSceneLocator {
    root: PathBuf,
    entries: Vec<ManifestEntry>,
}

impl LocalSceneLocator {
    /// Load the manifest from `root/scenes.json`.
    pub fn open(root: &Path) -> ChipResult<Self> {
        let manifest = root.join(MANIFEST_FILE);
        let raw = std::fs::read_to_string(&manifest).map_err(|e| {
            ChipError::input(format!("cannot read {}: {}", manifest.display(), e))
        })?;
        let entries: Vec<ManifestEntry> = serde_json::from_str(&raw)
            .map_err(|e| ChipError::input(format!("malformed {}: {}", manifest.display(), e)))?;

        debug!(root = %root.display(), scenes = entries.len(), "loaded scene manifest");
        Ok(Self {
            root: root.to_path_buf(),
            entries,
        })
    }

    fn band_path(&self, scene_id: &str, band: &str) -> Option<PathBuf> {
        self.entries
            .iter()
            .find(|e| e.id == scene_id)
            .and_then(|e| e.bands.get(band))
            .map(|rel| self.root.join(rel))
    }
}

#[async_trait]
impl SceneLocator for LocalSceneLocator {
    async fn search(&self, roi: &BoundingBox, window: &TimeWindow) -> ChipResult<Vec<SceneMeta>> {
        let scenes = self
            .entries
            .iter()
            .filter(|e| window.contains(e.acquired))
            .map(|e| SceneMeta {
                id: e.id.clone(),
                acquired: e.acquired,
                footprint: BoundingBox::from_array(e.footprint),
                cloud_pct: e.cloud_pct,
            })
            .filter(|s| s.footprint.intersects(roi))
            .collect();
        Ok(scenes)
    }

    async fn fetch_band(
        &self,
        scene: &SceneMeta,
        band: &str,
        roi: &BoundingBox,
    ) -> ChipResult<SourceArray> {
        let path = self.band_path(&scene.id, band).ok_or_else(|| {
            ChipError::source_fetch(
                &scene.id,
                format!("scene has no file for band {}", band),
            )
        })?;
        let roi = *roi;
        let scene_id = scene.id.clone();

        // TIFF decode is blocking work
        tokio::task::spawn_blocking(move || {
            let mut raster = GeoTiffRaster::open(&path)
                .map_err(|e| ChipError::source_fetch(&scene_id, e.to_string()))?;
            let window = roi_in_crs(&roi, raster.epsg())?;
            raster
                .read_window(&window)
                .map_err(|e| ChipError::source_fetch(&scene_id, e.to_string()))
        })
        .await
        .map_err(|e| ChipError::source_fetch(&scene.id, format!("fetch task failed: {}", e)))?
    }
}

/// Express a geographic ROI in the raster's CRS.
fn roi_in_crs(roi: &BoundingBox, epsg: u32) -> ChipResult<BoundingBox> {
    if epsg == EPSG_WGS84 {
        return Ok(*roi);
    }
    let proj = UtmProjection::for_epsg(epsg)?;
    let corners = [
        (roi.min_x, roi.min_y),
        (roi.min_x, roi.max_y),
        (roi.max_x, roi.min_y),
        (roi.max_x, roi.max_y),
    ];
    let mut out = BoundingBox::new(f64::MAX, f64::MAX, f64::MIN, f64::MIN);
    for (lon, lat) in corners {
        let (e, n) = proj.forward(lat, lon);
        out.min_x = out.min_x.min(e);
        out.min_y = out.min_y.min(n);
        out.max_x = out.max_x.max(e);
        out.max_y = out.max_y.max(n);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn write_manifest(dir: &Path, body: &str) {
        std::fs::write(dir.join(MANIFEST_FILE), body).unwrap();
    }

    #[tokio::test]
    async fn test_search_filters_time_and_roi() {
        let dir = tempfile::tempdir().unwrap();
        write_manifest(
            dir.path(),
            r#"[
                {"id": "in", "acquired": "2024-06-01T10:00:00Z",
                 "footprint": [10.0, 40.0, 11.0, 41.0], "bands": {"vv": "in_vv.tif"}},
                {"id": "late", "acquired": "2024-08-01T10:00:00Z",
                 "footprint": [10.0, 40.0, 11.0, 41.0], "bands": {"vv": "late_vv.tif"}},
                {"id": "far", "acquired": "2024-06-01T10:00:00Z",
                 "footprint": [50.0, 40.0, 51.0, 41.0], "bands": {"vv": "far_vv.tif"}}
            ]"#,
        );

        let locator = LocalSceneLocator::open(dir.path()).unwrap();
        let center = Utc.with_ymd_and_hms(2024, 6, 3, 0, 0, 0).unwrap();
        let window = TimeWindow {
            start: center - Duration::days(7),
            end: center + Duration::days(7),
        };
        let roi = BoundingBox::new(10.2, 40.2, 10.4, 40.4);

        let scenes = locator.search(&roi, &window).await.unwrap();
        assert_eq!(scenes.len(), 1);
        assert_eq!(scenes[0].id, "in");
    }

    #[tokio::test]
    async fn test_missing_band_is_fetch_error() {
        let dir = tempfile::tempdir().unwrap();
        write_manifest(
            dir.path(),
            r#"[{"id": "s1", "acquired": "2024-06-01T10:00:00Z",
                 "footprint": [10.0, 40.0, 11.0, 41.0], "bands": {"vv": "s1_vv.tif"}}]"#,
        );
        let locator = LocalSceneLocator::open(dir.path()).unwrap();
        let scene = SceneMeta {
            id: "s1".to_string(),
            acquired: Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap(),
            footprint: BoundingBox::new(10.0, 40.0, 11.0, 41.0),
            cloud_pct: None,
        };
        let roi = BoundingBox::new(10.2, 40.2, 10.4, 40.4);

        let err = locator.fetch_band(&scene, "vh", &roi).await.unwrap_err();
        assert!(!err.is_fatal());
        assert!(err.to_string().contains("no file for band"));
    }

    #[test]
    fn test_missing_manifest_is_input_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = match LocalSceneLocator::open(dir.path()) {
            Ok(_) => panic!("open succeeded without a manifest"),
            Err(err) => err,
        };
        assert!(err.is_fatal());
    }
}
