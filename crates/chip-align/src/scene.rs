//! Scene metadata and the locator seam.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use chip_common::{BoundingBox, ChipResult, TimeWindow};
use chip_raster::SourceArray;

/// One candidate scene from a search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneMeta {
    pub id: String,
    pub acquired: DateTime<Utc>,
    /// Geographic footprint (EPSG:4326).
    pub footprint: BoundingBox,
    /// Cloud cover percentage, absent for radar.
    #[serde(default)]
    pub cloud_pct: Option<f64>,
}

/// Finds scenes and fetches their band data.
///
/// Implementations are shared across worker tasks, so they take `&self`
/// and must be `Send + Sync`. Fetch failures are reported as
/// [`ChipError::SourceFetch`](chip_common::ChipError) and are retried by
/// the caller.
#[async_trait]
pub trait SceneLocator: Send + Sync {
    /// Scenes intersecting `roi` (EPSG:4326) within the time window.
    async fn search(&self, roi: &BoundingBox, window: &TimeWindow) -> ChipResult<Vec<SceneMeta>>;

    /// Fetch one band of one scene, windowed to the geographic `roi`.
    async fn fetch_band(
        &self,
        scene: &SceneMeta,
        band: &str,
        roi: &BoundingBox,
    ) -> ChipResult<SourceArray>;
}
