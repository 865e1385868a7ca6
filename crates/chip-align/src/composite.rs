//! Scene ranking and gap-filled mosaics.

use chip_common::BoundingBox;

use crate::scene::SceneMeta;

/// How scenes are combined when several candidates cover a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompositeStrategy {
    /// Use the single best-ranked scene.
    Best,
    /// Mosaic scenes in rank order, filling gaps left by earlier ones.
    All,
}

/// Rank candidate scenes for one cell.
///
/// Scenes that miss the cell or exceed the cloud threshold are dropped;
/// the rest sort by descending ROI coverage, acquisition time breaking
/// ties in favor of the earliest scene.
pub fn rank_scenes(
    scenes: &[SceneMeta],
    roi: &BoundingBox,
    max_cloud_pct: Option<f64>,
) -> Vec<SceneMeta> {
    let mut candidates: Vec<(f64, SceneMeta)> = scenes
        .iter()
        .filter(|s| s.footprint.intersects(roi))
        .filter(|s| match (max_cloud_pct, s.cloud_pct) {
            (Some(max), Some(cloud)) => cloud <= max,
            _ => true,
        })
        .map(|s| (roi.coverage_by(&s.footprint), s.clone()))
        .collect();

    candidates.sort_by(|(cov_a, a), (cov_b, b)| {
        cov_b
            .partial_cmp(cov_a)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.acquired.cmp(&b.acquired))
    });

    candidates.into_iter().map(|(_, s)| s).collect()
}

/// Fill NaN gaps in `base` from `addition`. Returns the number of pixels
/// still missing afterwards.
pub fn merge_plane(base: &mut [f32], addition: &[f32]) -> usize {
    debug_assert_eq!(base.len(), addition.len());
    let mut gaps = 0;
    for (b, a) in base.iter_mut().zip(addition) {
        if b.is_nan() {
            *b = *a;
        }
        if b.is_nan() {
            gaps += 1;
        }
    }
    gaps
}
