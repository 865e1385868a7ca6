//! Imagery chipping CLI.
//!
//! Aligns an imagery dataset to an existing label chip store, producing a
//! second store with identical cell geometry.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use chip_align::{
    AlignerConfig, CompositeStrategy, Dataset, LocalSceneLocator, SourceAligner,
};
use chip_store::ChipStore;

#[derive(Parser, Debug)]
#[command(name = "chipdata")]
#[command(about = "Chip imagery to match a label chip store")]
struct Args {
    /// Path to the label chip store (.zarr.zip)
    labelstore: PathBuf,

    /// Imagery dataset: S2L2A, HLS or S1RTC
    dataset: String,

    /// Directory of pre-staged scenes with a scenes.json manifest
    #[arg(long, default_value = "scenes")]
    scenedir: PathBuf,

    /// Output directory for the chip store
    #[arg(long, default_value = ".")]
    outdir: PathBuf,

    /// Maximum percent cloud cover for a candidate scene
    #[arg(long)]
    max_cloud_pct: Option<f64>,

    /// Search tolerance around the label date, in days
    #[arg(long, default_value_t = 7)]
    tolerance_days: i64,

    /// Concurrent cell workers
    #[arg(long, default_value_t = 4)]
    concurrency: usize,

    /// Scene strategy: best (single best scene) or all (mosaic)
    #[arg(long, default_value = "best")]
    strategy: String,

    /// Minimum fraction of valid pixels for a chip to be kept
    #[arg(long, default_value_t = 0.0)]
    min_valid_fraction: f64,

    /// Per-fetch timeout in seconds
    #[arg(long, default_value_t = 120)]
    fetch_timeout_secs: u64,

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

/// `labels.zarr.zip` -> `labels`.
fn store_stem(path: &std::path::Path) -> Option<String> {
    let name = path.file_name()?.to_string_lossy();
    let stem = name
        .strip_suffix(".zarr.zip")
        .map(str::to_string)
        .unwrap_or_else(|| {
            path.file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| name.into_owned())
        });
    Some(stem)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(&args.log_level)?;

    let dataset: Dataset = args.dataset.parse()?;
    let strategy = match args.strategy.to_lowercase().as_str() {
        "best" => CompositeStrategy::Best,
        "all" => CompositeStrategy::All,
        other => bail!("unknown strategy {:?}, expected best or all", other),
    };

    let labels = ChipStore::open(&args.labelstore)?;
    info!(
        labels = %args.labelstore.display(),
        cells = labels.len(),
        dataset = %dataset,
        "aligning imagery to label store"
    );

    let locator = Arc::new(LocalSceneLocator::open(&args.scenedir)?);
    let config = AlignerConfig {
        concurrency: args.concurrency,
        tolerance_days: args.tolerance_days,
        max_cloud_pct: args.max_cloud_pct,
        strategy,
        min_valid_fraction: args.min_valid_fraction,
        fetch_timeout: Duration::from_secs(args.fetch_timeout_secs),
        ..AlignerConfig::default()
    };

    let stem = store_stem(&args.labelstore).context("label store path has no file name")?;
    let output = args.outdir.join(format!("{}_{}.zarr.zip", stem, dataset));

    let aligner = SourceAligner::new(locator, config);
    let summary = aligner.run(&labels, dataset, &output).await?;

    info!(
        output = %summary.output.display(),
        written = summary.written,
        skipped = summary.skipped.len(),
        failed = summary.failed.len(),
        "imagery chipping complete"
    );
    for (cell, reason) in &summary.skipped {
        info!(cell = %cell, reason = %reason, "skipped");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_invocation_parses() {
        let args = Args::try_parse_from(["chipdata", "labels.zarr.zip", "S2L2A"]).unwrap();
        assert_eq!(args.scenedir, PathBuf::from("scenes"));
        assert_eq!(args.outdir, PathBuf::from("."));
        assert_eq!(args.concurrency, 4);
    }

    #[test]
    fn test_store_stem_strips_archive_suffix() {
        let stem = store_stem(std::path::Path::new("/data/labels.zarr.zip")).unwrap();
        assert_eq!(stem, "labels");
    }
}
