//! Stage-two chipping: align imagery to an existing label chip store.
//!
//! Given a label store, a dataset and a scene source, the aligner produces
//! a second store with identical cell geometry whose chips hold imagery
//! instead of labels. Scene fetches run on a bounded worker pool with
//! retry and timeout; writes funnel through a single store writer.

pub mod aligner;
pub mod composite;
pub mod dataset;
pub mod locator;
pub mod scene;

pub use aligner::{AlignerConfig, RunSummary, SourceAligner};
pub use composite::CompositeStrategy;
pub use dataset::Dataset;
pub use locator::LocalSceneLocator;
pub use scene::{SceneLocator, SceneMeta};
