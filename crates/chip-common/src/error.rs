//! Error types for the chipping pipeline.

use thiserror::Error;

/// Result type alias using ChipError.
pub type ChipResult<T> = Result<T, ChipError>;

/// Primary error type for chip generation.
///
/// The first two variants are fatal for a whole run; the per-cell variants
/// carry the cell id so a batch can skip the cell and keep going.
#[derive(Debug, Error)]
pub enum ChipError {
    /// Bad path, unparseable date, unsupported dataset name. Fatal before
    /// any chip work starts.
    #[error("invalid input: {0}")]
    Input(String),

    /// Degenerate footprint, missing CRS, or no intersecting cells. Fatal:
    /// nothing to produce.
    #[error("grid error: {0}")]
    Grid(String),

    /// Per-cell read or reprojection failure. Recovered: the cell is
    /// skipped and the run continues.
    #[error("extraction failed for cell {cell}: {message}")]
    Extraction { cell: String, message: String },

    /// Per-cell external scene lookup or timeout. Retried with backoff,
    /// then recovered as a skip.
    #[error("scene lookup failed for cell {cell}: {message}")]
    SourceFetch { cell: String, message: String },

    /// Archive write or append failure. Scoped to one cell's data; cells
    /// already in the archive remain intact.
    #[error("store error: {0}")]
    Store(String),
}

impl ChipError {
    /// Create an Input error.
    pub fn input(msg: impl Into<String>) -> Self {
        Self::Input(msg.into())
    }

    /// Create a Grid error.
    pub fn grid(msg: impl Into<String>) -> Self {
        Self::Grid(msg.into())
    }

    /// Create an Extraction error scoped to one cell.
    pub fn extraction(cell: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Extraction {
            cell: cell.into(),
            message: msg.into(),
        }
    }

    /// Create a SourceFetch error scoped to one cell.
    pub fn source_fetch(cell: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::SourceFetch {
            cell: cell.into(),
            message: msg.into(),
        }
    }

    /// Create a Store error.
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    /// True when the error is fatal for the whole run rather than one cell.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ChipError::Input(_) | ChipError::Grid(_))
    }
}

impl From<std::io::Error> for ChipError {
    fn from(err: std::io::Error) -> Self {
        ChipError::Store(err.to_string())
    }
}

impl From<serde_json::Error> for ChipError {
    fn from(err: serde_json::Error) -> Self {
        ChipError::Store(format!("JSON error: {}", err))
    }
}
