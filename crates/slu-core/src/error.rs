use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while loading data or running the intent model.
#[derive(Debug, Error)]
pub enum SluError {
    /// A data or vocabulary file could not be read or written.
    #[error("I/O error on {path:?}: {source}")]
    Io {
        /// The file the operation was performed on.
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The input, slot and intent files of a split disagree on line count.
    #[error("data files are misaligned at line {line}: {detail}")]
    Misaligned {
        /// 1-based line number of the first mismatch.
        line: usize,
        /// What went out of step.
        detail: String,
    },

    /// A vocabulary was built from a file without any tokens.
    #[error("vocabulary built from {0:?} is empty")]
    EmptyVocabulary(PathBuf),

    /// A cached vocabulary lacks its reserved tokens.
    #[error("invalid vocabulary {path:?}: {detail}")]
    InvalidVocabulary {
        /// The cache file that was read.
        path: PathBuf,
        /// Which reserved token is missing or misplaced.
        detail: String,
    },

    /// Tensor dimensions did not match what the model expects.
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    /// The requested operation is not available for the model configuration.
    #[error("unsupported operation: {0}")]
    Unsupported(String),

    /// Vocabulary (de)serialization failed.
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// Candle ML framework error.
    #[error("ML framework error: {0}")]
    Candle(#[from] candle_core::Error),
}

impl SluError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type alias for SLU core operations.
pub type Result<T> = std::result::Result<T, SluError>;
