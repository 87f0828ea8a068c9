use std::path::PathBuf;
use thiserror::Error;

/// Result alias for `tessera`.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by the pipeline and its components.
#[derive(Debug, Error)]
pub enum Error {
    /// Input was empty.
    #[error("empty input")]
    EmptyInput,

    /// Rows of a matrix (or a query) have inconsistent width.
    #[error("dimension mismatch: expected {expected}, found {found}")]
    DimensionMismatch {
        /// Expected dimension.
        expected: usize,
        /// Found dimension.
        found: usize,
    },

    /// Invalid parameter value or unrecognized parameter key.
    #[error("invalid parameter '{name}': {message}")]
    InvalidParameter {
        /// Parameter name.
        name: String,
        /// Human-readable explanation.
        message: String,
    },

    /// Requested cluster count is incompatible with the dataset.
    #[error("cannot create {requested} clusters from {n_items} items")]
    InvalidClusterCount {
        /// Requested count.
        requested: usize,
        /// Number of items.
        n_items: usize,
    },

    /// Unrecognized projector or cluster-assigner name.
    #[error("unknown {kind} algorithm '{name}'")]
    InvalidAlgorithm {
        /// Which family was being resolved (`projection` or `clustering`).
        kind: &'static str,
        /// The name that failed to resolve.
        name: String,
    },

    /// Operation needs a fitted pipeline.
    #[error("pipeline has not been fitted")]
    NotFitted,

    /// Vector query issued before the index was built.
    #[error("vector index has not been built")]
    NotBuilt,

    /// Load location is missing or lacks a required artifact.
    #[error("not found: {}", path.display())]
    NotFound {
        /// Missing path.
        path: PathBuf,
    },

    /// Embedding or text-generation provider failed.
    #[error("external service error: {0}")]
    ExternalService(String),

    /// Filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Persisted artifacts are corrupt or disagree with each other.
    #[error("format error: {0}")]
    Format(String),

    /// JSON or npy encoding failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Generic error with message.
    #[error("{0}")]
    Other(String),
}

impl Error {
    pub(crate) fn invalid_parameter(name: impl Into<String>, message: impl Into<String>) -> Self {
        Error::InvalidParameter {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Whether this error belongs to the malformed-input family
    /// (empty, ragged, out-of-range parameters, impossible cluster counts).
    pub fn is_invalid_input(&self) -> bool {
        matches!(
            self,
            Error::EmptyInput
                | Error::DimensionMismatch { .. }
                | Error::InvalidParameter { .. }
                | Error::InvalidClusterCount { .. }
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(format!("json: {e}"))
    }
}

impl From<ndarray_npy::ReadNpyError> for Error {
    fn from(e: ndarray_npy::ReadNpyError) -> Self {
        Error::Serialization(format!("npy read: {e}"))
    }
}

impl From<ndarray_npy::WriteNpyError> for Error {
    fn from(e: ndarray_npy::WriteNpyError) -> Self {
        Error::Serialization(format!("npy write: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_input_family() {
        assert!(Error::EmptyInput.is_invalid_input());
        assert!(Error::DimensionMismatch {
            expected: 2,
            found: 3
        }
        .is_invalid_input());
        assert!(Error::invalid_parameter("eps", "must be positive").is_invalid_input());
        assert!(!Error::NotFitted.is_invalid_input());
        assert!(!Error::NotBuilt.is_invalid_input());
    }

    #[test]
    fn display_mentions_names() {
        let e = Error::InvalidAlgorithm {
            kind: "clustering",
            name: "spectral".into(),
        };
        let s = e.to_string();
        assert!(s.contains("clustering"));
        assert!(s.contains("spectral"));
    }
}
