use std::path::{Path, PathBuf};

/// Convenience result type used across the builder.
pub type MoozicResult<T> = Result<T, MoozicError>;

/// Top-level error taxonomy used by builder APIs.
#[derive(thiserror::Error, Debug)]
pub enum MoozicError {
    /// Invalid project data or configuration. Aborts a build before any output is written.
    #[error("validation error: {0}")]
    Validation(String),

    /// A conversion backend failed to produce canonical audio for one source.
    #[error("conversion error: {0}")]
    Conversion(String),

    /// An external conversion exceeded its time limit and was killed.
    #[error("conversion timed out: {tool} did not finish within {secs}s")]
    Timeout {
        /// Program that was killed.
        tool: String,
        /// Limit that was exceeded, in seconds.
        secs: u64,
    },

    /// A cover could not be composited.
    #[error("compositing error: {0}")]
    Cover(#[from] CoverError),

    /// A filesystem operation failed.
    #[error("io error at '{}': {source}", path.display())]
    Io {
        /// Path the operation was applied to.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Errors when serializing or deserializing data structures.
    #[error("serialization error: {0}")]
    Serde(String),

    /// Wrapped lower-level error from dependencies.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl MoozicError {
    /// Build a [`MoozicError::Validation`] value.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Build a [`MoozicError::Conversion`] value.
    pub fn conversion(msg: impl Into<String>) -> Self {
        Self::Conversion(msg.into())
    }

    /// Build a [`MoozicError::Serde`] value.
    pub fn serde(msg: impl Into<String>) -> Self {
        Self::Serde(msg.into())
    }

    /// Build a [`MoozicError::Io`] value for `path`.
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// True for conversion failures, timeouts included.
    pub fn is_conversion_failure(&self) -> bool {
        matches!(self, Self::Conversion(_) | Self::Timeout { .. })
    }

    /// True when the underlying cause is a missing file.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Io { source, .. } => source.kind() == std::io::ErrorKind::NotFound,
            Self::Cover(CoverError::MissingBase { .. } | CoverError::MissingMask { .. }) => true,
            _ => false,
        }
    }
}

/// Failures specific to cover compositing.
#[derive(thiserror::Error, Debug)]
pub enum CoverError {
    /// The base image (override or default pick) does not exist.
    #[error("base image '{}' not found", path.display())]
    MissingBase {
        /// Expected location.
        path: PathBuf,
    },

    /// The mask asset for a variant does not exist.
    #[error("mask '{variant}' not found at '{}'", path.display())]
    MissingMask {
        /// Variant name.
        variant: String,
        /// Expected location.
        path: PathBuf,
    },

    /// An image exists but cannot be decoded.
    #[error("unsupported image '{}': {reason}", path.display())]
    UnsupportedImage {
        /// Offending file.
        path: PathBuf,
        /// Decoder message.
        reason: String,
    },

    /// No default cover is available to choose from.
    #[error("default cover pool at '{}' is empty", dir.display())]
    EmptyDefaultPool {
        /// Pool directory.
        dir: PathBuf,
    },
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;
