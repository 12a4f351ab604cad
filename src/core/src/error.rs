use std::path::PathBuf;

use thiserror::Error;

/// Stowage error types
#[derive(Error, Debug)]
pub enum StowageError {
    /// Pull policy forbids fetching and no usable local copy exists
    #[error("Local image unavailable: {reference} ({reason})")]
    LocalImageUnavailable { reference: String, reason: String },

    /// The copy collaborator failed to transfer an image
    #[error("Image copy failed: {source_ref} -> {destination}: {message}")]
    FetchFailed {
        source_ref: String,
        destination: String,
        message: String,
    },

    /// Reference cannot be used as a store key
    #[error("Invalid image reference: {0:?}")]
    InvalidReference(String),

    /// Unsupported media type or malformed digest
    #[error("Unsupported image format: {0}")]
    UnsupportedFormat(String),

    /// A manifest chain or config blob could not be read or decoded
    #[error("Image resolution failed at {}: {message}", path.display())]
    ResolutionFailed { path: PathBuf, message: String },

    /// Store directory or sidecar could not be written or read
    #[error("Image store persistence failed at {}: {message}", path.display())]
    PersistenceFailed { path: PathBuf, message: String },

    /// External build tool failed
    #[error("Image build failed for {tag}: {message}")]
    BuildFailed { tag: String, message: String },

    /// External program could not be started
    #[error("Failed to run {program}: {message}")]
    ProcessSpawn { program: String, message: String },

    /// Wrapped error with the image reference that was being resolved
    #[error("{reference}: {source}")]
    Image {
        reference: String,
        #[source]
        source: Box<StowageError>,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl StowageError {
    /// Attach the image reference to an error.
    pub fn for_image(self, reference: &str) -> Self {
        match self {
            // Policy errors already carry the reference
            e @ StowageError::LocalImageUnavailable { .. } => e,
            e @ StowageError::Image { .. } => e,
            other => StowageError::Image {
                reference: reference.to_string(),
                source: Box::new(other),
            },
        }
    }

    /// The innermost error, with any reference context removed.
    pub fn root(&self) -> &StowageError {
        match self {
            StowageError::Image { source, .. } => source.root(),
            other => other,
        }
    }
}

impl From<serde_json::Error> for StowageError {
    fn from(err: serde_json::Error) -> Self {
        StowageError::SerializationError(err.to_string())
    }
}

/// Result type alias for stowage operations
pub type Result<T> = std::result::Result<T, StowageError>;
