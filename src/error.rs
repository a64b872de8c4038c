//! Error types for background removal operations

use thiserror::Error;

/// Result type alias for background removal operations
pub type Result<T> = std::result::Result<T, BgRemovalError>;

/// Error kinds surfaced by the segmentation core and its collaborators
#[derive(Error, Debug)]
pub enum BgRemovalError {
    /// Input/output errors (file not found, permission denied, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Zero-sized or otherwise unusable bitmap/mask geometry
    #[error("Invalid dimensions: {0}")]
    InvalidDimensions(String),

    /// Mask and bitmap do not describe the same pixel grid
    #[error("Dimension mismatch: expected {}x{}, got {}x{}", expected.0, expected.1, actual.0, actual.1)]
    DimensionMismatch {
        expected: (u32, u32),
        actual: (u32, u32),
    },

    /// Crop region outside the source bounds or empty
    #[error("Invalid crop: {0}")]
    InvalidCrop(String),

    /// Image decoding failed in the codec collaborator
    #[error("Decode failure: {0}")]
    Decode(#[source] image::ImageError),

    /// Image encoding failed in the codec collaborator
    #[error("Encode failure: {0}")]
    Encode(#[source] image::ImageError),

    /// A single batch member failed; never fatal to the batch itself
    #[error("Image {index} ('{name}') failed: {message}")]
    PerImageFailure {
        index: usize,
        name: String,
        message: String,
    },

    /// Invalid configuration or parameters
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Blob store capacity cannot hold the requested entry
    #[error("Quota exceeded: {requested} bytes requested, capacity is {capacity} bytes")]
    QuotaExceeded { requested: usize, capacity: usize },

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

impl BgRemovalError {
    /// Create a new invalid dimensions error
    pub fn invalid_dimensions<S: Into<String>>(msg: S) -> Self {
        Self::InvalidDimensions(msg.into())
    }

    /// Create a new dimension mismatch error
    #[must_use]
    pub fn dimension_mismatch(expected: (u32, u32), actual: (u32, u32)) -> Self {
        Self::DimensionMismatch { expected, actual }
    }

    /// Create a new invalid crop error
    pub fn invalid_crop<S: Into<String>>(msg: S) -> Self {
        Self::InvalidCrop(msg.into())
    }

    /// Create a new invalid configuration error
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// Wrap any error as a failure of one batch member
    pub fn per_image<S: Into<String>>(index: usize, name: S, error: &dyn std::error::Error) -> Self {
        Self::PerImageFailure {
            index,
            name: name.into(),
            message: error.to_string(),
        }
    }

    /// Create file I/O error with operation context
    pub fn file_io_error<P: AsRef<std::path::Path>>(
        operation: &str,
        path: P,
        error: &std::io::Error,
    ) -> Self {
        let path_display = path.as_ref().display();
        Self::Io(std::io::Error::new(
            error.kind(),
            format!("Failed to {} '{}': {}", operation, path_display, error),
        ))
    }

    /// Create configuration error with valid ranges
    pub fn config_value_error<T: std::fmt::Display>(
        parameter: &str,
        value: T,
        valid_range: &str,
        recommended: Option<T>,
    ) -> Self {
        let recommendation = match recommended {
            Some(rec) => format!(" Recommended: {}", rec),
            None => String::new(),
        };

        Self::InvalidConfig(format!(
            "Invalid {}: {} (valid range: {}).{}",
            parameter, value, valid_range, recommendation
        ))
    }

    /// Whether this error only concerns one member of a batch
    #[must_use]
    pub fn is_per_image(&self) -> bool {
        matches!(self, Self::PerImageFailure { .. })
    }
}
