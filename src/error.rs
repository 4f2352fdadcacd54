use thiserror::Error;

/// Errors raised while building a descriptor system or extracting a histogram.
#[derive(Debug, Error)]
pub enum CrfhError {
    /// Unknown descriptor name, malformed spec token or inconsistent inputs.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// A filter, channel or scale-space sample was looked up before it was created.
    #[error("cache miss: {0}")]
    CacheMiss(String),
    /// Descriptor outputs do not share one pixel grid.
    #[error("descriptor outputs have different dimensions: expected {expected:?}, got {actual:?}")]
    DimensionMismatch {
        expected: (usize, usize),
        actual: (usize, usize),
    },
    #[error(transparent)]
    Image(#[from] image::ImageError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CrfhError>;

impl CrfhError {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        CrfhError::Configuration(msg.into())
    }
}
