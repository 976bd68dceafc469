//! Error types for container parsing and image decoding.

use thiserror::Error;

/// Result type for container operations.
pub type Result<T> = std::result::Result<T, ExrError>;

/// Errors raised while parsing or decoding an EXR file.
#[derive(Error, Debug)]
pub enum ExrError {
    /// File does not start with the EXR magic number.
    #[error("invalid EXR magic number")]
    InvalidMagic,

    /// Structurally invalid input.
    #[error("invalid format: {0}")]
    InvalidFormat(String),

    /// A required header attribute is absent.
    #[error("header does not have required attribute: {0}")]
    MissingAttribute(String),

    /// Channel list carries an unknown pixel type.
    #[error("invalid pixel type: {0}")]
    InvalidPixelType(u32),

    /// Compression attribute carries an unknown value.
    #[error("unsupported compression: {0}")]
    UnsupportedCompression(u8),

    /// Valid but unimplemented feature.
    #[error("unsupported feature: {0}")]
    Unsupported(String),

    /// Input ended before a structure was complete.
    #[error("insufficient data: need {needed} bytes, have {available}")]
    InsufficientData { needed: usize, available: usize },

    /// A compressed block failed to decode.
    #[error("block decode error: {0}")]
    Piz(#[from] exr_piz::PizError),

    /// I/O error while reading a file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
