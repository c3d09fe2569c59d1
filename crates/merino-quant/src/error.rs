//! Error types for quantized tensor codecs

use thiserror::Error;

/// Result type alias for codec operations
pub type Result<T> = std::result::Result<T, QuantError>;

/// Errors that can occur during quantization, decoding, and fused compute
#[derive(Error, Debug)]
pub enum QuantError {
    /// No registered decoder claims the given scheme tag
    #[error("Unsupported scheme tag: {0}")]
    UnsupportedScheme(u32),

    /// A tensor's byte length does not match what its scheme requires
    #[error(
        "Malformed block data for tensor '{name}' ({scheme}): expected {expected} bytes, found {found}"
    )]
    MalformedBlock {
        /// Tensor name, or "<anonymous>" when decoding bare buffers
        name: String,
        /// Scheme the data claims to be
        scheme: &'static str,
        /// Byte count the scheme and element count require
        expected: usize,
        /// Byte count actually provided
        found: usize,
    },

    /// Shape does not describe the given element count
    #[error("Invalid shape {dims:?} for {expected} elements")]
    InvalidShape {
        /// Declared dimensions
        dims: Vec<usize>,
        /// Element count implied by the data
        expected: usize,
    },

    /// Matmul operand dimensions disagree
    #[error("Dimension mismatch in fused matmul: {0}")]
    DimensionMismatch(String),

    /// Output buffer is smaller than the operation requires
    #[error("Buffer too small: needed {needed} elements, but only {available} available")]
    BufferTooSmall {
        /// Element count the operation requires
        needed: usize,
        /// Element count actually provided
        available: usize,
    },
}
