//! Error types for GGUF reading and import

use std::io;
use thiserror::Error;

/// Result type alias for GGUF operations
pub type Result<T> = std::result::Result<T, GgufError>;

/// Errors that can occur during GGUF loading and import
#[derive(Error, Debug)]
pub enum GgufError {
    /// I/O error occurred
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Invalid GGUF magic number
    #[error("Invalid GGUF magic: expected 'GGUF', found {0:?}")]
    InvalidMagic([u8; 4]),

    /// Unsupported GGUF version
    #[error("Unsupported GGUF version: {0}")]
    UnsupportedVersion(u32),

    /// Invalid metadata entry
    #[error("Invalid metadata: {0}")]
    InvalidMetadata(String),

    /// Invalid string encoding in a name or value
    #[error("Invalid string encoding")]
    InvalidString,

    /// Invalid tensor record
    #[error("Invalid tensor info: {0}")]
    InvalidTensorInfo(String),

    /// Tensor not found
    #[error("Tensor not found: {0}")]
    TensorNotFound(String),

    /// Buffer ends before declared content
    #[error("Buffer too small: needed {needed} bytes, but only {available} available")]
    BufferTooSmall {
        /// Byte count required
        needed: usize,
        /// Byte count present
        available: usize,
    },

    /// One or more tensors use schemes with no registered decoder.
    ///
    /// Carries every offender found during validation, never a partial
    /// list, so a single report covers the whole file.
    #[error("Unsupported tensor types: {}", format_offenders(.0))]
    UnsupportedTensorTypes(Vec<(String, u32)>),

    /// Codec-level failure while converting a tensor
    #[error(transparent)]
    Quant(#[from] merino_quant::QuantError),

    /// Failure emitting the native container
    #[error(transparent)]
    Container(#[from] merino_container::ContainerError),
}

fn format_offenders(offenders: &[(String, u32)]) -> String {
    offenders
        .iter()
        .map(|(name, tag)| {
            format!(
                "'{}' ({}, tag {})",
                name,
                crate::tensor_info::ggml_type_name(*tag),
                tag
            )
        })
        .collect::<Vec<_>>()
        .join(", ")
}
