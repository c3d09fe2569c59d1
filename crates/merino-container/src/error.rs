//! Error types for container I/O

use std::io;
use thiserror::Error;

use crate::validate::Finding;

/// Result type alias for container operations
pub type Result<T> = std::result::Result<T, ContainerError>;

/// Errors that can occur while reading or writing containers
#[derive(Error, Debug)]
pub enum ContainerError {
    /// I/O error occurred
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Invalid container magic
    #[error("Invalid container magic: expected 'MERINOTC', found {0:?}")]
    InvalidMagic([u8; 8]),

    /// Unsupported container version
    #[error("Unsupported container version: {0}")]
    UnsupportedVersion(u32),

    /// Metadata blob is not valid JSON
    #[error("Invalid metadata: {0}")]
    InvalidMetadata(#[from] serde_json::Error),

    /// Tensor not found in the directory
    #[error("Tensor not found: {0}")]
    TensorNotFound(String),

    /// Tensor name exceeds the directory record's name field
    #[error("Tensor name too long: '{name}' is {len} bytes, maximum is {max}")]
    NameTooLong {
        /// Offending name
        name: String,
        /// Its UTF-8 length
        len: usize,
        /// The record's capacity
        max: usize,
    },

    /// Tensor rank exceeds the directory record's dimension slots
    #[error("Tensor '{name}' has rank {rank}, maximum is {max}")]
    RankTooLarge {
        /// Offending tensor
        name: String,
        /// Its rank
        rank: usize,
        /// The record's capacity
        max: usize,
    },

    /// Buffer ends before a declared structure
    #[error("Buffer too small: needed {needed} bytes, but only {available} available")]
    BufferTooSmall {
        /// Byte count required
        needed: usize,
        /// Byte count present
        available: usize,
    },

    /// Directory entry name is not valid UTF-8
    #[error("Invalid UTF-8 in tensor name at directory index {0}")]
    InvalidName(usize),

    /// Integrity check found problems; every finding is listed
    #[error("Container failed validation with {} finding(s): {}", .0.len(), format_findings(.0))]
    Validation(Vec<Finding>),

    /// Codec-level failure while materializing a tensor
    #[error(transparent)]
    Quant(#[from] merino_quant::QuantError),
}

fn format_findings(findings: &[Finding]) -> String {
    findings
        .iter()
        .map(Finding::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
