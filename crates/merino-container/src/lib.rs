//! Merino native tensor container
//!
//! A compact binary container for block-quantized tensors: a fixed
//! header, a JSON metadata blob, a directory of fixed-size tensor
//! records, and a 64-byte-aligned data region. A loosely-typed sidecar
//! manifest allows quick inspection without parsing the binary.
//!
//! Reading is lazy: [`Container`] hands out borrowed byte slices per
//! tensor and only materializes a [`merino_quant::QuantizedTensor`] on
//! request. Integrity checking is a separate pass ([`validate`]) that
//! enumerates every problem it finds rather than stopping at the first.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod directory;
pub mod error;
pub mod format;
pub mod manifest;
pub mod reader;
pub mod validate;
pub mod writer;

pub use directory::DirectoryEntry;
pub use error::{ContainerError, Result};
pub use format::{detect_format, ContainerHeader, ModelFormat, CONTAINER_MAGIC, CONTAINER_VERSION};
pub use manifest::Manifest;
pub use reader::{Container, TensorSummary};
pub use validate::{validate, validate_strict, Finding};
pub use writer::ContainerWriter;
