//! GGUF reader and importer for Merino
//!
//! Reads the foreign GGUF container (header, metadata value tree, tensor
//! records, memory-mapped data) and converts supported tensors into the
//! Merino native container. Type validation is single-shot: every tensor
//! whose quantization scheme has no registered decoder is collected into
//! one report before the import fails.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod format;
pub mod import;
pub mod loader;
pub mod metadata;
pub mod tensor_info;

pub use error::{GgufError, Result};
pub use format::{GgufHeader, GgufVersion, GGUF_MAGIC};
pub use import::{import_gguf, import_gguf_file, ImportOptions};
pub use loader::GgufFile;
pub use metadata::{GgufMetadata, GgufValue, GgufValueType};
pub use tensor_info::{ggml_type_name, TensorInfo};
