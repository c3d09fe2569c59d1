//! Memory-mapped GGUF file access
//!
//! Parses the header, metadata, and tensor table up front; tensor data
//! stays in the mapping and is copied out on demand through a small LRU
//! cache, so repeated access to hot tensors does not re-touch the file.

use std::collections::HashMap;
use std::fs::File;
use std::io::Cursor;
use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::{Arc, Mutex};

use memmap2::Mmap;
use tracing::{debug, info, trace};

use crate::error::{GgufError, Result};
use crate::format::{GgufHeader, GGUF_DEFAULT_ALIGNMENT};
use crate::metadata::{keys, GgufMetadata};
use crate::tensor_info::TensorInfo;

/// Number of tensor byte buffers kept warm
const CACHE_CAPACITY: usize = 16;

enum GgufData {
    Mmap(Mmap),
    Heap(Vec<u8>),
}

impl GgufData {
    fn as_slice(&self) -> &[u8] {
        match self {
            Self::Mmap(mmap) => &mmap[..],
            Self::Heap(v) => v,
        }
    }
}

/// An open GGUF file
pub struct GgufFile {
    data: GgufData,
    header: GgufHeader,
    metadata: GgufMetadata,
    tensors: HashMap<String, TensorInfo>,
    tensor_order: Vec<String>,
    data_start_offset: u64,
    alignment: u32,
    cache: Mutex<lru::LruCache<String, Arc<[u8]>>>,
}

impl GgufFile {
    /// Open a GGUF file via memory mapping.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(&path)?;
        let mmap = unsafe { Mmap::map(&file)? };
        info!(path = %path.as_ref().display(), bytes = mmap.len(), "opened GGUF file");
        Self::from_data(GgufData::Mmap(mmap))
    }

    /// Parse a GGUF file from an owned byte buffer.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        Self::from_data(GgufData::Heap(bytes))
    }

    fn from_data(data: GgufData) -> Result<Self> {
        let bytes = data.as_slice();
        let mut cursor = Cursor::new(bytes);

        let header = GgufHeader::read_from(&mut cursor)?;
        let metadata = GgufMetadata::read_from(&mut cursor, header.metadata_kv_count)?;
        let alignment = metadata
            .get_u32(keys::GENERAL_ALIGNMENT)
            .unwrap_or(GGUF_DEFAULT_ALIGNMENT);

        let mut tensors = HashMap::with_capacity(header.tensor_count as usize);
        let mut tensor_order = Vec::with_capacity(header.tensor_count as usize);
        for _ in 0..header.tensor_count {
            let info = TensorInfo::read_from(&mut cursor)?;
            tensor_order.push(info.name.clone());
            tensors.insert(info.name.clone(), info);
        }

        let data_start_offset = align_offset(cursor.position(), alignment as u64);
        debug!(
            tensors = tensor_order.len(),
            data_start_offset, alignment, "parsed GGUF tables"
        );

        Ok(Self {
            data,
            header,
            metadata,
            tensors,
            tensor_order,
            data_start_offset,
            alignment,
            cache: Mutex::new(lru::LruCache::new(
                NonZeroUsize::new(CACHE_CAPACITY).unwrap(),
            )),
        })
    }

    /// The file header
    pub fn header(&self) -> &GgufHeader {
        &self.header
    }

    /// Parsed metadata
    pub fn metadata(&self) -> &GgufMetadata {
        &self.metadata
    }

    /// Tensor records keyed by name
    pub fn tensors(&self) -> &HashMap<String, TensorInfo> {
        &self.tensors
    }

    /// Tensor names in file order
    pub fn tensor_names(&self) -> &[String] {
        &self.tensor_order
    }

    /// One tensor record
    pub fn tensor_info(&self, name: &str) -> Option<&TensorInfo> {
        self.tensors.get(name)
    }

    /// Tensor data alignment in the data region
    pub fn alignment(&self) -> u32 {
        self.alignment
    }

    /// Model architecture from metadata
    pub fn architecture(&self) -> Option<&str> {
        self.metadata.get_string(keys::GENERAL_ARCHITECTURE)
    }

    /// Model name from metadata
    pub fn model_name(&self) -> Option<&str> {
        self.metadata.get_string(keys::GENERAL_NAME)
    }

    /// A tensor's packed bytes, copied out of the mapping and cached.
    pub fn tensor_data(&self, name: &str) -> Result<Arc<[u8]>> {
        let info = self
            .tensors
            .get(name)
            .ok_or_else(|| GgufError::TensorNotFound(name.to_string()))?;

        if let Some(cached) = self.cache.lock().unwrap().get(name) {
            trace!(name, "tensor cache hit");
            return Ok(cached.clone());
        }

        let size = info.data_size()? as usize;
        let start = (self.data_start_offset + info.offset) as usize;
        let bytes = self.data.as_slice();
        let end = start
            .checked_add(size)
            .ok_or(GgufError::BufferTooSmall {
                needed: usize::MAX,
                available: bytes.len(),
            })?;
        if end > bytes.len() {
            return Err(GgufError::BufferTooSmall {
                needed: end,
                available: bytes.len(),
            });
        }

        let data: Arc<[u8]> = Arc::from(bytes[start..end].to_vec().into_boxed_slice());
        self.cache
            .lock()
            .unwrap()
            .put(name.to_string(), data.clone());
        trace!(name, bytes = size, "loaded tensor data");
        Ok(data)
    }

    /// Total file size in bytes
    pub fn file_size(&self) -> usize {
        self.data.as_slice().len()
    }
}

fn align_offset(offset: u64, alignment: u64) -> u64 {
    if alignment == 0 {
        return offset;
    }
    (offset + alignment - 1) & !(alignment - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_align_offset() {
        assert_eq!(align_offset(0, 32), 0);
        assert_eq!(align_offset(1, 32), 32);
        assert_eq!(align_offset(32, 32), 32);
        assert_eq!(align_offset(33, 32), 64);
    }

    #[test]
    fn test_open_missing_file() {
        assert!(GgufFile::open("/nonexistent/model.gguf").is_err());
    }

    #[test]
    fn test_truncated_bytes_rejected() {
        assert!(GgufFile::from_bytes(b"GGUF".to_vec()).is_err());
    }
}
