//! Container reading with lazy tensor access

use std::collections::HashMap;
use std::fs::File;
use std::path::Path;

use memmap2::Mmap;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use merino_quant::{QuantizedTensor, Scheme};

use crate::directory::{DirectoryEntry, ENTRY_SIZE};
use crate::error::{ContainerError, Result};
use crate::format::{ContainerHeader, HEADER_SIZE};

/// Backing storage for an open container
enum ContainerData {
    Mmap(Mmap),
    Heap(Vec<u8>),
}

impl ContainerData {
    fn as_slice(&self) -> &[u8] {
        match self {
            Self::Mmap(mmap) => &mmap[..],
            Self::Heap(v) => v,
        }
    }
}

/// One row of [`Container::summary`]
#[derive(Debug, Clone)]
pub struct TensorSummary {
    /// Tensor name
    pub name: String,
    /// Scheme name, or the raw tag for unknown schemes
    pub scheme: String,
    /// Dimensions
    pub dims: Vec<usize>,
    /// Packed byte count
    pub bytes: u64,
}

/// An open container: parsed header, metadata, and directory over a
/// borrowed or memory-mapped byte buffer. Tensor bytes are handed out as
/// slices; [`Container::load`] materializes an owned
/// [`QuantizedTensor`] on demand.
pub struct Container {
    data: ContainerData,
    header: ContainerHeader,
    metadata: Value,
    entries: Vec<DirectoryEntry>,
    by_name: HashMap<String, usize>,
    data_start: usize,
}

impl Container {
    /// Open a container file via memory mapping.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(&path)?;
        let mmap = unsafe { Mmap::map(&file)? };
        // Containers are read front to back; the hint is advisory.
        #[cfg(unix)]
        let _ = mmap.advise(memmap2::Advice::Sequential);
        info!(path = %path.as_ref().display(), bytes = mmap.len(), "opened container");
        Self::from_data(ContainerData::Mmap(mmap))
    }

    /// Parse a container from an owned byte buffer.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        Self::from_data(ContainerData::Heap(bytes))
    }

    fn from_data(data: ContainerData) -> Result<Self> {
        let bytes = data.as_slice();
        let header = ContainerHeader::from_bytes(bytes)?;

        let metadata_end = HEADER_SIZE + header.metadata_len as usize;
        if bytes.len() < metadata_end {
            return Err(ContainerError::BufferTooSmall {
                needed: metadata_end,
                available: bytes.len(),
            });
        }
        let metadata: Value = if header.metadata_len == 0 {
            Value::Object(Default::default())
        } else {
            serde_json::from_slice(&bytes[HEADER_SIZE..metadata_end])?
        };

        let directory_end = metadata_end + header.tensor_count as usize * ENTRY_SIZE;
        if bytes.len() < directory_end {
            return Err(ContainerError::BufferTooSmall {
                needed: directory_end,
                available: bytes.len(),
            });
        }

        let mut entries = Vec::with_capacity(header.tensor_count as usize);
        let mut by_name = HashMap::with_capacity(header.tensor_count as usize);
        for i in 0..header.tensor_count as usize {
            let off = metadata_end + i * ENTRY_SIZE;
            let entry = DirectoryEntry::from_bytes(&bytes[off..off + ENTRY_SIZE], i)?;
            by_name.insert(entry.name.clone(), i);
            entries.push(entry);
        }
        debug!(tensors = entries.len(), "parsed container directory");

        Ok(Self {
            data,
            header,
            metadata,
            entries,
            by_name,
            data_start: crate::format::align_offset(directory_end, crate::format::DATA_ALIGNMENT),
        })
    }

    /// The parsed header
    pub fn header(&self) -> &ContainerHeader {
        &self.header
    }

    /// The metadata JSON document
    pub fn metadata(&self) -> &Value {
        &self.metadata
    }

    /// All directory entries, in file order
    pub fn entries(&self) -> &[DirectoryEntry] {
        &self.entries
    }

    /// Look up one directory entry by name
    pub fn entry(&self, name: &str) -> Option<&DirectoryEntry> {
        self.by_name.get(name).map(|&i| &self.entries[i])
    }

    /// Names of all tensors, in file order
    pub fn tensor_names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.name.as_str()).collect()
    }

    /// Borrow a tensor's packed bytes.
    pub fn tensor_data(&self, name: &str) -> Result<&[u8]> {
        let entry = self
            .entry(name)
            .ok_or_else(|| ContainerError::TensorNotFound(name.to_string()))?;
        self.slice(entry.data_offset, entry.data_length)
    }

    /// Borrow a tensor's external scale bytes, if it has any.
    pub fn tensor_aux(&self, name: &str) -> Result<Option<&[u8]>> {
        let entry = self
            .entry(name)
            .ok_or_else(|| ContainerError::TensorNotFound(name.to_string()))?;
        if entry.aux_length == 0 {
            return Ok(None);
        }
        self.slice(entry.aux_offset, entry.aux_length).map(Some)
    }

    /// Materialize a tensor as an owned [`QuantizedTensor`].
    pub fn load(&self, name: &str) -> Result<QuantizedTensor> {
        let entry = self
            .entry(name)
            .ok_or_else(|| ContainerError::TensorNotFound(name.to_string()))?;
        let scheme = Scheme::from_u32(entry.scheme_tag)?;
        let data = self.slice(entry.data_offset, entry.data_length)?.to_vec();
        let aux = if entry.aux_length > 0 {
            self.slice(entry.aux_offset, entry.aux_length)?.to_vec()
        } else {
            Vec::new()
        };
        Ok(QuantizedTensor::from_raw(
            scheme,
            entry.dims.clone(),
            data,
            aux,
        )?)
    }

    /// Inspection listing: name, scheme, shape, and byte count per tensor.
    pub fn summary(&self) -> Vec<TensorSummary> {
        self.entries
            .iter()
            .map(|e| TensorSummary {
                name: e.name.clone(),
                scheme: Scheme::from_u32(e.scheme_tag)
                    .map(|s| s.name().to_string())
                    .unwrap_or_else(|_| format!("tag:{}", e.scheme_tag)),
                dims: e.dims.clone(),
                bytes: e.data_length + e.aux_length,
            })
            .collect()
    }

    /// SHA-256 of the data region, hex-encoded with a `sha256:` prefix.
    ///
    /// This is the value recorded in the sidecar manifest and checked by
    /// the validator when a hash is supplied.
    pub fn content_hash(&self) -> String {
        let bytes = self.data.as_slice();
        let region = &bytes[self.data_start.min(bytes.len())..];
        let mut hasher = Sha256::new();
        hasher.update(region);
        let digest = hasher.finalize();
        let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
        format!("sha256:{hex}")
    }

    /// Total file size in bytes
    pub fn file_size(&self) -> usize {
        self.data.as_slice().len()
    }

    /// The raw container bytes
    pub fn as_bytes(&self) -> &[u8] {
        self.data.as_slice()
    }

    fn slice(&self, offset: u64, length: u64) -> Result<&[u8]> {
        let bytes = self.data.as_slice();
        let end = offset
            .checked_add(length)
            .ok_or(ContainerError::BufferTooSmall {
                needed: usize::MAX,
                available: bytes.len(),
            })? as usize;
        if end > bytes.len() {
            return Err(ContainerError::BufferTooSmall {
                needed: end,
                available: bytes.len(),
            });
        }
        Ok(&bytes[offset as usize..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::ContainerWriter;
    use serde_json::json;

    fn sample_container() -> Vec<u8> {
        let mut writer = ContainerWriter::new().with_metadata(json!({
            "general.architecture": "llama",
            "general.name": "tiny",
        }));
        let values: Vec<f32> = (0..96).map(|i| (i as f32 * 0.19).sin()).collect();
        writer
            .add_tensor(
                "output.weight",
                QuantizedTensor::quantize(&values, &[3, 32], Scheme::Q8_0).unwrap(),
            )
            .unwrap();
        writer.write().unwrap()
    }

    #[test]
    fn test_read_metadata_and_directory() {
        let container = Container::from_bytes(sample_container()).unwrap();
        assert_eq!(container.header().tensor_count, 1);
        assert_eq!(
            container.metadata()["general.architecture"],
            json!("llama")
        );
        let entry = container.entry("output.weight").unwrap();
        assert_eq!(entry.dims, vec![3, 32]);
        assert_eq!(entry.block_size, 32);
    }

    #[test]
    fn test_load_round_trips_bytes() {
        let container = Container::from_bytes(sample_container()).unwrap();
        let tensor = container.load("output.weight").unwrap();
        assert_eq!(tensor.scheme(), Scheme::Q8_0);
        assert_eq!(tensor.data(), container.tensor_data("output.weight").unwrap());
    }

    #[test]
    fn test_missing_tensor() {
        let container = Container::from_bytes(sample_container()).unwrap();
        assert!(matches!(
            container.tensor_data("nope"),
            Err(ContainerError::TensorNotFound(_))
        ));
    }

    #[test]
    fn test_content_hash_stable() {
        let bytes = sample_container();
        let a = Container::from_bytes(bytes.clone()).unwrap().content_hash();
        let b = Container::from_bytes(bytes).unwrap().content_hash();
        assert_eq!(a, b);
        assert!(a.starts_with("sha256:"));
    }

    #[test]
    fn test_open_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.mtc");
        std::fs::write(&path, sample_container()).unwrap();
        let container = Container::open(&path).unwrap();
        assert_eq!(container.tensor_names(), vec!["output.weight"]);
    }
}
