//! Container serialization

use serde_json::{json, Value};
use tracing::{debug, info};

use merino_quant::QuantizedTensor;

use crate::directory::{DirectoryEntry, ENTRY_SIZE, MAX_NAME_LEN, MAX_RANK};
use crate::error::{ContainerError, Result};
use crate::format::{align_offset, ContainerHeader, CONTAINER_VERSION, DATA_ALIGNMENT, HEADER_SIZE};

/// Builds a container from named tensors and a metadata document.
///
/// Directory entries are laid out and finalized only inside
/// [`ContainerWriter::write`]; until then tensors can be appended freely.
pub struct ContainerWriter {
    metadata: Value,
    tensors: Vec<(String, QuantizedTensor)>,
}

impl ContainerWriter {
    /// An empty writer with an empty metadata object.
    pub fn new() -> Self {
        Self {
            metadata: json!({}),
            tensors: Vec::new(),
        }
    }

    /// Replace the metadata document (must be a JSON object).
    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// Set one metadata key.
    pub fn set_metadata(&mut self, key: &str, value: Value) {
        if let Value::Object(map) = &mut self.metadata {
            map.insert(key.to_string(), value);
        }
    }

    /// Append a tensor, validating that its name and rank fit a
    /// directory record.
    pub fn add_tensor(&mut self, name: &str, tensor: QuantizedTensor) -> Result<()> {
        if name.len() > MAX_NAME_LEN {
            return Err(ContainerError::NameTooLong {
                name: name.to_string(),
                len: name.len(),
                max: MAX_NAME_LEN,
            });
        }
        if tensor.dims().len() > MAX_RANK {
            return Err(ContainerError::RankTooLarge {
                name: name.to_string(),
                rank: tensor.dims().len(),
                max: MAX_RANK,
            });
        }
        self.tensors.push((name.to_string(), tensor));
        Ok(())
    }

    /// Number of tensors added so far.
    pub fn tensor_count(&self) -> usize {
        self.tensors.len()
    }

    /// Serialize the container.
    pub fn write(&self) -> Result<Vec<u8>> {
        let metadata_bytes = serde_json::to_vec(&self.metadata)?;
        let directory_offset = HEADER_SIZE + metadata_bytes.len();
        let directory_len = self.tensors.len() * ENTRY_SIZE;
        let data_start = align_offset(directory_offset + directory_len, DATA_ALIGNMENT);

        // First pass: assign offsets.
        let mut entries = Vec::with_capacity(self.tensors.len());
        let mut cursor = data_start;
        for (name, tensor) in &self.tensors {
            let data_offset = align_offset(cursor, DATA_ALIGNMENT);
            let data_length = tensor.data().len();
            cursor = data_offset + data_length;

            let (aux_offset, aux_length) = if tensor.scale_data().is_empty() {
                (0, 0)
            } else {
                let off = align_offset(cursor, DATA_ALIGNMENT);
                cursor = off + tensor.scale_data().len();
                (off as u64, tensor.scale_data().len() as u64)
            };

            entries.push(DirectoryEntry {
                name: name.clone(),
                scheme_tag: tensor.scheme().tag(),
                dims: tensor.dims().to_vec(),
                block_size: tensor.scheme().block_size() as u32,
                data_offset: data_offset as u64,
                data_length: data_length as u64,
                aux_offset,
                aux_length,
            });
            debug!(
                name = name.as_str(),
                scheme = tensor.scheme().name(),
                bytes = data_length,
                "placed tensor"
            );
        }

        // Second pass: emit bytes.
        let mut out = vec![0u8; cursor];
        let header = ContainerHeader {
            version: CONTAINER_VERSION,
            tensor_count: self.tensors.len() as u32,
            metadata_len: metadata_bytes.len() as u32,
        };
        out[0..HEADER_SIZE].copy_from_slice(&header.to_bytes());
        out[HEADER_SIZE..HEADER_SIZE + metadata_bytes.len()].copy_from_slice(&metadata_bytes);

        for (i, entry) in entries.iter().enumerate() {
            let off = directory_offset + i * ENTRY_SIZE;
            out[off..off + ENTRY_SIZE].copy_from_slice(&entry.to_bytes()?);
        }

        for (entry, (_, tensor)) in entries.iter().zip(&self.tensors) {
            let off = entry.data_offset as usize;
            out[off..off + tensor.data().len()].copy_from_slice(tensor.data());
            if entry.aux_length > 0 {
                let off = entry.aux_offset as usize;
                out[off..off + tensor.scale_data().len()].copy_from_slice(tensor.scale_data());
            }
        }

        info!(
            tensors = self.tensors.len(),
            bytes = out.len(),
            "wrote container"
        );
        Ok(out)
    }
}

impl Default for ContainerWriter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use merino_quant::Scheme;

    #[test]
    fn test_write_empty_container() {
        let bytes = ContainerWriter::new().write().unwrap();
        let header = ContainerHeader::from_bytes(&bytes).unwrap();
        assert_eq!(header.tensor_count, 0);
    }

    #[test]
    fn test_data_regions_aligned() {
        let mut writer = ContainerWriter::new();
        for i in 0..3 {
            let values: Vec<f32> = (0..64).map(|j| (i * 64 + j) as f32).collect();
            let tensor = QuantizedTensor::quantize(&values, &[2, 32], Scheme::Q8_0).unwrap();
            writer.add_tensor(&format!("t{i}"), tensor).unwrap();
        }
        let bytes = writer.write().unwrap();

        let header = ContainerHeader::from_bytes(&bytes).unwrap();
        let dir_off = HEADER_SIZE + header.metadata_len as usize;
        for i in 0..3 {
            let entry = DirectoryEntry::from_bytes(&bytes[dir_off + i * ENTRY_SIZE..], i).unwrap();
            assert_eq!(entry.data_offset as usize % DATA_ALIGNMENT, 0);
        }
    }

    #[test]
    fn test_add_tensor_rejects_long_name() {
        let mut writer = ContainerWriter::new();
        let values = vec![0.0f32; 32];
        let tensor = QuantizedTensor::quantize(&values, &[32], Scheme::Q8_0).unwrap();
        let long = "n".repeat(200);
        assert!(matches!(
            writer.add_tensor(&long, tensor),
            Err(ContainerError::NameTooLong { .. })
        ));
    }
}
