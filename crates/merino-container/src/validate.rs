//! Container integrity checking
//!
//! Validation is a separate pass over the raw bytes, not something the
//! reader does implicitly. It keeps going after the first problem and
//! returns every finding so one report covers the whole file.

use thiserror::Error;

use merino_quant::Scheme;

use crate::directory::{DirectoryEntry, ENTRY_SIZE};
use crate::error::{ContainerError, Result};
use crate::format::{CONTAINER_MAGIC, CONTAINER_VERSION, HEADER_SIZE};

/// One problem discovered during validation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Finding {
    /// File is shorter than the fixed header
    #[error("file truncated: {found} bytes, header needs {}", HEADER_SIZE)]
    TruncatedHeader {
        /// Bytes present
        found: usize,
    },

    /// Magic bytes do not match
    #[error("bad magic: {0:?}")]
    BadMagic([u8; 8]),

    /// Version is not supported
    #[error("unsupported version {0}")]
    BadVersion(u32),

    /// Metadata blob extends past the end of the file
    #[error("metadata region ends at {end} but file is {file_len} bytes")]
    MetadataOutOfBounds {
        /// Declared end of the metadata blob
        end: usize,
        /// File length
        file_len: usize,
    },

    /// Metadata blob is not valid JSON
    #[error("metadata blob is not valid JSON")]
    MetadataNotJson,

    /// Directory extends past the end of the file
    #[error("directory ends at {end} but file is {file_len} bytes")]
    DirectoryOutOfBounds {
        /// Declared end of the directory
        end: usize,
        /// File length
        file_len: usize,
    },

    /// A directory record could not be parsed
    #[error("directory entry {index} is malformed: {reason}")]
    MalformedEntry {
        /// Record index
        index: usize,
        /// What went wrong
        reason: String,
    },

    /// A declared data or aux region leaves the file
    #[error("tensor '{tensor}' region [{offset}, +{length}) exceeds file length {file_len}")]
    RegionOutOfBounds {
        /// Owning tensor
        tensor: String,
        /// Region start
        offset: u64,
        /// Region length
        length: u64,
        /// File length
        file_len: usize,
    },

    /// Two tensors' regions overlap
    #[error("overlapping data regions: '{first}' and '{second}'")]
    OverlappingRegions {
        /// Tensor whose region starts first
        first: String,
        /// Tensor overlapping it
        second: String,
    },

    /// Data length disagrees with the scheme and shape
    #[error("tensor '{tensor}' declares {found} data bytes, {expected} required by its scheme")]
    LengthMismatch {
        /// Owning tensor
        tensor: String,
        /// Bytes the scheme requires
        expected: usize,
        /// Bytes declared
        found: u64,
    },

    /// Content hash does not match the expected value
    #[error("content hash mismatch: expected {expected}, found {found}")]
    HashMismatch {
        /// Hash the caller supplied (e.g. from the manifest)
        expected: String,
        /// Hash computed over the data region
        found: String,
    },
}

/// Check a container's integrity, enumerating every finding.
///
/// `expected_hash` is typically the manifest's `content_hash`; pass
/// `None` to skip the hash comparison. An empty vector means the
/// container is sound.
pub fn validate(bytes: &[u8], expected_hash: Option<&str>) -> Vec<Finding> {
    let mut findings = Vec::new();

    if bytes.len() < HEADER_SIZE {
        findings.push(Finding::TruncatedHeader { found: bytes.len() });
        return findings;
    }

    let mut magic = [0u8; 8];
    magic.copy_from_slice(&bytes[0..8]);
    if magic != CONTAINER_MAGIC {
        findings.push(Finding::BadMagic(magic));
    }
    let version = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]);
    if version != CONTAINER_VERSION {
        findings.push(Finding::BadVersion(version));
    }

    let tensor_count = u32::from_le_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]) as usize;
    let metadata_len = u32::from_le_bytes([bytes[16], bytes[17], bytes[18], bytes[19]]) as usize;

    let metadata_end = HEADER_SIZE + metadata_len;
    if metadata_end > bytes.len() {
        findings.push(Finding::MetadataOutOfBounds {
            end: metadata_end,
            file_len: bytes.len(),
        });
        return findings;
    }
    if metadata_len > 0 && serde_json::from_slice::<serde_json::Value>(&bytes[HEADER_SIZE..metadata_end]).is_err()
    {
        findings.push(Finding::MetadataNotJson);
    }

    let directory_end = metadata_end + tensor_count * ENTRY_SIZE;
    if directory_end > bytes.len() {
        findings.push(Finding::DirectoryOutOfBounds {
            end: directory_end,
            file_len: bytes.len(),
        });
        return findings;
    }

    // Parse what we can of the directory, collecting per-entry problems.
    let mut regions: Vec<(u64, u64, String)> = Vec::new();
    for i in 0..tensor_count {
        let off = metadata_end + i * ENTRY_SIZE;
        let entry = match DirectoryEntry::from_bytes(&bytes[off..off + ENTRY_SIZE], i) {
            Ok(entry) => entry,
            Err(e) => {
                findings.push(Finding::MalformedEntry {
                    index: i,
                    reason: e.to_string(),
                });
                continue;
            }
        };

        for (offset, length) in [
            (entry.data_offset, entry.data_length),
            (entry.aux_offset, entry.aux_length),
        ] {
            if length == 0 {
                continue;
            }
            if offset.checked_add(length).map_or(true, |end| end > bytes.len() as u64) {
                findings.push(Finding::RegionOutOfBounds {
                    tensor: entry.name.clone(),
                    offset,
                    length,
                    file_len: bytes.len(),
                });
            } else {
                regions.push((offset, offset + length, entry.name.clone()));
            }
        }

        if let Ok(scheme) = Scheme::from_u32(entry.scheme_tag) {
            let row_len = entry.dims.last().copied().unwrap_or(0);
            let n_rows: usize = entry.dims[..entry.dims.len() - 1].iter().product();
            let expected = n_rows * scheme.row_bytes(row_len);
            if expected as u64 != entry.data_length {
                findings.push(Finding::LengthMismatch {
                    tensor: entry.name.clone(),
                    expected,
                    found: entry.data_length,
                });
            }
        }
    }

    // Overlap check over all in-bounds regions.
    regions.sort_by_key(|&(start, _, _)| start);
    for pair in regions.windows(2) {
        let (_, first_end, first) = &pair[0];
        let (second_start, _, second) = &pair[1];
        if second_start < first_end {
            findings.push(Finding::OverlappingRegions {
                first: first.clone(),
                second: second.clone(),
            });
        }
    }

    if let Some(expected) = expected_hash {
        if let Ok(container) = crate::reader::Container::from_bytes(bytes.to_vec()) {
            let found = container.content_hash();
            if found != expected {
                findings.push(Finding::HashMismatch {
                    expected: expected.to_string(),
                    found,
                });
            }
        }
    }

    findings
}

/// Validate and convert findings into a single error.
pub fn validate_strict(bytes: &[u8], expected_hash: Option<&str>) -> Result<()> {
    let findings = validate(bytes, expected_hash);
    if findings.is_empty() {
        Ok(())
    } else {
        Err(ContainerError::Validation(findings))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::ContainerWriter;
    use merino_quant::{QuantizedTensor, Scheme};

    fn two_tensor_container() -> Vec<u8> {
        let mut writer = ContainerWriter::new();
        for name in ["a.weight", "b.weight"] {
            let values: Vec<f32> = (0..64).map(|i| i as f32).collect();
            writer
                .add_tensor(
                    name,
                    QuantizedTensor::quantize(&values, &[2, 32], Scheme::Q8_0).unwrap(),
                )
                .unwrap();
        }
        writer.write().unwrap()
    }

    #[test]
    fn test_valid_container_has_no_findings() {
        let bytes = two_tensor_container();
        assert!(validate(&bytes, None).is_empty());
    }

    #[test]
    fn test_bad_magic_and_version_both_reported() {
        let mut bytes = two_tensor_container();
        bytes[0] = b'X';
        bytes[8..12].copy_from_slice(&42u32.to_le_bytes());
        let findings = validate(&bytes, None);
        assert!(findings.iter().any(|f| matches!(f, Finding::BadMagic(_))));
        assert!(findings.iter().any(|f| matches!(f, Finding::BadVersion(42))));
    }

    #[test]
    fn test_overlapping_regions_names_both_tensors() {
        let bytes = two_tensor_container();
        let container = crate::reader::Container::from_bytes(bytes.clone()).unwrap();
        let first = container.entry("a.weight").unwrap().clone();

        // Rewrite the second entry's offset to land inside the first's
        // data region.
        let mut corrupted = bytes;
        let header = crate::format::ContainerHeader::from_bytes(&corrupted).unwrap();
        let dir_off = HEADER_SIZE + header.metadata_len as usize;
        let second_off = dir_off + ENTRY_SIZE;
        corrupted[second_off + 176..second_off + 184]
            .copy_from_slice(&(first.data_offset + 8).to_le_bytes());

        let findings = validate(&corrupted, None);
        let overlap = findings
            .iter()
            .find_map(|f| match f {
                Finding::OverlappingRegions { first, second } => Some((first, second)),
                _ => None,
            })
            .expect("overlap finding");
        assert_eq!(overlap.0, "a.weight");
        assert_eq!(overlap.1, "b.weight");
    }

    #[test]
    fn test_region_out_of_bounds() {
        let bytes = two_tensor_container();
        let mut corrupted = bytes;
        let header = crate::format::ContainerHeader::from_bytes(&corrupted).unwrap();
        let dir_off = HEADER_SIZE + header.metadata_len as usize;
        let huge = u64::MAX / 2;
        corrupted[dir_off + 176..dir_off + 184].copy_from_slice(&huge.to_le_bytes());

        let findings = validate(&corrupted, None);
        assert!(findings
            .iter()
            .any(|f| matches!(f, Finding::RegionOutOfBounds { tensor, .. } if tensor == "a.weight")));
    }

    #[test]
    fn test_hash_mismatch() {
        let bytes = two_tensor_container();
        let findings = validate(&bytes, Some("sha256:deadbeef"));
        assert!(findings.iter().any(|f| matches!(f, Finding::HashMismatch { .. })));

        let container = crate::reader::Container::from_bytes(bytes.clone()).unwrap();
        let good = container.content_hash();
        assert!(validate(&bytes, Some(&good)).is_empty());
    }

    #[test]
    fn test_length_mismatch() {
        let bytes = two_tensor_container();
        let mut corrupted = bytes;
        let header = crate::format::ContainerHeader::from_bytes(&corrupted).unwrap();
        let dir_off = HEADER_SIZE + header.metadata_len as usize;
        // Shrink the declared data length below what Q8_0 [2, 32] needs.
        corrupted[dir_off + 184..dir_off + 192].copy_from_slice(&10u64.to_le_bytes());

        let findings = validate(&corrupted, None);
        assert!(findings.iter().any(|f| matches!(
            f,
            Finding::LengthMismatch {
                expected: 68,
                found: 10,
                ..
            }
        )));
    }

    #[test]
    fn test_validate_strict_lists_everything() {
        let mut bytes = two_tensor_container();
        bytes[0] = b'X';
        let err = validate_strict(&bytes, None).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("bad magic"), "{msg}");
    }
}
