//! GGUF format definitions

use byteorder::{LittleEndian, ReadBytesExt};
use std::io::Read;

use crate::error::{GgufError, Result};

/// GGUF magic number: "GGUF" in ASCII
pub const GGUF_MAGIC: [u8; 4] = *b"GGUF";

/// Default alignment for tensor data when `general.alignment` is absent
pub const GGUF_DEFAULT_ALIGNMENT: u32 = 32;

/// GGUF format version
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GgufVersion(pub u32);

impl GgufVersion {
    /// Versions 1 through 3 are readable
    pub fn is_supported(&self) -> bool {
        matches!(self.0, 1..=3)
    }
}

/// GGUF file header
#[derive(Debug, Clone)]
pub struct GgufHeader {
    /// Format version
    pub version: GgufVersion,
    /// Number of tensor records
    pub tensor_count: u64,
    /// Number of metadata key-value pairs
    pub metadata_kv_count: u64,
}

impl GgufHeader {
    /// Size of the fixed header in bytes
    pub const SIZE: usize = 4 + 4 + 8 + 8;

    /// Read and verify a header.
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;
        if magic != GGUF_MAGIC {
            return Err(GgufError::InvalidMagic(magic));
        }

        let version = GgufVersion(reader.read_u32::<LittleEndian>()?);
        if !version.is_supported() {
            return Err(GgufError::UnsupportedVersion(version.0));
        }

        let tensor_count = reader.read_u64::<LittleEndian>()?;
        let metadata_kv_count = reader.read_u64::<LittleEndian>()?;

        Ok(Self {
            version,
            tensor_count,
            metadata_kv_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_parses() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&GGUF_MAGIC);
        bytes.extend_from_slice(&3u32.to_le_bytes());
        bytes.extend_from_slice(&5u64.to_le_bytes());
        bytes.extend_from_slice(&2u64.to_le_bytes());

        let header = GgufHeader::read_from(&mut std::io::Cursor::new(&bytes)).unwrap();
        assert_eq!(header.version, GgufVersion(3));
        assert_eq!(header.tensor_count, 5);
        assert_eq!(header.metadata_kv_count, 2);
    }

    #[test]
    fn test_bad_magic_rejected() {
        let mut bytes = vec![b'G', b'G', b'M', b'L'];
        bytes.extend_from_slice(&[0u8; 20]);
        assert!(matches!(
            GgufHeader::read_from(&mut std::io::Cursor::new(&bytes)),
            Err(GgufError::InvalidMagic(_))
        ));
    }

    #[test]
    fn test_version_bounds() {
        assert!(GgufVersion(1).is_supported());
        assert!(GgufVersion(3).is_supported());
        assert!(!GgufVersion(0).is_supported());
        assert!(!GgufVersion(4).is_supported());
    }
}
