//! Quantization scheme tags and their storage geometry
//!
//! Tag values are wire-compatible with the GGML type enumeration so that
//! imported tensors keep their on-disk identity.

use crate::error::{QuantError, Result};

/// Supported tensor storage schemes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
#[allow(non_camel_case_types)]
pub enum Scheme {
    /// 32-bit float, no quantization
    F32 = 0,
    /// 16-bit float, no quantization
    F16 = 1,
    /// 4-bit symmetric, blocks of 32
    Q4_0 = 2,
    /// 4-bit asymmetric (scale + min), blocks of 32
    Q4_1 = 3,
    /// 5-bit symmetric, blocks of 32
    Q5_0 = 6,
    /// 5-bit asymmetric (scale + min), blocks of 32
    Q5_1 = 7,
    /// 8-bit symmetric, blocks of 32
    Q8_0 = 8,
    /// 4-bit K-quant super-blocks of 256, 8 sub-blocks
    Q4_K = 12,
    /// 5-bit K-quant super-blocks of 256, 8 sub-blocks
    Q5_K = 13,
    /// 6-bit K-quant super-blocks of 256, 16 sub-blocks
    Q6_K = 14,
    /// 8-bit K-quant super-blocks of 256 with sub-block sums
    Q8_K = 15,
}

impl Scheme {
    /// Map a raw tag to a supported scheme.
    ///
    /// Tags defined by the foreign format but not implemented here
    /// (Q2_K, Q3_K, the IQ families, integer types) are rejected with
    /// `UnsupportedScheme` rather than mis-decoded.
    pub fn from_u32(value: u32) -> Result<Self> {
        match value {
            0 => Ok(Self::F32),
            1 => Ok(Self::F16),
            2 => Ok(Self::Q4_0),
            3 => Ok(Self::Q4_1),
            6 => Ok(Self::Q5_0),
            7 => Ok(Self::Q5_1),
            8 => Ok(Self::Q8_0),
            12 => Ok(Self::Q4_K),
            13 => Ok(Self::Q5_K),
            14 => Ok(Self::Q6_K),
            15 => Ok(Self::Q8_K),
            other => Err(QuantError::UnsupportedScheme(other)),
        }
    }

    /// Raw tag value
    pub fn tag(self) -> u32 {
        self as u32
    }

    /// Human-readable scheme name
    pub fn name(self) -> &'static str {
        match self {
            Self::F32 => "F32",
            Self::F16 => "F16",
            Self::Q4_0 => "Q4_0",
            Self::Q4_1 => "Q4_1",
            Self::Q5_0 => "Q5_0",
            Self::Q5_1 => "Q5_1",
            Self::Q8_0 => "Q8_0",
            Self::Q4_K => "Q4_K",
            Self::Q5_K => "Q5_K",
            Self::Q6_K => "Q6_K",
            Self::Q8_K => "Q8_K",
        }
    }

    /// Number of elements sharing one block of scale metadata
    pub fn block_size(self) -> usize {
        match self {
            Self::F32 | Self::F16 => 1,
            Self::Q4_0 | Self::Q4_1 | Self::Q5_0 | Self::Q5_1 | Self::Q8_0 => 32,
            Self::Q4_K | Self::Q5_K | Self::Q6_K | Self::Q8_K => 256,
        }
    }

    /// Bytes occupied by one block (one element for float schemes)
    pub fn type_size(self) -> usize {
        match self {
            Self::F32 => 4,
            Self::F16 => 2,
            Self::Q4_0 => 18,  // 2 + 16
            Self::Q4_1 => 20,  // 2 + 2 + 16
            Self::Q5_0 => 22,  // 2 + 4 + 16
            Self::Q5_1 => 24,  // 2 + 2 + 4 + 16
            Self::Q8_0 => 34,  // 2 + 32
            Self::Q4_K => 144, // 2 + 2 + 12 + 128
            Self::Q5_K => 176, // 2 + 2 + 12 + 32 + 128
            Self::Q6_K => 210, // 128 + 64 + 16 + 2
            Self::Q8_K => 292, // 4 + 256 + 32
        }
    }

    /// Whether the scheme stores block-quantized codes
    pub fn is_quantized(self) -> bool {
        !matches!(self, Self::F32 | Self::F16)
    }

    /// Bytes required to store `n_elements` values.
    ///
    /// A partial trailing block occupies a whole block's bytes.
    pub fn row_bytes(self, n_elements: usize) -> usize {
        let block = self.block_size();
        let n_blocks = n_elements.div_ceil(block);
        n_blocks * self.type_size()
    }

    /// All schemes with a registered codec, in tag order
    pub fn all() -> &'static [Scheme] {
        &[
            Self::F32,
            Self::F16,
            Self::Q4_0,
            Self::Q4_1,
            Self::Q5_0,
            Self::Q5_1,
            Self::Q8_0,
            Self::Q4_K,
            Self::Q5_K,
            Self::Q6_K,
            Self::Q8_K,
        ]
    }
}

impl std::fmt::Display for Scheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
