//! GGUF tensor records

use byteorder::{LittleEndian, ReadBytesExt};
use std::io::Read;

use merino_quant::Scheme;

use crate::error::{GgufError, Result};

/// One tensor record from the GGUF tensor table.
///
/// Dimensions are kept in GGUF order: `dims[0]` is the innermost
/// (fastest-varying) axis. The importer reverses them for the native
/// layout, which puts the innermost axis last.
#[derive(Debug, Clone)]
pub struct TensorInfo {
    /// Tensor name
    pub name: String,
    /// Dimensions, innermost first
    pub dims: Vec<u64>,
    /// Raw quantization scheme tag
    pub type_tag: u32,
    /// Offset of the tensor data relative to the data region start
    pub offset: u64,
}

impl TensorInfo {
    /// Read one record.
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let name_len = reader.read_u64::<LittleEndian>()? as usize;
        let mut name_buf = vec![0u8; name_len];
        reader.read_exact(&mut name_buf)?;
        let name = String::from_utf8(name_buf).map_err(|_| GgufError::InvalidString)?;

        let n_dims = reader.read_u32::<LittleEndian>()?;
        if n_dims == 0 || n_dims > 8 {
            return Err(GgufError::InvalidTensorInfo(format!(
                "tensor '{name}' has {n_dims} dimensions"
            )));
        }
        let mut dims = Vec::with_capacity(n_dims as usize);
        for _ in 0..n_dims {
            dims.push(reader.read_u64::<LittleEndian>()?);
        }

        let type_tag = reader.read_u32::<LittleEndian>()?;
        let offset = reader.read_u64::<LittleEndian>()?;

        Ok(Self {
            name,
            dims,
            type_tag,
            offset,
        })
    }

    /// Total element count
    pub fn n_elements(&self) -> u64 {
        self.dims.iter().product()
    }

    /// Byte count of the tensor's packed data.
    ///
    /// Only computable for supported schemes; rejecting unsupported tags
    /// happens before any data access.
    pub fn data_size(&self) -> Result<u64> {
        let scheme = Scheme::from_u32(self.type_tag)?;
        let row_len = self.dims[0] as usize;
        let n_rows: u64 = self.dims[1..].iter().product();
        Ok(n_rows * scheme.row_bytes(row_len) as u64)
    }
}

/// Human-readable name for any GGML type tag, including the ones this
/// runtime rejects. Used in unsupported-type reports.
pub fn ggml_type_name(tag: u32) -> &'static str {
    match tag {
        0 => "F32",
        1 => "F16",
        2 => "Q4_0",
        3 => "Q4_1",
        6 => "Q5_0",
        7 => "Q5_1",
        8 => "Q8_0",
        9 => "Q8_1",
        10 => "Q2_K",
        11 => "Q3_K",
        12 => "Q4_K",
        13 => "Q5_K",
        14 => "Q6_K",
        15 => "Q8_K",
        16 => "IQ2_XXS",
        17 => "IQ2_XS",
        18 => "IQ3_XXS",
        19 => "IQ1_S",
        20 => "IQ4_NL",
        21 => "IQ3_S",
        22 => "IQ2_S",
        23 => "IQ4_XS",
        24 => "I8",
        25 => "I16",
        26 => "I32",
        27 => "I64",
        28 => "F64",
        29 => "IQ1_M",
        30 => "BF16",
        _ => "unknown",
    }
}
