//! Immutable quantized tensor value type

use crate::codec;
use crate::error::{QuantError, Result};
use crate::scheme::Scheme;

/// A tensor held in its compressed block representation.
///
/// The value is immutable after construction: the backing buffers are
/// owned and never mutated, so a `QuantizedTensor` can be shared
/// read-only across threads. Re-quantization produces a new tensor.
///
/// Blocks run along the innermost (last) dimension: a `[n, k]` weight is
/// stored as `n` independently quantized rows of `k` elements, each row
/// padded to a whole number of blocks. Scale metadata is embedded in the
/// block bytes for every supported scheme; `scale_data` carries
/// externally-stored scale arrays for schemes that need them.
#[derive(Debug, Clone)]
pub struct QuantizedTensor {
    scheme: Scheme,
    dims: Vec<usize>,
    data: Vec<u8>,
    scale_data: Vec<u8>,
}

impl QuantizedTensor {
    /// Wrap raw block bytes, validating the byte count against the scheme
    /// and shape.
    pub fn from_raw(
        scheme: Scheme,
        dims: Vec<usize>,
        data: Vec<u8>,
        scale_data: Vec<u8>,
    ) -> Result<Self> {
        if dims.is_empty() || dims.iter().any(|&d| d == 0) {
            return Err(QuantError::InvalidShape {
                dims,
                expected: 0,
            });
        }
        let row_len = *dims.last().unwrap();
        let n_rows: usize = dims[..dims.len() - 1].iter().product();
        let expected = n_rows * scheme.row_bytes(row_len);
        if data.len() != expected {
            return Err(QuantError::MalformedBlock {
                name: "<anonymous>".to_string(),
                scheme: scheme.name(),
                expected,
                found: data.len(),
            });
        }
        Ok(Self {
            scheme,
            dims,
            data,
            scale_data,
        })
    }

    /// Quantize `values` into a new tensor of the given scheme and shape.
    pub fn quantize(values: &[f32], dims: &[usize], scheme: Scheme) -> Result<Self> {
        let n_elements: usize = dims.iter().product();
        if dims.is_empty() || n_elements != values.len() {
            return Err(QuantError::InvalidShape {
                dims: dims.to_vec(),
                expected: values.len(),
            });
        }
        let row_len = *dims.last().unwrap();
        let mut data = Vec::with_capacity(scheme.row_bytes(row_len) * (n_elements / row_len));
        for row in values.chunks(row_len) {
            data.extend_from_slice(&codec::quantize(scheme, row));
        }
        Ok(Self {
            scheme,
            dims: dims.to_vec(),
            data,
            scale_data: Vec::new(),
        })
    }

    /// Storage scheme
    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    /// Tensor dimensions, innermost last
    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    /// Total element count
    pub fn n_elements(&self) -> usize {
        self.dims.iter().product()
    }

    /// Elements per quantized row (the innermost dimension)
    pub fn row_len(&self) -> usize {
        *self.dims.last().unwrap()
    }

    /// Number of quantized rows
    pub fn n_rows(&self) -> usize {
        self.dims[..self.dims.len() - 1].iter().product()
    }

    /// Bytes per quantized row
    pub fn row_bytes(&self) -> usize {
        self.scheme.row_bytes(self.row_len())
    }

    /// Raw packed block bytes
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Externally-stored scale bytes (empty when scales are embedded)
    pub fn scale_data(&self) -> &[u8] {
        &self.scale_data
    }

    /// Packed bytes of one quantized row
    pub fn row_data(&self, row: usize) -> &[u8] {
        let rb = self.row_bytes();
        &self.data[row * rb..(row + 1) * rb]
    }

    /// Decode the whole tensor to f32, row by row.
    pub fn dequantize(&self) -> Result<Vec<f32>> {
        let row_len = self.row_len();
        let mut out = Vec::with_capacity(self.n_elements());
        for row in 0..self.n_rows() {
            out.extend_from_slice(&codec::dequantize(self.scheme, self.row_data(row), row_len)?);
        }
        Ok(out)
    }

    /// Produce a new tensor re-quantized to `scheme`.
    ///
    /// This decodes at the current scheme and re-encodes at the target
    /// one, so it compounds a second rounding step on top of the original
    /// quantization error; use only where the format conversion demands
    /// it.
    pub fn requantize(&self, scheme: Scheme) -> Result<Self> {
        let values = self.dequantize()?;
        Self::quantize(&values, &self.dims, scheme)
    }
}
