//! Block codec library
//!
//! Pure encode/decode functions, one pair per scheme. Row-level functions
//! (`quantize`, `dequantize`) handle whole tensors including a partial
//! trailing block; the per-scheme `dequantize_block_*` primitives in the
//! submodules write into caller-supplied fixed-size buffers and never
//! allocate, which is what the fused kernels build on.

pub mod basic;
pub mod float;
pub mod kquant;

use crate::error::{QuantError, Result};
use crate::scheme::Scheme;

/// Quantize `values` into packed block bytes for `scheme`.
///
/// The trailing block is zero-padded when `values.len()` is not a multiple
/// of the scheme's block size. Scale metadata is embedded in the block
/// bytes for every supported scheme.
pub fn quantize(scheme: Scheme, values: &[f32]) -> Vec<u8> {
    match scheme {
        Scheme::F32 => float::encode_f32(values),
        Scheme::F16 => float::encode_f16(values),
        Scheme::Q4_0 => basic::quantize_q4_0(values),
        Scheme::Q4_1 => basic::quantize_q4_1(values),
        Scheme::Q5_0 => basic::quantize_q5_0(values),
        Scheme::Q5_1 => basic::quantize_q5_1(values),
        Scheme::Q8_0 => basic::quantize_q8_0(values),
        Scheme::Q4_K => kquant::quantize_q4_k(values),
        Scheme::Q5_K => kquant::quantize_q5_k(values),
        Scheme::Q6_K => kquant::quantize_q6_k(values),
        Scheme::Q8_K => kquant::quantize_q8_k(values),
    }
}

/// Decode `n_elements` values of `scheme` from packed block bytes.
pub fn dequantize(scheme: Scheme, data: &[u8], n_elements: usize) -> Result<Vec<f32>> {
    check_len(scheme, data, n_elements, "<anonymous>")?;
    Ok(match scheme {
        Scheme::F32 => float::decode_f32(data, n_elements),
        Scheme::F16 => float::decode_f16(data, n_elements),
        Scheme::Q4_0 => basic::dequantize_q4_0(data, n_elements),
        Scheme::Q4_1 => basic::dequantize_q4_1(data, n_elements),
        Scheme::Q5_0 => basic::dequantize_q5_0(data, n_elements),
        Scheme::Q5_1 => basic::dequantize_q5_1(data, n_elements),
        Scheme::Q8_0 => basic::dequantize_q8_0(data, n_elements),
        Scheme::Q4_K => kquant::dequantize_q4_k(data, n_elements),
        Scheme::Q5_K => kquant::dequantize_q5_k(data, n_elements),
        Scheme::Q6_K => kquant::dequantize_q6_k(data, n_elements),
        Scheme::Q8_K => kquant::dequantize_q8_k(data, n_elements),
    })
}

/// Verify that `data` holds exactly the bytes `scheme` requires for
/// `n_elements` values, failing with a malformed-block error naming
/// `tensor_name` otherwise.
pub fn check_len(scheme: Scheme, data: &[u8], n_elements: usize, tensor_name: &str) -> Result<()> {
    let expected = scheme.row_bytes(n_elements);
    if data.len() != expected {
        return Err(QuantError::MalformedBlock {
            name: tensor_name.to_string(),
            scheme: scheme.name(),
            expected,
            found: data.len(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_len_truncated() {
        let data = vec![0u8; 17]; // one byte short of a Q4_0 block
        let err = check_len(Scheme::Q4_0, &data, 32, "blk.0.attn_q.weight").unwrap_err();
        match err {
            QuantError::MalformedBlock {
                name,
                scheme,
                expected,
                found,
            } => {
                assert_eq!(name, "blk.0.attn_q.weight");
                assert_eq!(scheme, "Q4_0");
                assert_eq!(expected, 18);
                assert_eq!(found, 17);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_round_trip_all_schemes_smoke() {
        let values: Vec<f32> = (0..512).map(|i| ((i as f32) * 0.31).sin() * 4.0).collect();
        for &scheme in Scheme::all() {
            let packed = quantize(scheme, &values);
            assert_eq!(packed.len(), scheme.row_bytes(values.len()));
            let decoded = dequantize(scheme, &packed, values.len()).unwrap();
            assert_eq!(decoded.len(), values.len());
        }
    }
}
