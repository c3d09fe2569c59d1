//! F32 and F16 pass-through codecs

use half::f16;

/// Encode f32 values as raw bytes.
pub fn encode_f32(values: &[f32]) -> Vec<u8> {
    bytemuck::cast_slice(values).to_vec()
}

/// Decode raw f32 bytes.
///
/// Casts in place when the buffer is aligned, falling back to a
/// per-element copy otherwise.
pub fn decode_f32(data: &[u8], n_elements: usize) -> Vec<f32> {
    let bytes = &data[..n_elements * 4];
    match bytemuck::try_cast_slice::<u8, f32>(bytes) {
        Ok(slice) => slice.to_vec(),
        Err(_) => bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect(),
    }
}

/// Encode f32 values as little-endian IEEE 754 half precision.
pub fn encode_f16(values: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(values.len() * 2);
    for &v in values {
        out.extend_from_slice(&f16::from_f32(v).to_le_bytes());
    }
    out
}

/// Decode little-endian f16 bytes, widening to f32.
pub fn decode_f16(data: &[u8], n_elements: usize) -> Vec<f32> {
    let mut out = Vec::with_capacity(n_elements);
    for chunk in data.chunks_exact(2).take(n_elements) {
        out.push(f16::from_le_bytes([chunk[0], chunk[1]]).to_f32());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_f32_round_trip_exact() {
        let values = [0.0f32, 1.0, -1.0, f32::MIN_POSITIVE, 3.5e20];
        let bytes = encode_f32(&values);
        assert_eq!(decode_f32(&bytes, values.len()), values);
    }

    #[test]
    fn test_f16_round_trip_representable() {
        // Values exactly representable in half precision survive unchanged.
        let values = [0.0f32, 0.5, -2.0, 1024.0];
        let bytes = encode_f16(&values);
        assert_eq!(decode_f16(&bytes, values.len()), values);
    }
}
