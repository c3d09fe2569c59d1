//! Codecs for the 32-element basic block schemes
//!
//! Packing rules follow the foreign format exactly: the low nibble of
//! `qs[j]` holds element `j` and the high nibble holds element `j + 16`;
//! Q5 schemes keep the fifth bit of element `j` at bit `j` of a
//! little-endian u32 (`j + 16` for the high half). Symmetric scales are
//! derived from the maximum-magnitude value so that value maps to the
//! most negative code.

use crate::blocks::{BlockQ4_0, BlockQ4_1, BlockQ5_0, BlockQ5_1, BlockQ8_0, QK};

/// Quantize one 32-element block to Q4_0.
pub fn quantize_block_q4_0(x: &[f32; QK]) -> BlockQ4_0 {
    let mut amax = 0.0f32;
    let mut max = 0.0f32;
    for &v in x {
        if v.abs() > amax {
            amax = v.abs();
            max = v;
        }
    }

    let d = max / -8.0;
    let id = if d != 0.0 { 1.0 / d } else { 0.0 };

    let mut qs = [0u8; QK / 2];
    for j in 0..QK / 2 {
        let x0 = x[j] * id;
        let x1 = x[j + QK / 2] * id;
        let xi0 = ((x0 + 8.5) as i32).clamp(0, 15) as u8;
        let xi1 = ((x1 + 8.5) as i32).clamp(0, 15) as u8;
        qs[j] = xi0 | (xi1 << 4);
    }

    BlockQ4_0 {
        d: half::f16::from_f32(d),
        qs,
    }
}

/// Dequantize one Q4_0 block.
pub fn dequantize_block_q4_0(block: &BlockQ4_0, out: &mut [f32; QK]) {
    let d = block.d.to_f32();
    for j in 0..QK / 2 {
        let x0 = (block.qs[j] & 0x0F) as i32 - 8;
        let x1 = (block.qs[j] >> 4) as i32 - 8;
        out[j] = x0 as f32 * d;
        out[j + QK / 2] = x1 as f32 * d;
    }
}

/// Quantize one 32-element block to Q4_1.
pub fn quantize_block_q4_1(x: &[f32; QK]) -> BlockQ4_1 {
    let mut min = f32::INFINITY;
    let mut max = f32::NEG_INFINITY;
    for &v in x {
        min = min.min(v);
        max = max.max(v);
    }

    let d = (max - min) / 15.0;
    let id = if d != 0.0 { 1.0 / d } else { 0.0 };

    let mut qs = [0u8; QK / 2];
    for j in 0..QK / 2 {
        let x0 = (x[j] - min) * id;
        let x1 = (x[j + QK / 2] - min) * id;
        let xi0 = ((x0 + 0.5) as i32).clamp(0, 15) as u8;
        let xi1 = ((x1 + 0.5) as i32).clamp(0, 15) as u8;
        qs[j] = xi0 | (xi1 << 4);
    }

    BlockQ4_1 {
        d: half::f16::from_f32(d),
        m: half::f16::from_f32(min),
        qs,
    }
}

/// Dequantize one Q4_1 block.
pub fn dequantize_block_q4_1(block: &BlockQ4_1, out: &mut [f32; QK]) {
    let d = block.d.to_f32();
    let m = block.m.to_f32();
    for j in 0..QK / 2 {
        let x0 = (block.qs[j] & 0x0F) as f32;
        let x1 = (block.qs[j] >> 4) as f32;
        out[j] = x0 * d + m;
        out[j + QK / 2] = x1 * d + m;
    }
}

/// Quantize one 32-element block to Q5_0.
pub fn quantize_block_q5_0(x: &[f32; QK]) -> BlockQ5_0 {
    let mut amax = 0.0f32;
    let mut max = 0.0f32;
    for &v in x {
        if v.abs() > amax {
            amax = v.abs();
            max = v;
        }
    }

    let d = max / -16.0;
    let id = if d != 0.0 { 1.0 / d } else { 0.0 };

    let mut qs = [0u8; QK / 2];
    let mut qh = 0u32;
    for j in 0..QK / 2 {
        let x0 = x[j] * id;
        let x1 = x[j + QK / 2] * id;
        let xi0 = ((x0 + 16.5) as i32).clamp(0, 31) as u8;
        let xi1 = ((x1 + 16.5) as i32).clamp(0, 31) as u8;
        qs[j] = (xi0 & 0x0F) | ((xi1 & 0x0F) << 4);
        qh |= (((xi0 & 0x10) >> 4) as u32) << j;
        qh |= (((xi1 & 0x10) >> 4) as u32) << (j + QK / 2);
    }

    BlockQ5_0 {
        d: half::f16::from_f32(d),
        qh: qh.to_le_bytes(),
        qs,
    }
}

/// Dequantize one Q5_0 block.
pub fn dequantize_block_q5_0(block: &BlockQ5_0, out: &mut [f32; QK]) {
    let d = block.d.to_f32();
    let qh = u32::from_le_bytes(block.qh);
    for j in 0..QK / 2 {
        let xh_0 = (((qh >> j) << 4) & 0x10) as u8;
        let xh_1 = ((qh >> (j + 12)) & 0x10) as u8;
        let x0 = ((block.qs[j] & 0x0F) | xh_0) as i32 - 16;
        let x1 = ((block.qs[j] >> 4) | xh_1) as i32 - 16;
        out[j] = x0 as f32 * d;
        out[j + QK / 2] = x1 as f32 * d;
    }
}

/// Quantize one 32-element block to Q5_1.
pub fn quantize_block_q5_1(x: &[f32; QK]) -> BlockQ5_1 {
    let mut min = f32::INFINITY;
    let mut max = f32::NEG_INFINITY;
    for &v in x {
        min = min.min(v);
        max = max.max(v);
    }

    let d = (max - min) / 31.0;
    let id = if d != 0.0 { 1.0 / d } else { 0.0 };

    let mut qs = [0u8; QK / 2];
    let mut qh = 0u32;
    for j in 0..QK / 2 {
        let x0 = (x[j] - min) * id;
        let x1 = (x[j + QK / 2] - min) * id;
        let xi0 = ((x0 + 0.5) as i32).clamp(0, 31) as u8;
        let xi1 = ((x1 + 0.5) as i32).clamp(0, 31) as u8;
        qs[j] = (xi0 & 0x0F) | ((xi1 & 0x0F) << 4);
        qh |= (((xi0 & 0x10) >> 4) as u32) << j;
        qh |= (((xi1 & 0x10) >> 4) as u32) << (j + QK / 2);
    }

    BlockQ5_1 {
        d: half::f16::from_f32(d),
        m: half::f16::from_f32(min),
        qh: qh.to_le_bytes(),
        qs,
    }
}

/// Dequantize one Q5_1 block.
pub fn dequantize_block_q5_1(block: &BlockQ5_1, out: &mut [f32; QK]) {
    let d = block.d.to_f32();
    let m = block.m.to_f32();
    let qh = u32::from_le_bytes(block.qh);
    for j in 0..QK / 2 {
        let xh_0 = (((qh >> j) << 4) & 0x10) as u8;
        let xh_1 = ((qh >> (j + 12)) & 0x10) as u8;
        let x0 = ((block.qs[j] & 0x0F) | xh_0) as f32;
        let x1 = ((block.qs[j] >> 4) | xh_1) as f32;
        out[j] = x0 * d + m;
        out[j + QK / 2] = x1 * d + m;
    }
}

/// Quantize one 32-element block to Q8_0.
pub fn quantize_block_q8_0(x: &[f32; QK]) -> BlockQ8_0 {
    let mut amax = 0.0f32;
    for &v in x {
        amax = amax.max(v.abs());
    }

    let d = amax / 127.0;
    let id = if d != 0.0 { 1.0 / d } else { 0.0 };

    let mut qs = [0i8; QK];
    for (q, &v) in qs.iter_mut().zip(x.iter()) {
        *q = (v * id).round().clamp(-127.0, 127.0) as i8;
    }

    BlockQ8_0 {
        d: half::f16::from_f32(d),
        qs,
    }
}

/// Dequantize one Q8_0 block.
pub fn dequantize_block_q8_0(block: &BlockQ8_0, out: &mut [f32; QK]) {
    let d = block.d.to_f32();
    for (o, &q) in out.iter_mut().zip(block.qs.iter()) {
        *o = q as f32 * d;
    }
}

macro_rules! row_codec {
    ($quantize:ident, $dequantize:ident, $quantize_block:ident, $dequantize_block:ident, $block:ty) => {
        /// Quantize a full row, zero-padding the trailing partial block.
        pub fn $quantize(values: &[f32]) -> Vec<u8> {
            let n_blocks = values.len().div_ceil(QK);
            let mut out = vec![0u8; n_blocks * <$block>::SIZE];
            for (i, chunk) in values.chunks(QK).enumerate() {
                let mut x = [0.0f32; QK];
                x[..chunk.len()].copy_from_slice(chunk);
                let block = $quantize_block(&x);
                block.write_to(&mut out[i * <$block>::SIZE..(i + 1) * <$block>::SIZE]);
            }
            out
        }

        /// Decode `n_elements` values, stopping inside the final block when
        /// the count is not a multiple of 32.
        pub fn $dequantize(data: &[u8], n_elements: usize) -> Vec<f32> {
            let mut out = Vec::with_capacity(n_elements);
            let mut scratch = [0.0f32; QK];
            for chunk in data.chunks_exact(<$block>::SIZE) {
                if out.len() >= n_elements {
                    break;
                }
                let block = <$block>::from_bytes(chunk);
                $dequantize_block(&block, &mut scratch);
                let take = (n_elements - out.len()).min(QK);
                out.extend_from_slice(&scratch[..take]);
            }
            out
        }
    };
}

row_codec!(
    quantize_q4_0,
    dequantize_q4_0,
    quantize_block_q4_0,
    dequantize_block_q4_0,
    BlockQ4_0
);
row_codec!(
    quantize_q4_1,
    dequantize_q4_1,
    quantize_block_q4_1,
    dequantize_block_q4_1,
    BlockQ4_1
);
row_codec!(
    quantize_q5_0,
    dequantize_q5_0,
    quantize_block_q5_0,
    dequantize_block_q5_0,
    BlockQ5_0
);
row_codec!(
    quantize_q5_1,
    dequantize_q5_1,
    quantize_block_q5_1,
    dequantize_block_q5_1,
    BlockQ5_1
);
row_codec!(
    quantize_q8_0,
    dequantize_q8_0,
    quantize_block_q8_0,
    dequantize_block_q8_0,
    BlockQ8_0
);
