//! Codecs for the 256-element K-quant super-block schemes
//!
//! Q4_K and Q5_K carry eight 6-bit (scale, min) sub-block pairs unpacked
//! via [`crate::scales`]; Q6_K carries sixteen signed 8-bit sub-block
//! scales and splits each code across `ql`/`qh`; Q8_K keeps full 8-bit
//! codes plus per-16 sums for the integer dot-product kernels. Bit
//! positions match the foreign format's reference implementation exactly.

use crate::blocks::{BlockQ4K, BlockQ5K, BlockQ6K, BlockQ8K, QK_K};
use crate::scales::{pack_scale_min, unpack_scale_min, N_SUB_BLOCKS};

#[inline]
fn nearest_int(v: f32) -> i32 {
    v.round() as i32
}

/// Fit an asymmetric (scale, min) pair to `x` with codes in `0..=nmax`,
/// refining by alternating least squares for up to `ntry` rounds.
///
/// Returns `(scale, -min)`; the caller stores the negated minimum so that
/// dequantization is `d*sc*q - dmin*m`.
fn make_qkx1_quants(nmax: i32, ntry: usize, x: &[f32]) -> (f32, f32) {
    debug_assert!(x.len() <= 32);
    let mut l = [0u8; 32];

    let mut min = x[0];
    let mut max = x[0];
    for &v in &x[1..] {
        min = min.min(v);
        max = max.max(v);
    }
    if max == min {
        return (0.0, 0.0);
    }
    if min > 0.0 {
        min = 0.0;
    }

    let mut iscale = nmax as f32 / (max - min);
    let mut scale = 1.0 / iscale;
    for _ in 0..ntry {
        let mut sumlx = 0.0f32;
        let mut suml2 = 0i32;
        let mut did_change = false;
        for (i, &v) in x.iter().enumerate() {
            let li = nearest_int(iscale * (v - min)).clamp(0, nmax);
            if li as u8 != l[i] {
                l[i] = li as u8;
                did_change = true;
            }
            sumlx += (v - min) * li as f32;
            suml2 += li * li;
        }
        scale = sumlx / suml2 as f32;
        let mut sum = 0.0f32;
        for (i, &v) in x.iter().enumerate() {
            sum += v - scale * l[i] as f32;
        }
        min = sum / x.len() as f32;
        if min > 0.0 {
            min = 0.0;
        }
        iscale = 1.0 / scale;
        if !did_change {
            break;
        }
    }
    (scale, -min)
}

/// Fit a symmetric scale to `x` with codes in `-nmax..nmax`, storing the
/// shifted codes `l + nmax` into `ls`. Weighted least squares over the
/// initial rounding, weights `x^2`.
fn make_qx_quants(nmax: i32, x: &[f32], ls: &mut [i8]) -> f32 {
    let mut max = 0.0f32;
    let mut amax = 0.0f32;
    for &v in x {
        if v.abs() > amax {
            amax = v.abs();
            max = v;
        }
    }
    if amax == 0.0 {
        ls.fill(0);
        return 0.0;
    }

    let iscale = -(nmax as f32) / max;
    let mut sumlx = 0.0f32;
    let mut suml2 = 0.0f32;
    for (i, &v) in x.iter().enumerate() {
        let li = nearest_int(iscale * v).clamp(-nmax, nmax - 1);
        ls[i] = (li + nmax) as i8;
        let w = v * v;
        sumlx += w * v * li as f32;
        suml2 += w * (li * li) as f32;
    }
    if suml2 > 0.0 {
        sumlx / suml2
    } else {
        1.0 / iscale
    }
}

// ---------------------------------------------------------------------------
// Q4_K
// ---------------------------------------------------------------------------

/// Quantize one 256-element super-block to Q4_K.
pub fn quantize_block_q4_k(x: &[f32; QK_K]) -> BlockQ4K {
    let mut scales = [0.0f32; N_SUB_BLOCKS];
    let mut mins = [0.0f32; N_SUB_BLOCKS];
    for (j, chunk) in x.chunks_exact(32).enumerate() {
        (scales[j], mins[j]) = make_qkx1_quants(15, 5, chunk);
    }

    let max_scale = scales.iter().fold(0.0f32, |a, &v| a.max(v));
    let max_min = mins.iter().fold(0.0f32, |a, &v| a.max(v));
    let inv_scale = if max_scale > 0.0 { 63.0 / max_scale } else { 0.0 };
    let inv_min = if max_min > 0.0 { 63.0 / max_min } else { 0.0 };

    let mut ls = [0u8; N_SUB_BLOCKS];
    let mut lm = [0u8; N_SUB_BLOCKS];
    for j in 0..N_SUB_BLOCKS {
        ls[j] = nearest_int(inv_scale * scales[j]).min(63) as u8;
        lm[j] = nearest_int(inv_min * mins[j]).min(63) as u8;
    }
    let packed_scales = pack_scale_min(&ls, &lm);

    let d = half::f16::from_f32(max_scale / 63.0);
    let dmin = half::f16::from_f32(max_min / 63.0);

    let mut l = [0u8; QK_K];
    for j in 0..N_SUB_BLOCKS {
        let (sc, m) = unpack_scale_min(j, &packed_scales);
        let dj = d.to_f32() * sc as f32;
        if dj != 0.0 {
            let dm = dmin.to_f32() * m as f32;
            for ii in 0..32 {
                l[32 * j + ii] = nearest_int((x[32 * j + ii] + dm) / dj).clamp(0, 15) as u8;
            }
        }
    }

    let mut qs = [0u8; QK_K / 2];
    for g in 0..QK_K / 64 {
        for j in 0..32 {
            qs[g * 32 + j] = l[g * 64 + j] | (l[g * 64 + 32 + j] << 4);
        }
    }

    BlockQ4K {
        d,
        dmin,
        scales: packed_scales,
        qs,
    }
}

/// Dequantize one Q4_K super-block.
pub fn dequantize_block_q4_k(block: &BlockQ4K, out: &mut [f32; QK_K]) {
    let d = block.d.to_f32();
    let dmin = block.dmin.to_f32();

    let mut is = 0usize;
    let mut q_off = 0usize;
    let mut idx = 0usize;
    for _ in 0..QK_K / 64 {
        let (sc1, m1) = unpack_scale_min(is, &block.scales);
        let d1 = d * sc1 as f32;
        let dm1 = dmin * m1 as f32;
        let (sc2, m2) = unpack_scale_min(is + 1, &block.scales);
        let d2 = d * sc2 as f32;
        let dm2 = dmin * m2 as f32;

        for l in 0..32 {
            out[idx] = d1 * (block.qs[q_off + l] & 0x0F) as f32 - dm1;
            idx += 1;
        }
        for l in 0..32 {
            out[idx] = d2 * (block.qs[q_off + l] >> 4) as f32 - dm2;
            idx += 1;
        }
        q_off += 32;
        is += 2;
    }
}

// ---------------------------------------------------------------------------
// Q5_K
// ---------------------------------------------------------------------------

/// Quantize one 256-element super-block to Q5_K.
pub fn quantize_block_q5_k(x: &[f32; QK_K]) -> BlockQ5K {
    let mut scales = [0.0f32; N_SUB_BLOCKS];
    let mut mins = [0.0f32; N_SUB_BLOCKS];
    for (j, chunk) in x.chunks_exact(32).enumerate() {
        (scales[j], mins[j]) = make_qkx1_quants(31, 5, chunk);
    }

    let max_scale = scales.iter().fold(0.0f32, |a, &v| a.max(v));
    let max_min = mins.iter().fold(0.0f32, |a, &v| a.max(v));
    let inv_scale = if max_scale > 0.0 { 63.0 / max_scale } else { 0.0 };
    let inv_min = if max_min > 0.0 { 63.0 / max_min } else { 0.0 };

    let mut ls = [0u8; N_SUB_BLOCKS];
    let mut lm = [0u8; N_SUB_BLOCKS];
    for j in 0..N_SUB_BLOCKS {
        ls[j] = nearest_int(inv_scale * scales[j]).min(63) as u8;
        lm[j] = nearest_int(inv_min * mins[j]).min(63) as u8;
    }
    let packed_scales = pack_scale_min(&ls, &lm);

    let d = half::f16::from_f32(max_scale / 63.0);
    let dmin = half::f16::from_f32(max_min / 63.0);

    let mut l = [0u8; QK_K];
    for j in 0..N_SUB_BLOCKS {
        let (sc, m) = unpack_scale_min(j, &packed_scales);
        let dj = d.to_f32() * sc as f32;
        if dj != 0.0 {
            let dm = dmin.to_f32() * m as f32;
            for ii in 0..32 {
                l[32 * j + ii] = nearest_int((x[32 * j + ii] + dm) / dj).clamp(0, 31) as u8;
            }
        }
    }

    let mut qs = [0u8; QK_K / 2];
    let mut qh = [0u8; QK_K / 8];
    let mut m1 = 1u8;
    let mut m2 = 2u8;
    for n in (0..QK_K).step_by(64) {
        let offset = (n / 64) * 32;
        for j in 0..32 {
            let mut l1 = l[n + j];
            if l1 > 15 {
                l1 -= 16;
                qh[j] |= m1;
            }
            let mut l2 = l[n + j + 32];
            if l2 > 15 {
                l2 -= 16;
                qh[j] |= m2;
            }
            qs[offset + j] = l1 | (l2 << 4);
        }
        m1 <<= 2;
        m2 <<= 2;
    }

    BlockQ5K {
        d,
        dmin,
        scales: packed_scales,
        qh,
        qs,
    }
}

/// Dequantize one Q5_K super-block.
pub fn dequantize_block_q5_k(block: &BlockQ5K, out: &mut [f32; QK_K]) {
    let d = block.d.to_f32();
    let dmin = block.dmin.to_f32();

    let mut is = 0usize;
    let mut ql_off = 0usize;
    let mut idx = 0usize;
    let mut u1 = 1u8;
    let mut u2 = 2u8;
    for _ in 0..QK_K / 64 {
        let (sc1, m1) = unpack_scale_min(is, &block.scales);
        let d1 = d * sc1 as f32;
        let dm1 = dmin * m1 as f32;
        let (sc2, m2) = unpack_scale_min(is + 1, &block.scales);
        let d2 = d * sc2 as f32;
        let dm2 = dmin * m2 as f32;

        for l in 0..32 {
            let high = if block.qh[l] & u1 != 0 { 16 } else { 0 };
            out[idx] = d1 * ((block.qs[ql_off + l] & 0x0F) + high) as f32 - dm1;
            idx += 1;
        }
        for l in 0..32 {
            let high = if block.qh[l] & u2 != 0 { 16 } else { 0 };
            out[idx] = d2 * ((block.qs[ql_off + l] >> 4) + high) as f32 - dm2;
            idx += 1;
        }
        ql_off += 32;
        is += 2;
        u1 <<= 2;
        u2 <<= 2;
    }
}

// ---------------------------------------------------------------------------
// Q6_K
// ---------------------------------------------------------------------------

/// Quantize one 256-element super-block to Q6_K.
pub fn quantize_block_q6_k(x: &[f32; QK_K]) -> BlockQ6K {
    let mut l = [0i8; QK_K];
    let mut scales_f = [0.0f32; QK_K / 16];

    let mut max_scale = 0.0f32;
    let mut max_abs_scale = 0.0f32;
    for (ib, chunk) in x.chunks_exact(16).enumerate() {
        let scale = make_qx_quants(32, chunk, &mut l[ib * 16..(ib + 1) * 16]);
        scales_f[ib] = scale;
        if scale.abs() > max_abs_scale {
            max_abs_scale = scale.abs();
            max_scale = scale;
        }
    }

    let mut block = BlockQ6K {
        ql: [0u8; QK_K / 2],
        qh: [0u8; QK_K / 4],
        scales: [0i8; QK_K / 16],
        d: half::f16::from_f32(0.0),
    };
    if max_abs_scale == 0.0 {
        return block;
    }

    let iscale = -128.0f32 / max_scale;
    block.d = half::f16::from_f32(1.0 / iscale);
    for (dst, &scale) in block.scales.iter_mut().zip(scales_f.iter()) {
        *dst = nearest_int(iscale * scale).min(127) as i8;
    }

    for j in 0..QK_K / 16 {
        let dj = block.d.to_f32() * block.scales[j] as f32;
        if dj != 0.0 {
            for ii in 0..16 {
                let li = nearest_int(x[16 * j + ii] / dj).clamp(-32, 31);
                l[16 * j + ii] = (li + 32) as i8;
            }
        }
    }

    for j in (0..QK_K).step_by(128) {
        for idx in 0..32 {
            let q1 = l[j + idx] & 0x0F;
            let q2 = l[j + idx + 32] & 0x0F;
            let q3 = l[j + idx + 64] & 0x0F;
            let q4 = l[j + idx + 96] & 0x0F;
            block.ql[j / 2 + idx] = (q1 | (q3 << 4)) as u8;
            block.ql[j / 2 + idx + 32] = (q2 | (q4 << 4)) as u8;
            block.qh[j / 4 + idx] = ((l[j + idx] >> 4)
                | ((l[j + idx + 32] >> 4) << 2)
                | ((l[j + idx + 64] >> 4) << 4)
                | ((l[j + idx + 96] >> 4) << 6)) as u8;
        }
    }

    block
}

/// Dequantize one Q6_K super-block.
pub fn dequantize_block_q6_k(block: &BlockQ6K, out: &mut [f32; QK_K]) {
    let d = block.d.to_f32();

    let mut ql_off = 0usize;
    let mut qh_off = 0usize;
    let mut sc_off = 0usize;
    let mut out_off = 0usize;
    for _ in 0..2 {
        for l in 0..32 {
            let is = l / 16;
            let q1 =
                ((block.ql[ql_off + l] & 0x0F) | ((block.qh[qh_off + l] & 3) << 4)) as i32 - 32;
            let q2 = ((block.ql[ql_off + l + 32] & 0x0F)
                | (((block.qh[qh_off + l] >> 2) & 3) << 4)) as i32
                - 32;
            let q3 =
                ((block.ql[ql_off + l] >> 4) | (((block.qh[qh_off + l] >> 4) & 3) << 4)) as i32
                    - 32;
            let q4 = ((block.ql[ql_off + l + 32] >> 4)
                | (((block.qh[qh_off + l] >> 6) & 3) << 4)) as i32
                - 32;

            out[out_off + l] = d * block.scales[sc_off + is] as f32 * q1 as f32;
            out[out_off + l + 32] = d * block.scales[sc_off + is + 2] as f32 * q2 as f32;
            out[out_off + l + 64] = d * block.scales[sc_off + is + 4] as f32 * q3 as f32;
            out[out_off + l + 96] = d * block.scales[sc_off + is + 6] as f32 * q4 as f32;
        }
        ql_off += 64;
        qh_off += 32;
        sc_off += 8;
        out_off += 128;
    }
}

// ---------------------------------------------------------------------------
// Q8_K
// ---------------------------------------------------------------------------

/// Quantize one 256-element super-block to Q8_K.
pub fn quantize_block_q8_k(x: &[f32; QK_K]) -> BlockQ8K {
    let mut block = BlockQ8K {
        d: 0.0,
        qs: [0i8; QK_K],
        bsums: [0i16; QK_K / 16],
    };

    let mut amax = 0.0f32;
    let mut max = 0.0f32;
    for &v in x {
        if v.abs() > amax {
            amax = v.abs();
            max = v;
        }
    }
    if amax == 0.0 {
        return block;
    }

    let iscale = -128.0f32 / max;
    for (q, &v) in block.qs.iter_mut().zip(x.iter()) {
        *q = nearest_int(iscale * v).clamp(-128, 127) as i8;
    }
    for (j, sum) in block.bsums.iter_mut().enumerate() {
        let mut s = 0i32;
        for ii in 0..16 {
            s += block.qs[j * 16 + ii] as i32;
        }
        *sum = s as i16;
    }
    block.d = 1.0 / iscale;
    block
}

/// Dequantize one Q8_K super-block.
pub fn dequantize_block_q8_k(block: &BlockQ8K, out: &mut [f32; QK_K]) {
    for (o, &q) in out.iter_mut().zip(block.qs.iter()) {
        *o = block.d * q as f32;
    }
}

// ---------------------------------------------------------------------------
// Row-level wrappers
// ---------------------------------------------------------------------------

macro_rules! row_codec_k {
    ($quantize:ident, $dequantize:ident, $quantize_block:ident, $dequantize_block:ident, $block:ty) => {
        /// Quantize a full row, zero-padding the trailing partial super-block.
        pub fn $quantize(values: &[f32]) -> Vec<u8> {
            let n_blocks = values.len().div_ceil(QK_K);
            let mut out = vec![0u8; n_blocks * <$block>::SIZE];
            for (i, chunk) in values.chunks(QK_K).enumerate() {
                let mut x = [0.0f32; QK_K];
                x[..chunk.len()].copy_from_slice(chunk);
                let block = $quantize_block(&x);
                block.write_to(&mut out[i * <$block>::SIZE..(i + 1) * <$block>::SIZE]);
            }
            out
        }

        /// Decode `n_elements` values, stopping inside the final
        /// super-block when the count is not a multiple of 256.
        pub fn $dequantize(data: &[u8], n_elements: usize) -> Vec<f32> {
            let mut out = Vec::with_capacity(n_elements);
            let mut scratch = [0.0f32; QK_K];
            for chunk in data.chunks_exact(<$block>::SIZE) {
                if out.len() >= n_elements {
                    break;
                }
                let block = <$block>::from_bytes(chunk);
                $dequantize_block(&block, &mut scratch);
                let take = (n_elements - out.len()).min(QK_K);
                out.extend_from_slice(&scratch[..take]);
            }
            out
        }
    };
}

row_codec_k!(
    quantize_q4_k,
    dequantize_q4_k,
    quantize_block_q4_k,
    dequantize_block_q4_k,
    BlockQ4K
);
row_codec_k!(
    quantize_q5_k,
    dequantize_q5_k,
    quantize_block_q5_k,
    dequantize_block_q5_k,
    BlockQ5K
);
row_codec_k!(
    quantize_q6_k,
    dequantize_q6_k,
    quantize_block_q6_k,
    dequantize_block_q6_k,
    BlockQ6K
);
row_codec_k!(
    quantize_q8_k,
    dequantize_q8_k,
    quantize_block_q8_k,
    dequantize_block_q8_k,
    BlockQ8K
);

#[cfg(test)]
mod tests {
    use super::*;

    fn wave(n: usize, amp: f32) -> Vec<f32> {
        (0..n).map(|i| (i as f32 * 0.37).sin() * amp).collect()
    }

    fn max_abs_err(a: &[f32], b: &[f32]) -> f32 {
        a.iter()
            .zip(b.iter())
            .fold(0.0f32, |acc, (&x, &y)| acc.max((x - y).abs()))
    }

    #[test]
    fn test_q4_k_round_trip() {
        let x = wave(QK_K, 2.0);
        let packed = quantize_q4_k(&x);
        assert_eq!(packed.len(), BlockQ4K::SIZE);
        let decoded = dequantize_q4_k(&packed, QK_K);
        assert!(max_abs_err(&x, &decoded) < 2.0 * 0.15);
    }

    #[test]
    fn test_q5_k_round_trip() {
        let x = wave(QK_K, 2.0);
        let packed = quantize_q5_k(&x);
        let decoded = dequantize_q5_k(&packed, QK_K);
        assert!(max_abs_err(&x, &decoded) < 2.0 * 0.08);
    }

    #[test]
    fn test_q6_k_round_trip() {
        let x = wave(QK_K, 2.0);
        let packed = quantize_q6_k(&x);
        let decoded = dequantize_q6_k(&packed, QK_K);
        assert!(max_abs_err(&x, &decoded) < 2.0 * 0.05);
    }

    #[test]
    fn test_q8_k_round_trip() {
        let x = wave(QK_K, 2.0);
        let packed = quantize_q8_k(&x);
        let decoded = dequantize_q8_k(&packed, QK_K);
        assert!(max_abs_err(&x, &decoded) < 2.0 * 0.01);
    }

    #[test]
    fn test_q8_k_bsums_consistent() {
        let x = wave(QK_K, 1.0);
        let mut buf = [0.0f32; QK_K];
        buf.copy_from_slice(&x);
        let block = quantize_block_q8_k(&buf);
        for (j, &sum) in block.bsums.iter().enumerate() {
            let expected: i32 = block.qs[j * 16..(j + 1) * 16]
                .iter()
                .map(|&q| q as i32)
                .sum();
            assert_eq!(sum as i32, expected);
        }
    }

    #[test]
    fn test_zero_super_block() {
        let zeros = vec![0.0f32; QK_K];
        for (packed, n) in [
            (quantize_q4_k(&zeros), QK_K),
            (quantize_q5_k(&zeros), QK_K),
            (quantize_q6_k(&zeros), QK_K),
            (quantize_q8_k(&zeros), QK_K),
        ] {
            let decoded = match packed.len() {
                x if x == BlockQ4K::SIZE => dequantize_q4_k(&packed, n),
                x if x == BlockQ5K::SIZE => dequantize_q5_k(&packed, n),
                x if x == BlockQ6K::SIZE => dequantize_q6_k(&packed, n),
                _ => dequantize_q8_k(&packed, n),
            };
            assert!(decoded.iter().all(|&v| v == 0.0 && !v.is_nan()));
        }
    }

    #[test]
    fn test_partial_super_block() {
        // 300 elements: one full super-block plus 44.
        let x = wave(300, 1.5);
        let packed = quantize_q6_k(&x);
        assert_eq!(packed.len(), 2 * BlockQ6K::SIZE);
        let decoded = dequantize_q6_k(&packed, 300);
        assert_eq!(decoded.len(), 300);
        assert!(max_abs_err(&x, &decoded) < 1.5 * 0.05);
    }

    #[test]
    fn test_q4_k_known_reference_block() {
        // A super-block where sub-block 0 is [0..32) and the rest zero:
        // sub-block 0 gets the only nonzero scale, everything else
        // decodes to a constant -dmin*m (zero when mins are zero).
        let mut x = [0.0f32; QK_K];
        for (i, v) in x.iter_mut().take(32).enumerate() {
            *v = i as f32;
        }
        let block = quantize_block_q4_k(&x);
        let mut out = [0.0f32; QK_K];
        dequantize_block_q4_k(&block, &mut out);
        for i in 0..32 {
            assert!((out[i] - x[i]).abs() <= 31.0 / 15.0 * 0.5 + 0.3, "i={i}");
        }
        for &v in &out[32..] {
            assert!(v.abs() <= 0.3);
        }
    }
}
