//! Fused matrix multiply over compressed weights
//!
//! Computes `C[M×N] = A[M×K] × B[K×N]` where `A` and `C` are f32 and `B`
//! stays in its block representation throughout: each kernel unpacks one
//! block into a fixed stack scratch buffer, multiply-accumulates against
//! the matching slice of `A`, and moves on. `B` is a [`QuantizedTensor`]
//! of shape `[n, k]`, one quantized row per output column.
//!
//! Accumulation over `k` is sequential within every output element, so
//! results are identical run to run at any thread count; the `parallel`
//! feature only partitions independent output elements across rayon
//! workers.

use crate::blocks::{
    BlockQ4K, BlockQ4_0, BlockQ4_1, BlockQ5K, BlockQ5_0, BlockQ5_1, BlockQ6K, BlockQ8K,
    BlockQ8_0, QK, QK_K,
};
use crate::codec::basic::{
    dequantize_block_q4_0, dequantize_block_q4_1, dequantize_block_q5_0, dequantize_block_q5_1,
    dequantize_block_q8_0,
};
use crate::codec::kquant::{
    dequantize_block_q4_k, dequantize_block_q5_k, dequantize_block_q6_k, dequantize_block_q8_k,
    quantize_block_q8_k,
};
use crate::error::{QuantError, Result};
use crate::scales::unpack_all;
use crate::scheme::Scheme;
use crate::tensor::QuantizedTensor;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Fused multiply: `out[M×N] = a[M×K] × weight[K×N]`.
///
/// `weight` must have shape `[n, k]`. `a` is row-major `[m, k]`, `out`
/// row-major `[m, n]`. The weight matrix is never materialized in full
/// precision; scratch is one block per call frame.
pub fn fused_matmul(
    a: &[f32],
    weight: &QuantizedTensor,
    out: &mut [f32],
    m: usize,
    k: usize,
    n: usize,
) -> Result<()> {
    validate_operands(a, weight, out, m, k, n)?;

    let scheme = weight.scheme();
    for i in 0..m {
        let a_row = &a[i * k..(i + 1) * k];
        let out_row = &mut out[i * n..(i + 1) * n];

        #[cfg(feature = "parallel")]
        out_row
            .par_iter_mut()
            .with_min_len(8)
            .enumerate()
            .for_each(|(j, o)| {
                *o = fused_dot(scheme, weight.row_data(j), a_row);
            });

        #[cfg(not(feature = "parallel"))]
        for (j, o) in out_row.iter_mut().enumerate() {
            *o = fused_dot(scheme, weight.row_data(j), a_row);
        }
    }
    Ok(())
}

/// Single-activation-row convenience: `out[N] = a[K] × weight[K×N]`.
pub fn fused_matmul_row(
    a: &[f32],
    weight: &QuantizedTensor,
    out: &mut [f32],
    k: usize,
    n: usize,
) -> Result<()> {
    fused_matmul(a, weight, out, 1, k, n)
}

/// Fused multiply with Q8_K-quantized activations.
///
/// Quantizes each row of `a` to Q8_K once, then computes integer dot
/// products against Q4_K or Q6_K weight blocks using the pre-computed
/// sub-block sums. Trades one extra activation rounding step for
/// integer-domain inner loops; output stays within the fused-kernel
/// tolerance contract. Requires `k` to be a multiple of 256.
pub fn fused_matmul_q8k(
    a: &[f32],
    weight: &QuantizedTensor,
    out: &mut [f32],
    m: usize,
    k: usize,
    n: usize,
) -> Result<()> {
    validate_operands(a, weight, out, m, k, n)?;
    let scheme = weight.scheme();
    if !matches!(scheme, Scheme::Q4_K | Scheme::Q6_K) {
        return Err(QuantError::DimensionMismatch(format!(
            "q8k activation path supports Q4_K/Q6_K weights, got {scheme}"
        )));
    }
    if k % QK_K != 0 {
        return Err(QuantError::DimensionMismatch(format!(
            "q8k activation path requires k divisible by {QK_K}, got {k}"
        )));
    }

    let blocks_per_row = k / QK_K;
    let mut a8: Vec<BlockQ8K> = Vec::with_capacity(blocks_per_row);
    for i in 0..m {
        let a_row = &a[i * k..(i + 1) * k];
        a8.clear();
        for chunk in a_row.chunks_exact(QK_K) {
            let mut buf = [0.0f32; QK_K];
            buf.copy_from_slice(chunk);
            a8.push(quantize_block_q8_k(&buf));
        }

        let out_row = &mut out[i * n..(i + 1) * n];
        let a8 = &a8[..];

        #[cfg(feature = "parallel")]
        out_row
            .par_iter_mut()
            .with_min_len(8)
            .enumerate()
            .for_each(|(j, o)| {
                *o = match scheme {
                    Scheme::Q4_K => dot_q4_k_q8_k(weight.row_data(j), a8),
                    _ => dot_q6_k_q8_k(weight.row_data(j), a8),
                };
            });

        #[cfg(not(feature = "parallel"))]
        for (j, o) in out_row.iter_mut().enumerate() {
            *o = match scheme {
                Scheme::Q4_K => dot_q4_k_q8_k(weight.row_data(j), a8),
                _ => dot_q6_k_q8_k(weight.row_data(j), a8),
            };
        }
    }
    Ok(())
}

fn validate_operands(
    a: &[f32],
    weight: &QuantizedTensor,
    out: &[f32],
    m: usize,
    k: usize,
    n: usize,
) -> Result<()> {
    if weight.dims() != [n, k].as_slice() {
        return Err(QuantError::DimensionMismatch(format!(
            "weight shape {:?} does not match [n, k] = [{n}, {k}]",
            weight.dims()
        )));
    }
    if a.len() != m * k {
        return Err(QuantError::DimensionMismatch(format!(
            "activation length {} does not match m*k = {}",
            a.len(),
            m * k
        )));
    }
    if out.len() < m * n {
        return Err(QuantError::BufferTooSmall {
            needed: m * n,
            available: out.len(),
        });
    }
    Ok(())
}

macro_rules! block_dot {
    ($block:ty, $deq:path, $bs:expr, $row:expr, $a:expr) => {{
        let mut acc = 0.0f32;
        let mut scratch = [0.0f32; $bs];
        let mut pos = 0usize;
        for chunk in $row.chunks_exact(<$block>::SIZE) {
            if pos >= $a.len() {
                break;
            }
            let block = <$block>::from_bytes(chunk);
            $deq(&block, &mut scratch);
            let take = ($a.len() - pos).min($bs);
            for i in 0..take {
                acc += scratch[i] * $a[pos + i];
            }
            pos += take;
        }
        acc
    }};
}

/// Dot product of one quantized weight row against an f32 activation
/// slice, unpacking one block at a time.
pub fn fused_dot(scheme: Scheme, row: &[u8], a: &[f32]) -> f32 {
    match scheme {
        Scheme::F32 => {
            let mut acc = 0.0f32;
            for (chunk, &x) in row.chunks_exact(4).zip(a.iter()) {
                acc += f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]) * x;
            }
            acc
        }
        Scheme::F16 => {
            let mut acc = 0.0f32;
            for (chunk, &x) in row.chunks_exact(2).zip(a.iter()) {
                acc += half::f16::from_le_bytes([chunk[0], chunk[1]]).to_f32() * x;
            }
            acc
        }
        Scheme::Q4_0 => block_dot!(BlockQ4_0, dequantize_block_q4_0, QK, row, a),
        Scheme::Q4_1 => block_dot!(BlockQ4_1, dequantize_block_q4_1, QK, row, a),
        Scheme::Q5_0 => block_dot!(BlockQ5_0, dequantize_block_q5_0, QK, row, a),
        Scheme::Q5_1 => block_dot!(BlockQ5_1, dequantize_block_q5_1, QK, row, a),
        Scheme::Q8_0 => block_dot!(BlockQ8_0, dequantize_block_q8_0, QK, row, a),
        Scheme::Q4_K => block_dot!(BlockQ4K, dequantize_block_q4_k, QK_K, row, a),
        Scheme::Q5_K => block_dot!(BlockQ5K, dequantize_block_q5_k, QK_K, row, a),
        Scheme::Q6_K => block_dot!(BlockQ6K, dequantize_block_q6_k, QK_K, row, a),
        Scheme::Q8_K => block_dot!(BlockQ8K, dequantize_block_q8_k, QK_K, row, a),
    }
}

fn dot_q4_k_q8_k(row: &[u8], a8: &[BlockQ8K]) -> f32 {
    let mut acc = 0.0f32;
    for (wchunk, ablk) in row.chunks_exact(BlockQ4K::SIZE).zip(a8.iter()) {
        let w = BlockQ4K::from_bytes(wchunk);
        let d = w.d.to_f32() * ablk.d;
        let dmin = w.dmin.to_f32() * ablk.d;
        let (scs, mns) = unpack_all(&w.scales);

        let mut q_off = 0usize;
        let mut idx = 0usize;
        for pair in 0..QK_K / 64 {
            let is = pair * 2;
            let mut s1 = 0i32;
            let mut s2 = 0i32;
            for l in 0..32 {
                s1 += (w.qs[q_off + l] & 0x0F) as i32 * ablk.qs[idx + l] as i32;
                s2 += (w.qs[q_off + l] >> 4) as i32 * ablk.qs[idx + 32 + l] as i32;
            }
            acc += d * (scs[is] as f32 * s1 as f32 + scs[is + 1] as f32 * s2 as f32);

            let b1 = (ablk.bsums[2 * is] + ablk.bsums[2 * is + 1]) as i32;
            let b2 = (ablk.bsums[2 * is + 2] + ablk.bsums[2 * is + 3]) as i32;
            acc -= dmin * (mns[is] as f32 * b1 as f32 + mns[is + 1] as f32 * b2 as f32);

            q_off += 32;
            idx += 64;
        }
    }
    acc
}

fn dot_q6_k_q8_k(row: &[u8], a8: &[BlockQ8K]) -> f32 {
    let mut acc = 0.0f32;
    for (wchunk, ablk) in row.chunks_exact(BlockQ6K::SIZE).zip(a8.iter()) {
        let w = BlockQ6K::from_bytes(wchunk);
        let d = w.d.to_f32() * ablk.d;

        let mut sums = [0i32; QK_K / 16];
        let mut ql_off = 0usize;
        let mut qh_off = 0usize;
        let mut sc_off = 0usize;
        let mut out_off = 0usize;
        for _ in 0..2 {
            for l in 0..32 {
                let is = l / 16;
                let q1 = ((w.ql[ql_off + l] & 0x0F) | ((w.qh[qh_off + l] & 3) << 4)) as i32 - 32;
                let q2 = ((w.ql[ql_off + l + 32] & 0x0F)
                    | (((w.qh[qh_off + l] >> 2) & 3) << 4)) as i32
                    - 32;
                let q3 = ((w.ql[ql_off + l] >> 4) | (((w.qh[qh_off + l] >> 4) & 3) << 4)) as i32
                    - 32;
                let q4 = ((w.ql[ql_off + l + 32] >> 4) | (((w.qh[qh_off + l] >> 6) & 3) << 4))
                    as i32
                    - 32;

                sums[sc_off + is] += q1 * ablk.qs[out_off + l] as i32;
                sums[sc_off + is + 2] += q2 * ablk.qs[out_off + l + 32] as i32;
                sums[sc_off + is + 4] += q3 * ablk.qs[out_off + l + 64] as i32;
                sums[sc_off + is + 6] += q4 * ablk.qs[out_off + l + 96] as i32;
            }
            ql_off += 64;
            qh_off += 32;
            sc_off += 8;
            out_off += 128;
        }

        for (t, &s) in sums.iter().enumerate() {
            acc += d * w.scales[t] as f32 * s as f32;
        }
    }
    acc
}
