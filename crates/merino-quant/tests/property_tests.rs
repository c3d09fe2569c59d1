//! Property-based tests for the block codecs and fused kernels
//!
//! These tests use proptest to generate random inputs and verify the
//! round-trip error bounds and fused-kernel equivalence that the codecs
//! guarantee.

use proptest::prelude::*;
use merino_quant::codec;
use merino_quant::scales::{pack_scale_min, unpack_scale_min};
use merino_quant::{fused_matmul, QuantizedTensor, Scheme};

prop_compose! {
    fn arb_values(max_len: usize)(
        data in prop::collection::vec(-8.0f32..8.0f32, 1..=max_len)
    ) -> Vec<f32> {
        data
    }
}

prop_compose! {
    fn arb_scale_mins()(
        sc in prop::array::uniform8(0u8..64),
        mn in prop::array::uniform8(0u8..64)
    ) -> ([u8; 8], [u8; 8]) {
        (sc, mn)
    }
}

fn amax(values: &[f32]) -> f32 {
    values.iter().fold(0.0f32, |a, v| a.max(v.abs()))
}

proptest! {
    /// Packed 6-bit scale/min pairs survive pack → unpack in every slot.
    #[test]
    fn prop_scale_pack_unpack_identity((sc, mn) in arb_scale_mins()) {
        let packed = pack_scale_min(&sc, &mn);
        for j in 0..8 {
            prop_assert_eq!(unpack_scale_min(j, &packed), (sc[j], mn[j]));
        }
    }

    /// Q8_0 round-trip stays within half a quantization step per block.
    #[test]
    fn prop_q8_0_round_trip(values in arb_values(200)) {
        let packed = codec::quantize(Scheme::Q8_0, &values);
        let decoded = codec::dequantize(Scheme::Q8_0, &packed, values.len()).unwrap();
        prop_assert_eq!(decoded.len(), values.len());
        for (block_orig, block_dec) in values.chunks(32).zip(decoded.chunks(32)) {
            let step = amax(block_orig) / 127.0;
            for (&o, &d) in block_orig.iter().zip(block_dec.iter()) {
                prop_assert!((o - d).abs() <= step * 0.5 + step * 0.1 + 1e-6);
            }
        }
    }

    /// Q4_0 round-trip stays within a step of the block's max magnitude.
    #[test]
    fn prop_q4_0_round_trip(values in arb_values(200)) {
        let packed = codec::quantize(Scheme::Q4_0, &values);
        let decoded = codec::dequantize(Scheme::Q4_0, &packed, values.len()).unwrap();
        for (block_orig, block_dec) in values.chunks(32).zip(decoded.chunks(32)) {
            let step = amax(block_orig) / 8.0;
            for (&o, &d) in block_orig.iter().zip(block_dec.iter()) {
                prop_assert!((o - d).abs() <= step * 0.5 + step * 0.05 + 1e-6);
            }
        }
    }

    /// Asymmetric Q4_1 error is bounded by the block's value range.
    #[test]
    fn prop_q4_1_round_trip(values in arb_values(200)) {
        let packed = codec::quantize(Scheme::Q4_1, &values);
        let decoded = codec::dequantize(Scheme::Q4_1, &packed, values.len()).unwrap();
        for (block_orig, block_dec) in values.chunks(32).zip(decoded.chunks(32)) {
            let min = block_orig.iter().fold(f32::INFINITY, |a, &v| a.min(v));
            let max = block_orig.iter().fold(f32::NEG_INFINITY, |a, &v| a.max(v));
            let step = (max - min) / 15.0;
            for (&o, &d) in block_orig.iter().zip(block_dec.iter()) {
                prop_assert!((o - d).abs() <= step * 0.5 + (max - min) * 0.02 + 1e-5);
            }
        }
    }

    /// K-quant super-block round-trips stay within their per-bit bounds.
    #[test]
    fn prop_kquant_round_trip(values in prop::collection::vec(-4.0f32..4.0f32, 1..600)) {
        let a = amax(&values);
        for (scheme, rel_bound) in [
            (Scheme::Q4_K, 0.20),
            (Scheme::Q5_K, 0.10),
            (Scheme::Q6_K, 0.06),
            (Scheme::Q8_K, 0.02),
        ] {
            let packed = codec::quantize(scheme, &values);
            let decoded = codec::dequantize(scheme, &packed, values.len()).unwrap();
            prop_assert_eq!(decoded.len(), values.len());
            for (&o, &d) in values.iter().zip(decoded.iter()) {
                prop_assert!(
                    (o - d).abs() <= a * rel_bound + 1e-6,
                    "{} error {} exceeds {}", scheme, (o - d).abs(), a * rel_bound
                );
            }
        }
    }

    /// Fused matmul equals matmul over fully dequantized weights, with
    /// tolerance scaling as sqrt(k).
    #[test]
    fn prop_fused_equivalence(
        k_blocks in 1usize..4,
        n in 1usize..6,
        seed in 0u64..1000
    ) {
        let k = k_blocks * 64;
        let gen = |i: usize| (((i as u64).wrapping_mul(seed + 7) % 101) as f32 / 50.5) - 1.0;
        let a: Vec<f32> = (0..k).map(gen).collect();
        let b: Vec<f32> = (0..n * k).map(|i| gen(i + 13)).collect();

        for scheme in [Scheme::Q4_0, Scheme::Q8_0, Scheme::Q4_K, Scheme::Q6_K] {
            let weight = QuantizedTensor::quantize(&b, &[n, k], scheme).unwrap();
            let b_deq = weight.dequantize().unwrap();

            let mut reference = vec![0.0f32; n];
            for j in 0..n {
                let mut acc = 0.0f32;
                for p in 0..k {
                    acc += a[p] * b_deq[j * k + p];
                }
                reference[j] = acc;
            }

            let mut fused = vec![0.0f32; n];
            fused_matmul(&a, &weight, &mut fused, 1, k, n).unwrap();

            let tol = 1e-5 * (k as f32).sqrt() * 16.0;
            for (j, (&f, &r)) in fused.iter().zip(reference.iter()).enumerate() {
                prop_assert!(
                    (f - r).abs() <= tol.max(r.abs() * 1e-3),
                    "{} col {}: {} vs {}", scheme, j, f, r
                );
            }
        }
    }

    /// Decoding never reads past the declared element count.
    #[test]
    fn prop_partial_block_exact_count(n in 1usize..300) {
        let values: Vec<f32> = (0..n).map(|i| i as f32 * 0.01).collect();
        for &scheme in Scheme::all() {
            let packed = codec::quantize(scheme, &values);
            let decoded = codec::dequantize(scheme, &packed, n).unwrap();
            prop_assert_eq!(decoded.len(), n);
        }
    }
}

#[test]
fn test_f32_passthrough_exact() {
    let values: Vec<f32> = (0..64).map(|i| (i as f32) * 0.5 - 16.0).collect();
    let packed = codec::quantize(Scheme::F32, &values);
    let decoded = codec::dequantize(Scheme::F32, &packed, values.len()).unwrap();
    for (&o, &d) in values.iter().zip(decoded.iter()) {
        approx::assert_abs_diff_eq!(o, d);
    }
}

#[test]
fn test_reference_scenario_8bit_ramp() {
    // Quantize [0.0, 1.0, ..., 255.0] with the 8-bit symmetric scheme at
    // block size 32: the first block's scale is 31/127 and its max
    // absolute error is at most half that step.
    let values: Vec<f32> = (0..256).map(|i| i as f32).collect();
    let packed = codec::quantize(Scheme::Q8_0, &values);

    let d = half::f16::from_le_bytes([packed[0], packed[1]]).to_f32();
    let expected = 31.0 / 127.0;
    assert!(
        (d - expected).abs() <= expected * 0.01,
        "first block scale {d}, expected {expected}"
    );

    let decoded = codec::dequantize(Scheme::Q8_0, &packed, 256).unwrap();
    for (i, (&o, &dec)) in values.iter().take(32).zip(decoded.iter()).enumerate() {
        assert!(
            (o - dec).abs() <= expected * 0.5 + 1e-3,
            "element {i}: {o} vs {dec}"
        );
    }
}
