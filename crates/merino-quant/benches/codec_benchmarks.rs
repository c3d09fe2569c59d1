//! Criterion benchmarks for the block codecs and fused kernels

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use merino_quant::{codec, fused_matmul, QuantizedTensor, Scheme};

fn bench_dequantize(c: &mut Criterion) {
    let values: Vec<f32> = (0..4096).map(|i| ((i as f32) * 0.11).sin()).collect();

    let mut group = c.benchmark_group("dequantize_4k");
    for scheme in [Scheme::Q4_0, Scheme::Q8_0, Scheme::Q4_K, Scheme::Q6_K] {
        let packed = codec::quantize(scheme, &values);
        group.bench_function(scheme.name(), |b| {
            b.iter(|| codec::dequantize(scheme, black_box(&packed), values.len()).unwrap())
        });
    }
    group.finish();
}

fn bench_fused_matmul(c: &mut Criterion) {
    let (k, n) = (1024, 256);
    let a: Vec<f32> = (0..k).map(|i| ((i as f32) * 0.07).cos()).collect();
    let b_vals: Vec<f32> = (0..n * k).map(|i| ((i as f32) * 0.03).sin()).collect();

    let mut group = c.benchmark_group("fused_gemv_1024x256");
    for scheme in [Scheme::Q4_0, Scheme::Q8_0, Scheme::Q4_K, Scheme::Q6_K] {
        let weight = QuantizedTensor::quantize(&b_vals, &[n, k], scheme).unwrap();
        group.bench_function(scheme.name(), |bench| {
            bench.iter(|| {
                let mut out = vec![0.0f32; n];
                fused_matmul(black_box(&a), &weight, &mut out, 1, k, n).unwrap();
                out
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_dequantize, bench_fused_matmul);
criterion_main!(benches);
