//! Performance benchmarks for quantization and quantized contractions.
//!
//! Compares integer-accumulated matmul against the float reference and
//! measures the cost of clipping-bound search per channel count.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use cuantizar::config::{Calibration, SearchConfig};
use cuantizar::operations::einsum;
use cuantizar::{quantize_tensor, quantized_matmul, search_bound, ErrorMetric, QuantizationConfig};
use ndarray::{ArrayD, IxDyn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn random(shape: &[usize], seed: u64) -> ArrayD<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    ArrayD::from_shape_simple_fn(IxDyn(shape), || rng.gen_range(-1.0f32..1.0))
}

/// Benchmark quantized matmul against float einsum
fn bench_matmul(c: &mut Criterion) {
    let mut group = c.benchmark_group("Matmul");
    let config = QuantizationConfig::symmetric(8).expect("valid config");

    for size in [32usize, 128, 256].iter() {
        let a = random(&[*size, *size], 1);
        let b = random(&[*size, *size], 2);
        let qa = quantize_tensor(a.view(), &config).expect("quantize lhs");
        let qb = quantize_tensor(b.view(), &config).expect("quantize rhs");

        group.throughput(Throughput::Elements((size * size * size) as u64));
        group.bench_with_input(BenchmarkId::new("quantized", size), size, |bench, _| {
            bench.iter(|| black_box(quantized_matmul(&qa, &qb)))
        });
        group.bench_with_input(BenchmarkId::new("float", size), size, |bench, _| {
            bench.iter(|| black_box(einsum("ij,jk->ik", a.view(), b.view())))
        });
    }
    group.finish();
}

/// Benchmark quantization with max-abs calibration
fn bench_quantize(c: &mut Criterion) {
    let mut group = c.benchmark_group("Quantize");

    for channels in [1usize, 64, 512].iter() {
        let t = random(&[*channels, 1024], 3);
        let config = QuantizationConfig::builder(8)
            .per_channel(0)
            .build()
            .expect("valid config");
        group.throughput(Throughput::Elements((channels * 1024) as u64));
        group.bench_with_input(BenchmarkId::new("per_channel", channels), channels, |bench, _| {
            bench.iter(|| black_box(quantize_tensor(t.view(), &config)))
        });
    }
    group.finish();
}

/// Benchmark the clipping-bound search
fn bench_search(c: &mut Criterion) {
    let mut group = c.benchmark_group("SearchBound");
    group.sample_size(20);

    for channels in [1usize, 16, 128].iter() {
        let t = random(&[*channels, 512], 4);
        let config = QuantizationConfig::builder(4)
            .per_channel(0)
            .calibration(Calibration::Search(SearchConfig::default()))
            .build()
            .expect("valid config");
        group.bench_with_input(BenchmarkId::new("mse", channels), channels, |bench, _| {
            bench.iter(|| black_box(search_bound(t.view(), &config, ErrorMetric::Mse)))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_matmul, bench_quantize, bench_search);
criterion_main!(benches);
