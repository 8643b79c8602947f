use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use jdelta::engine::{self, DiffOptions};
use jdelta::jdf::patcher;

fn gen_data(size: usize, seed: u64) -> Vec<u8> {
    let mut s = seed | 1;
    let mut out = Vec::with_capacity(size);
    for _ in 0..size {
        s = s.wrapping_mul(6364136223846793005).wrapping_add(1);
        out.push((s >> 33) as u8);
    }
    out
}

fn mutate(base: &[u8], stride: usize) -> Vec<u8> {
    let mut out = base.to_vec();
    for i in (0..out.len()).step_by(stride.max(1)) {
        out[i] = out[i].wrapping_add(1);
    }
    out
}

fn opts() -> DiffOptions {
    DiffOptions {
        index_size: 8 * 1024 * 1024,
        ..DiffOptions::default()
    }
}

fn bench_diff_speed(c: &mut Criterion) {
    let mut g = c.benchmark_group("diff_speed");
    for size in [64 * 1024usize, 1024 * 1024, 4 * 1024 * 1024] {
        let source = gen_data(size, 1);
        let dest = mutate(&source, 4096);
        g.throughput(Throughput::Bytes(size as u64));
        g.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| {
                let patch =
                    engine::diff_bytes(black_box(&source), black_box(&dest), &opts()).unwrap();
                black_box(patch);
            });
        });
    }
    g.finish();
}

fn bench_apply_speed(c: &mut Criterion) {
    let mut g = c.benchmark_group("apply_speed");
    for size in [64 * 1024usize, 1024 * 1024, 4 * 1024 * 1024] {
        let source = gen_data(size, 2);
        let dest = mutate(&source, 4096);
        let patch = engine::diff_bytes(&source, &dest, &opts()).unwrap();
        g.throughput(Throughput::Bytes(size as u64));
        g.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| {
                let out = patcher::apply_bytes(black_box(&source), black_box(&patch)).unwrap();
                black_box(out);
            });
        });
    }
    g.finish();
}

fn bench_dissimilar_inputs(c: &mut Criterion) {
    // Worst case for the search: nothing ever matches.
    let mut g = c.benchmark_group("diff_dissimilar");
    let source = gen_data(256 * 1024, 3);
    let dest = gen_data(256 * 1024, 4);
    g.throughput(Throughput::Bytes(source.len() as u64));
    g.bench_function("256k_vs_256k", |b| {
        b.iter(|| {
            let patch = engine::diff_bytes(black_box(&source), black_box(&dest), &opts()).unwrap();
            black_box(patch);
        });
    });
    g.finish();
}

criterion_group!(
    benches,
    bench_diff_speed,
    bench_apply_speed,
    bench_dissimilar_inputs
);
criterion_main!(benches);
