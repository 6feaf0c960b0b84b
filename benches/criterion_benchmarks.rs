use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use fwpatch::codec::heatshrink;
use fwpatch::codec::{BsdiffHeatshrink, DeltaCodec};
use fwpatch::config::{self, CompressionConfig};
use fwpatch::report::NullReporter;
use fwpatch::search::{self, SearchOptions};
use std::fs;
use std::path::Path;

fn gen_data(size: usize, seed: u64) -> Vec<u8> {
    // Firmware-like: short repeated instruction patterns with sparse noise.
    let mut s = seed;
    let mut out = Vec::with_capacity(size);
    for i in 0..size {
        s = s.wrapping_mul(6364136223846793005).wrapping_add(1);
        let noise = (s >> 33) as u8;
        out.push(if noise < 64 { noise } else { (i % 61) as u8 });
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

fn write_ratio_snapshot() {
    let source = gen_data(256 * 1024, 123);
    let target = mutate(&source, 4096);
    let mut csv = String::from("window_exp,lookahead_exp,patch_bytes,target_bytes,ratio\n");
    for cfg in config::grid(config::DEFAULT_MAX_WINDOW_EXP) {
        let patch = BsdiffHeatshrink.diff(&source, &target, cfg).unwrap();
        let ratio = patch.len() as f64 / target.len() as f64;
        csv.push_str(&format!(
            "{},{},{},{},{}\n",
            cfg.window_exp,
            cfg.lookahead_exp,
            patch.len(),
            target.len(),
            ratio
        ));
    }
    let out_dir = Path::new("target/criterion/custom_reports");
    let _ = fs::create_dir_all(out_dir);
    let _ = fs::write(out_dir.join("ratio_snapshot.csv"), csv);
}

fn bench_diff_speed(c: &mut Criterion) {
    let mut g = c.benchmark_group("diff_speed_mb_s");
    let cfg = CompressionConfig::new(10, 4);
    for size in [64 * 1024usize, 512 * 1024, 2 * 1024 * 1024] {
        let source = gen_data(size, 1);
        let target = mutate(&source, 1024);
        g.throughput(Throughput::Bytes(size as u64));
        g.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| {
                let patch = BsdiffHeatshrink
                    .diff(black_box(&source), black_box(&target), cfg)
                    .unwrap();
                black_box(patch);
            });
        });
    }
    g.finish();
}

fn bench_apply_speed(c: &mut Criterion) {
    let mut g = c.benchmark_group("apply_speed_vs_patch");
    let cfg = CompressionConfig::new(10, 4);
    for size in [64 * 1024usize, 512 * 1024, 2 * 1024 * 1024] {
        let source = gen_data(size, 2);
        let target = mutate(&source, 2048);
        let patch = BsdiffHeatshrink.diff(&source, &target, cfg).unwrap();
        g.throughput(Throughput::Bytes(target.len() as u64));
        g.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| {
                let out = BsdiffHeatshrink
                    .apply(black_box(&source), black_box(&patch), cfg)
                    .unwrap();
                black_box(out);
            });
        });
    }
    g.finish();
}

fn bench_heatshrink_window(c: &mut Criterion) {
    let mut g = c.benchmark_group("heatshrink_compress_vs_window");
    let data = gen_data(256 * 1024, 3);
    g.throughput(Throughput::Bytes(data.len() as u64));
    for window in [4u8, 8, 12, 15] {
        g.bench_with_input(BenchmarkId::from_parameter(window), &window, |b, &w| {
            b.iter(|| {
                let packed = heatshrink::compress(black_box(&data), w, 3).unwrap();
                black_box(packed);
            });
        });
    }
    g.finish();
}

fn bench_search(c: &mut Criterion) {
    write_ratio_snapshot();
    let mut g = c.benchmark_group("configuration_search");
    g.sample_size(10);
    let source = gen_data(128 * 1024, 4);
    let target = mutate(&source, 4096);
    for parallel in [false, true] {
        let options = SearchOptions {
            parallel,
            ..SearchOptions::default()
        };
        let name = if parallel { "parallel" } else { "sequential" };
        g.bench_function(name, |b| {
            b.iter(|| {
                let outcome =
                    search::search(&BsdiffHeatshrink, &source, &target, &options, &mut NullReporter)
                        .unwrap();
                black_box(outcome);
            });
        });
    }
    g.finish();
}

criterion_group!(
    benches,
    bench_diff_speed,
    bench_apply_speed,
    bench_heatshrink_window,
    bench_search
);
criterion_main!(benches);
