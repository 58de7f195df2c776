use auralis_dsp::chroma::chroma_cqt;
use auralis_dsp::compressor::{compress, CompressorConfig, DetectionMode};
use auralis_dsp::hpss::{hpss, HpssConfig};
use auralis_dsp::limiter::{limit, LimiterConfig};
use auralis_dsp::yin::yin;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::f64::consts::PI;

fn sine(freq: f64, sr: usize, n: usize) -> Vec<f64> {
    (0..n)
        .map(|i| (2.0 * PI * freq * i as f64 / sr as f64).sin() * 0.5)
        .collect()
}

fn bench_hpss(c: &mut Criterion) {
    let audio = sine(440.0, 44100, 44100 * 5);
    let config = HpssConfig::default();
    c.bench_function("hpss_5s", |b| b.iter(|| hpss(black_box(&audio), &config).unwrap()));
}

fn bench_yin(c: &mut Criterion) {
    let audio = sine(220.0, 44100, 44100 * 5);
    c.bench_function("yin_5s", |b| b.iter(|| yin(black_box(&audio), 44100, 80.0, 1000.0)));
}

fn bench_chroma(c: &mut Criterion) {
    let audio = sine(440.0, 44100, 44100 * 5);
    c.bench_function("chroma_cqt_5s", |b| b.iter(|| chroma_cqt(black_box(&audio), 44100)));
}

fn bench_compressor(c: &mut Criterion) {
    let audio = sine(440.0, 44100, 44100);
    let config = CompressorConfig::default();
    c.bench_function("compressor_1s", |b| {
        b.iter(|| compress(black_box(&audio), &config, DetectionMode::Hybrid))
    });
}

fn bench_limiter(c: &mut Criterion) {
    let audio = sine(440.0, 44100, 44100);
    let config = LimiterConfig::default();
    c.bench_function("limiter_1s", |b| b.iter(|| limit(black_box(&audio), &config)));
}

criterion_group!(benches, bench_hpss, bench_yin, bench_chroma, bench_compressor, bench_limiter);
criterion_main!(benches);
