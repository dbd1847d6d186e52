//! Benchmarks for overlay compositing.
//!
//! Run with: cargo bench --bench overlay_bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use image::{Rgb, RgbImage};
use ndarray::Array2;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

use plasmo_explain::{composite, ImportanceMap, OverlayConfig, OverlayFormat};

fn synthetic_smear(size: u32, rng: &mut ChaCha8Rng) -> RgbImage {
    RgbImage::from_fn(size, size, |_, _| {
        let base: u8 = rng.gen_range(150..230);
        Rgb([base, base.saturating_sub(40), base.saturating_sub(20)])
    })
}

fn synthetic_map(side: usize, rng: &mut ChaCha8Rng) -> ImportanceMap {
    ImportanceMap::new(Array2::from_shape_fn((side, side), |_| rng.gen::<f32>()))
}

fn bench_composite(c: &mut Criterion) {
    let mut group = c.benchmark_group("composite");
    let mut rng = ChaCha8Rng::seed_from_u64(42);
    let map = synthetic_map(16, &mut rng);

    for size in [128u32, 256, 512] {
        let image = synthetic_smear(size, &mut rng);
        for format in [OverlayFormat::Png, OverlayFormat::Jpeg] {
            let config = OverlayConfig::default().with_format(format);
            group.bench_with_input(
                BenchmarkId::new(format.extension(), size),
                &image,
                |b, image| b.iter(|| composite(black_box(image), black_box(&map), &config)),
            );
        }
    }

    group.finish();
}

criterion_group!(benches, bench_composite);
criterion_main!(benches);
