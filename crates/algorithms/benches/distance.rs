//! Benchmarks for distance transforms

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use distmap_algorithms::distance::{distance_raster, euclidean_distance, DistanceParams};
use distmap_core::{GeoTransform, PixelSpacing, Raster};
use ndarray::Array2;

/// Binary grid with a meandering river and scattered point features
fn create_binary(size: usize) -> Array2<u8> {
    Array2::from_shape_fn((size, size), |(row, col)| {
        let center = size as f64 / 2.0 + (row as f64 / 17.0).sin() * size as f64 / 6.0;
        let on_river = (col as f64 - center).abs() < 1.5;
        let point = (row * 31 + col * 7) % 997 == 0;
        if on_river || point {
            0
        } else {
            1
        }
    })
}

fn bench_in_memory(c: &mut Criterion) {
    let mut group = c.benchmark_group("distance/in_memory");
    for size in [256, 512, 1024, 2048] {
        let binary = create_binary(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| euclidean_distance(black_box(binary.view()), PixelSpacing::new(30.0, 30.0)).unwrap())
        });
    }
    group.finish();
}

fn bench_strategies(c: &mut Criterion) {
    let size = 1024;
    let mut raster = Raster::from_array(create_binary(size).mapv(|b| 1 - b));
    raster.set_transform(GeoTransform::new(0.0, size as f64 * 30.0, 30.0, -30.0));

    let mut group = c.benchmark_group("distance/strategy");
    group.sample_size(10);
    group.bench_function("whole_grid", |b| {
        b.iter(|| distance_raster(black_box(&raster), &DistanceParams::default()).unwrap())
    });
    for tile_size in [256, 512] {
        let params = DistanceParams {
            tile_size,
            tile_padding: 128,
            ..Default::default()
        };
        group.bench_with_input(BenchmarkId::new("tiled", tile_size), &tile_size, |b, _| {
            b.iter(|| distance_raster(black_box(&raster), &params).unwrap())
        });
    }
    group.finish();
}

criterion_group!(benches, bench_in_memory, bench_strategies);
criterion_main!(benches);
