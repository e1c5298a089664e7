//! PDF Assembly Benchmarks
//!
//! Decode-and-write cost for typical upload batches, plus identifier
//! generation.
//!
//! Run with: `cargo bench --bench assembly`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::io::Cursor;
use std::time::Duration;

use image::{DynamicImage, ImageFormat, Rgb, RgbImage, Rgba, RgbaImage};
use pdfdrop_server::pdf::Assembler;
use pdfdrop_server::storage::ArtifactId;
use pdfdrop_server::upload::ImageKind;

fn encode(image: DynamicImage, format: ImageFormat) -> Vec<u8> {
    let mut cursor = Cursor::new(Vec::new());
    image
        .write_to(&mut cursor, format)
        .expect("Failed to encode fixture");
    cursor.into_inner()
}

/// Gradient photo-like JPEG
fn create_jpeg(width: u32, height: u32) -> Vec<u8> {
    let image = RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
    });
    encode(DynamicImage::ImageRgb8(image), ImageFormat::Jpeg)
}

/// Screenshot-like PNG with an alpha channel
fn create_png(width: u32, height: u32) -> Vec<u8> {
    let image = RgbaImage::from_fn(width, height, |x, y| {
        Rgba([(x % 256) as u8, 64, (y % 256) as u8, if x % 7 == 0 { 128 } else { 255 }])
    });
    encode(DynamicImage::ImageRgba8(image), ImageFormat::Png)
}

/// Benchmark single-image documents by format
fn bench_single_page(c: &mut Criterion) {
    let assembler = Assembler::new();
    let jpeg = create_jpeg(1024, 768);
    let png = create_png(1024, 768);

    let mut group = c.benchmark_group("single_page");
    group.measurement_time(Duration::from_secs(10));

    for (name, kind, data) in [("jpeg", ImageKind::Jpeg, &jpeg), ("png", ImageKind::Png, &png)] {
        group.throughput(Throughput::Bytes(data.len() as u64));
        group.bench_with_input(BenchmarkId::new(name, data.len()), data, |b, data| {
            b.iter(|| {
                let pdf = assembler
                    .assemble_blocking(vec![(kind, black_box(data.clone()))])
                    .expect("Failed to assemble PDF");
                black_box(pdf)
            })
        });
    }

    group.finish();
}

/// Benchmark mixed batches of increasing size
fn bench_batch(c: &mut Criterion) {
    let assembler = Assembler::new();
    let jpeg = create_jpeg(640, 480);
    let png = create_png(320, 240);

    let mut group = c.benchmark_group("batch");
    group.measurement_time(Duration::from_secs(10));

    for pages in [1usize, 5, 20] {
        let batch: Vec<(ImageKind, Vec<u8>)> = (0..pages)
            .map(|i| {
                if i % 2 == 0 {
                    (ImageKind::Jpeg, jpeg.clone())
                } else {
                    (ImageKind::Png, png.clone())
                }
            })
            .collect();

        group.bench_with_input(BenchmarkId::new("mixed", pages), &batch, |b, batch| {
            b.iter(|| {
                let pdf = assembler
                    .assemble_blocking(black_box(batch.clone()))
                    .expect("Failed to assemble PDF");
                black_box(pdf)
            })
        });
    }

    group.finish();
}

/// Benchmark artifact identifier generation
fn bench_artifact_id(c: &mut Criterion) {
    c.bench_function("artifact_id_generate", |b| {
        b.iter(|| black_box(ArtifactId::generate()))
    });
}

criterion_group!(benches, bench_single_page, bench_batch, bench_artifact_id);
criterion_main!(benches);
