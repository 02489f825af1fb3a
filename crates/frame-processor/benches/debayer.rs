use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use frame_processor::{debayer_u8, yuv_to_rgb8, BayerMethod};
use iidc_bus::{ColorCoding, ColorFilter};

fn bench_debayer(c: &mut Criterion) {
    let (width, height) = (640u32, 480u32);
    let mosaic: Vec<u8> = (0..width * height).map(|i| (i % 251) as u8).collect();
    let mut out = Vec::new();

    let mut group = c.benchmark_group("debayer_vga");
    for method in [BayerMethod::Nearest, BayerMethod::Simple, BayerMethod::Bilinear] {
        group.bench_with_input(BenchmarkId::from_parameter(format!("{:?}", method)), &method, |b, &method| {
            b.iter(|| {
                debayer_u8(
                    black_box(&mosaic),
                    width,
                    height,
                    ColorFilter::Rggb,
                    method,
                    &mut out,
                )
            })
        });
    }
    group.finish();
}

fn bench_yuv(c: &mut Criterion) {
    let (width, height) = (640u32, 480u32);
    let uyvy: Vec<u8> = (0..width * height * 2).map(|i| (i % 253) as u8).collect();
    let mut out = Vec::new();

    c.bench_function("yuv422_to_rgb8_vga", |b| {
        b.iter(|| yuv_to_rgb8(ColorCoding::Yuv422, black_box(&uyvy), width, height, &mut out))
    });
}

criterion_group!(benches, bench_debayer, bench_yuv);
criterion_main!(benches);
