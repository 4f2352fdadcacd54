use divan::{black_box, Bencher};
use image::{DynamicImage, GrayImage, Luma};

fn main() {
    divan::main();
}

const SPEC: &str = "Lxx(8,28)+Lxy(8,28)+Lyy(8,28)+Lxx(2,28)+Lxy(2,28)+Lyy(2,28)";

fn synthetic_image(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageLuma8(GrayImage::from_fn(width, height, |x, y| {
        let checker = if (x / 16 + y / 16) % 2 == 0 { 40 } else { 200 };
        Luma([(checker + (x * 7 + y * 3) % 40) as u8])
    }))
}

#[divan::bench(args = [64, 256])]
fn histogram(bencher: Bencher, size: u32) {
    let img = synthetic_image(size, size);
    let system = crfh::System::new(SPEC).unwrap();

    bencher.bench_local(|| black_box(system.compute_histogram(&img, 0).unwrap()));
}

#[divan::bench]
fn descriptor_outputs(bencher: Bencher) {
    let img = synthetic_image(256, 256);
    let system = crfh::System::new(SPEC).unwrap();

    bencher.bench_local(|| black_box(system.compute_descriptor_outputs(&img).unwrap()));
}

#[divan::bench]
fn system_construction() -> crfh::System {
    crfh::System::new(black_box(SPEC)).unwrap()
}
