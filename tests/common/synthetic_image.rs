use image::{DynamicImage, GrayImage, Luma, Rgb, RgbImage};

/// High-contrast checkerboard with square cells.
pub fn checkerboard(width: u32, height: u32, cell: u32) -> DynamicImage {
    assert!(cell > 0, "cell size must be positive");
    DynamicImage::ImageLuma8(GrayImage::from_fn(width, height, |x, y| {
        Luma([if (x / cell + y / cell) % 2 == 0 { 32 } else { 220 }])
    }))
}

/// Smooth diagonal ramp spanning most of the 8-bit range.
pub fn gradient(width: u32, height: u32) -> DynamicImage {
    let span = (width + height).max(1);
    DynamicImage::ImageLuma8(GrayImage::from_fn(width, height, |x, y| {
        Luma([((x + y) * 250 / span) as u8])
    }))
}

pub fn uniform_gray(width: u32, height: u32, value: u8) -> DynamicImage {
    DynamicImage::ImageLuma8(GrayImage::from_pixel(width, height, Luma([value])))
}

pub fn uniform_rgb(width: u32, height: u32, rgb: [u8; 3]) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb(rgb)))
}

/// Horizontal bands: each `(rows, value)` pair fills the next `rows` rows with `value`.
pub fn bands(width: u32, bands: &[(u32, u8)]) -> DynamicImage {
    let height = bands.iter().map(|(rows, _)| rows).sum();
    DynamicImage::ImageLuma8(GrayImage::from_fn(width, height, |_, y| {
        let mut start = 0;
        for &(rows, value) in bands {
            if y < start + rows {
                return Luma([value]);
            }
            start += rows;
        }
        Luma([0])
    }))
}
