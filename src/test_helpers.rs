//! Shared fixtures for the unit tests.
//!
//! Images are synthesised on the fly so tests never depend on checked-in
//! binaries.

use image::{ImageEncoder, Rgb, RgbImage, Rgba, RgbaImage};
use std::path::Path;

/// Write a gradient PNG. With `alpha`, the left column is fully transparent
/// and the rest half-transparent.
pub fn create_test_png(path: &Path, width: u32, height: u32, alpha: bool) {
    let img = RgbaImage::from_fn(width, height, |x, y| {
        let a = match (alpha, x) {
            (false, _) => 255,
            (true, 0) => 0,
            (true, _) => 128,
        };
        Rgba([(x % 256) as u8, (y % 256) as u8, 128, a])
    });
    img.save(path).unwrap();
}

/// Write a small valid JPEG file with the given dimensions.
pub fn create_test_jpeg(path: &Path, width: u32, height: u32) {
    let img = RgbImage::from_fn(width, height, |x, y| Rgb([(x % 256) as u8, (y % 256) as u8, 128]));
    let file = std::fs::File::create(path).unwrap();
    let writer = std::io::BufWriter::new(file);
    image::codecs::jpeg::JpegEncoder::new(writer)
        .write_image(img.as_raw(), width, height, image::ExtendedColorType::Rgb8)
        .unwrap();
}
