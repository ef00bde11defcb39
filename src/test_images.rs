//! In-memory fixtures shared by the unit tests.

use std::io::Cursor;

use image::{DynamicImage, ImageFormat, Rgb, RgbImage};

pub fn uniform(width: u32, height: u32, rgb: [u8; 3]) -> RgbImage {
    RgbImage::from_pixel(width, height, Rgb(rgb))
}

/// 12px blocks alternating dark/bright with a shallow ramp inside each block:
/// crisp edges on a regular lattice and a wide tonal spread.
pub fn textured(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        let (bx, by) = (x / 12, y / 12);
        let ramp = ((x % 12) + (y % 12)) / 2;
        let level = if (bx + by) % 2 == 0 {
            10 + ((bx * 3 + by * 5) % 6) * 15
        } else {
            160 + ((bx * 5 + by * 3) % 6) * 15
        };
        let v = (level + ramp) as u8;
        Rgb([v, v, v])
    })
}

pub fn png_bytes(img: &RgbImage) -> Vec<u8> {
    encode(img, ImageFormat::Png)
}

pub fn jpeg_bytes(img: &RgbImage) -> Vec<u8> {
    encode(img, ImageFormat::Jpeg)
}

fn encode(img: &RgbImage, format: ImageFormat) -> Vec<u8> {
    let mut buf = Vec::new();
    DynamicImage::ImageRgb8(img.clone())
        .write_to(&mut Cursor::new(&mut buf), format)
        .unwrap();
    buf
}
