use std::io::Cursor;

use docauth_core::{
    classifier::{ElementType, InputShape, InputTensor, ModelSpec},
    error::AnalysisError,
    InferenceBackend,
};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};

pub fn png(img: RgbImage) -> Vec<u8> {
    let mut buf = Vec::new();
    DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .unwrap();
    buf
}

pub fn blank_page(width: u32, height: u32) -> Vec<u8> {
    png(RgbImage::from_pixel(width, height, Rgb([250, 250, 250])))
}

/// Alternating dark/bright 12px cells with a shallow in-cell ramp.
pub fn detailed_page(width: u32, height: u32) -> Vec<u8> {
    png(RgbImage::from_fn(width, height, |x, y| {
        let (bx, by) = (x / 12, y / 12);
        let ramp = ((x % 12) + (y % 12)) / 2;
        let level = if (bx + by) % 2 == 0 {
            10 + ((bx * 3 + by * 5) % 6) * 15
        } else {
            160 + ((bx * 5 + by * 3) % 6) * 15
        };
        let v = (level + ramp) as u8;
        Rgb([v, v, v])
    }))
}

/// Stands in for a loaded 28x28 grayscale model and answers a constant.
pub struct ConstantModel(pub f32);

impl InferenceBackend for ConstantModel {
    fn forward(&self, input: InputTensor) -> Result<f32, AnalysisError> {
        assert_eq!(input.dims, vec![1, 28, 28, 1]);
        Ok(self.0)
    }
}

pub fn grayscale_spec() -> ModelSpec {
    ModelSpec {
        input: InputShape::from_dims(&[1, 28, 28, 1]),
        input_type: ElementType::U8,
        output_shape: Some(vec![1, 1]),
    }
}
