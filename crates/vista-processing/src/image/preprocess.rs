//! Vision model input preparation

use crate::error::DecodeError;
use image::imageops::{self, FilterType};
use image::ImageReader;
use std::io::Cursor;

/// Decode `data` and turn it into a `3 x size x size` tensor in CHW order.
///
/// The image is center-cropped to a square, resized with Catmull-Rom and each
/// channel value `v` is mapped to `v / 127.5 - 1`, i.e. into `[-1, 1]`.
pub fn preprocess(data: &[u8], size: u32) -> Result<Vec<f32>, DecodeError> {
    if size == 0 {
        return Err(DecodeError::Malformed("target size must be positive".to_string()));
    }

    let image = ImageReader::new(Cursor::new(data))
        .with_guessed_format()?
        .decode()?;
    let rgb = image.to_rgb8();

    let (width, height) = rgb.dimensions();
    if width == 0 || height == 0 {
        return Err(DecodeError::Malformed("image has no pixels".to_string()));
    }

    let side = width.min(height);
    let x = (width - side) / 2;
    let y = (height - side) / 2;
    let square = imageops::crop_imm(&rgb, x, y, side, side).to_image();
    let resized = imageops::resize(&square, size, size, FilterType::CatmullRom);

    let plane = (size * size) as usize;
    let mut tensor = vec![0.0f32; 3 * plane];
    for (i, pixel) in resized.pixels().enumerate() {
        for c in 0..3 {
            tensor[c * plane + i] = pixel[c] as f32 / 127.5 - 1.0;
        }
    }

    Ok(tensor)
}
