//! Image processor - header metadata extraction

use crate::error::DecodeError;
use crate::metadata::ImageMetadata;
use image::ImageReader;
use std::io::Cursor;

/// Read format and dimensions from the image header without decoding pixels.
pub fn read_header(data: &[u8]) -> Result<ImageMetadata, DecodeError> {
    let reader = ImageReader::new(Cursor::new(data)).with_guessed_format()?;
    let format = reader
        .format()
        .map(|f| format!("{:?}", f).to_lowercase())
        .ok_or_else(|| DecodeError::Unsupported("unrecognized image signature".to_string()))?;

    let (width, height) = reader.into_dimensions()?;

    tracing::debug!(format = %format, width, height, "Image header read");

    Ok(ImageMetadata {
        format,
        width,
        height,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb, RgbImage};

    fn encode(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
        let img = RgbImage::from_pixel(width, height, Rgb([255, 0, 0]));
        let mut buffer = Vec::new();
        img.write_to(&mut Cursor::new(&mut buffer), format).unwrap();
        buffer
    }

    #[test]
    fn test_png_header() {
        let meta = read_header(&encode(800, 600, ImageFormat::Png)).unwrap();
        assert_eq!(
            meta,
            ImageMetadata {
                format: "png".to_string(),
                width: 800,
                height: 600,
            }
        );
    }

    #[test]
    fn test_jpeg_header() {
        let meta = read_header(&encode(32, 16, ImageFormat::Jpeg)).unwrap();
        assert_eq!(meta.format, "jpeg");
        assert_eq!((meta.width, meta.height), (32, 16));
    }

    #[test]
    fn test_unknown_signature_is_unsupported() {
        let err = read_header(b"definitely not an image").unwrap_err();
        assert!(matches!(err, DecodeError::Unsupported(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_truncated_header_is_not_retryable() {
        let png = encode(8, 8, ImageFormat::Png);
        let err = read_header(&png[..12]).unwrap_err();
        assert!(matches!(err, DecodeError::Malformed(_)));
        assert!(!err.is_retryable());
    }
}
