pub mod fetch;
pub mod preprocess;

pub use fetch::ImageFetcher;
pub use preprocess::preprocess_ref;

use crate::error::Result;
use image::{DynamicImage, ImageFormat, RgbImage};
use std::io::Cursor;

/// Decodes any supported format, sniffing the container from the bytes.
pub fn decode_rgb(bytes: &[u8]) -> Result<RgbImage> {
    Ok(image::load_from_memory(bytes)?.to_rgb8())
}

pub fn encode_png(image: &RgbImage) -> Result<Vec<u8>> {
    let mut buf = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(image.clone()).write_to(&mut buf, ImageFormat::Png)?;
    Ok(buf.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn png_encoding_decodes_back() {
        let image = RgbImage::from_pixel(8, 4, Rgb([10, 200, 30]));
        let png = encode_png(&image).unwrap();
        assert_eq!(&png[1..4], b"PNG");

        let decoded = decode_rgb(&png).unwrap();
        assert_eq!(decoded.dimensions(), (8, 4));
        assert_eq!(decoded.get_pixel(3, 2), &Rgb([10, 200, 30]));
    }

    #[test]
    fn garbage_is_an_image_error() {
        let err = decode_rgb(b"<html>not found</html>").unwrap_err();
        assert!(matches!(err, crate::error::WorkerError::ImageError(_)));
    }
}
