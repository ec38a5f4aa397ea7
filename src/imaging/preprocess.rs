use crate::error::{Result, WorkerError};
use image::{imageops, imageops::FilterType, RgbImage};

const ALIGN: u32 = 16;

/// Scales `image` so its longer side is `long_size`, then center-crops both
/// sides down to a multiple of 16.
pub fn preprocess_ref(image: &RgbImage, long_size: u32) -> Result<RgbImage> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(WorkerError::ImageError("reference image is empty".into()));
    }

    let (new_w, new_h) = scaled_size(width, height, long_size);
    let target_w = new_w / ALIGN * ALIGN;
    let target_h = new_h / ALIGN * ALIGN;
    if target_w == 0 || target_h == 0 {
        return Err(WorkerError::ImageError(format!(
            "reference image too small: {}x{} scales to {}x{}",
            width, height, new_w, new_h
        )));
    }

    let resized = imageops::resize(image, new_w, new_h, FilterType::Lanczos3);
    let left = (new_w - target_w) / 2;
    let top = (new_h - target_h) / 2;

    Ok(imageops::crop_imm(&resized, left, top, target_w, target_h).to_image())
}

/// Width wins ties; the short side is truncated, never rounded.
fn scaled_size(width: u32, height: u32, long_size: u32) -> (u32, u32) {
    let long = long_size as f64;
    if width >= height {
        (long_size, (long / width as f64 * height as f64) as u32)
    } else {
        ((long / height as f64 * width as f64) as u32, long_size)
    }
}
