//! Request payload → normalized input tensor.
//!
//! Pipeline: strip data-URL header → Base64 decode → image decode →
//! grayscale (ITU-R 601-2 luma) → 28×28 Catmull-Rom resize → flatten → /255.
//! Both the luma transform and the resize filter are pinned so the same
//! payload always yields the same tensor.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{imageops::FilterType, DynamicImage, GrayImage, ImageBuffer};

use crate::error::{DigitError, Result};

/// Side length of the square network input image.
pub const IMAGE_SIDE: u32 = 28;

/// Flattened input width (28 × 28).
pub const INPUT_DIM: usize = (IMAGE_SIDE * IMAGE_SIDE) as usize;

/// Drop everything up to and including the first comma, if any.
pub fn strip_data_url(payload: &str) -> &str {
    match payload.split_once(',') {
        Some((_, data)) => data,
        None => payload,
    }
}

/// Standard-alphabet decode. Line breaks and other ASCII whitespace (MIME
/// wrapping) are skipped.
pub fn decode_base64(payload: &str) -> Result<Vec<u8>> {
    let data: String = strip_data_url(payload)
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();
    Ok(STANDARD.decode(data)?)
}

/// Integer ITU-R 601-2 luma: L = R*299/1000 + G*587/1000 + B*114/1000, in 16.16 fixed point.
pub fn luma_601(r: u8, g: u8, b: u8) -> u8 {
    let l = (u32::from(r) * 19595 + u32::from(g) * 38470 + u32::from(b) * 7471 + 0x8000) >> 16;
    l as u8
}

/// Single-channel conversion. Alpha is dropped, not composited.
pub fn to_grayscale(image: &DynamicImage) -> Result<GrayImage> {
    let rgb = image.to_rgb8();
    let (width, height) = rgb.dimensions();
    let luma: Vec<u8> = rgb
        .pixels()
        .map(|p| {
            let [r, g, b] = p.0;
            luma_601(r, g, b)
        })
        .collect();

    ImageBuffer::from_raw(width, height, luma)
        .ok_or_else(|| DigitError::Internal("grayscale buffer size mismatch".to_string()))
}

pub fn image_to_tensor(image: &DynamicImage) -> Result<Vec<f64>> {
    if image.width() == 0 || image.height() == 0 {
        return Err(DigitError::Validation(format!(
            "image has zero area ({}x{})",
            image.width(),
            image.height()
        )));
    }

    let gray = to_grayscale(image)?;
    let resized = image::imageops::resize(&gray, IMAGE_SIDE, IMAGE_SIDE, FilterType::CatmullRom);

    let tensor: Vec<f64> = resized
        .as_raw()
        .iter()
        .map(|&px| f64::from(px) / 255.0)
        .collect();

    debug_assert_eq!(tensor.len(), INPUT_DIM);
    Ok(tensor)
}

pub fn bytes_to_tensor(bytes: &[u8]) -> Result<Vec<f64>> {
    let image = image::load_from_memory(bytes)?;
    image_to_tensor(&image)
}

/// Full request-payload path used by the prediction endpoint.
pub fn payload_to_tensor(payload: &str) -> Result<Vec<f64>> {
    let bytes = decode_base64(payload)?;
    bytes_to_tensor(&bytes)
}
