//! Preview thumbnails.
//!
//! Board listings show a small snapshot of each document. The gateway grabs
//! an RGBA frame from the render surface, scales it down, and stores it as a
//! JPEG data URL in the document row alongside the data itself.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, RgbaImage};
use thiserror::Error;

use crate::surface::FrameCapture;

/// Widest a stored preview gets; taller frames scale proportionally.
pub const PREVIEW_MAX_WIDTH: u32 = 600;

/// JPEG quality for previews. Thumbnails, not archival copies.
pub const PREVIEW_QUALITY: u8 = 70;

#[derive(Debug, Error)]
pub enum PreviewError {
    #[error("frame buffer is {actual} bytes, expected {expected} for {width}x{height}")]
    BadFrame {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },
    #[error("frame has no pixels")]
    EmptyFrame,
    #[error("jpeg encoding failed: {0}")]
    Encode(#[from] image::ImageError),
}

pub type Result<T> = std::result::Result<T, PreviewError>;

/// Encode a captured frame as a `data:image/jpeg;base64,…` URL using the
/// default size and quality.
pub fn encode_preview(frame: &FrameCapture) -> Result<String> {
    encode_preview_with(frame, PREVIEW_MAX_WIDTH, PREVIEW_QUALITY)
}

pub fn encode_preview_with(frame: &FrameCapture, max_width: u32, quality: u8) -> Result<String> {
    if frame.width == 0 || frame.height == 0 {
        return Err(PreviewError::EmptyFrame);
    }
    // Dimensions whose byte count exceeds the address space can never match
    // any real buffer.
    let expected = (frame.width as usize)
        .checked_mul(frame.height as usize)
        .and_then(|pixels| pixels.checked_mul(4))
        .ok_or(PreviewError::BadFrame {
            width: frame.width,
            height: frame.height,
            expected: usize::MAX,
            actual: frame.rgba.len(),
        })?;
    if frame.rgba.len() != expected {
        return Err(PreviewError::BadFrame {
            width: frame.width,
            height: frame.height,
            expected,
            actual: frame.rgba.len(),
        });
    }

    let rgba = RgbaImage::from_raw(frame.width, frame.height, frame.rgba.clone()).ok_or(
        PreviewError::BadFrame {
            width: frame.width,
            height: frame.height,
            expected,
            actual: frame.rgba.len(),
        },
    )?;
    let mut image = DynamicImage::ImageRgba8(rgba);

    if frame.width > max_width {
        let scaled_height =
            ((frame.height as u64 * max_width as u64) / frame.width as u64).max(1) as u32;
        image = image.resize_exact(max_width, scaled_height, FilterType::Triangle);
    }

    // JPEG carries no alpha channel.
    let rgb = image.to_rgb8();
    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, quality).encode_image(&rgb)?;

    Ok(format!("data:image/jpeg;base64,{}", STANDARD.encode(&jpeg)))
}

// ==================== Preview tests ====================
