//! Reference image normalization.
//!
//! Uploaded references are decoded, converted to 8-bit RGB, center-cropped
//! to the target aspect ratio and resized to a fixed square.  Cropping
//! always happens before scaling so the subject is never stretched.

use std::io::Cursor;
use std::path::Path;

use image::imageops::{self, FilterType};
use image::{ImageFormat, RgbImage};

use crate::error::CoreError;

/// Region of the source image kept by the center crop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Compute the center crop that brings `width x height` to the aspect
/// ratio of `target_width x target_height`.
///
/// - Source wider than target: equal margins come off the left and right,
///   the full height is kept.
/// - Source taller than target: equal margins come off the top and bottom,
///   the full width is kept.
/// - Matching ratio: the whole image is kept.
///
/// Ratios are compared by cross-multiplication to stay exact.
pub fn center_crop_box(width: u32, height: u32, target_width: u32, target_height: u32) -> CropBox {
    let (w, h) = (u64::from(width), u64::from(height));
    let (tw, th) = (u64::from(target_width), u64::from(target_height));

    if w * th > h * tw {
        let new_w = (h * tw / th) as u32;
        CropBox {
            x: (width - new_w) / 2,
            y: 0,
            width: new_w,
            height,
        }
    } else if w * th < h * tw {
        let new_h = (w * th / tw) as u32;
        CropBox {
            x: 0,
            y: (height - new_h) / 2,
            width,
            height: new_h,
        }
    } else {
        CropBox {
            x: 0,
            y: 0,
            width,
            height,
        }
    }
}

/// Decode `bytes` and normalize them into a `size x size` RGB image.
///
/// Undecodable input is a validation error.
pub fn normalize_reference(bytes: &[u8], size: u32) -> Result<RgbImage, CoreError> {
    let decoded = image::load_from_memory(bytes)
        .map_err(|e| CoreError::Validation(format!("Unable to decode image: {e}")))?;
    let rgb = decoded.to_rgb8();

    let crop = center_crop_box(rgb.width(), rgb.height(), size, size);
    if crop.width == 0 || crop.height == 0 {
        return Err(CoreError::Validation(format!(
            "Image is too small to normalize ({}x{})",
            rgb.width(),
            rgb.height()
        )));
    }

    let cropped = imageops::crop_imm(&rgb, crop.x, crop.y, crop.width, crop.height).to_image();
    Ok(imageops::resize(&cropped, size, size, FilterType::Lanczos3))
}

/// Encode an RGB image as PNG.
pub fn encode_png(img: &RgbImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageFormat::Png)?;
    Ok(buf.into_inner())
}

/// Fully decode the image at `path`, returning its dimensions.
///
/// Used by the readiness check: a header-only probe would accept
/// truncated files.
pub fn probe_image(path: &Path) -> Result<(u32, u32), image::ImageError> {
    let img = image::open(path)?;
    Ok((img.width(), img.height()))
}
