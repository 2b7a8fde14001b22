use std::io::Cursor;
use std::path::Path;

use image::{imageops::FilterType, ExtendedColorType, RgbImage};
use ndarray::{Array3, Array4, ArrayView3, ArrayViewD, Axis};

use crate::models::error::AppError;

/// Reads an image file from transient storage.
pub async fn read_image_bytes(path: &Path) -> Result<Vec<u8>, AppError> {
    tokio::fs::read(path).await.map_err(|e| {
        AppError::Io(format!("Failed to read image {}: {}", path.display(), e))
    })
}

/// Decodes JPEG or PNG bytes into an `H x W x 3` RGB tensor.
pub fn decode(bytes: &[u8]) -> Result<Array3<u8>, AppError> {
    let img = image::load_from_memory(bytes).map_err(|e| AppError::DecodeError(e.to_string()))?;
    let rgb = img.to_rgb8();
    rgb_to_tensor(rgb)
}

fn rgb_to_tensor(rgb: RgbImage) -> Result<Array3<u8>, AppError> {
    let (w, h) = rgb.dimensions();
    Array3::from_shape_vec((h as usize, w as usize, 3), rgb.into_raw())
        .map_err(|e| AppError::DecodeError(format!("Unexpected pixel buffer layout: {}", e)))
}

/// Resamples an RGB tensor to `edge x edge`.
pub fn resize_square(image: ArrayView3<'_, u8>, edge: u32) -> Result<Array3<u8>, AppError> {
    let (h, w, c) = image.dim();
    if c != 3 {
        return Err(AppError::DecodeError(format!("Expected 3 channels, got {}", c)));
    }
    let pixels: Vec<u8> = image.iter().copied().collect();
    let rgb = RgbImage::from_raw(w as u32, h as u32, pixels)
        .ok_or_else(|| AppError::DecodeError("Pixel buffer too small".to_string()))?;
    let resized = image::imageops::resize(&rgb, edge, edge, FilterType::Triangle);
    rgb_to_tensor(resized)
}

/// Converts to `f32` in `[0, 1]` and prepends a batch axis of size 1.
pub fn normalize(image: ArrayView3<'_, u8>) -> Array4<f32> {
    image.mapv(|v| v as f32 / 255.0).insert_axis(Axis(0))
}

/// Drops a leading batch axis of size 1, leaving other tensors untouched.
pub fn squeeze_batch(tensor: ArrayViewD<'_, f32>) -> ArrayViewD<'_, f32> {
    if tensor.ndim() == 4 && tensor.shape()[0] == 1 {
        tensor.index_axis_move(Axis(0), 0)
    } else {
        tensor
    }
}

/// Scales back to `[0, 255]`, squeezes the batch axis and encodes as JPEG.
pub fn denormalize_and_encode(tensor: ArrayViewD<'_, f32>, quality: u8) -> Result<Vec<u8>, AppError> {
    let hwc = squeeze_batch(tensor);
    if hwc.ndim() != 3 {
        return Err(AppError::EncodeError(format!(
            "Expected a rank-3 HWC tensor, got shape {:?}",
            hwc.shape()
        )));
    }
    let (h, w, c) = (hwc.shape()[0], hwc.shape()[1], hwc.shape()[2]);
    let color = match c {
        1 => ExtendedColorType::L8,
        3 => ExtendedColorType::Rgb8,
        _ => {
            return Err(AppError::EncodeError(format!("Unsupported channel count {}", c)));
        }
    };
    if h == 0 || w == 0 {
        return Err(AppError::EncodeError("Empty image tensor".to_string()));
    }

    // `as u8` saturates, so out-of-range network output clips to black/white.
    let pixels: Vec<u8> = hwc.iter().map(|&v| (v * 255.0) as u8).collect();

    let mut buf = Cursor::new(Vec::new());
    let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buf, quality);
    encoder
        .encode(&pixels, w as u32, h as u32, color)
        .map_err(|e| AppError::EncodeError(format!("JPEG encode error: {}", e)))?;
    Ok(buf.into_inner())
}
