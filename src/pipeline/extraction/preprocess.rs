//! Page-image preprocessing ahead of OCR.
//!
//! Rendered pages are converted to single-channel grayscale and then
//! binarized with a global threshold picked from the image histogram
//! (Otsu's method). The transform is pure: same input bytes, same output
//! bytes, same dimensions.

use std::io::Cursor;

use image::{DynamicImage, GrayImage, ImageOutputFormat, Luma, RgbImage};
use tracing::debug;

use super::ExtractionError;

// ═══════════════════════════════════════════════════════════
// Constants
// ═══════════════════════════════════════════════════════════

/// Upper bound on a single page raster before decoding.
/// A 300 DPI A3 page is well below this.
const MAX_IMAGE_BYTES: usize = 64 * 1024 * 1024;

/// Shorter than any image signature.
const MIN_IMAGE_BYTES: usize = 8;

// ═══════════════════════════════════════════════════════════
// Service trait
// ═══════════════════════════════════════════════════════════

/// Image-to-image transform run on every page raster before recognition.
pub trait ImagePreprocessor: Send + Sync {
    /// Input: encoded image bytes (PNG, JPEG, TIFF).
    /// Output: preprocessed single-channel PNG.
    fn preprocess(&self, image_bytes: &[u8]) -> Result<PreparedImage, ExtractionError>;
}

/// Result of preprocessing one image.
#[derive(Debug)]
pub struct PreparedImage {
    pub png_bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Threshold chosen for this image; pixels above it become white.
    pub threshold: u8,
}

/// Grayscale + Otsu global binarization.
#[derive(Debug, Clone, Copy, Default)]
pub struct OtsuBinarizer;

impl ImagePreprocessor for OtsuBinarizer {
    fn preprocess(&self, image_bytes: &[u8]) -> Result<PreparedImage, ExtractionError> {
        validate_image_bytes(image_bytes)?;

        let img = image::load_from_memory(image_bytes)
            .map_err(|e| ExtractionError::InvalidImage(format!("decode failed: {e}")))?;

        let gray = to_grayscale(&img);
        let threshold = otsu_threshold(&gray);
        let binary = binarize(&gray, threshold);

        debug!(
            width = binary.width(),
            height = binary.height(),
            threshold,
            "Binarized page image"
        );

        Ok(PreparedImage {
            width: binary.width(),
            height: binary.height(),
            threshold,
            png_bytes: encode_gray_png(&binary)?,
        })
    }
}

// ═══════════════════════════════════════════════════════════
// Pixel operations
// ═══════════════════════════════════════════════════════════

/// Grayscale conversion. Already-gray inputs are taken as-is, everything
/// else goes through [`rgb_to_gray`].
pub fn to_grayscale(img: &DynamicImage) -> GrayImage {
    match img {
        DynamicImage::ImageLuma8(gray) => gray.clone(),
        other => rgb_to_gray(&other.to_rgb8()),
    }
}

/// Convert RGB image to grayscale using ITU-R BT.601 luminance.
pub fn rgb_to_gray(rgb: &RgbImage) -> GrayImage {
    GrayImage::from_fn(rgb.width(), rgb.height(), |x, y| {
        let p = rgb.get_pixel(x, y);
        let luma = 0.299 * p.0[0] as f32 + 0.587 * p.0[1] as f32 + 0.114 * p.0[2] as f32;
        Luma([luma.round().min(255.0) as u8])
    })
}

/// Otsu's method: the threshold maximising between-class variance of
/// the intensity histogram. Ties resolve to the lowest threshold.
pub fn otsu_threshold(gray: &GrayImage) -> u8 {
    let mut histogram = [0u64; 256];
    for pixel in gray.pixels() {
        histogram[pixel.0[0] as usize] += 1;
    }

    let total: u64 = histogram.iter().sum();
    if total == 0 {
        return 0;
    }

    let weighted_total: f64 = histogram
        .iter()
        .enumerate()
        .map(|(level, &count)| level as f64 * count as f64)
        .sum();

    let mut weight_bg = 0u64;
    let mut sum_bg = 0.0f64;
    let mut best_threshold = 0u8;
    let mut best_variance = -1.0f64;

    for (level, &count) in histogram.iter().enumerate() {
        weight_bg += count;
        if weight_bg == 0 {
            continue;
        }
        let weight_fg = total - weight_bg;
        if weight_fg == 0 {
            break;
        }

        sum_bg += level as f64 * count as f64;
        let mean_bg = sum_bg / weight_bg as f64;
        let mean_fg = (weighted_total - sum_bg) / weight_fg as f64;
        let between = weight_bg as f64 * weight_fg as f64 * (mean_bg - mean_fg).powi(2);

        if between > best_variance {
            best_variance = between;
            best_threshold = level as u8;
        }
    }

    best_threshold
}

/// Pixels strictly above `threshold` become 255, the rest 0.
pub fn binarize(gray: &GrayImage, threshold: u8) -> GrayImage {
    GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
        if gray.get_pixel(x, y).0[0] > threshold {
            Luma([255])
        } else {
            Luma([0])
        }
    })
}

// ═══════════════════════════════════════════════════════════
// Validation + encoding
// ═══════════════════════════════════════════════════════════

/// Reject clearly invalid input before decoding.
pub fn validate_image_bytes(bytes: &[u8]) -> Result<(), ExtractionError> {
    if bytes.len() < MIN_IMAGE_BYTES {
        return Err(ExtractionError::InvalidImage(
            "image data too small to be valid".into(),
        ));
    }
    if bytes.len() > MAX_IMAGE_BYTES {
        return Err(ExtractionError::InvalidImage(format!(
            "image data exceeds {}MB limit",
            MAX_IMAGE_BYTES / (1024 * 1024)
        )));
    }
    Ok(())
}

/// Encode a grayscale image as PNG bytes.
pub fn encode_gray_png(img: &GrayImage) -> Result<Vec<u8>, ExtractionError> {
    let dynamic = DynamicImage::ImageLuma8(img.clone());
    let mut cursor = Cursor::new(Vec::new());
    dynamic
        .write_to(&mut cursor, ImageOutputFormat::Png)
        .map_err(|e| ExtractionError::InvalidImage(format!("PNG encoding failed: {e}")))?;
    Ok(cursor.into_inner())
}
