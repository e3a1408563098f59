//! Adaptive binarization
//!
//! Turns a color page photo into a foreground mask. The threshold sits
//! between the mean border luminance (usually the scanner bed or table) and
//! the mean luminance of the page center, so it adapts to each capture.

use image::{GrayImage, Luma, RgbImage};
use imageproc::filter::separable_filter_equal;
use tracing::{debug, instrument};

use super::types::{BinaryMask, CorrectionError, Result};

// ============================================================
// Constants
// ============================================================

/// Luma weights in RGB order
const LUMA_WEIGHTS: [f64; 3] = [0.299, 0.587, 0.114];

/// Blur kernel is about 1/50 of the smaller image side
const BLUR_KERNEL_DIVISOR: u32 = 50;

const MIN_BLUR_KERNEL: u32 = 3;
const MAX_BLUR_KERNEL: u32 = 51;

/// Border band thickness as a fraction of the smaller side
const BORDER_BAND_RATIO: f64 = 0.05;

/// Center patch side as a fraction of the smaller side
const CENTER_PATCH_RATIO: f64 = 0.10;

/// Position of the threshold between border and center luminance
const THRESHOLD_BLEND: f64 = 0.6;

// ============================================================
// Types
// ============================================================

/// Which side of the threshold counts as page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BinarizationMode {
    /// Page brighter than its surroundings
    #[default]
    Standard,
    /// Page darker than its surroundings
    Inverted,
}

impl BinarizationMode {
    pub fn name(&self) -> &'static str {
        match self {
            BinarizationMode::Standard => "standard",
            BinarizationMode::Inverted => "inverted",
        }
    }
}

impl std::str::FromStr for BinarizationMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "standard" => Ok(Self::Standard),
            "inverted" => Ok(Self::Inverted),
            other => Err(format!("unknown binarization mode: {}", other)),
        }
    }
}

/// Result of binarizing one image
#[derive(Debug, Clone)]
pub struct Binarization {
    pub mask: BinaryMask,
    /// Mean border color, rounded
    pub border_color: [u8; 3],
    pub threshold: u8,
    /// Odd Gaussian kernel size used for smoothing
    pub blur_kernel: u32,
}

// ============================================================
// Binarizer
// ============================================================

/// Binarize a color image with an adaptively estimated threshold
#[instrument(skip_all, fields(width = image.width(), height = image.height()))]
pub fn binarize(image: &RgbImage, mode: BinarizationMode) -> Result<Binarization> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(CorrectionError::InvalidImage(format!(
            "cannot binarize a {}x{} image",
            width, height
        )));
    }

    let gray = to_gray(image);
    let blur_kernel = blur_kernel_size(width, height);
    let blurred = separable_filter_equal(&gray, &gaussian_kernel(blur_kernel));

    let border = border_mean(image);
    let border_gray = luma(border);
    let center_gray = center_mean(&gray);

    let threshold = (border_gray + (center_gray - border_gray) * THRESHOLD_BLEND)
        .clamp(0.0, 255.0)
        .trunc() as u8;

    let mask = BinaryMask::from_fn(width, height, |x, y| {
        let value = blurred.get_pixel(x, y).0[0];
        match mode {
            BinarizationMode::Standard => value > threshold,
            BinarizationMode::Inverted => value < threshold,
        }
    });

    let border_color = border.map(|c| c.round().clamp(0.0, 255.0) as u8);

    debug!(
        threshold,
        border_gray,
        center_gray,
        blur_kernel,
        foreground = mask.foreground_count(),
        "Binarized"
    );

    Ok(Binarization {
        mask,
        border_color,
        threshold,
        blur_kernel,
    })
}

/// Odd blur kernel size for an image of the given size
pub fn blur_kernel_size(width: u32, height: u32) -> u32 {
    let k = width.min(height) / BLUR_KERNEL_DIVISOR / 2 * 2 + 1;
    k.clamp(MIN_BLUR_KERNEL, MAX_BLUR_KERNEL)
}

/// Gaussian sigma implied by a kernel size
pub fn kernel_sigma(kernel: u32) -> f32 {
    0.3 * ((kernel as f32 - 1.0) * 0.5 - 1.0) + 0.8
}

/// Normalized `size`-tap Gaussian weights with the sigma of [`kernel_sigma`]
pub fn gaussian_kernel(size: u32) -> Vec<f32> {
    let sigma = kernel_sigma(size);
    let center = (size as f32 - 1.0) / 2.0;
    let weights: Vec<f32> = (0..size)
        .map(|i| {
            let d = i as f32 - center;
            (-(d * d) / (2.0 * sigma * sigma)).exp()
        })
        .collect();
    let sum: f32 = weights.iter().sum();
    weights.into_iter().map(|w| w / sum).collect()
}

fn luma(rgb: [f64; 3]) -> f64 {
    rgb[0] * LUMA_WEIGHTS[0] + rgb[1] * LUMA_WEIGHTS[1] + rgb[2] * LUMA_WEIGHTS[2]
}

/// Grayscale conversion with the classic luma weights
pub fn to_gray(image: &RgbImage) -> GrayImage {
    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        let p = image.get_pixel(x, y).0;
        let value = luma([f64::from(p[0]), f64::from(p[1]), f64::from(p[2])]);
        Luma([value.round().clamp(0.0, 255.0) as u8])
    })
}

/// Mean RGB over the outer band, each pixel counted once
fn border_mean(image: &RgbImage) -> [f64; 3] {
    let (width, height) = image.dimensions();
    let band = fraction_of(width.min(height), BORDER_BAND_RATIO);

    let mut sum = [0u64; 3];
    let mut count = 0u64;
    for (x, y, pixel) in image.enumerate_pixels() {
        let in_band = x < band || y < band || x + band >= width || y + band >= height;
        if in_band {
            for (acc, &c) in sum.iter_mut().zip(pixel.0.iter()) {
                *acc += u64::from(c);
            }
            count += 1;
        }
    }

    // band >= 1 and the image is non-empty, so count > 0
    let count = count.max(1) as f64;
    sum.map(|s| s as f64 / count)
}

/// Mean gray over the central square patch
fn center_mean(gray: &GrayImage) -> f64 {
    let (width, height) = gray.dimensions();
    let side = fraction_of(width.min(height), CENTER_PATCH_RATIO);
    let x0 = (width - side) / 2;
    let y0 = (height - side) / 2;

    let mut sum = 0u64;
    for y in y0..y0 + side {
        for x in x0..x0 + side {
            sum += u64::from(gray.get_pixel(x, y).0[0]);
        }
    }
    sum as f64 / f64::from(side * side)
}

fn fraction_of(length: u32, ratio: f64) -> u32 {
    ((f64::from(length) * ratio) as u32).clamp(1, length.max(1))
}
