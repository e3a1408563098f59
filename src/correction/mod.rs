//! Page correction module
//!
//! Detects the page in a photographed or scanned image, straightens it and
//! strips the dark frame left around it.
//!
//! # Stages
//!
//! - [`binarize`]: adaptive foreground mask plus border color estimate
//! - [`detect_region`]: dominant page polygon or rotated box
//! - [`correct`]: rotation onto an enlarged canvas and crop
//! - [`refine`]: coarse line scan and corner discontinuity crop
//!
//! # Example
//!
//! ```rust,no_run
//! use scan_autocrop::correction::{binarize, correct, detect_region, refine, CorrectionOptions};
//!
//! let image = image::open("page.tif").unwrap().to_rgb8();
//! let options = CorrectionOptions::builder().border_margin(20).build();
//!
//! let binarization = binarize(&image, options.binarization).unwrap();
//! if let Some(region) = detect_region(&binarization.mask, options.detection) {
//!     let fill = options.fill.resolve(binarization.border_color);
//!     let corrected = correct(&image, &region, options.border_margin, fill).unwrap();
//!     let refined = refine(&corrected.corrected, &corrected.corrected_white).unwrap();
//!     println!("{}x{}", refined.image.width(), refined.image.height());
//! }
//! ```

mod binarize;
mod detect;
mod geometry;
mod refine;
mod transform;
mod types;

pub use binarize::{binarize, blur_kernel_size, to_gray, Binarization, BinarizationMode};
pub use detect::{detect_region, DetectionMode};
pub use geometry::{hull_min_area_rect, min_area_rect, Affine};
pub use refine::{coarse_bounds, content_mask, corner_proposals, refine, Refinement, FRAME_THRESHOLD};
pub use transform::{correct, correction_angle, Correction};
pub use types::{
    BinaryMask, Corner, CorrectionError, CropAxis, CropPlan, CropProposal, EdgeDescriptor,
    KeepSide, PixelRect, Point2, Region, Result, RotatedBox, BACKGROUND, FOREGROUND,
};

// ============================================================
// Constants
// ============================================================

/// Default outward margin around the detected page in pixels
const DEFAULT_BORDER_MARGIN: u32 = 0;

/// Default minimum output/original area ratio (disabled)
const DEFAULT_MIN_AREA_RATIO: f64 = 0.0;

const WHITE: [u8; 3] = [255, 255, 255];
const BLACK: [u8; 3] = [0, 0, 0];

// ============================================================
// Options
// ============================================================

/// Color used for canvas areas the rotated source does not cover
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FillColorPolicy {
    /// Mean border color measured by the binarizer
    #[default]
    EstimatedBorder,
    /// Fixed RGB triple
    Fixed([u8; 3]),
    White,
    Black,
}

impl FillColorPolicy {
    /// Concrete fill color given the estimated border color
    pub fn resolve(&self, border_color: [u8; 3]) -> [u8; 3] {
        match self {
            FillColorPolicy::EstimatedBorder => border_color,
            FillColorPolicy::Fixed(rgb) => *rgb,
            FillColorPolicy::White => WHITE,
            FillColorPolicy::Black => BLACK,
        }
    }
}

impl std::str::FromStr for FillColorPolicy {
    type Err = String;

    /// Accepts `estimated`, `white`, `black` or `R,G,B`
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "estimated" | "estimated_border" => Ok(Self::EstimatedBorder),
            "white" => Ok(Self::White),
            "black" => Ok(Self::Black),
            other => {
                let channels: Vec<&str> = other.split(',').map(str::trim).collect();
                if channels.len() != 3 {
                    return Err(format!("invalid fill color: {}", s));
                }
                let mut rgb = [0u8; 3];
                for (slot, channel) in rgb.iter_mut().zip(&channels) {
                    *slot = channel
                        .parse()
                        .map_err(|_| format!("invalid fill channel '{}' in {}", channel, s))?;
                }
                Ok(Self::Fixed(rgb))
            }
        }
    }
}

/// Page correction options
#[derive(Debug, Clone, PartialEq)]
pub struct CorrectionOptions {
    /// Uniform outward margin added before cropping, in pixels
    pub border_margin: u32,
    /// Foreground polarity for the binarizer
    pub binarization: BinarizationMode,
    /// Region shape returned by the detector
    pub detection: DetectionMode,
    /// Canvas fill for the rotation
    pub fill: FillColorPolicy,
    /// Outputs covering at most this fraction of the original fall back to
    /// the original (0 disables the check)
    pub min_area_ratio: f64,
}

impl Default for CorrectionOptions {
    fn default() -> Self {
        Self {
            border_margin: DEFAULT_BORDER_MARGIN,
            binarization: BinarizationMode::Standard,
            detection: DetectionMode::Box,
            fill: FillColorPolicy::EstimatedBorder,
            min_area_ratio: DEFAULT_MIN_AREA_RATIO,
        }
    }
}

impl CorrectionOptions {
    /// Create a new options builder
    pub fn builder() -> CorrectionOptionsBuilder {
        CorrectionOptionsBuilder::default()
    }

    /// Options for dark pages on a light bed
    pub fn for_light_background() -> Self {
        Self {
            binarization: BinarizationMode::Inverted,
            fill: FillColorPolicy::White,
            ..Default::default()
        }
    }

    /// Check option ranges
    pub fn validate(&self) -> Result<()> {
        if !self.min_area_ratio.is_finite() || !(0.0..=1.0).contains(&self.min_area_ratio) {
            return Err(CorrectionError::InvalidConfiguration(format!(
                "min_area_ratio must be within [0, 1], got {}",
                self.min_area_ratio
            )));
        }
        Ok(())
    }
}

/// Builder for CorrectionOptions
#[derive(Debug, Default)]
pub struct CorrectionOptionsBuilder {
    options: CorrectionOptions,
}

impl CorrectionOptionsBuilder {
    /// Set outward margin in pixels
    #[must_use]
    pub fn border_margin(mut self, pixels: u32) -> Self {
        self.options.border_margin = pixels;
        self
    }

    /// Set binarization mode
    #[must_use]
    pub fn binarization(mut self, mode: BinarizationMode) -> Self {
        self.options.binarization = mode;
        self
    }

    /// Set detection mode
    #[must_use]
    pub fn detection(mut self, mode: DetectionMode) -> Self {
        self.options.detection = mode;
        self
    }

    /// Set rotation fill policy
    #[must_use]
    pub fn fill(mut self, policy: FillColorPolicy) -> Self {
        self.options.fill = policy;
        self
    }

    /// Set minimum output/original area ratio (0 disables)
    #[must_use]
    pub fn min_area_ratio(mut self, ratio: f64) -> Self {
        self.options.min_area_ratio = ratio;
        self
    }

    /// Build the options
    #[must_use]
    pub fn build(self) -> CorrectionOptions {
        self.options
    }
}

/// Synthetic page images shared by the unit tests
#[cfg(test)]
pub(crate) mod synthetic {
    use image::{Rgb, RgbImage};

    /// Scanner bed gray level
    pub const BED: u8 = 20;
    /// Page gray level
    pub const PAGE: u8 = 230;

    /// Bright page over `[x0, x1) x [y0, y1)` on a dark bed
    pub fn page_on_bed(width: u32, height: u32, page: (u32, u32, u32, u32)) -> RgbImage {
        let (x0, y0, x1, y1) = page;
        RgbImage::from_fn(width, height, |x, y| {
            if x >= x0 && x < x1 && y >= y0 && y < y1 {
                Rgb([PAGE; 3])
            } else {
                Rgb([BED; 3])
            }
        })
    }

    /// Centered `page_w` x `page_h` page turned clockwise on screen by
    /// `degrees`
    pub fn rotated_page_on_bed(
        width: u32,
        height: u32,
        page_w: f64,
        page_h: f64,
        degrees: f64,
    ) -> RgbImage {
        let (cx, cy) = (f64::from(width) / 2.0, f64::from(height) / 2.0);
        let (s, c) = degrees.to_radians().sin_cos();
        RgbImage::from_fn(width, height, |x, y| {
            let (dx, dy) = (f64::from(x) - cx, f64::from(y) - cy);
            // back into the page frame
            let u = dx * c + dy * s;
            let v = -dx * s + dy * c;
            if u.abs() <= page_w / 2.0 && v.abs() <= page_h / 2.0 {
                Rgb([PAGE; 3])
            } else {
                Rgb([BED; 3])
            }
        })
    }

    /// Paste `image` in the middle of a dark bed grown by `pad` per side
    pub fn pad_with_bed(image: &RgbImage, pad: u32) -> RgbImage {
        let mut padded =
            RgbImage::from_pixel(image.width() + 2 * pad, image.height() + 2 * pad, Rgb([BED; 3]));
        image::imageops::replace(&mut padded, image, i64::from(pad), i64::from(pad));
        padded
    }
}
