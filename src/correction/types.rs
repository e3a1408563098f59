//! Core types for the page correction stages
//!
//! Masks, regions, rotated boxes, corner descriptors and crop plans shared by
//! the binarizer, region detector, perspective corrector and border refiner.

use image::{GrayImage, Luma, RgbImage};
use imageproc::point::Point;
use thiserror::Error;

// ============================================================
// Constants
// ============================================================

/// Mask value for page-like foreground
pub const FOREGROUND: u8 = 255;

/// Mask value for background
pub const BACKGROUND: u8 = 0;

// ============================================================
// Error Types
// ============================================================

/// Correction error types
#[derive(Debug, Error)]
pub enum CorrectionError {
    /// Crop box collapsed to zero width or height after clamping
    #[error("Degenerate crop: {width}x{height}")]
    DegenerateCrop { width: u32, height: u32 },

    /// Two buffers that must share a shape do not
    #[error("Dimension mismatch: expected {expected:?}, got {actual:?}")]
    DimensionMismatch {
        expected: (u32, u32),
        actual: (u32, u32),
    },

    #[error("Invalid image: {0}")]
    InvalidImage(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

pub type Result<T> = std::result::Result<T, CorrectionError>;

// ============================================================
// Binary Mask
// ============================================================

/// Single-channel mask restricted to {0, 255}
///
/// 255 marks page-like foreground, 0 marks background. Every stage of the
/// crate uses this polarity, which is also what `imageproc` morphology and
/// contour tracing treat as the object.
#[derive(Debug, Clone, PartialEq)]
pub struct BinaryMask(GrayImage);

impl BinaryMask {
    /// Build a mask from a per-pixel predicate
    pub fn from_fn<F>(width: u32, height: u32, mut is_foreground: F) -> Self
    where
        F: FnMut(u32, u32) -> bool,
    {
        Self(GrayImage::from_fn(width, height, |x, y| {
            if is_foreground(x, y) {
                Luma([FOREGROUND])
            } else {
                Luma([BACKGROUND])
            }
        }))
    }

    /// Wrap a gray image, snapping every non-zero value to foreground
    pub fn from_gray(gray: GrayImage) -> Self {
        let (width, height) = gray.dimensions();
        Self::from_fn(width, height, |x, y| gray.get_pixel(x, y).0[0] != BACKGROUND)
    }

    pub fn width(&self) -> u32 {
        self.0.width()
    }

    pub fn height(&self) -> u32 {
        self.0.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.0.dimensions()
    }

    /// Whether the pixel at (x, y) is foreground
    #[inline]
    pub fn is_foreground(&self, x: u32, y: u32) -> bool {
        self.0.get_pixel(x, y).0[0] == FOREGROUND
    }

    /// Number of foreground pixels
    pub fn foreground_count(&self) -> usize {
        self.0.pixels().filter(|p| p.0[0] == FOREGROUND).count()
    }

    pub fn as_image(&self) -> &GrayImage {
        &self.0
    }

    /// Fail unless `image` has exactly the mask's shape
    pub fn ensure_same_size(&self, image: &RgbImage) -> Result<()> {
        if self.dimensions() != image.dimensions() {
            return Err(CorrectionError::DimensionMismatch {
                expected: self.dimensions(),
                actual: image.dimensions(),
            });
        }
        Ok(())
    }
}

// ============================================================
// Geometry
// ============================================================

/// Sub-pixel point in image coordinates (x right, y down)
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point2 {
    pub x: f64,
    pub y: f64,
}

impl Point2 {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

impl From<Point<i32>> for Point2 {
    fn from(p: Point<i32>) -> Self {
        Self::new(f64::from(p.x), f64::from(p.y))
    }
}

/// Minimum-area rotated rectangle
///
/// `angle` follows the OpenCV convention: degrees in (0, 90], measured from
/// the x axis to the `width` side, clockwise on screen.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RotatedBox {
    pub center: Point2,
    pub width: f64,
    pub height: f64,
    pub angle: f64,
    pub corners: [Point2; 4],
}

impl RotatedBox {
    pub fn area(&self) -> f64 {
        self.width * self.height
    }
}

/// Detected page region
#[derive(Debug, Clone, PartialEq)]
pub enum Region {
    /// Simplified contour of the page boundary (at least 4 vertices)
    Polygon(Vec<Point<i32>>),
    /// Minimum-area box around the page contour
    Box(RotatedBox),
}

impl Region {
    /// Minimum-area rectangle enclosing the region
    pub fn rotated_box(&self) -> RotatedBox {
        match self {
            Region::Polygon(points) => super::geometry::min_area_rect(points),
            Region::Box(rotated) => *rotated,
        }
    }

    /// Four corner points of the enclosing rectangle
    pub fn corners(&self) -> [Point2; 4] {
        self.rotated_box().corners
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Region::Polygon(_) => "polygon",
            Region::Box(_) => "box",
        }
    }
}

/// Integer pixel rectangle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PixelRect {
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

// ============================================================
// Border Refiner Descriptors
// ============================================================

/// Corner of the image scanned by the border refiner
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Corner {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

impl Corner {
    /// Visiting order of the corner pass
    pub const ORDER: [Corner; 4] = [
        Corner::TopLeft,
        Corner::TopRight,
        Corner::BottomLeft,
        Corner::BottomRight,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Corner::TopLeft => "top-left",
            Corner::TopRight => "top-right",
            Corner::BottomLeft => "bottom-left",
            Corner::BottomRight => "bottom-right",
        }
    }
}

/// Scan start point and direction for one corner
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeDescriptor {
    pub corner: Corner,
    /// Anchor as (row, col)
    pub anchor: (u32, u32),
    /// Step along (row, col); each component is +1 or -1
    pub direction: (i8, i8),
}

impl EdgeDescriptor {
    /// Corner table for a mask of the given size, in visiting order
    pub fn table(height: u32, width: u32) -> [EdgeDescriptor; 4] {
        let last_row = height.saturating_sub(1);
        let last_col = width.saturating_sub(1);
        Corner::ORDER.map(|corner| {
            let (anchor, direction) = match corner {
                Corner::TopLeft => ((0, 0), (1, 1)),
                Corner::TopRight => ((0, last_col), (1, -1)),
                Corner::BottomLeft => ((last_row, 0), (-1, 1)),
                Corner::BottomRight => ((last_row, last_col), (-1, -1)),
            };
            EdgeDescriptor {
                corner,
                anchor,
                direction,
            }
        })
    }
}

/// Axis a crop proposal acts on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CropAxis {
    Row,
    Col,
}

/// Which side of the crop point survives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeepSide {
    Before,
    After,
}

/// Crop proposed by one corner
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropProposal {
    pub corner: Corner,
    /// Discontinuity as (row, col)
    pub point: (u32, u32),
    pub axis: CropAxis,
    pub keep: KeepSide,
}

/// Folded corner proposals as half-open ranges per axis
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CropPlan {
    pub proposals: Vec<CropProposal>,
    pub rows: (u32, u32),
    pub cols: (u32, u32),
}

impl CropPlan {
    /// Fold proposals in order over a `height` x `width` buffer
    ///
    /// `After` keeps the range starting at the last frame line, `Before`
    /// keeps everything ahead of it. A later proposal on the same bound replaces an
    /// earlier one. An axis whose folded range would be empty is left whole.
    pub fn fold(height: u32, width: u32, proposals: Vec<CropProposal>) -> Self {
        let mut rows = (0, height);
        let mut cols = (0, width);

        for proposal in &proposals {
            let (range, at) = match proposal.axis {
                CropAxis::Row => (&mut rows, proposal.point.0),
                CropAxis::Col => (&mut cols, proposal.point.1),
            };
            match proposal.keep {
                KeepSide::After => range.0 = at,
                KeepSide::Before => range.1 = at,
            }
        }

        if rows.0 >= rows.1 {
            rows = (0, height);
        }
        if cols.0 >= cols.1 {
            cols = (0, width);
        }

        Self {
            proposals,
            rows,
            cols,
        }
    }

    /// Whether the plan removes anything
    pub fn is_identity(&self, height: u32, width: u32) -> bool {
        self.rows == (0, height) && self.cols == (0, width)
    }

    pub fn as_rect(&self) -> PixelRect {
        PixelRect {
            x: self.cols.0,
            y: self.rows.0,
            width: self.cols.1 - self.cols.0,
            height: self.rows.1 - self.rows.0,
        }
    }
}
