//! Black border refinement
//!
//! Scanners and rotation leave thin dark frames around the straightened
//! page. Two passes remove them:
//!
//! 1. **Coarse**: strip runs of all-frame rows and columns from each side.
//!    On the bottom and right the seam line before a run goes too.
//! 2. **Corner**: from each dark corner walk along both axes while pixels
//!    stay dark and cut at the nearer discontinuity.

use image::{imageops, RgbImage};
use tracing::{debug, instrument, trace};

use super::binarize::to_gray;
use super::types::{
    BinaryMask, CropAxis, CropPlan, CropProposal, EdgeDescriptor, KeepSide, PixelRect, Result,
};

// ============================================================
// Constants
// ============================================================

/// Gray values above this are page content, the rest is frame
pub const FRAME_THRESHOLD: u8 = 50;

// ============================================================
// Types
// ============================================================

/// Output of the border refiner
#[derive(Debug, Clone)]
pub struct Refinement {
    /// Refined crop of the white-background buffer
    pub image: RgbImage,
    /// Coarse crop on the input buffers
    pub coarse: PixelRect,
    /// Corner plan relative to the coarse crop
    pub plan: CropPlan,
}

impl Refinement {
    /// Final crop rectangle on the input buffers
    pub fn rect(&self) -> PixelRect {
        let inner = self.plan.as_rect();
        PixelRect {
            x: self.coarse.x + inner.x,
            y: self.coarse.y + inner.y,
            width: inner.width,
            height: inner.height,
        }
    }
}

// ============================================================
// Refiner
// ============================================================

/// Content mask: 255 where gray exceeds [`FRAME_THRESHOLD`]
pub fn content_mask(image: &RgbImage) -> BinaryMask {
    let gray = to_gray(image);
    BinaryMask::from_fn(gray.width(), gray.height(), |x, y| {
        gray.get_pixel(x, y).0[0] > FRAME_THRESHOLD
    })
}

/// Remove residual black frame from a corrected crop
///
/// `color` is scanned; the same crops are applied to `white`, which
/// becomes the result.
#[instrument(skip_all, fields(width = color.width(), height = color.height()))]
pub fn refine(color: &RgbImage, white: &RgbImage) -> Result<Refinement> {
    let mask = content_mask(color);
    mask.ensure_same_size(white)?;

    let coarse = coarse_bounds(&mask);
    let coarse_color = crop(color, coarse);
    let coarse_white = crop(white, coarse);
    debug!(
        x = coarse.x,
        y = coarse.y,
        width = coarse.width,
        height = coarse.height,
        "Coarse frame removed"
    );

    let coarse_mask = content_mask(&coarse_color);
    let proposals = corner_proposals(&coarse_mask);
    let plan = CropPlan::fold(coarse.height, coarse.width, proposals);
    let image = crop(&coarse_white, plan.as_rect());

    debug!(
        proposals = plan.proposals.len(),
        rows = ?plan.rows,
        cols = ?plan.cols,
        "Corner frame removed"
    );

    Ok(Refinement {
        image,
        coarse,
        plan,
    })
}

// ============================================================
// Pass 1: full-line scan
// ============================================================

/// Bounds left after stripping all-frame lines and their seams
pub fn coarse_bounds(mask: &BinaryMask) -> PixelRect {
    let (width, height) = mask.dimensions();

    let (y0, y1) = trim_axis(height, |y| (0..width).all(|x| !mask.is_foreground(x, y)));
    let (x0, x1) = trim_axis(width, |x| (0..height).all(|y| !mask.is_foreground(x, y)));

    PixelRect {
        x: x0,
        y: y0,
        width: x1 - x0,
        height: y1 - y0,
    }
}

/// Half-open range kept on one axis
///
/// A side without a frame run is untouched. The leading side loses its run,
/// the trailing side loses its run plus the seam line ahead of it. If every
/// line is frame the axis is kept whole, and if nothing would be left only
/// the runs are dropped.
fn trim_axis<F>(len: u32, all_frame: F) -> (u32, u32)
where
    F: Fn(u32) -> bool,
{
    let leading = (0..len).take_while(|&i| all_frame(i)).count() as u32;
    if leading == len {
        return (0, len);
    }
    let trailing = (0..len).rev().take_while(|&i| all_frame(i)).count() as u32;

    let inner = (leading, len - trailing);
    let end = if trailing > 0 { inner.1 - 1 } else { inner.1 };

    if inner.0 < end {
        (inner.0, end)
    } else {
        inner
    }
}

// ============================================================
// Pass 2: corner discontinuities
// ============================================================

/// One proposal per dark corner, in visiting order
pub fn corner_proposals(mask: &BinaryMask) -> Vec<CropProposal> {
    let (width, height) = mask.dimensions();
    if width == 0 || height == 0 {
        return Vec::new();
    }

    EdgeDescriptor::table(height, width)
        .iter()
        .filter_map(|edge| corner_proposal(mask, edge))
        .collect()
}

fn corner_proposal(mask: &BinaryMask, edge: &EdgeDescriptor) -> Option<CropProposal> {
    let (row, col) = edge.anchor;
    if mask.is_foreground(col, row) {
        return None;
    }
    let (dr, dc) = edge.direction;

    let frame_row = walk(row, dr, mask.height(), |r| !mask.is_foreground(col, r));
    let frame_col = walk(col, dc, mask.width(), |c| !mask.is_foreground(c, row));

    let row_shift = frame_row.abs_diff(row);
    let col_shift = frame_col.abs_diff(col);

    let proposal = if row_shift <= col_shift {
        CropProposal {
            corner: edge.corner,
            point: (frame_row, col),
            axis: CropAxis::Row,
            keep: keep_side(dr),
        }
    } else {
        CropProposal {
            corner: edge.corner,
            point: (row, frame_col),
            axis: CropAxis::Col,
            keep: keep_side(dc),
        }
    };

    trace!(
        corner = edge.corner.name(),
        row_shift,
        col_shift,
        axis = ?proposal.axis,
        "Corner proposal"
    );
    Some(proposal)
}

/// Last index reached from `start` stepping by `step` while `is_frame` holds
fn walk<F>(start: u32, step: i8, len: u32, is_frame: F) -> u32
where
    F: Fn(u32) -> bool,
{
    let mut at = start;
    loop {
        let next = if step > 0 {
            at.checked_add(1).filter(|&n| n < len)
        } else {
            at.checked_sub(1)
        };
        match next {
            Some(n) if is_frame(n) => at = n,
            _ => return at,
        }
    }
}

fn keep_side(step: i8) -> KeepSide {
    if step > 0 {
        KeepSide::After
    } else {
        KeepSide::Before
    }
}

fn crop(image: &RgbImage, rect: PixelRect) -> RgbImage {
    imageops::crop_imm(image, rect.x, rect.y, rect.width, rect.height).to_image()
}
