//! Rotation correction and crop
//!
//! Rotates the whole image about the detected box center onto a canvas
//! large enough to hold every source pixel, then crops the straightened box
//! (plus an optional margin) out of it.

use image::{imageops, Rgb, RgbImage};
use imageproc::geometric_transformations::{warp_into, Interpolation};
use tracing::{debug, instrument};

use super::geometry::{bounding_rect, bounds, Affine};
use super::types::{CorrectionError, PixelRect, Point2, Region, Result};

// ============================================================
// Constants
// ============================================================

/// Box angles above this are treated as a small tilt the other way
const ANGLE_WRAP_THRESHOLD: f64 = 80.0;

const WHITE: Rgb<u8> = Rgb([255, 255, 255]);

// ============================================================
// Types
// ============================================================

/// Output of the perspective corrector
#[derive(Debug, Clone)]
pub struct Correction {
    /// Straightened crop over the fill color
    pub corrected: RgbImage,
    /// Same crop over white
    pub corrected_white: RgbImage,
    /// Axis-aligned crop of the un-rotated box from the source
    pub reference: RgbImage,
    /// Applied rotation in degrees, counter-clockwise on screen
    pub angle: f64,
    /// Size of the rotated canvas
    pub canvas: (u32, u32),
    /// Crop rectangle on the canvas
    pub crop: PixelRect,
    /// Crop rectangle of the reference on the source
    pub reference_rect: PixelRect,
}

// ============================================================
// Corrector
// ============================================================

/// Rotation that straightens a box with the given OpenCV-style angle
pub fn correction_angle(box_angle: f64) -> f64 {
    if box_angle > ANGLE_WRAP_THRESHOLD {
        box_angle - 90.0
    } else {
        box_angle
    }
}

/// Straighten `region` and crop it out of `image`
///
/// `fill` colors the canvas area not covered by the source image. Fails with
/// `DegenerateCrop` when the crop collapses after clamping.
#[instrument(skip_all, fields(margin = border_margin))]
pub fn correct(
    image: &RgbImage,
    region: &Region,
    border_margin: u32,
    fill: [u8; 3],
) -> Result<Correction> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(CorrectionError::InvalidImage(format!(
            "cannot correct a {}x{} image",
            width, height
        )));
    }

    let rotated_box = region.rotated_box();
    let angle = correction_angle(rotated_box.angle);

    let reference_rect = bounding_rect(&rotated_box.corners, border_margin, width, height);
    if reference_rect.is_empty() {
        return Err(CorrectionError::DegenerateCrop {
            width: reference_rect.width,
            height: reference_rect.height,
        });
    }
    let reference = crop(image, reference_rect);

    let (affine, canvas) = canvas_transform(rotated_box.center, angle, width, height);
    let projection = affine.to_projection().ok_or_else(|| {
        CorrectionError::InvalidImage(format!("rotation by {} is not invertible", angle))
    })?;

    let mut rotated = RgbImage::new(canvas.0, canvas.1);
    warp_into(image, &projection, Interpolation::Bicubic, Rgb(fill), &mut rotated);
    let mut rotated_white = RgbImage::new(canvas.0, canvas.1);
    warp_into(image, &projection, Interpolation::Bicubic, WHITE, &mut rotated_white);

    let moved: Vec<Point2> = rotated_box.corners.iter().map(|&p| affine.apply(p)).collect();
    let crop_rect = bounding_rect(&moved, border_margin, canvas.0, canvas.1);
    if crop_rect.is_empty() {
        return Err(CorrectionError::DegenerateCrop {
            width: crop_rect.width,
            height: crop_rect.height,
        });
    }

    debug!(
        angle,
        canvas_width = canvas.0,
        canvas_height = canvas.1,
        crop_width = crop_rect.width,
        crop_height = crop_rect.height,
        "Rotation corrected"
    );

    Ok(Correction {
        corrected: crop(&rotated, crop_rect),
        corrected_white: crop(&rotated_white, crop_rect),
        reference,
        angle,
        canvas,
        crop: crop_rect,
        reference_rect,
    })
}

/// Rotation about `center` shifted so the whole rotated image lands on a
/// canvas starting at the origin
fn canvas_transform(center: Point2, angle: f64, width: u32, height: u32) -> (Affine, (u32, u32)) {
    let rotation = Affine::rotation(center, angle);
    let (w, h) = (f64::from(width), f64::from(height));
    let corners = [
        Point2::new(0.0, 0.0),
        Point2::new(w, 0.0),
        Point2::new(w, h),
        Point2::new(0.0, h),
    ]
    .map(|p| rotation.apply(p));

    let (min_x, min_y, max_x, max_y) = bounds(&corners);
    let canvas = (
        ((max_x - min_x).ceil() as u32).max(1),
        ((max_y - min_y).ceil() as u32).max(1),
    );
    (rotation.translated(-min_x, -min_y), canvas)
}

fn crop(image: &RgbImage, rect: PixelRect) -> RgbImage {
    imageops::crop_imm(image, rect.x, rect.y, rect.width, rect.height).to_image()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correction::synthetic::{page_on_bed, rotated_page_on_bed, BED, PAGE};
    use crate::correction::types::RotatedBox;

    fn axis_box(x0: f64, y0: f64, x1: f64, y1: f64) -> Region {
        Region::Box(RotatedBox {
            center: Point2::new((x0 + x1) / 2.0, (y0 + y1) / 2.0),
            width: x1 - x0,
            height: y1 - y0,
            angle: 90.0,
            corners: [
                Point2::new(x0, y1),
                Point2::new(x0, y0),
                Point2::new(x1, y0),
                Point2::new(x1, y1),
            ],
        })
    }

    #[test]
    fn test_correction_angle_wraps() {
        assert_eq!(correction_angle(90.0), 0.0);
        assert_eq!(correction_angle(85.0), -5.0);
        assert_eq!(correction_angle(12.0), 12.0);
        assert_eq!(correction_angle(80.0), 80.0);
    }

    #[test]
    fn test_canvas_holds_rotated_image() {
        let (_, canvas) = canvas_transform(Point2::new(50.0, 25.0), 0.0, 100, 50);
        assert_eq!(canvas, (100, 50));

        let (affine, canvas) = canvas_transform(Point2::new(50.0, 25.0), 30.0, 100, 50);
        let (s, c) = 30f64.to_radians().sin_cos();
        let expected_w = (100.0 * c + 50.0 * s).ceil() as u32;
        let expected_h = (100.0 * s + 50.0 * c).ceil() as u32;
        assert_eq!(canvas, (expected_w, expected_h));

        for p in [(0.0, 0.0), (100.0, 0.0), (0.0, 50.0), (100.0, 50.0)] {
            let q = affine.apply(Point2::new(p.0, p.1));
            assert!(q.x >= -1e-9 && q.y >= -1e-9);
            assert!(q.x <= f64::from(canvas.0) + 1e-9);
            assert!(q.y <= f64::from(canvas.1) + 1e-9);
        }
    }

    #[test]
    fn test_axis_aligned_crop_is_exact() {
        let image = page_on_bed(300, 200, (60, 40, 240, 160));
        let region = axis_box(60.0, 40.0, 239.0, 159.0);

        let correction = correct(&image, &region, 0, [BED; 3]).unwrap();
        assert_eq!(correction.angle, 0.0);
        assert_eq!(correction.canvas, (300, 200));
        assert_eq!(correction.crop, PixelRect { x: 60, y: 40, width: 180, height: 120 });
        assert_eq!(correction.corrected.dimensions(), (180, 120));
        assert_eq!(correction.reference.dimensions(), (180, 120));
        assert!(correction.corrected_white.get_pixel(90, 60).0[0] > 200);
    }

    #[test]
    fn test_margin_grows_crop_and_reference() {
        let image = page_on_bed(300, 200, (60, 40, 240, 160));
        let region = axis_box(60.0, 40.0, 239.0, 159.0);

        let correction = correct(&image, &region, 10, [BED; 3]).unwrap();
        assert_eq!(correction.corrected.dimensions(), (200, 140));
        assert_eq!(correction.reference.dimensions(), (200, 140));
        assert!(correction.corrected.get_pixel(2, 2).0[0] < 50);
    }

    #[test]
    fn test_margin_is_clamped_to_image() {
        let image = page_on_bed(100, 100, (5, 5, 95, 95));
        let region = axis_box(5.0, 5.0, 94.0, 94.0);

        let correction = correct(&image, &region, 50, [BED; 3]).unwrap();
        assert_eq!(correction.corrected.dimensions(), (100, 100));
        assert_eq!(correction.reference_rect, PixelRect { x: 0, y: 0, width: 100, height: 100 });
    }

    #[test]
    fn test_rotated_page_is_straightened() {
        let image = rotated_page_on_bed(400, 300, 200.0, 120.0, 10.0);
        let (s, c) = 10f64.to_radians().sin_cos();
        let corners = [(-100.0, -60.0), (100.0, -60.0), (100.0, 60.0), (-100.0, 60.0)]
            .map(|(dx, dy)| Point2::new(200.0 + dx * c - dy * s, 150.0 + dx * s + dy * c));
        let region = Region::Box(crate::correction::geometry::hull_min_area_rect(&corners));

        let correction = correct(&image, &region, 0, [BED; 3]).unwrap();
        assert!((correction.angle - 10.0).abs() < 1e-6);

        let (w, h) = correction.corrected_white.dimensions();
        assert!((i64::from(w) - 200).abs() <= 2, "width {}", w);
        assert!((i64::from(h) - 120).abs() <= 2, "height {}", h);
        // straightened page fills the crop
        assert!(correction.corrected_white.get_pixel(w / 2, 5).0[0] > 200);
        assert!(correction.corrected_white.get_pixel(5, h / 2).0[0] > 200);
        // the un-rotated reference is larger
        assert!(correction.reference.width() > w && correction.reference.height() > h);
    }

    #[test]
    fn test_fill_color_outside_source() {
        let image = RgbImage::from_pixel(100, 100, Rgb([PAGE; 3]));
        // box hanging over the top-left edge
        let region = axis_box(-20.0, -20.0, 60.0, 60.0);
        let correction = correct(&image, &region, 0, [1, 2, 3]).unwrap();
        assert_eq!(correction.crop.x, 0);
        assert_eq!(correction.crop.y, 0);

        let rotated_box = Region::Box(RotatedBox {
            angle: 45.0,
            ..region.rotated_box()
        });
        let rotated = correct(&image, &rotated_box, 0, [1, 2, 3]).unwrap();
        assert_eq!(rotated.corrected.get_pixel(0, 0).0, [1, 2, 3]);
        assert_eq!(rotated.corrected_white.get_pixel(0, 0).0, [255, 255, 255]);
    }

    #[test]
    fn test_box_outside_image_is_degenerate() {
        let image = page_on_bed(100, 100, (10, 10, 90, 90));
        let region = axis_box(150.0, 150.0, 180.0, 180.0);
        let result = correct(&image, &region, 0, [BED; 3]);
        assert!(matches!(result, Err(CorrectionError::DegenerateCrop { .. })));
    }
}
