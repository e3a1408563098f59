//! Page region detection
//!
//! Finds the dominant page-like blob in a binary mask, either as a
//! simplified polygon or as a minimum-area rotated box.

use imageproc::contours::{find_contours, BorderType, Contour};
use imageproc::distance_transform::Norm;
use imageproc::geometry::{approximate_polygon_dp, arc_length, contour_area};
use imageproc::morphology::dilate;
use imageproc::point::Point;
use tracing::{debug, instrument};

use super::geometry::min_area_rect;
use super::types::{BinaryMask, Region, RotatedBox};

// ============================================================
// Constants
// ============================================================

/// Chebyshev radius of the dilation element (5x5 square)
const DILATION_RADIUS: u8 = 2;

const DILATION_ITERATIONS: usize = 2;

/// Candidates covering more than this share of the image are the frame itself
const MAX_AREA_RATIO: f64 = 0.98;

/// Douglas-Peucker tolerance relative to the closed contour perimeter
const POLYGON_EPSILON_RATIO: f64 = 0.02;

const MIN_POLYGON_VERTICES: usize = 4;

// ============================================================
// Types
// ============================================================

/// Shape returned by the detector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DetectionMode {
    /// Simplified contour with at least four vertices
    Polygon,
    /// Minimum-area rotated rectangle
    #[default]
    Box,
}

impl DetectionMode {
    pub fn name(&self) -> &'static str {
        match self {
            DetectionMode::Polygon => "polygon",
            DetectionMode::Box => "box",
        }
    }
}

impl std::str::FromStr for DetectionMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "polygon" => Ok(Self::Polygon),
            "box" => Ok(Self::Box),
            other => Err(format!("unknown detection mode: {}", other)),
        }
    }
}

// ============================================================
// Detector
// ============================================================

/// Detect the dominant page region, if any
///
/// Returns `None` when the mask holds no acceptable candidate.
#[instrument(skip_all, fields(mode = ?mode))]
pub fn detect_region(mask: &BinaryMask, mode: DetectionMode) -> Option<Region> {
    let (width, height) = mask.dimensions();
    if width == 0 || height == 0 {
        return None;
    }
    let max_area = f64::from(width) * f64::from(height) * MAX_AREA_RATIO;

    let contours = outer_contours(mask);
    debug!(contours = contours.len(), "Traced outer contours");

    let region = match mode {
        DetectionMode::Box => best_box(&contours, max_area).map(Region::Box),
        DetectionMode::Polygon => best_polygon(contours, max_area).map(Region::Polygon),
    };

    match &region {
        Some(found) => debug!(kind = found.kind(), "Page region detected"),
        None => debug!("No page region"),
    }
    region
}

/// Dilate the mask and trace the outer borders of its foreground
fn outer_contours(mask: &BinaryMask) -> Vec<Contour<i32>> {
    let mut dilated = mask.as_image().clone();
    for _ in 0..DILATION_ITERATIONS {
        dilated = dilate(&dilated, Norm::LInf, DILATION_RADIUS);
    }

    find_contours::<i32>(&dilated)
        .into_iter()
        .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
        .filter(|c| !c.points.is_empty())
        .collect()
}

fn contour_box(points: &[Point<i32>]) -> RotatedBox {
    min_area_rect(points)
}

fn best_box(contours: &[Contour<i32>], max_area: f64) -> Option<RotatedBox> {
    contours
        .iter()
        .map(|c| contour_box(&c.points))
        .filter(|b| b.area() <= max_area)
        .max_by(|a, b| a.area().total_cmp(&b.area()))
}

fn best_polygon(contours: Vec<Contour<i32>>, max_area: f64) -> Option<Vec<Point<i32>>> {
    let mut ranked: Vec<(f64, Vec<Point<i32>>)> = contours
        .into_iter()
        .map(|c| (contour_area(&c.points), c.points))
        .collect();
    ranked.sort_by(|a, b| b.0.total_cmp(&a.0));

    ranked.into_iter().find_map(|(_, points)| {
        let epsilon = arc_length(&points, true) * POLYGON_EPSILON_RATIO;
        let approx = approximate_polygon_dp(&points, epsilon, true);
        if approx.len() >= MIN_POLYGON_VERTICES && contour_box(&approx).area() <= max_area {
            Some(approx)
        } else {
            None
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mask_with_rects(width: u32, height: u32, rects: &[(u32, u32, u32, u32)]) -> BinaryMask {
        BinaryMask::from_fn(width, height, |x, y| {
            rects
                .iter()
                .any(|&(x0, y0, x1, y1)| x >= x0 && x < x1 && y >= y0 && y < y1)
        })
    }

    #[test]
    fn test_empty_mask_has_no_region() {
        let mask = BinaryMask::from_fn(100, 100, |_, _| false);
        assert!(detect_region(&mask, DetectionMode::Box).is_none());
        assert!(detect_region(&mask, DetectionMode::Polygon).is_none());
    }

    #[test]
    fn test_full_frame_is_rejected() {
        let mask = BinaryMask::from_fn(100, 100, |_, _| true);
        assert!(detect_region(&mask, DetectionMode::Box).is_none());
    }

    #[test]
    fn test_box_mode_axis_aligned() {
        let mask = mask_with_rects(200, 150, &[(40, 30, 160, 120)]);
        let region = detect_region(&mask, DetectionMode::Box).unwrap();
        let rotated = region.rotated_box();

        let mod90 = rotated.angle.rem_euclid(90.0);
        assert!(mod90.min(90.0 - mod90) < 1e-6, "angle {}", rotated.angle);
        // dilation grows the blob by 4 px per side
        assert!((rotated.center.x - 99.5).abs() < 1.0);
        assert!((rotated.center.y - 74.5).abs() < 1.0);
        assert!(matches!(region, Region::Box(_)));
    }

    #[test]
    fn test_box_mode_largest_wins() {
        let mask = mask_with_rects(300, 200, &[(10, 10, 40, 40), (100, 50, 250, 180)]);
        let rotated = detect_region(&mask, DetectionMode::Box)
            .unwrap()
            .rotated_box();
        assert!(rotated.center.x > 150.0);
        assert!(rotated.area() > 150.0 * 130.0);
    }

    #[test]
    fn test_polygon_mode_simplifies_rectangle() {
        let mask = mask_with_rects(200, 200, &[(50, 60, 150, 140)]);
        match detect_region(&mask, DetectionMode::Polygon) {
            Some(Region::Polygon(points)) => {
                assert!(points.len() >= 4);
                let area = contour_area(&points);
                assert!(area > 100.0 * 80.0 * 0.9);
            }
            other => panic!("Unexpected region: {:?}", other),
        }
    }

    #[test]
    fn test_polygon_mode_thin_line() {
        // a one-pixel line dilates into a 9 px bar
        let mask = mask_with_rects(100, 100, &[(20, 50, 80, 51)]);
        let region = detect_region(&mask, DetectionMode::Polygon);
        assert!(matches!(region, Some(Region::Polygon(_))));
    }

    #[test]
    fn test_detection_mode_from_str() {
        assert_eq!("box".parse::<DetectionMode>(), Ok(DetectionMode::Box));
        assert_eq!("Polygon".parse::<DetectionMode>(), Ok(DetectionMode::Polygon));
        assert!("circle".parse::<DetectionMode>().is_err());
    }
}
