//! Planar geometry helpers
//!
//! Rotating-calipers minimum-area rectangle, 2x3 affine transforms and
//! axis-aligned bounding boxes.

use imageproc::geometric_transformations::Projection;
use imageproc::geometry::convex_hull;
use imageproc::point::Point;

use super::types::{PixelRect, Point2, RotatedBox};

/// Edges shorter than this are ignored by the calipers
const MIN_EDGE_LENGTH: f64 = 1e-9;

/// Minimum-area enclosing rectangle of a pixel point set
///
/// The angle is normalized to (0, 90] with `width` measured along it.
pub fn min_area_rect(points: &[Point<i32>]) -> RotatedBox {
    let hull: Vec<Point2> = convex_hull(points.to_vec())
        .into_iter()
        .map(Point2::from)
        .collect();
    hull_min_area_rect(&hull)
}

/// Rotating calipers over a convex polygon with its vertices in order
pub fn hull_min_area_rect(hull: &[Point2]) -> RotatedBox {
    match hull.len() {
        0 => return rotated_box(Point2::default(), (1.0, 0.0), 0.0, 0.0),
        1 => return rotated_box(hull[0], (1.0, 0.0), 0.0, 0.0),
        2 => {
            let (a, b) = (hull[0], hull[1]);
            let length = (b.x - a.x).hypot(b.y - a.y);
            let center = Point2::new((a.x + b.x) / 2.0, (a.y + b.y) / 2.0);
            let axis = ((b.x - a.x) / length, (b.y - a.y) / length);
            return rotated_box(center, axis, length, 0.0);
        }
        _ => {}
    }

    let n = hull.len();
    let mut best: Option<(f64, Point2, (f64, f64), f64, f64)> = None;

    for i in 0..n {
        let p1 = hull[i];
        let p2 = hull[(i + 1) % n];
        let (ex, ey) = (p2.x - p1.x, p2.y - p1.y);
        let length = ex.hypot(ey);
        if length < MIN_EDGE_LENGTH {
            continue;
        }
        let (ux, uy) = (ex / length, ey / length);
        let (vx, vy) = (-uy, ux);

        let (mut min_u, mut max_u) = (f64::MAX, f64::MIN);
        let (mut min_v, mut max_v) = (f64::MAX, f64::MIN);
        for p in hull {
            let (dx, dy) = (p.x - p1.x, p.y - p1.y);
            let u = dx * ux + dy * uy;
            let v = dx * vx + dy * vy;
            min_u = min_u.min(u);
            max_u = max_u.max(u);
            min_v = min_v.min(v);
            max_v = max_v.max(v);
        }

        let (width, height) = (max_u - min_u, max_v - min_v);
        let area = width * height;
        if best.map_or(true, |(best_area, ..)| area < best_area) {
            let (cu, cv) = ((min_u + max_u) / 2.0, (min_v + max_v) / 2.0);
            let center = Point2::new(p1.x + cu * ux + cv * vx, p1.y + cu * uy + cv * vy);
            best = Some((area, center, (ux, uy), width, height));
        }
    }

    match best {
        Some((_, center, axis, width, height)) => rotated_box(center, axis, width, height),
        None => rotated_box(hull[0], (1.0, 0.0), 0.0, 0.0),
    }
}

/// Build a box from its center, width axis and extents, normalizing the angle
fn rotated_box(center: Point2, axis: (f64, f64), width: f64, height: f64) -> RotatedBox {
    let (ux, uy) = axis;
    let (vx, vy) = (-uy, ux);
    let (hw, hh) = (width / 2.0, height / 2.0);
    let corners = [
        Point2::new(center.x - hw * ux - hh * vx, center.y - hw * uy - hh * vy),
        Point2::new(center.x + hw * ux - hh * vx, center.y + hw * uy - hh * vy),
        Point2::new(center.x + hw * ux + hh * vx, center.y + hw * uy + hh * vy),
        Point2::new(center.x - hw * ux + hh * vx, center.y - hw * uy + hh * vy),
    ];

    let mut angle = uy.atan2(ux).to_degrees();
    let (mut width, mut height) = (width, height);
    while angle <= 0.0 {
        angle += 90.0;
        std::mem::swap(&mut width, &mut height);
    }
    while angle > 90.0 {
        angle -= 90.0;
        std::mem::swap(&mut width, &mut height);
    }

    RotatedBox {
        center,
        width,
        height,
        angle,
        corners,
    }
}

/// 2x3 affine transform `[a b c; d e f]` mapping (x, y) to
/// (a*x + b*y + c, d*x + e*y + f)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Affine {
    pub m: [[f64; 3]; 2],
}

impl Affine {
    /// Rotation about `center` by `angle_degrees`
    ///
    /// Same layout as OpenCV's `getRotationMatrix2D` with unit scale: a
    /// positive angle turns content counter-clockwise on screen.
    pub fn rotation(center: Point2, angle_degrees: f64) -> Self {
        let theta = angle_degrees.to_radians();
        let (alpha, beta) = (theta.cos(), theta.sin());
        Self {
            m: [
                [alpha, beta, (1.0 - alpha) * center.x - beta * center.y],
                [-beta, alpha, beta * center.x + (1.0 - alpha) * center.y],
            ],
        }
    }

    /// Same transform followed by a translation
    pub fn translated(mut self, dx: f64, dy: f64) -> Self {
        self.m[0][2] += dx;
        self.m[1][2] += dy;
        self
    }

    pub fn apply(&self, p: Point2) -> Point2 {
        let [r0, r1] = self.m;
        Point2::new(
            r0[0] * p.x + r0[1] * p.y + r0[2],
            r1[0] * p.x + r1[1] * p.y + r1[2],
        )
    }

    /// Forward projection usable by `imageproc` warping
    pub fn to_projection(&self) -> Option<Projection> {
        let [r0, r1] = self.m;
        Projection::from_matrix([
            r0[0] as f32,
            r0[1] as f32,
            r0[2] as f32,
            r1[0] as f32,
            r1[1] as f32,
            r1[2] as f32,
            0.0,
            0.0,
            1.0,
        ])
    }
}

/// Axis-aligned bounds of a point set as (min_x, min_y, max_x, max_y)
pub fn bounds(points: &[Point2]) -> (f64, f64, f64, f64) {
    points.iter().fold(
        (f64::MAX, f64::MAX, f64::MIN, f64::MIN),
        |(x0, y0, x1, y1), p| (x0.min(p.x), y0.min(p.y), x1.max(p.x), y1.max(p.y)),
    )
}

/// Integer bounding rectangle of sub-pixel points, grown by `margin` and
/// clamped to a `width` x `height` buffer
///
/// Follows OpenCV `boundingRect`: a point at x covers pixel floor(x).
pub fn bounding_rect(points: &[Point2], margin: u32, width: u32, height: u32) -> PixelRect {
    if points.is_empty() {
        return PixelRect::default();
    }
    let (min_x, min_y, max_x, max_y) = bounds(points);
    let margin = f64::from(margin);

    let x0 = (min_x.floor() - margin).clamp(0.0, f64::from(width));
    let y0 = (min_y.floor() - margin).clamp(0.0, f64::from(height));
    let x1 = (max_x.floor() + 1.0 + margin).clamp(0.0, f64::from(width));
    let y1 = (max_y.floor() + 1.0 + margin).clamp(0.0, f64::from(height));

    PixelRect {
        x: x0 as u32,
        y: y0 as u32,
        width: (x1 - x0).max(0.0) as u32,
        height: (y1 - y0).max(0.0) as u32,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect_points(x0: f64, y0: f64, x1: f64, y1: f64) -> Vec<Point2> {
        vec![
            Point2::new(x0, y0),
            Point2::new(x1, y0),
            Point2::new(x1, y1),
            Point2::new(x0, y1),
        ]
    }

    fn rotated_points(cx: f64, cy: f64, w: f64, h: f64, degrees: f64) -> Vec<Point2> {
        let (s, c) = degrees.to_radians().sin_cos();
        [(-w, -h), (w, -h), (w, h), (-w, h)]
            .iter()
            .map(|&(dx, dy)| {
                let (dx, dy) = (dx / 2.0, dy / 2.0);
                Point2::new(cx + dx * c - dy * s, cy + dx * s + dy * c)
            })
            .collect()
    }

    #[test]
    fn test_min_area_rect_ignores_interior_pixels() {
        let mut pts: Vec<Point<i32>> = Vec::new();
        for x in 0..=10 {
            for y in 0..=5 {
                pts.push(Point::new(x, y));
            }
        }
        let rect = min_area_rect(&pts);
        assert!((rect.area() - 50.0).abs() < 1e-6);
        assert!((rect.center.x - 5.0).abs() < 1e-6);
        assert!((rect.center.y - 2.5).abs() < 1e-6);
    }

    #[test]
    fn test_min_area_rect_axis_aligned() {
        let rect = hull_min_area_rect(&rect_points(10.0, 20.0, 110.0, 70.0));
        assert!((rect.area() - 5000.0).abs() < 1e-6);
        assert!((rect.angle - 90.0).abs() < 1e-6 || rect.angle.abs() < 1e-6);
        assert!((rect.center.x - 60.0).abs() < 1e-6);
        assert!((rect.center.y - 45.0).abs() < 1e-6);
    }

    #[test]
    fn test_min_area_rect_recovers_tilt() {
        for degrees in [5.0, 12.5, 30.0, 60.0, 85.0] {
            let rect = hull_min_area_rect(&rotated_points(200.0, 150.0, 160.0, 90.0, degrees));
            assert!(
                (rect.angle - degrees).abs() < 1e-6,
                "expected {}, got {}",
                degrees,
                rect.angle
            );
            assert!((rect.area() - 160.0 * 90.0).abs() < 1e-3);
        }
    }

    #[test]
    fn test_min_area_rect_negative_tilt_wraps() {
        let rect = hull_min_area_rect(&rotated_points(100.0, 100.0, 80.0, 40.0, -10.0));
        assert!((rect.angle - 80.0).abs() < 1e-6);
        // the 80 degree side is the short one
        assert!((rect.width - 40.0).abs() < 1e-6);
        assert!((rect.height - 80.0).abs() < 1e-6);
    }

    #[test]
    fn test_min_area_rect_degenerate_inputs() {
        assert_eq!(min_area_rect(&[]).area(), 0.0);
        let single = min_area_rect(&[Point::new(3, 4)]);
        assert_eq!(single.center, Point2::new(3.0, 4.0));
        let line = min_area_rect(&[Point::new(0, 0), Point::new(5, 0), Point::new(10, 0)]);
        assert_eq!(line.area(), 0.0);
        assert!((line.width.max(line.height) - 10.0).abs() < 1e-6);
    }

    #[test]
    fn test_rotation_undoes_clockwise_tilt() {
        let center = Point2::new(50.0, 50.0);
        let rotation = Affine::rotation(center, 10.0);
        let (s, c) = 10f64.to_radians().sin_cos();
        let tilted = Point2::new(50.0 + 20.0 * c, 50.0 + 20.0 * s);
        let mapped = rotation.apply(tilted);
        assert!((mapped.x - 70.0).abs() < 1e-9);
        assert!((mapped.y - 50.0).abs() < 1e-9);
        assert_eq!(rotation.apply(center), center);
    }

    #[test]
    fn test_translated_affine() {
        let affine = Affine::rotation(Point2::new(0.0, 0.0), 0.0).translated(5.0, -2.0);
        assert_eq!(affine.apply(Point2::new(1.0, 1.0)), Point2::new(6.0, -1.0));
        assert!(affine.to_projection().is_some());
    }

    #[test]
    fn test_bounding_rect_margin_and_clamp() {
        let pts = rect_points(10.2, 5.0, 20.7, 15.0);
        let rect = bounding_rect(&pts, 0, 100, 100);
        assert_eq!(rect, PixelRect { x: 10, y: 5, width: 11, height: 11 });

        let grown = bounding_rect(&pts, 8, 25, 100);
        assert_eq!(grown.x, 2);
        assert_eq!(grown.width, 23);
        assert_eq!(grown.y, 0);
        assert_eq!(grown.height, 24);
    }

    #[test]
    fn test_bounding_rect_outside_buffer_is_empty() {
        let pts = rect_points(200.0, 200.0, 210.0, 210.0);
        assert!(bounding_rect(&pts, 0, 100, 100).is_empty());
    }
}
