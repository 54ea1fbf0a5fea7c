//! Pixel-space geometry shared by detections, tracks and regions.
//!
//! Boxes are integer rectangles in frame coordinates (`x`, `y` is the top-left
//! corner). Region polygons are ordered point lists; containment is tested on
//! the box centroid only.

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned rectangle in pixel space.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl BoundingBox {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Build a box from corner coordinates, rounding toward the enclosed pixels.
    pub fn from_corners(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        let x = x1.min(x2).round() as i32;
        let y = y1.min(y2).round() as i32;
        let w = (x1 - x2).abs().round() as i32;
        let h = (y1 - y2).abs().round() as i32;
        Self::new(x, y, w, h)
    }

    pub fn right(&self) -> i32 {
        self.x.saturating_add(self.width)
    }

    pub fn bottom(&self) -> i32 {
        self.y.saturating_add(self.height)
    }

    pub fn area(&self) -> i64 {
        if self.is_empty() {
            return 0;
        }
        self.width as i64 * self.height as i64
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    /// Integer centroid, the reference point for region membership.
    pub fn centroid(&self) -> Point {
        Point::new(
            self.x.saturating_add(self.width / 2),
            self.y.saturating_add(self.height / 2),
        )
    }

    pub fn intersection(&self, other: &BoundingBox) -> Option<BoundingBox> {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = self.right().min(other.right());
        let y2 = self.bottom().min(other.bottom());
        if x2 <= x1 || y2 <= y1 {
            return None;
        }
        Some(BoundingBox::new(
            x1,
            y1,
            x2.saturating_sub(x1),
            y2.saturating_sub(y1),
        ))
    }

    /// Intersection over union, 0.0 for disjoint or degenerate boxes.
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let Some(inter) = self.intersection(other) else {
            return 0.0;
        };
        let inter_area = inter.area() as f64;
        let union = self.area() as f64 + other.area() as f64 - inter_area;
        if union <= 0.0 {
            return 0.0;
        }
        (inter_area / union) as f32
    }

    /// Grow the box by `padding` pixels on every side.
    pub fn padded(&self, padding: i32) -> BoundingBox {
        let grow = padding.saturating_mul(2);
        BoundingBox::new(
            self.x.saturating_sub(padding),
            self.y.saturating_sub(padding),
            self.width.saturating_add(grow),
            self.height.saturating_add(grow),
        )
    }

    /// Clip the box to a `width` x `height` frame. `None` when nothing remains.
    pub fn clamp_to(&self, width: u32, height: u32) -> Option<BoundingBox> {
        let frame = BoundingBox::new(
            0,
            0,
            i32::try_from(width).ok()?,
            i32::try_from(height).ok()?,
        );
        self.intersection(&frame)
    }
}

/// Point-in-polygon test. Points on an edge or vertex count as inside.
///
/// Polygons with fewer than three points never contain anything.
pub fn polygon_contains(polygon: &[Point], point: Point) -> bool {
    if polygon.len() < 3 {
        return false;
    }

    let n = polygon.len();
    for i in 0..n {
        if on_segment(polygon[i], polygon[(i + 1) % n], point) {
            return true;
        }
    }

    let px = point.x as f64;
    let py = point.y as f64;
    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let (xi, yi) = (polygon[i].x as f64, polygon[i].y as f64);
        let (xj, yj) = (polygon[j].x as f64, polygon[j].y as f64);
        if (yi > py) != (yj > py) {
            let x_cross = (xj - xi) * (py - yi) / (yj - yi) + xi;
            if px < x_cross {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

fn on_segment(a: Point, b: Point, p: Point) -> bool {
    let cross = (b.x as i64 - a.x as i64) * (p.y as i64 - a.y as i64)
        - (b.y as i64 - a.y as i64) * (p.x as i64 - a.x as i64);
    if cross != 0 {
        return false;
    }
    p.x >= a.x.min(b.x) && p.x <= a.x.max(b.x) && p.y >= a.y.min(b.y) && p.y <= a.y.max(b.y)
}

/// Bounding rectangle of a point set; the zero box for an empty set.
pub fn polygon_bounds(points: &[Point]) -> BoundingBox {
    let Some(first) = points.first() else {
        return BoundingBox::default();
    };
    let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
    for p in points {
        min_x = min_x.min(p.x);
        min_y = min_y.min(p.y);
        max_x = max_x.max(p.x);
        max_y = max_y.max(p.y);
    }
    BoundingBox::new(
        min_x,
        min_y,
        max_x.saturating_sub(min_x),
        max_y.saturating_sub(min_y),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square() -> Vec<Point> {
        vec![
            Point::new(0, 0),
            Point::new(100, 0),
            Point::new(100, 100),
            Point::new(0, 100),
        ]
    }

    #[test]
    fn boundary_points_are_inside() {
        let poly = square();
        assert!(polygon_contains(&poly, Point::new(0, 50)));
        assert!(polygon_contains(&poly, Point::new(100, 100)));
        assert!(polygon_contains(&poly, Point::new(50, 50)));
        assert!(!polygon_contains(&poly, Point::new(101, 50)));
        assert!(!polygon_contains(&poly, Point::new(-1, -1)));
    }

    #[test]
    fn concave_polygon_excludes_notch() {
        // U shape: notch between x=30..70 above y=40
        let poly = vec![
            Point::new(0, 0),
            Point::new(30, 0),
            Point::new(30, 40),
            Point::new(70, 40),
            Point::new(70, 0),
            Point::new(100, 0),
            Point::new(100, 100),
            Point::new(0, 100),
        ];
        assert!(!polygon_contains(&poly, Point::new(50, 20)));
        assert!(polygon_contains(&poly, Point::new(50, 60)));
        assert!(polygon_contains(&poly, Point::new(15, 20)));
    }

    #[test]
    fn degenerate_polygon_is_inert() {
        let line = vec![Point::new(0, 0), Point::new(10, 10)];
        assert!(!polygon_contains(&line, Point::new(5, 5)));
        assert!(!polygon_contains(&[], Point::new(0, 0)));
    }

    #[test]
    fn iou_matches_hand_computation() {
        let a = BoundingBox::new(0, 0, 10, 10);
        let b = BoundingBox::new(5, 0, 10, 10);
        // intersection 50, union 150
        assert!((a.iou(&b) - 1.0 / 3.0).abs() < 1e-6);
        assert_eq!(a.iou(&BoundingBox::new(20, 20, 5, 5)), 0.0);
        assert_eq!(a.iou(&a), 1.0);
    }

    #[test]
    fn padded_box_is_clamped_to_frame() {
        let b = BoundingBox::new(5, 5, 20, 20).padded(15);
        assert_eq!(b.clamp_to(100, 100), Some(BoundingBox::new(0, 0, 40, 40)));
        let outside = BoundingBox::new(200, 200, 10, 10);
        assert_eq!(outside.padded(15).clamp_to(100, 100), None);
    }

    #[test]
    fn extreme_boxes_saturate_instead_of_overflowing() {
        let far = BoundingBox::new(i32::MAX - 5, i32::MAX - 5, 100, 100);
        assert_eq!(far.right(), i32::MAX);
        assert_eq!(far.bottom(), i32::MAX);
        assert_eq!(far.centroid(), Point::new(i32::MAX, i32::MAX));

        let near = BoundingBox::new(i32::MAX - 50, i32::MAX - 50, 100, 100);
        let inter = far.intersection(&near).unwrap();
        assert_eq!(inter, BoundingBox::new(i32::MAX - 5, i32::MAX - 5, 5, 5));
        assert!(far.iou(&near) > 0.0);
        assert_eq!(far.iou(&BoundingBox::new(0, 0, 10, 10)), 0.0);

        let grown = BoundingBox::new(i32::MIN + 1, 0, 10, 10).padded(i32::MAX);
        assert_eq!(grown.x, i32::MIN);
        assert_eq!(grown.width, i32::MAX);
        assert_eq!(grown.height, i32::MAX);

        let wide = polygon_bounds(&[Point::new(i32::MIN, 0), Point::new(i32::MAX, 10)]);
        assert_eq!(wide.width, i32::MAX);
    }

    #[test]
    fn centroid_uses_integer_halves() {
        assert_eq!(BoundingBox::new(10, 10, 5, 7).centroid(), Point::new(12, 13));
    }
}
