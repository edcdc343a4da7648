//! Point, line and polygon helpers.

use nalgebra::{Point2, Vector2};
use serde::{Deserialize, Serialize};

/// Finite segment between two image points.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LineSegment {
    pub start: Point2<f32>,
    pub end: Point2<f32>,
}

impl LineSegment {
    pub fn new(start: Point2<f32>, end: Point2<f32>) -> Self {
        Self { start, end }
    }

    #[inline]
    pub fn length(&self) -> f32 {
        (self.end - self.start).norm()
    }

    #[inline]
    pub fn midpoint(&self) -> Point2<f32> {
        nalgebra::center(&self.start, &self.end)
    }

    /// Direction angle in radians, `atan2(dy, dx)`.
    #[inline]
    pub fn angle(&self) -> f32 {
        let d = self.end - self.start;
        d.y.atan2(d.x)
    }

    /// Infinite line through the segment, `None` for a zero-length segment.
    pub fn line(&self) -> Option<Line> {
        Line::through(self.start, self.end)
    }
}

/// Infinite line as a point plus unit direction.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Line {
    pub point: Point2<f32>,
    pub direction: Vector2<f32>,
}

impl Line {
    pub fn through(a: Point2<f32>, b: Point2<f32>) -> Option<Self> {
        let d = b - a;
        let n = d.norm();
        if n <= f32::EPSILON {
            return None;
        }
        Some(Self {
            point: a,
            direction: d / n,
        })
    }

    /// Total least-squares fit (principal axis of the point cloud).
    pub fn fit(points: &[Point2<f32>]) -> Option<Self> {
        if points.len() < 2 {
            return None;
        }
        let n = points.len() as f64;
        let (mut sx, mut sy) = (0.0f64, 0.0f64);
        for p in points {
            sx += p.x as f64;
            sy += p.y as f64;
        }
        let (cx, cy) = (sx / n, sy / n);
        let (mut sxx, mut sxy, mut syy) = (0.0f64, 0.0f64, 0.0f64);
        for p in points {
            let dx = p.x as f64 - cx;
            let dy = p.y as f64 - cy;
            sxx += dx * dx;
            sxy += dx * dy;
            syy += dy * dy;
        }
        Self::from_moments(cx, cy, sxx, sxy, syy)
    }

    /// Line from centroid `(cx, cy)` and central second moments.
    pub fn from_moments(cx: f64, cy: f64, sxx: f64, sxy: f64, syy: f64) -> Option<Self> {
        if sxx + syy <= 1e-12 {
            return None;
        }
        let theta = 0.5 * (2.0 * sxy).atan2(sxx - syy);
        Some(Self {
            point: Point2::new(cx as f32, cy as f32),
            direction: Vector2::new(theta.cos() as f32, theta.sin() as f32),
        })
    }

    /// Unsigned perpendicular distance from `p` to the line.
    #[inline]
    pub fn distance(&self, p: Point2<f32>) -> f32 {
        let d = p - self.point;
        (d.x * self.direction.y - d.y * self.direction.x).abs()
    }

    /// Intersection with another line, `None` if (nearly) parallel.
    pub fn intersect(&self, other: &Line) -> Option<Point2<f32>> {
        let d1 = self.direction;
        let d2 = other.direction;
        let denom = d1.x * d2.y - d1.y * d2.x;
        if denom.abs() < 1e-6 {
            return None;
        }
        let w = other.point - self.point;
        let t = (w.x * d2.y - w.y * d2.x) / denom;
        Some(self.point + d1 * t)
    }
}

/// Unoriented angle between two directions, in `[0, pi/2]`.
#[inline]
pub fn angle_between_lines(a: Vector2<f32>, b: Vector2<f32>) -> f32 {
    let na = a.norm();
    let nb = b.norm();
    if na <= f32::EPSILON || nb <= f32::EPSILON {
        return 0.0;
    }
    let c = (a.dot(&b) / (na * nb)).abs().min(1.0);
    c.acos()
}

/// Signed shoelace area. Positive for clockwise-on-screen order (y down).
pub fn polygon_area(pts: &[Point2<f32>]) -> f32 {
    let n = pts.len();
    if n < 3 {
        return 0.0;
    }
    let mut acc = 0.0f32;
    for i in 0..n {
        let a = pts[i];
        let b = pts[(i + 1) % n];
        acc += a.x * b.y - b.x * a.y;
    }
    0.5 * acc
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn fit_recovers_diagonal_line() {
        let pts: Vec<Point2<f32>> = (0..20).map(|i| Point2::new(i as f32, 2.0 * i as f32 + 1.0)).collect();
        let line = Line::fit(&pts).unwrap();
        for p in &pts {
            assert!(line.distance(*p) < 1e-3);
        }
        let expected = Vector2::new(1.0f32, 2.0).normalize();
        assert_relative_eq!(angle_between_lines(line.direction, expected), 0.0, epsilon = 1e-3);
    }

    #[test]
    fn fit_rejects_single_point_cloud() {
        assert!(Line::fit(&[Point2::new(1.0, 1.0)]).is_none());
        assert!(Line::fit(&[Point2::new(1.0, 1.0), Point2::new(1.0, 1.0)]).is_none());
    }

    #[test]
    fn perpendicular_lines_intersect() {
        let a = Line::through(Point2::new(0.0, 5.0), Point2::new(10.0, 5.0)).unwrap();
        let b = Line::through(Point2::new(3.0, 0.0), Point2::new(3.0, 10.0)).unwrap();
        let p = a.intersect(&b).unwrap();
        assert_relative_eq!(p.x, 3.0, epsilon = 1e-5);
        assert_relative_eq!(p.y, 5.0, epsilon = 1e-5);
        assert!(a.intersect(&a).is_none());
    }

    #[test]
    fn clockwise_square_has_positive_area() {
        let sq = [
            Point2::new(0.0, 0.0),
            Point2::new(2.0, 0.0),
            Point2::new(2.0, 2.0),
            Point2::new(0.0, 2.0),
        ];
        assert_relative_eq!(polygon_area(&sq), 4.0);
        let mut rev = sq;
        rev.reverse();
        assert_relative_eq!(polygon_area(&rev), -4.0);
    }

    #[test]
    fn segment_basics() {
        let s = LineSegment::new(Point2::new(0.0, 0.0), Point2::new(3.0, 4.0));
        assert_relative_eq!(s.length(), 5.0);
        assert_relative_eq!(s.midpoint().x, 1.5);
        assert!(s.line().is_some());
    }
}
