//! Greedy straight-run segmentation of contour chains.

use nalgebra::Point2;
use qyoo_core::{angle_between_lines, Line};

use crate::contour::Contour;
use crate::params::FeatureParams;

/// Straight run `points[start..end]` of a contour with its fitted line.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Run {
    pub start: usize,
    pub end: usize,
    pub line: Line,
}

impl Run {
    #[inline]
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.end == self.start
    }
}

/// Running sums for an incremental principal-axis line fit.
#[derive(Default)]
struct Moments {
    n: f64,
    sx: f64,
    sy: f64,
    sxx: f64,
    sxy: f64,
    syy: f64,
}

impl Moments {
    fn push(&mut self, p: Point2<f32>) {
        let (x, y) = (p.x as f64, p.y as f64);
        self.n += 1.0;
        self.sx += x;
        self.sy += y;
        self.sxx += x * x;
        self.sxy += x * y;
        self.syy += y * y;
    }

    fn line(&self) -> Option<Line> {
        if self.n < 2.0 {
            return None;
        }
        let cx = self.sx / self.n;
        let cy = self.sy / self.n;
        Line::from_moments(
            cx,
            cy,
            self.sxx - self.n * cx * cx,
            self.sxy - self.n * cx * cy,
            self.syy - self.n * cy * cy,
        )
    }
}

/// Split a contour into straight runs.
///
/// A run is seeded with `min_run_len` points that lie close to their own fit
/// line, then grown one point at a time while the direction from its last
/// point to the point `lookahead` steps further stays within
/// `angle_tolerance_deg` of the running fit. Points that never seed a run are
/// skipped; runs never overlap.
pub fn segment_contour(contour: &Contour, params: &FeatureParams) -> Vec<Run> {
    let pts = &contour.points;
    let n = pts.len();
    let seed = params.min_run_len.max(2);
    let lookahead = params.lookahead.max(1);
    let tol = params.angle_tolerance_deg.to_radians();

    let mut runs = Vec::new();
    let mut i = 0;
    while i + seed <= n {
        let mut acc = Moments::default();
        for p in &pts[i..i + seed] {
            acc.push(*p);
        }
        let Some(mut line) = acc.line() else {
            i += 1;
            continue;
        };
        if pts[i..i + seed]
            .iter()
            .any(|p| line.distance(*p) > params.seed_max_deviation)
        {
            i += 1;
            continue;
        }

        let mut end = i + seed;
        while end < n {
            let from = pts[end - 1];
            let to = pts[(end - 1 + lookahead).min(n - 1)];
            let v = to - from;
            if v.norm() <= f32::EPSILON || angle_between_lines(v, line.direction) > tol {
                break;
            }
            acc.push(pts[end]);
            end += 1;
            if let Some(l) = acc.line() {
                line = l;
            }
        }

        runs.push(Run {
            start: i,
            end,
            line,
        });
        i = end;
    }
    runs
}
