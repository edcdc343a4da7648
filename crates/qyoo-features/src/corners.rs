//! Corner and interior feature candidates from contour runs.

use log::debug;
use nalgebra::Point2;
use qyoo_core::angle_between_lines;
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::contour::{trace_contours, Contour};
use crate::edge_map::EdgeMap;
use crate::params::FeatureParams;
use crate::segment::{segment_contour, Run};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureKind {
    /// Intersection of two straight runs meeting at an angle.
    Corner,
    /// Midpoint of a straight run.
    Interior,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FeatureCandidate {
    pub position: Point2<f32>,
    /// Angular deviation in radians for corners, zero for interior points.
    pub strength: f32,
    pub kind: FeatureKind,
    /// Index of the contour chain the candidate came from.
    pub contour: usize,
}

impl FeatureCandidate {
    #[inline]
    pub fn is_corner(&self) -> bool {
        self.kind == FeatureKind::Corner
    }
}

fn corner_between(
    contour: &Contour,
    a: &Run,
    b: &Run,
    params: &FeatureParams,
) -> Option<(Point2<f32>, f32)> {
    let angle = angle_between_lines(a.line.direction, b.line.direction);
    if angle < params.min_corner_angle_deg.to_radians() {
        return None;
    }
    let last = contour.points[a.end - 1];
    let first = contour.points[b.start];
    let transition = nalgebra::center(&last, &first);
    let position = a
        .line
        .intersect(&b.line)
        .filter(|p| (p - transition).norm() <= params.max_corner_offset)
        .unwrap_or(transition);
    Some((position, angle))
}

fn contour_features(
    index: usize,
    contour: &Contour,
    params: &FeatureParams,
    out: &mut Vec<FeatureCandidate>,
) {
    let runs: Vec<Run> = segment_contour(contour, params)
        .into_iter()
        .filter(|r| r.len() >= params.min_segment_len)
        .collect();

    for r in &runs {
        out.push(FeatureCandidate {
            position: contour.points[(r.start + r.end - 1) / 2],
            strength: 0.0,
            kind: FeatureKind::Interior,
            contour: index,
        });
    }

    let mut pairs: Vec<(&Run, &Run)> = runs.windows(2).map(|w| (&w[0], &w[1])).collect();
    if contour.closed && runs.len() >= 2 {
        pairs.push((&runs[runs.len() - 1], &runs[0]));
    }
    for (a, b) in pairs {
        if let Some((position, strength)) = corner_between(contour, a, b, params) {
            out.push(FeatureCandidate {
                position,
                strength,
                kind: FeatureKind::Corner,
                contour: index,
            });
        }
    }
}

/// Trace, segment and collect feature candidates from an edge map.
#[cfg_attr(feature = "tracing", instrument(level = "info", skip(edges, params)))]
pub fn extract_features(edges: &EdgeMap, params: &FeatureParams) -> Vec<FeatureCandidate> {
    let contours = trace_contours(edges, params);
    let mut out = Vec::new();
    for (i, c) in contours.iter().enumerate() {
        contour_features(i, c, params, &mut out);
    }
    debug!(
        "features: {} contours -> {} corners, {} interior points",
        contours.len(),
        out.iter().filter(|f| f.is_corner()).count(),
        out.iter().filter(|f| !f.is_corner()).count()
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edge_map::Direction;

    fn outline(lo: usize, hi: usize, size: usize) -> EdgeMap {
        let mut map = EdgeMap::new(size, size).unwrap();
        for i in lo..=hi {
            map.set(i, lo, Some(Direction::North));
            map.set(i, hi, Some(Direction::South));
            map.set(lo, i, Some(Direction::West));
            map.set(hi, i, Some(Direction::East));
        }
        map
    }

    #[test]
    fn square_outline_gives_four_corners() {
        let edges = outline(10, 49, 60);
        let feats = extract_features(&edges, &FeatureParams::default());
        let corners: Vec<_> = feats.iter().filter(|f| f.is_corner()).collect();
        assert_eq!(corners.len(), 4, "{corners:?}");
        for target in [(10.0, 10.0), (49.0, 10.0), (49.0, 49.0), (10.0, 49.0)] {
            let t = Point2::new(target.0, target.1);
            assert!(
                corners.iter().any(|c| (c.position - t).norm() < 0.5),
                "no corner near {t:?}"
            );
        }
        assert!(corners.iter().all(|c| c.contour == 0));
        let right = std::f32::consts::FRAC_PI_2;
        assert!(corners.iter().all(|c| (c.strength - right).abs() < 1e-3));
        assert!(feats.iter().any(|f| f.kind == FeatureKind::Interior));
    }

    #[test]
    fn open_line_has_no_corners() {
        let mut map = EdgeMap::new(50, 10).unwrap();
        for x in 2..45 {
            map.set(x, 5, Some(Direction::South));
        }
        let feats = extract_features(&map, &FeatureParams::default());
        assert!(feats.iter().all(|f| !f.is_corner()));
        assert_eq!(feats.len(), 1);
    }
}
