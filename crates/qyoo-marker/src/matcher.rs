//! Quad enumeration and marker-boundary matching.
//!
//! Corner candidates are grouped (by contour by default), every 4-subset of a
//! group is ordered into a convex clockwise quad, an affine transform from the
//! canonical square is fitted, and the mapped boundary is checked against
//! the image and the edge map:
//!
//! - aspect: side-length ratio against the model,
//! - polarity: the border band must be darker than the surround,
//! - residual: distance from mapped boundary samples to edge pixels whose
//!   gradient points outwards (dark marker, light surround).

use std::collections::BTreeMap;

use log::{debug, trace};
use nalgebra::{Point2, Vector2};
use qyoo_core::{estimate_affine, polygon_area, sample_bilinear, AffineTransform, PixelView};
use qyoo_features::{EdgeMap, FeatureCandidate};
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::detector::DetectError;
use crate::model::{canonical_corners, MarkerModel};

/// Point sets whose largest triangle is below this area (px²) are collinear.
const COLLINEAR_AREA: f32 = 1.0;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherParams {
    /// Only combine corners that come from the same contour chain.
    pub same_contour_only: bool,
    /// Keep at most this many of the strongest corners per group.
    pub max_corners_per_group: usize,
    /// Minimum quad area in px².
    pub min_area: f32,
    /// Boundary samples per side for the residual and polarity checks.
    pub samples_per_side: usize,
    /// Edge search radius in pixels.
    pub search_radius: usize,
    /// Maximum angle between an edge direction and the mapped outward normal.
    pub max_normal_deviation_deg: f32,
    /// Maximum mean boundary distance in pixels.
    pub max_residual: f32,
    /// Minimum fraction of boundary samples that found an edge.
    pub min_support: f32,
    /// Minimum mean intensity step from border band to surround.
    pub min_border_contrast: f32,
    /// Accepted quads whose corners all lie this close are the same quad.
    pub duplicate_distance: f32,
    /// Residual gap below which the two best quads are ambiguous.
    pub ambiguity_epsilon: f32,
}

impl Default for MatcherParams {
    fn default() -> Self {
        Self {
            same_contour_only: true,
            max_corners_per_group: 10,
            min_area: 400.0,
            samples_per_side: 16,
            search_radius: 3,
            max_normal_deviation_deg: 67.5,
            max_residual: 1.5,
            min_support: 0.75,
            min_border_contrast: 40.0,
            duplicate_distance: 5.0,
            ambiguity_epsilon: 0.01,
        }
    }
}

/// Affine fit of one ordered quad.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct QuadFit {
    /// Image corners matching canonical TL, TR, BR, BL.
    pub corners: [Point2<f32>; 4],
    pub transform: AffineTransform,
    pub area: f32,
}

/// Accepted quad with its quality measures.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct QuadMatch {
    pub corners: [Point2<f32>; 4],
    pub transform: AffineTransform,
    /// Mean boundary-to-edge distance in pixels.
    pub residual: f32,
    /// Fraction of boundary samples with a matching edge.
    pub support: f32,
    pub aspect_deviation: f32,
    /// Mean surround-minus-border intensity.
    pub contrast: f32,
    pub confidence: f32,
}

enum Rejection {
    Collinear,
    NotConvex,
    TooSmall,
    Aspect,
    Polarity,
    Residual,
}

/// Order four points clockwise on screen, starting at the smallest `x + y`.
///
/// Returns `None` unless the points form a strictly convex quad.
pub fn order_quad(pts: [Point2<f32>; 4]) -> Option<[Point2<f32>; 4]> {
    let c = Point2::from((pts[0].coords + pts[1].coords + pts[2].coords + pts[3].coords) / 4.0);
    let mut ordered = pts;
    ordered.sort_by(|a, b| {
        let ta = (a.y - c.y).atan2(a.x - c.x);
        let tb = (b.y - c.y).atan2(b.x - c.x);
        ta.total_cmp(&tb)
    });
    for i in 0..4 {
        let a = ordered[i];
        let b = ordered[(i + 1) % 4];
        let d = ordered[(i + 2) % 4];
        let cross = (b - a).perp(&(d - b));
        if cross <= 0.0 {
            return None;
        }
    }
    let start = (0..4)
        .min_by(|&i, &j| {
            let si = ordered[i].x + ordered[i].y;
            let sj = ordered[j].x + ordered[j].y;
            si.total_cmp(&sj)
        })
        .unwrap_or(0);
    ordered.rotate_left(start);
    Some(ordered)
}

/// True if no three of the points span a triangle of noticeable area.
fn is_collinear(pts: &[Point2<f32>; 4]) -> bool {
    let tri = |a: usize, b: usize, c: usize| 0.5 * (pts[b] - pts[a]).perp(&(pts[c] - pts[a])).abs();
    tri(0, 1, 2).max(tri(0, 1, 3)).max(tri(0, 2, 3)).max(tri(1, 2, 3)) < COLLINEAR_AREA
}

fn side_lengths(q: &[Point2<f32>; 4]) -> (f32, f32) {
    let w = 0.5 * ((q[1] - q[0]).norm() + (q[2] - q[3]).norm());
    let h = 0.5 * ((q[3] - q[0]).norm() + (q[2] - q[1]).norm());
    (w, h)
}

/// Finds the marker boundary among corner candidates.
#[derive(Clone, Debug)]
pub struct MarkerMatcher {
    model: MarkerModel,
    params: MatcherParams,
}

impl MarkerMatcher {
    pub fn new(model: MarkerModel, params: MatcherParams) -> Self {
        Self { model, params }
    }

    #[inline]
    pub fn params(&self) -> &MatcherParams {
        &self.params
    }

    #[inline]
    pub fn model(&self) -> &MarkerModel {
        &self.model
    }

    /// Fit the canonical square onto an ordered quad (TL, TR, BR, BL).
    ///
    /// Fails with `GeometryDegenerate` for collinear points or an area below
    /// `min_area`.
    pub fn fit_quad(&self, corners: &[Point2<f32>; 4]) -> Result<QuadFit, DetectError> {
        let area = polygon_area(corners).abs();
        if is_collinear(corners) || area < self.params.min_area {
            return Err(DetectError::GeometryDegenerate);
        }
        let transform = estimate_affine(&canonical_corners(), corners)
            .map_err(|_| DetectError::GeometryDegenerate)?;
        Ok(QuadFit {
            corners: *corners,
            transform,
            area,
        })
    }

    fn aspect_deviation(&self, q: &[Point2<f32>; 4]) -> f32 {
        let (w, h) = side_lengths(q);
        if h <= f32::EPSILON {
            return f32::INFINITY;
        }
        ((w / h) / self.model.aspect_ratio() - 1.0).abs()
    }

    /// Choose which ordered corner is canonical TL so the side ratio best
    /// matches the model. Square models keep the smallest-`x + y` start.
    fn align_to_aspect(&self, q: [Point2<f32>; 4]) -> ([Point2<f32>; 4], f32) {
        let d0 = self.aspect_deviation(&q);
        let mut rotated = q;
        rotated.rotate_left(1);
        let d1 = self.aspect_deviation(&rotated);
        if d1 < d0 {
            (rotated, d1)
        } else {
            (q, d0)
        }
    }

    /// Canonical boundary samples with their outward normals.
    fn boundary_samples(&self) -> Vec<(Point2<f32>, Vector2<f32>)> {
        let n = self.params.samples_per_side.max(1);
        let c = canonical_corners();
        let normals = [
            Vector2::new(0.0, -1.0),
            Vector2::new(1.0, 0.0),
            Vector2::new(0.0, 1.0),
            Vector2::new(-1.0, 0.0),
        ];
        let mut out = Vec::with_capacity(4 * n);
        for side in 0..4 {
            let a = c[side];
            let b = c[(side + 1) % 4];
            for i in 0..n {
                let t = (i as f32 + 0.5) / n as f32;
                out.push((a + (b - a) * t, normals[side]));
            }
        }
        out
    }

    /// Mean surround-minus-border intensity and the fraction of samples
    /// where the surround is lighter. `None` if too few samples fall inside
    /// the image.
    fn polarity(
        &self,
        image: &PixelView<'_, u8>,
        t: &AffineTransform,
        samples: &[(Point2<f32>, Vector2<f32>)],
    ) -> Option<(f32, f32)> {
        let b = self.model.border();
        let depths = [0.25 * b, 0.5 * b, 0.75 * b];
        let (w, h) = (image.width() as f32, image.height() as f32);
        let inside_image = |p: Point2<f32>| p.x >= 0.0 && p.y >= 0.0 && p.x <= w - 1.0 && p.y <= h - 1.0;

        let mut sum = 0.0f32;
        let mut lighter = 0usize;
        let mut used = 0usize;
        'samples: for &(p, n) in samples {
            let mut inner = 0.0f32;
            let mut outer = 0.0f32;
            for d in depths {
                let pi = t.apply(p - n * d);
                let po = t.apply(p + n * d);
                if !inside_image(pi) || !inside_image(po) {
                    continue 'samples;
                }
                inner += sample_bilinear(image, pi.x, pi.y);
                outer += sample_bilinear(image, po.x, po.y);
            }
            let diff = (outer - inner) / depths.len() as f32;
            sum += diff;
            if diff > 0.0 {
                lighter += 1;
            }
            used += 1;
        }
        if used * 2 < samples.len() {
            return None;
        }
        Some((sum / used as f32, lighter as f32 / used as f32))
    }

    /// Mean distance to outward-facing edges and the hit fraction.
    fn boundary_residual(
        &self,
        edges: &EdgeMap,
        t: &AffineTransform,
        samples: &[(Point2<f32>, Vector2<f32>)],
    ) -> (f32, f32) {
        let radius = self.params.search_radius;
        let max_dev = self.params.max_normal_deviation_deg.to_radians();
        let mut total = 0.0f32;
        let mut hits = 0usize;
        for &(p, n) in samples {
            let q = t.apply(p);
            let normal = t.apply_normal(n);
            match edges.nearest_matching(q.x, q.y, radius, |dir| dir.angle_to(normal) <= max_dev) {
                Some(d) => {
                    total += d;
                    hits += 1;
                }
                None => total += radius as f32,
            }
        }
        let n = samples.len().max(1) as f32;
        (total / n, hits as f32 / n)
    }

    fn evaluate(
        &self,
        image: &PixelView<'_, u8>,
        edges: &EdgeMap,
        pts: [Point2<f32>; 4],
        samples: &[(Point2<f32>, Vector2<f32>)],
    ) -> Result<QuadMatch, Rejection> {
        if is_collinear(&pts) {
            return Err(Rejection::Collinear);
        }
        let ordered = order_quad(pts).ok_or(Rejection::NotConvex)?;
        let (ordered, aspect_deviation) = self.align_to_aspect(ordered);
        let fit = self.fit_quad(&ordered).map_err(|_| Rejection::TooSmall)?;
        if aspect_deviation > self.model.aspect_tolerance() {
            return Err(Rejection::Aspect);
        }

        let (contrast, lighter) = self
            .polarity(image, &fit.transform, samples)
            .ok_or(Rejection::Polarity)?;
        if contrast < self.params.min_border_contrast || lighter < self.params.min_support {
            return Err(Rejection::Polarity);
        }

        let (residual, support) = self.boundary_residual(edges, &fit.transform, samples);
        if residual > self.params.max_residual || support < self.params.min_support {
            trace!("matcher: reject quad residual={residual:.2} support={support:.2}");
            return Err(Rejection::Residual);
        }

        let confidence = (support * (1.0 - residual / self.params.max_residual)).clamp(0.0, 1.0);
        Ok(QuadMatch {
            corners: fit.corners,
            transform: fit.transform,
            residual,
            support,
            aspect_deviation,
            contrast,
            confidence,
        })
    }

    fn corner_groups(&self, features: &[FeatureCandidate]) -> Vec<Vec<Point2<f32>>> {
        let mut groups: BTreeMap<usize, Vec<&FeatureCandidate>> = BTreeMap::new();
        for f in features.iter().filter(|f| f.is_corner()) {
            let key = if self.params.same_contour_only {
                f.contour
            } else {
                0
            };
            groups.entry(key).or_default().push(f);
        }
        groups
            .into_values()
            .filter_map(|mut g| {
                g.sort_by(|a, b| b.strength.total_cmp(&a.strength));
                g.truncate(self.params.max_corners_per_group);
                (g.len() >= 4).then(|| g.iter().map(|f| f.position).collect())
            })
            .collect()
    }

    fn is_duplicate(&self, a: &QuadMatch, b: &QuadMatch) -> bool {
        let d = self.params.duplicate_distance;
        a.corners
            .iter()
            .all(|p| b.corners.iter().any(|q| (p - q).norm() <= d))
    }

    /// Best marker boundary among the corner candidates.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "info", skip_all, fields(features = features.len()))
    )]
    pub fn find(
        &self,
        image: &PixelView<'_, u8>,
        edges: &EdgeMap,
        features: &[FeatureCandidate],
    ) -> Result<QuadMatch, DetectError> {
        let samples = self.boundary_samples();
        let groups = self.corner_groups(features);

        let mut enumerated = 0usize;
        let mut collinear = 0usize;
        let mut rejected = [0usize; 5];
        let mut accepted: Vec<QuadMatch> = Vec::new();

        for group in &groups {
            let n = group.len();
            for a in 0..n {
                for b in (a + 1)..n {
                    for c in (b + 1)..n {
                        for d in (c + 1)..n {
                            enumerated += 1;
                            let pts = [group[a], group[b], group[c], group[d]];
                            match self.evaluate(image, edges, pts, &samples) {
                                Ok(m) => accepted.push(m),
                                Err(Rejection::Collinear) => collinear += 1,
                                Err(Rejection::NotConvex) => rejected[0] += 1,
                                Err(Rejection::TooSmall) => rejected[1] += 1,
                                Err(Rejection::Aspect) => rejected[2] += 1,
                                Err(Rejection::Polarity) => rejected[3] += 1,
                                Err(Rejection::Residual) => rejected[4] += 1,
                            }
                        }
                    }
                }
            }
        }

        debug!(
            "matcher: {} groups, {} quads, {} accepted, {} collinear, rejected \
             [convex={}, small={}, aspect={}, polarity={}, residual={}]",
            groups.len(),
            enumerated,
            accepted.len(),
            collinear,
            rejected[0],
            rejected[1],
            rejected[2],
            rejected[3],
            rejected[4]
        );

        if accepted.is_empty() {
            if enumerated > 0 && collinear == enumerated {
                return Err(DetectError::GeometryDegenerate);
            }
            return Err(DetectError::NoMarkerFound);
        }

        accepted.sort_by(|a, b| a.residual.total_cmp(&b.residual));
        let mut distinct: Vec<QuadMatch> = Vec::new();
        for m in accepted {
            if !distinct.iter().any(|k| self.is_duplicate(&m, k)) {
                distinct.push(m);
            }
        }

        let best = distinct[0];
        if let Some(runner_up) = distinct.get(1) {
            if runner_up.residual - best.residual <= self.params.ambiguity_epsilon {
                return Err(DetectError::AmbiguousMatch {
                    best: best.residual,
                    runner_up: runner_up.residual,
                });
            }
        }
        debug!(
            "matcher: best quad residual={:.3} support={:.2} contrast={:.1}",
            best.residual, best.support, best.contrast
        );
        Ok(best)
    }
}
