//! Dot-grid sampling and payload decoding for a located marker.

use log::{debug, trace};
use nalgebra::{Point2, Vector2};
use qyoo_core::{sample_bilinear, AffineTransform, PixelView};
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::detector::DetectError;
use crate::model::{canonical_corners, MarkerModel};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderParams {
    /// Minimum light-minus-dark reference difference.
    pub min_contrast: f32,
    /// Reference samples per marker side.
    pub reference_samples: usize,
}

impl Default for DecoderParams {
    fn default() -> Self {
        Self {
            min_contrast: 20.0,
            reference_samples: 8,
        }
    }
}

/// Decoded payload with the orientation-corrected pose.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DecodedMarker {
    pub payload: u64,
    pub checksum: u64,
    /// Canonical-to-image transform with canonical TL on the key corner.
    pub transform: AffineTransform,
    /// Image corners TL, TR, BR, BL after re-basing.
    pub corners: [Point2<f32>; 4],
    /// Quarter turns applied to the input transform.
    pub quarter_turns: usize,
    pub dark_level: f32,
    pub light_level: f32,
    pub confidence: f32,
}

impl DecodedMarker {
    #[inline]
    pub fn threshold(&self) -> f32 {
        0.5 * (self.dark_level + self.light_level)
    }
}

pub struct DotDecoder {
    model: MarkerModel,
    params: DecoderParams,
}

impl DotDecoder {
    pub fn new(model: MarkerModel, params: DecoderParams) -> Self {
        Self { model, params }
    }

    #[inline]
    pub fn model(&self) -> &MarkerModel {
        &self.model
    }

    #[inline]
    pub fn params(&self) -> &DecoderParams {
        &self.params
    }

    fn mean_at(
        image: &PixelView<'_, u8>,
        t: &AffineTransform,
        pts: impl IntoIterator<Item = Point2<f32>>,
    ) -> f32 {
        let mut sum = 0.0f32;
        let mut n = 0usize;
        for p in pts {
            let q = t.apply(p);
            sum += sample_bilinear(image, q.x, q.y);
            n += 1;
        }
        if n == 0 {
            0.0
        } else {
            sum / n as f32
        }
    }

    /// Mean of a 3×3 canonical patch centred at `c` with spacing `offset`.
    fn patch_mean(
        image: &PixelView<'_, u8>,
        t: &AffineTransform,
        c: Point2<f32>,
        offset: Vector2<f32>,
    ) -> f32 {
        let pts = (-1..=1).flat_map(move |j| {
            (-1..=1).map(move |i| Point2::new(c.x + i as f32 * offset.x, c.y + j as f32 * offset.y))
        });
        Self::mean_at(image, t, pts)
    }

    /// Points on the band at depth `d` from the outer edge, with side
    /// parameter `s` in `[lo, hi]`.
    fn ring(d: f32, lo: f32, hi: f32, n: usize) -> Vec<Point2<f32>> {
        let n = n.max(1);
        let mut out = Vec::with_capacity(4 * n);
        for i in 0..n {
            let s = if n == 1 {
                0.5 * (lo + hi)
            } else {
                lo + (hi - lo) * i as f32 / (n - 1) as f32
            };
            out.push(Point2::new(s, d));
            out.push(Point2::new(1.0 - d, s));
            out.push(Point2::new(1.0 - s, 1.0 - d));
            out.push(Point2::new(d, 1.0 - s));
        }
        out
    }

    /// Dark (border) and light (quiet band) reference levels.
    pub fn reference_levels(&self, image: &PixelView<'_, u8>, t: &AffineTransform) -> (f32, f32) {
        let b = self.model.border();
        let q = self.model.quiet_zone();
        let n = self.params.reference_samples;
        let dark = Self::mean_at(image, t, Self::ring(0.5 * b, 0.5 * b, 1.0 - 0.5 * b, n));
        let light = Self::mean_at(image, t, Self::ring(b + 0.5 * q, 0.4, 0.6, n));
        (dark, light)
    }

    /// Index (TL, TR, BR, BL) of the single dark key patch.
    fn find_key(
        &self,
        image: &PixelView<'_, u8>,
        t: &AffineTransform,
        threshold: f32,
    ) -> Result<usize, DetectError> {
        let off = Vector2::repeat(0.25 * self.model.spec().key_size);
        let means = self
            .model
            .key_centers()
            .map(|c| Self::patch_mean(image, t, c, off));
        trace!("decoder: key patch means {means:?}, threshold {threshold:.1}");

        let k = (0..4)
            .min_by(|&a, &b| means[a].total_cmp(&means[b]))
            .ok_or(DetectError::OrientationNotFound)?;
        let single = means[k] < threshold
            && means
                .iter()
                .enumerate()
                .all(|(i, m)| i == k || *m > threshold);
        if single {
            Ok(k)
        } else {
            Err(DetectError::OrientationNotFound)
        }
    }

    /// Decode the marker seen through `transform` (canonical square to image).
    #[cfg_attr(feature = "tracing", instrument(level = "info", skip_all))]
    pub fn decode(
        &self,
        image: &PixelView<'_, u8>,
        transform: &AffineTransform,
    ) -> Result<DecodedMarker, DetectError> {
        let (dark, light) = self.reference_levels(image, transform);
        let contrast = light - dark;
        if contrast < self.params.min_contrast {
            debug!("decoder: contrast {contrast:.1} below {}", self.params.min_contrast);
            return Err(DetectError::LowContrast { contrast });
        }
        let threshold = 0.5 * (dark + light);

        let k = self.find_key(image, transform, threshold)?;
        let rebased = transform.compose(&AffineTransform::unit_square_turn(k));

        let offset = self.model.sample_offset();
        let used = self.model.payload_bits() + self.model.checksum().bits();
        let half_range = 0.5 * contrast;
        let mut bits = Vec::with_capacity(used);
        let mut margin = 0.0f32;
        for i in 0..used {
            let m = Self::patch_mean(image, &rebased, self.model.cell_center(i), offset);
            bits.push(m < threshold);
            margin += ((m - threshold).abs() / half_range).clamp(0.0, 1.0);
        }
        let confidence = if used == 0 { 0.0 } else { margin / used as f32 };

        let (payload, observed) = self.model.split_bits(&bits);
        let expected = self
            .model
            .checksum()
            .compute(payload, self.model.payload_bits());
        if expected != observed {
            debug!("decoder: checksum mismatch payload={payload:#x} expected={expected:#x} observed={observed:#x}");
            return Err(DetectError::ChecksumMismatch { expected, observed });
        }
        debug!("decoder: payload={payload} turns={k} contrast={contrast:.1} confidence={confidence:.2}");

        Ok(DecodedMarker {
            payload,
            checksum: observed,
            transform: rebased,
            corners: canonical_corners().map(|p| rebased.apply(p)),
            quarter_turns: k,
            dark_level: dark,
            light_level: light,
            confidence,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::{marker_transform, render_bits, render_marker, RenderStyle};
    use qyoo_core::PixelBuffer;

    fn decoder() -> DotDecoder {
        DotDecoder::new(MarkerModel::default(), DecoderParams::default())
    }

    fn placement() -> AffineTransform {
        marker_transform(Point2::new(60.0, 60.0), 100.0, 0.0).unwrap()
    }

    #[test]
    fn decodes_payload_through_known_transform() {
        let t = placement();
        let img = render_marker(&MarkerModel::default(), 0b1011, &t, 120, 120, &RenderStyle::default())
            .unwrap();
        let m = decoder().decode(&img.view(), &t).unwrap();
        assert_eq!(m.payload, 0b1011);
        assert_eq!(m.quarter_turns, 0);
        assert!(m.confidence > 0.8, "confidence {}", m.confidence);
        assert!(m.light_level - m.dark_level > 150.0);
    }

    #[test]
    fn quarter_turned_transform_is_rebased() {
        let t = marker_transform(Point2::new(64.0, 60.0), 96.0, 25.0).unwrap();
        let img = render_marker(&MarkerModel::default(), 1234, &t, 128, 128, &RenderStyle::default())
            .unwrap();
        let turned = t.compose(&AffineTransform::unit_square_turn(1));
        let m = decoder().decode(&img.view(), &turned).unwrap();
        assert_eq!(m.payload, 1234);
        assert_eq!(m.quarter_turns, 3);
        for (a, b) in m.transform.coefficients().iter().zip(t.coefficients()) {
            assert!((a - b).abs() < 1e-6, "{a} vs {b}");
        }
        let tl = t.apply(Point2::new(0.0, 0.0));
        assert!((m.corners[0] - tl).norm() < 1e-3);
    }

    #[test]
    fn flipped_checksum_bit_is_reported() {
        let model = MarkerModel::default();
        let t = placement();
        let mut bits = model.encode_bits(0b1011).unwrap();
        bits[15] = !bits[15];
        let img = render_bits(&model, &bits, &t, 120, 120, &RenderStyle::default()).unwrap();
        let expected = model.checksum().compute(0b1011, 12);
        match decoder().decode(&img.view(), &t) {
            Err(DetectError::ChecksumMismatch {
                expected: e,
                observed,
            }) => {
                assert_eq!(e, expected);
                assert_eq!(observed, expected ^ 1);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn faint_marker_is_low_contrast() {
        let style = RenderStyle {
            dark: 120,
            light: 130,
            supersample: 2,
        };
        let t = placement();
        let img = render_marker(&MarkerModel::default(), 5, &t, 120, 120, &style).unwrap();
        assert!(matches!(
            decoder().decode(&img.view(), &t),
            Err(DetectError::LowContrast { .. })
        ));
    }

    #[test]
    fn two_dark_keys_are_rejected() {
        let model = MarkerModel::default();
        let t = placement();
        let img = render_marker(&model, 5, &t, 120, 120, &RenderStyle::default()).unwrap();
        let inv = t.inverse();
        let (b, k) = (model.border(), model.spec().key_size);
        let painted = PixelBuffer::from_fn(120, 120, |x, y| {
            let c = inv.apply(Point2::new(x as f32, y as f32));
            let in_tr_key = (1.0 - b - k..1.0 - b).contains(&c.x) && (b..b + k).contains(&c.y);
            if in_tr_key {
                25
            } else {
                img.get(x, y).unwrap_or(230)
            }
        })
        .unwrap();
        assert_eq!(
            decoder().decode(&painted.view(), &t),
            Err(DetectError::OrientationNotFound)
        );
    }
}
