//! Qyoo marker template.
//!
//! The marker is described in a canonical unit square (x right, y down) with
//! corners TL (0,0), TR (1,0), BR (1,1), BL (0,1):
//!
//! - a dark border band of width `border`,
//! - a light quiet band of width `quiet_zone` inside it,
//! - a dark orientation key of side `key_size` in the quiet band at the TL corner,
//! - a `rows × cols` dot grid filling the remaining square; a dark dot is a `1`.
//!
//! Bits are scanned row-major from the TL cell: the payload MSB first, then the
//! checksum MSB first. Unused trailing cells are always light.

use nalgebra::{Point2, Vector2};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::checksum::ChecksumScheme;
use crate::io::{read_json, QyooIoError};

/// Canonical corners in clockwise-on-screen order TL, TR, BR, BL.
pub fn canonical_corners() -> [Point2<f32>; 4] {
    [
        Point2::new(0.0, 0.0),
        Point2::new(1.0, 0.0),
        Point2::new(1.0, 1.0),
        Point2::new(0.0, 1.0),
    ]
}

#[derive(thiserror::Error, Debug)]
pub enum ModelError {
    #[error("invalid marker model: {reason}")]
    Invalid { reason: String },
    #[error("payload {payload} does not fit in {bits} bits")]
    PayloadTooLarge { payload: u64, bits: usize },
    #[error(transparent)]
    Load(#[from] QyooIoError),
}

fn invalid(reason: impl Into<String>) -> ModelError {
    ModelError::Invalid {
        reason: reason.into(),
    }
}

/// Serializable marker description; validated by [`MarkerModel::new`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarkerModelSpec {
    /// Expected `width / height` of the outer boundary.
    pub aspect_ratio: f32,
    /// Accepted relative deviation from `aspect_ratio`.
    pub aspect_tolerance: f32,
    /// Border band width, fraction of the marker side.
    pub border: f32,
    /// Quiet band width, fraction of the marker side.
    pub quiet_zone: f32,
    /// Orientation key side, fraction of the marker side (at most `quiet_zone`).
    pub key_size: f32,
    pub rows: usize,
    pub cols: usize,
    pub payload_bits: usize,
    pub checksum: ChecksumScheme,
    /// Dot diameter as a fraction of the cell side.
    pub dot_diameter: f32,
    /// Half-spacing of the 3×3 sampling patch, fraction of the cell side.
    pub sample_radius: f32,
}

impl Default for MarkerModelSpec {
    fn default() -> Self {
        Self {
            aspect_ratio: 1.0,
            aspect_tolerance: 0.2,
            border: 0.14,
            quiet_zone: 0.08,
            key_size: 0.08,
            rows: 4,
            cols: 4,
            payload_bits: 12,
            checksum: ChecksumScheme::crc4(),
            dot_diameter: 0.6,
            sample_radius: 0.15,
        }
    }
}

fn in_range(v: f32, lo: f32, hi: f32) -> bool {
    v.is_finite() && v > lo && v <= hi
}

/// Validated, immutable marker template.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(into = "MarkerModelSpec")]
pub struct MarkerModel {
    spec: MarkerModelSpec,
}

impl From<MarkerModel> for MarkerModelSpec {
    fn from(m: MarkerModel) -> Self {
        m.spec
    }
}

impl Default for MarkerModel {
    fn default() -> Self {
        Self {
            spec: MarkerModelSpec::default(),
        }
    }
}

impl MarkerModel {
    pub fn new(spec: MarkerModelSpec) -> Result<Self, ModelError> {
        if !in_range(spec.aspect_ratio, 0.0, f32::MAX) {
            return Err(invalid("aspect_ratio must be > 0"));
        }
        if !spec.aspect_tolerance.is_finite() || spec.aspect_tolerance < 0.0 {
            return Err(invalid("aspect_tolerance must be >= 0"));
        }
        if !in_range(spec.border, 0.0, 0.5) || !in_range(spec.quiet_zone, 0.0, 0.5) {
            return Err(invalid("border and quiet_zone must be in (0, 0.5)"));
        }
        if 2.0 * (spec.border + spec.quiet_zone) >= 1.0 {
            return Err(invalid("border and quiet zone leave no room for the dot grid"));
        }
        if !in_range(spec.key_size, 0.0, spec.quiet_zone) {
            return Err(invalid("key_size must be in (0, quiet_zone]"));
        }
        if spec.rows == 0 || spec.cols == 0 {
            return Err(invalid("grid must have at least one row and column"));
        }
        if spec.payload_bits == 0 || spec.payload_bits > 64 {
            return Err(invalid("payload_bits must be in 1..=64"));
        }
        if let ChecksumScheme::Crc { bits, poly } = spec.checksum {
            if bits == 0 || bits > 32 {
                return Err(invalid("crc width must be in 1..=32"));
            }
            if poly == 0 || (bits < 32 && poly >> bits != 0) {
                return Err(invalid(format!("crc poly {poly:#x} does not fit {bits} bits")));
            }
        }
        let needed = spec.payload_bits + spec.checksum.bits();
        if needed > spec.rows * spec.cols {
            return Err(invalid(format!(
                "{needed} payload+checksum bits do not fit a {}x{} grid",
                spec.rows, spec.cols
            )));
        }
        if !in_range(spec.dot_diameter, 0.0, 1.0) {
            return Err(invalid("dot_diameter must be in (0, 1]"));
        }
        if !spec.sample_radius.is_finite() || spec.sample_radius < 0.0 || spec.sample_radius >= 0.5
        {
            return Err(invalid("sample_radius must be in [0, 0.5)"));
        }
        Ok(Self { spec })
    }

    pub fn from_json_str(json: &str) -> Result<Self, ModelError> {
        let spec: MarkerModelSpec =
            serde_json::from_str(json).map_err(|e| ModelError::Load(e.into()))?;
        Self::new(spec)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ModelError> {
        Self::new(read_json(path)?)
    }

    #[inline]
    pub fn spec(&self) -> &MarkerModelSpec {
        &self.spec
    }

    #[inline]
    pub fn aspect_ratio(&self) -> f32 {
        self.spec.aspect_ratio
    }

    #[inline]
    pub fn aspect_tolerance(&self) -> f32 {
        self.spec.aspect_tolerance
    }

    #[inline]
    pub fn border(&self) -> f32 {
        self.spec.border
    }

    #[inline]
    pub fn quiet_zone(&self) -> f32 {
        self.spec.quiet_zone
    }

    #[inline]
    pub fn payload_bits(&self) -> usize {
        self.spec.payload_bits
    }

    #[inline]
    pub fn checksum(&self) -> ChecksumScheme {
        self.spec.checksum
    }

    #[inline]
    pub fn cell_count(&self) -> usize {
        self.spec.rows * self.spec.cols
    }

    /// Canonical offset where the dot grid starts.
    #[inline]
    pub fn grid_origin(&self) -> f32 {
        self.spec.border + self.spec.quiet_zone
    }

    /// Canonical cell `(width, height)`.
    pub fn cell_size(&self) -> Vector2<f32> {
        let extent = 1.0 - 2.0 * self.grid_origin();
        Vector2::new(extent / self.spec.cols as f32, extent / self.spec.rows as f32)
    }

    /// Canonical centre of the cell at scan index `i` (row-major).
    pub fn cell_center(&self, i: usize) -> Point2<f32> {
        let (row, col) = (i / self.spec.cols, i % self.spec.cols);
        let g0 = self.grid_origin();
        let cs = self.cell_size();
        Point2::new(
            g0 + (col as f32 + 0.5) * cs.x,
            g0 + (row as f32 + 0.5) * cs.y,
        )
    }

    /// Sampling patch half-spacing in canonical units.
    pub fn sample_offset(&self) -> Vector2<f32> {
        self.cell_size() * self.spec.sample_radius
    }

    /// Canonical centres of the four possible key positions, ordered
    /// TL, TR, BR, BL. The marker's key sits at index 0.
    pub fn key_centers(&self) -> [Point2<f32>; 4] {
        let k = self.spec.border + 0.5 * self.spec.key_size;
        [
            Point2::new(k, k),
            Point2::new(1.0 - k, k),
            Point2::new(1.0 - k, 1.0 - k),
            Point2::new(k, 1.0 - k),
        ]
    }

    /// True if `p` lies on a dark part of the marker frame (border or key).
    pub fn is_frame_dark(&self, p: Point2<f32>) -> bool {
        let b = self.spec.border;
        let edge = p.x.min(p.y).min(1.0 - p.x).min(1.0 - p.y);
        if edge < b {
            return true;
        }
        let key_end = b + self.spec.key_size;
        (b..key_end).contains(&p.x) && (b..key_end).contains(&p.y)
    }

    /// Index of the dot whose disc contains `p`, if any.
    pub fn dot_at(&self, p: Point2<f32>) -> Option<usize> {
        let g0 = self.grid_origin();
        let cs = self.cell_size();
        let col = ((p.x - g0) / cs.x).floor();
        let row = ((p.y - g0) / cs.y).floor();
        if col < 0.0 || row < 0.0 {
            return None;
        }
        let (col, row) = (col as usize, row as usize);
        if col >= self.spec.cols || row >= self.spec.rows {
            return None;
        }
        let i = row * self.spec.cols + col;
        let c = self.cell_center(i);
        let r = 0.5 * self.spec.dot_diameter;
        let dx = (p.x - c.x) / cs.x;
        let dy = (p.y - c.y) / cs.y;
        (dx * dx + dy * dy <= r * r).then_some(i)
    }

    /// Full cell bit vector for `payload`: payload, checksum, then zeros.
    pub fn encode_bits(&self, payload: u64) -> Result<Vec<bool>, ModelError> {
        let pb = self.spec.payload_bits;
        if pb < 64 && payload >> pb != 0 {
            return Err(ModelError::PayloadTooLarge { payload, bits: pb });
        }
        let cb = self.spec.checksum.bits();
        let sum = self.spec.checksum.compute(payload, pb);
        let mut bits = Vec::with_capacity(self.cell_count());
        bits.extend((0..pb).rev().map(|i| (payload >> i) & 1 == 1));
        bits.extend((0..cb).rev().map(|i| (sum >> i) & 1 == 1));
        bits.resize(self.cell_count(), false);
        Ok(bits)
    }

    /// Split scanned cell bits into `(payload, checksum)`.
    pub fn split_bits(&self, bits: &[bool]) -> (u64, u64) {
        let pb = self.spec.payload_bits;
        let cb = self.spec.checksum.bits();
        let fold = |acc: u64, b: &bool| (acc << 1) | *b as u64;
        let payload = bits.iter().take(pb).fold(0u64, fold);
        let checksum = bits.iter().skip(pb).take(cb).fold(0u64, fold);
        (payload, checksum)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_model_is_valid() {
        let m = MarkerModel::new(MarkerModelSpec::default()).unwrap();
        assert_eq!(m, MarkerModel::default());
        assert_eq!(m.cell_count(), 16);
        assert!((m.grid_origin() - 0.22).abs() < 1e-6);
        let c0 = m.cell_center(0);
        assert!((c0.x - 0.29).abs() < 1e-6 && (c0.y - 0.29).abs() < 1e-6);
    }

    #[test]
    fn overfull_grid_is_rejected() {
        let spec = MarkerModelSpec {
            payload_bits: 14,
            ..MarkerModelSpec::default()
        };
        assert!(matches!(MarkerModel::new(spec), Err(ModelError::Invalid { .. })));

        let spec = MarkerModelSpec {
            key_size: 0.1,
            ..MarkerModelSpec::default()
        };
        assert!(MarkerModel::new(spec).is_err());

        let spec = MarkerModelSpec {
            checksum: ChecksumScheme::Crc { bits: 4, poly: 0x13 },
            ..MarkerModelSpec::default()
        };
        assert!(MarkerModel::new(spec).is_err());
    }

    #[test]
    fn encode_then_split_recovers_payload_and_checksum() {
        let m = MarkerModel::default();
        let bits = m.encode_bits(0b1011).unwrap();
        assert_eq!(bits.len(), 16);
        assert_eq!(&bits[8..12], &[true, false, true, true]);
        let (payload, sum) = m.split_bits(&bits);
        assert_eq!(payload, 0b1011);
        assert_eq!(sum, m.checksum().compute(0b1011, 12));
        assert!(matches!(
            m.encode_bits(1 << 12),
            Err(ModelError::PayloadTooLarge { bits: 12, .. })
        ));
    }

    #[test]
    fn frame_and_dots_classify_points() {
        let m = MarkerModel::default();
        assert!(m.is_frame_dark(Point2::new(0.05, 0.5)));
        assert!(m.is_frame_dark(Point2::new(0.18, 0.18)));
        assert!(!m.is_frame_dark(Point2::new(0.82, 0.18)));
        assert!(!m.is_frame_dark(Point2::new(0.5, 0.5)));
        assert_eq!(m.dot_at(m.cell_center(5)), Some(5));
        assert_eq!(m.dot_at(Point2::new(0.225, 0.225)), None);
    }

    #[test]
    fn partial_json_overrides_defaults() {
        let m = MarkerModel::from_json_str(r#"{ "rows": 5, "cols": 5, "payload_bits": 20 }"#)
            .unwrap();
        assert_eq!(m.cell_count(), 25);
        assert_eq!(m.checksum(), ChecksumScheme::crc4());
        let json = serde_json::to_string(&m).unwrap();
        assert_eq!(MarkerModel::from_json_str(&json).unwrap(), m);
        assert!(MarkerModel::from_json_str(r#"{ "rows": 0 }"#).is_err());
    }
}
