use nalgebra::Point2;
use qyoo_core::AffineTransform;
use serde::{Deserialize, Serialize};

use super::{DetectError, DetectionStatus};
use crate::decoder::DecodedMarker;
use crate::matcher::QuadMatch;

/// Flat per-frame report, suitable for JSON output.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    pub status: DetectionStatus,
    /// Canonical unit square to image pixels.
    pub transform: Option<AffineTransform>,
    /// Image corners TL, TR, BR, BL.
    pub corners: Option<[Point2<f32>; 4]>,
    pub payload: Option<u64>,
    pub confidence: f32,
}

impl DetectionResult {
    /// Report for a run that failed before the marker was located.
    pub fn failure(err: &DetectError) -> Self {
        Self {
            status: err.status(),
            transform: None,
            corners: None,
            payload: None,
            confidence: 0.0,
        }
    }

    /// Report for a located marker whose payload could not be read.
    pub fn located(err: &DetectError, quad: &QuadMatch) -> Self {
        Self {
            status: err.status(),
            transform: Some(quad.transform),
            corners: Some(quad.corners),
            payload: None,
            confidence: 0.0,
        }
    }

    #[inline]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Image position of the marker centre.
    pub fn center(&self) -> Option<Point2<f32>> {
        self.transform.map(|t| t.apply(Point2::new(0.5, 0.5)))
    }

    /// Marker rotation in degrees (clockwise on screen).
    pub fn rotation_deg(&self) -> Option<f32> {
        self.transform.map(|t| t.rotation().to_degrees() as f32)
    }
}

/// Successful detection with the intermediate stage outputs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub quad: QuadMatch,
    pub marker: DecodedMarker,
    /// Match confidence times decode confidence.
    pub confidence: f32,
}

impl Detection {
    pub fn new(quad: QuadMatch, marker: DecodedMarker) -> Self {
        let confidence = (quad.confidence * marker.confidence).clamp(0.0, 1.0);
        Self {
            quad,
            marker,
            confidence,
        }
    }

    #[inline]
    pub fn payload(&self) -> u64 {
        self.marker.payload
    }

    /// Orientation-corrected transform.
    #[inline]
    pub fn transform(&self) -> &AffineTransform {
        &self.marker.transform
    }

    pub fn to_result(&self) -> DetectionResult {
        DetectionResult {
            status: DetectionStatus::Success,
            transform: Some(self.marker.transform),
            corners: Some(self.marker.corners),
            payload: Some(self.marker.payload),
            confidence: self.confidence,
        }
    }
}

impl From<&Detection> for DetectionResult {
    fn from(d: &Detection) -> Self {
        d.to_result()
    }
}
