//! Qyoo detection pipeline.
//!
//! [`QyooDetector`] chains contrast stretch, edge detection, feature
//! extraction, quad matching and dot decoding in a single call.
//! [`StagedDetector`] exposes the same work as process / query / decode steps
//! for frame-loop integrations.

mod error;
mod params;
mod pipeline;
mod result;
mod staged;

pub use error::{DetectError, DetectionStatus};
pub use params::QyooDetectorParams;
pub use pipeline::{detect_marker, QyooDetector};
pub use result::{Detection, DetectionResult};
pub use staged::{MarkerHandle, StagedDetector};
