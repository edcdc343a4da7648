//! Edge and geometric feature extraction for Qyoo marker detection.
//!
//! Two stages sit here:
//! - [`detect_edges`]: a Canny detector producing an [`EdgeMap`] that keeps
//!   the quantized gradient direction of every edge pixel,
//! - [`extract_features`]: contour tracing, straight-run segmentation and
//!   corner placement, producing [`FeatureCandidate`]s.
//!
//! ```
//! use qyoo_core::PixelBuffer;
//! use qyoo_features::{detect_edges, extract_features, EdgeParams, FeatureParams};
//!
//! let img = PixelBuffer::from_fn(80, 80, |x, y| {
//!     if (20..60).contains(&x) && (20..60).contains(&y) { 20u8 } else { 220 }
//! })
//! .unwrap();
//! let edges = detect_edges(&img.view(), &EdgeParams::default()).unwrap();
//! let features = extract_features(&edges, &FeatureParams::default());
//! assert!(features.iter().filter(|f| f.is_corner()).count() >= 4);
//! ```

mod canny;
mod contour;
mod corners;
mod edge_map;
mod params;
mod segment;

pub use canny::{
    detect_edges, gradient, hysteresis, non_maximum_suppression, smooth, EdgeError, EdgeParams,
    GradientField, MagnitudeMode,
};
pub use contour::{trace_contours, Contour};
pub use corners::{extract_features, FeatureCandidate, FeatureKind};
pub use edge_map::{Direction, EdgeMap};
pub use params::FeatureParams;
pub use segment::{segment_contour, Run};
