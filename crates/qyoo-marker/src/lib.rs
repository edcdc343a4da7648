//! Qyoo marker model, matching, decoding and the detection pipeline.
//!
//! Current focus:
//! - a validated [`MarkerModel`] describing border, orientation key and dot grid,
//! - quad matching of corner candidates against the marker boundary,
//! - dot-grid decoding with checksum validation,
//! - single-call ([`QyooDetector`]) and staged ([`StagedDetector`]) pipelines.
//!
//! Edge and corner extraction live in `qyoo-features`.
//!
//! ```
//! use qyoo_core::Point2;
//! use qyoo_marker::{
//!     marker_transform, render_marker, MarkerModel, QyooDetector, QyooDetectorParams,
//!     RenderStyle,
//! };
//!
//! let model = MarkerModel::default();
//! let placement = marker_transform(Point2::new(100.0, 100.0), 110.0, 8.0).unwrap();
//! let img = render_marker(&model, 42, &placement, 200, 200, &RenderStyle::default()).unwrap();
//!
//! let detector = QyooDetector::new(model, QyooDetectorParams::default());
//! let result = detector.detect(&img.view());
//! assert_eq!(result.payload, Some(42));
//! ```

mod checksum;
mod decoder;
mod detector;
mod io;
mod matcher;
mod model;
mod render;

pub use checksum::ChecksumScheme;
pub use decoder::{DecodedMarker, DecoderParams, DotDecoder};
pub use detector::{
    detect_marker, DetectError, Detection, DetectionResult, DetectionStatus, MarkerHandle,
    QyooDetector, QyooDetectorParams, StagedDetector,
};
pub use io::{read_json, write_json, QyooIoError};
pub use matcher::{order_quad, MarkerMatcher, MatcherParams, QuadFit, QuadMatch};
pub use model::{canonical_corners, MarkerModel, MarkerModelSpec, ModelError};
pub use render::{marker_transform, render_bits, render_marker, RenderError, RenderStyle};

pub use qyoo_core::AffineTransform;
