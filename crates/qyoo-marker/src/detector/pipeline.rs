use log::{debug, info};
use qyoo_core::{PixelBuffer, PixelView};
use qyoo_features::{detect_edges, extract_features};

#[cfg(feature = "tracing")]
use tracing::instrument;

use super::{DetectError, Detection, DetectionResult, QyooDetectorParams};
use crate::decoder::{DecodedMarker, DotDecoder};
use crate::matcher::{MarkerMatcher, QuadMatch};
use crate::model::MarkerModel;

/// Located quad plus the outcome of decoding it.
type Located = (QuadMatch, Result<DecodedMarker, DetectError>);

/// Single-call Qyoo marker detector.
///
/// Immutable after construction; share it across threads freely.
pub struct QyooDetector {
    model: MarkerModel,
    params: QyooDetectorParams,
    matcher: MarkerMatcher,
    decoder: DotDecoder,
}

impl QyooDetector {
    pub fn new(model: MarkerModel, params: QyooDetectorParams) -> Self {
        let matcher = MarkerMatcher::new(model.clone(), params.matcher.clone());
        let decoder = DotDecoder::new(model.clone(), params.decoder.clone());
        Self {
            model,
            params,
            matcher,
            decoder,
        }
    }

    #[inline]
    pub fn model(&self) -> &MarkerModel {
        &self.model
    }

    #[inline]
    pub fn params(&self) -> &QyooDetectorParams {
        &self.params
    }

    /// Detect a marker and report the outcome as a flat result.
    ///
    /// Decode failures still carry the located transform and corners.
    pub fn detect(&self, image: &PixelView<'_, u8>) -> DetectionResult {
        self.report(image).0
    }

    /// Flat result plus the error behind a failed status.
    pub(super) fn report(
        &self,
        image: &PixelView<'_, u8>,
    ) -> (DetectionResult, Option<DetectError>) {
        match self.locate(image) {
            Err(e) => {
                debug!("qyoo: detection failed: {e}");
                (DetectionResult::failure(&e), Some(e))
            }
            Ok((quad, Err(e))) => {
                debug!("qyoo: marker located but not decoded: {e}");
                (DetectionResult::located(&e, &quad), Some(e))
            }
            Ok((quad, Ok(marker))) => (Detection::new(quad, marker).to_result(), None),
        }
    }

    /// Detect a marker, returning the stage outputs on success.
    pub fn try_detect(&self, image: &PixelView<'_, u8>) -> Result<Detection, DetectError> {
        let (quad, decoded) = self.locate(image)?;
        Ok(Detection::new(quad, decoded?))
    }

    #[cfg_attr(
        feature = "tracing",
        instrument(
            level = "info",
            skip_all,
            fields(width = image.width(), height = image.height())
        )
    )]
    fn locate(&self, image: &PixelView<'_, u8>) -> Result<Located, DetectError> {
        let stretched: PixelBuffer<u8>;
        let view = if self.params.contrast_stretch {
            stretched = image.stretched();
            stretched.view()
        } else {
            *image
        };

        let edges = detect_edges(&view, &self.params.edges)?;
        debug!(
            "qyoo: {} edge pixels in {}x{}",
            edges.edge_count(),
            view.width(),
            view.height()
        );
        if edges.is_empty() {
            return Err(DetectError::NoMarkerFound);
        }

        let features = extract_features(&edges, &self.params.features);
        debug!(
            "qyoo: {} feature candidates ({} corners)",
            features.len(),
            features.iter().filter(|f| f.is_corner()).count()
        );

        let quad = self.matcher.find(&view, &edges, &features)?;
        let decoded = self.decoder.decode(&view, &quad.transform);
        if let Ok(m) = &decoded {
            info!(
                "qyoo: decoded payload {} (turns={}, confidence={:.2})",
                m.payload,
                m.quarter_turns,
                quad.confidence * m.confidence
            );
        }
        Ok((quad, decoded))
    }
}

/// One-shot convenience wrapper around [`QyooDetector`].
pub fn detect_marker(
    image: &PixelView<'_, u8>,
    model: &MarkerModel,
    params: &QyooDetectorParams,
) -> DetectionResult {
    QyooDetector::new(model.clone(), params.clone()).detect(image)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::DetectionStatus;

    #[test]
    fn detector_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<QyooDetector>();
        assert_send_sync::<MarkerModel>();
    }

    #[test]
    fn blank_frame_reports_no_marker() {
        let img = PixelBuffer::filled(64, 48, 180u8).unwrap();
        let r = detect_marker(&img.view(), &MarkerModel::default(), &QyooDetectorParams::default());
        assert_eq!(r.status, DetectionStatus::NoMarkerFound);
        assert!(r.transform.is_none());
    }

    #[test]
    fn tiny_blank_frames_report_no_marker() {
        let det = QyooDetector::new(MarkerModel::default(), QyooDetectorParams::default());
        for size in [1, 2, 5, 8, 10] {
            let img = PixelBuffer::filled(size, size, 100u8).unwrap();
            let r = det.detect(&img.view());
            assert_eq!(r.status, DetectionStatus::NoMarkerFound, "{size}x{size}");
        }
    }

    #[test]
    fn inverted_thresholds_surface_as_configuration_error() {
        let img = PixelBuffer::filled(32, 32, 10u8).unwrap();
        let mut params = QyooDetectorParams::default();
        params.edges.low_threshold = 200.0;
        params.edges.high_threshold = 50.0;
        let det = QyooDetector::new(MarkerModel::default(), params);
        assert!(matches!(
            det.try_detect(&img.view()),
            Err(DetectError::InvalidKernel { .. })
        ));
    }
}
