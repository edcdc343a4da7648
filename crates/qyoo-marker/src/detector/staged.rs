use log::{debug, warn};
use qyoo_core::PixelView;

use super::{DetectError, DetectionResult, DetectionStatus, QyooDetector};

/// Opaque reference to a marker located in a processed frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MarkerHandle {
    frame: u64,
    index: usize,
}

impl MarkerHandle {
    #[inline]
    pub fn frame(&self) -> u64 {
        self.frame
    }
}

struct FrameState {
    frame: u64,
    result: DetectionResult,
    error: Option<DetectError>,
}

/// Three-call wrapper around [`QyooDetector`]: process a frame, query the
/// marker, then read its payload.
pub struct StagedDetector {
    detector: QyooDetector,
    frames: u64,
    last: Option<FrameState>,
}

impl StagedDetector {
    pub fn new(detector: QyooDetector) -> Self {
        Self {
            detector,
            frames: 0,
            last: None,
        }
    }

    #[inline]
    pub fn detector(&self) -> &QyooDetector {
        &self.detector
    }

    /// Run detection on a new frame, replacing the previous frame's state.
    pub fn process_frame(&mut self, image: &PixelView<'_, u8>) -> DetectionStatus {
        self.frames += 1;
        let (result, error) = self.detector.report(image);
        debug!("staged: frame {} -> {:?}", self.frames, result.status);
        let status = result.status;
        self.last = Some(FrameState {
            frame: self.frames,
            result,
            error,
        });
        status
    }

    /// Handle to the marker located in the last frame, if any.
    pub fn query_marker(&self) -> Option<MarkerHandle> {
        let state = self.last.as_ref()?;
        state.result.transform.map(|_| MarkerHandle {
            frame: state.frame,
            index: 0,
        })
    }

    /// Payload of the marker behind `handle`.
    pub fn decode_payload(&self, handle: MarkerHandle) -> Result<u64, DetectError> {
        let state = self.last.as_ref().ok_or(DetectError::NotProcessed)?;
        if handle.frame != state.frame || handle.index != 0 {
            warn!(
                "staged: stale marker handle (frame {}, current {})",
                handle.frame, state.frame
            );
            return Err(DetectError::NoMarkerFound);
        }
        match (state.result.payload, &state.error) {
            (Some(p), _) => Ok(p),
            (None, Some(e)) => Err(e.clone()),
            (None, None) => Err(DetectError::NoMarkerFound),
        }
    }

    /// Full report for the last processed frame.
    pub fn last_result(&self) -> Option<&DetectionResult> {
        self.last.as_ref().map(|s| &s.result)
    }
}
