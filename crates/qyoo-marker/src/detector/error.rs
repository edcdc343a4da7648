use qyoo_core::{ConvolutionError, ImageError};
use qyoo_features::EdgeError;
use serde::{Deserialize, Serialize};

/// Errors returned by the Qyoo detection stages.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum DetectError {
    #[error("invalid image dimensions (width={width}, height={height})")]
    InvalidDimensions { width: usize, height: usize },
    #[error("invalid pixel buffer: {reason}")]
    InvalidBuffer { reason: String },
    #[error("invalid kernel or edge configuration: {reason}")]
    InvalidKernel { reason: String },
    #[error("no marker found")]
    NoMarkerFound,
    #[error("ambiguous match (best residual {best:.3}, runner-up {runner_up:.3})")]
    AmbiguousMatch { best: f32, runner_up: f32 },
    #[error("degenerate marker geometry")]
    GeometryDegenerate,
    #[error("checksum mismatch (expected {expected:#x}, observed {observed:#x})")]
    ChecksumMismatch { expected: u64, observed: u64 },
    #[error("marker contrast too low ({contrast:.1})")]
    LowContrast { contrast: f32 },
    #[error("orientation key not found")]
    OrientationNotFound,
    #[error("no frame has been processed")]
    NotProcessed,
}

impl DetectError {
    pub fn status(&self) -> DetectionStatus {
        match self {
            Self::InvalidDimensions { .. } => DetectionStatus::InvalidDimensions,
            Self::InvalidBuffer { .. } => DetectionStatus::InvalidBuffer,
            Self::InvalidKernel { .. } => DetectionStatus::InvalidKernel,
            Self::NoMarkerFound => DetectionStatus::NoMarkerFound,
            Self::AmbiguousMatch { .. } => DetectionStatus::AmbiguousMatch,
            Self::GeometryDegenerate => DetectionStatus::GeometryDegenerate,
            Self::ChecksumMismatch { .. } => DetectionStatus::ChecksumMismatch,
            Self::LowContrast { .. } => DetectionStatus::LowContrast,
            Self::OrientationNotFound => DetectionStatus::OrientationNotFound,
            Self::NotProcessed => DetectionStatus::NotProcessed,
        }
    }

    /// True for failures that happen after the marker was located.
    pub fn is_decode_failure(&self) -> bool {
        matches!(
            self,
            Self::ChecksumMismatch { .. } | Self::LowContrast { .. } | Self::OrientationNotFound
        )
    }
}

impl From<ImageError> for DetectError {
    fn from(e: ImageError) -> Self {
        match e {
            ImageError::InvalidDimensions { width, height } => {
                Self::InvalidDimensions { width, height }
            }
            other => Self::InvalidBuffer {
                reason: other.to_string(),
            },
        }
    }
}

impl From<ConvolutionError> for DetectError {
    fn from(e: ConvolutionError) -> Self {
        match e {
            ConvolutionError::InvalidKernel { reason } => Self::InvalidKernel { reason },
            ConvolutionError::Image(img) => img.into(),
        }
    }
}

impl From<EdgeError> for DetectError {
    fn from(e: EdgeError) -> Self {
        match e {
            EdgeError::InvalidThresholds { .. } => Self::InvalidKernel {
                reason: e.to_string(),
            },
            EdgeError::Convolution(c) => c.into(),
            EdgeError::Image(img) => img.into(),
        }
    }
}

/// Flat outcome code of a detection run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionStatus {
    Success,
    InvalidDimensions,
    InvalidBuffer,
    InvalidKernel,
    NoMarkerFound,
    AmbiguousMatch,
    GeometryDegenerate,
    ChecksumMismatch,
    LowContrast,
    OrientationNotFound,
    NotProcessed,
}

impl DetectionStatus {
    #[inline]
    pub fn is_success(self) -> bool {
        self == Self::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lower_errors_map_onto_the_taxonomy() {
        let e: DetectError = ImageError::InvalidDimensions {
            width: 0,
            height: 3,
        }
        .into();
        assert_eq!(e.status(), DetectionStatus::InvalidDimensions);

        let e: DetectError = EdgeError::InvalidThresholds {
            low: 9.0,
            high: 1.0,
        }
        .into();
        assert_eq!(e.status(), DetectionStatus::InvalidKernel);

        let e: DetectError = EdgeError::Convolution(ConvolutionError::InvalidKernel {
            reason: "too big".into(),
        })
        .into();
        assert_eq!(
            e,
            DetectError::InvalidKernel {
                reason: "too big".into()
            }
        );
        assert!(DetectError::OrientationNotFound.is_decode_failure());
        assert!(!DetectError::NoMarkerFound.is_decode_failure());
    }
}
