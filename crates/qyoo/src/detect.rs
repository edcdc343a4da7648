//! End-to-end helpers working on `image::GrayImage`.

use ::image::GrayImage;
use qyoo_core::{ImageError, Point2};
use qyoo_marker::{
    marker_transform, render_marker, DetectionResult, MarkerModel, QyooDetector,
    QyooDetectorParams, RenderError, RenderStyle,
};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::bridge::{gray_view, BridgeError, ImageBridge, LumaBridge};

/// Run `detector` on a grayscale image without copying its pixels.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "info", skip_all, fields(width = img.width(), height = img.height()))
)]
pub fn detect_image(
    img: &GrayImage,
    detector: &QyooDetector,
) -> Result<DetectionResult, ImageError> {
    Ok(detector.detect(&gray_view(img)?))
}

/// Detect with the default marker model and parameters.
pub fn detect_image_default(img: &GrayImage) -> Result<DetectionResult, ImageError> {
    let detector = QyooDetector::new(MarkerModel::default(), QyooDetectorParams::default());
    detect_image(img, &detector)
}

/// Errors from [`render_image`].
#[derive(thiserror::Error, Debug)]
pub enum RenderImageError {
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error(transparent)]
    Bridge(#[from] BridgeError),
}

/// Render a square `size`×`size` image with one marker of side `marker_size`
/// at its centre.
pub fn render_image(
    model: &MarkerModel,
    payload: u64,
    size: u32,
    marker_size: f32,
    rotation_deg: f32,
    style: &RenderStyle,
) -> Result<GrayImage, RenderImageError> {
    let half = size as f32 * 0.5;
    let placement = marker_transform(Point2::new(half, half), marker_size, rotation_deg)?;
    let side = size as usize;
    let buf = render_marker(model, payload, &placement, side, side, style)?;
    Ok(LumaBridge.from_pixel_buffer(&buf.view())?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rendered_image_detects_end_to_end() {
        let model = MarkerModel::default();
        let img = render_image(&model, 99, 200, 100.0, 12.0, &RenderStyle::default()).unwrap();
        assert_eq!(img.dimensions(), (200, 200));
        let r = detect_image_default(&img).unwrap();
        assert_eq!(r.payload, Some(99));
        let c = r.center().unwrap();
        assert!((c.x - 100.0).abs() < 1.0 && (c.y - 100.0).abs() < 1.0);
    }

    #[test]
    fn zero_sized_render_is_an_error() {
        let err = render_image(&MarkerModel::default(), 1, 0, 10.0, 0.0, &RenderStyle::default());
        assert!(matches!(
            err,
            Err(RenderImageError::Render(RenderError::Image(_)))
        ));
    }
}
