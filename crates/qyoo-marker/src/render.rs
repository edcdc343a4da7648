//! Synthetic marker rendering for fixtures and printable targets.

use nalgebra::{Point2, Vector2};
use qyoo_core::{AffineError, AffineTransform, ImageError, PixelBuffer};
use serde::{Deserialize, Serialize};

use crate::model::{MarkerModel, ModelError};

#[derive(thiserror::Error, Debug)]
pub enum RenderError {
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error(transparent)]
    Image(#[from] ImageError),
    #[error("invalid marker placement: {0}")]
    Placement(#[from] AffineError),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderStyle {
    pub dark: u8,
    pub light: u8,
    /// Sub-samples per pixel axis.
    pub supersample: usize,
}

impl Default for RenderStyle {
    fn default() -> Self {
        Self {
            dark: 25,
            light: 230,
            supersample: 4,
        }
    }
}

/// Transform placing a `side`-pixel marker centred at `center`, rotated by
/// `rotation_deg` (clockwise on screen).
pub fn marker_transform(
    center: Point2<f32>,
    side: f32,
    rotation_deg: f32,
) -> Result<AffineTransform, RenderError> {
    let rot = (rotation_deg as f64).to_radians();
    let (s, c) = rot.sin_cos();
    let side = side as f64;
    // centre minus R * (side/2, side/2)
    let half = 0.5 * side;
    let t = Vector2::new(
        center.x as f64 - (c * half - s * half),
        center.y as f64 - (s * half + c * half),
    );
    Ok(AffineTransform::from_similarity(rot, side, t)?)
}

/// Draw the marker encoding `payload` through `transform` on a light
/// background.
pub fn render_marker(
    model: &MarkerModel,
    payload: u64,
    transform: &AffineTransform,
    width: usize,
    height: usize,
    style: &RenderStyle,
) -> Result<PixelBuffer<u8>, RenderError> {
    let bits = model.encode_bits(payload)?;
    render_bits(model, &bits, transform, width, height, style)
}

/// Draw an explicit cell bit vector; cells past `bits.len()` stay light.
pub fn render_bits(
    model: &MarkerModel,
    bits: &[bool],
    transform: &AffineTransform,
    width: usize,
    height: usize,
    style: &RenderStyle,
) -> Result<PixelBuffer<u8>, RenderError> {
    let inv = transform.inverse();
    let n = style.supersample.max(1);
    let step = 1.0 / n as f32;
    let dark = style.dark as f32;
    let light = style.light as f32;

    let is_dark = |p: Point2<f32>| -> bool {
        let c = inv.apply(p);
        if !(0.0..1.0).contains(&c.x) || !(0.0..1.0).contains(&c.y) {
            return false;
        }
        model.is_frame_dark(c) || model.dot_at(c).is_some_and(|i| bits.get(i).copied().unwrap_or(false))
    };

    Ok(PixelBuffer::from_fn(width, height, |x, y| {
        let mut hits = 0usize;
        for sy in 0..n {
            for sx in 0..n {
                let p = Point2::new(
                    x as f32 - 0.5 + (sx as f32 + 0.5) * step,
                    y as f32 - 0.5 + (sy as f32 + 0.5) * step,
                );
                if is_dark(p) {
                    hits += 1;
                }
            }
        }
        let frac = hits as f32 / (n * n) as f32;
        (light + (dark - light) * frac).round().clamp(0.0, 255.0) as u8
    })?)
}
