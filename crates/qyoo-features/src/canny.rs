//! Canny edge detection as four pure stages.
//!
//! 1. [`smooth`]: separable Gaussian blur.
//! 2. [`gradient`]: Sobel responses, magnitude and quantized direction.
//! 3. [`non_maximum_suppression`]: thin ridges to one pixel.
//! 4. [`hysteresis`]: dual threshold with 8-connected promotion.
//!
//! [`detect_edges`] chains them.

use log::debug;
use qyoo_core::{
    convolve, convolve_separable, BorderPolicy, ConvolutionError, ImageError, Kernel, Kernel1d,
    PixelBuffer, PixelView, Sample,
};
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::edge_map::{Direction, EdgeMap};

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum EdgeError {
    #[error("hysteresis thresholds out of order (low={low}, high={high})")]
    InvalidThresholds { low: f32, high: f32 },
    #[error(transparent)]
    Convolution(#[from] ConvolutionError),
    #[error(transparent)]
    Image(#[from] ImageError),
}

/// How the Sobel responses are combined into a magnitude.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MagnitudeMode {
    /// `sqrt(gx² + gy²)`
    #[default]
    Euclidean,
    /// `|gx| + |gy|`
    L1,
}

/// Edge detector configuration.
///
/// Thresholds are in unnormalized Sobel units: a clean 0→255 step yields a
/// peak magnitude of roughly 500 after the default smoothing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EdgeParams {
    /// Gaussian sigma in pixels; `<= 0` disables smoothing.
    pub sigma: f32,
    pub low_threshold: f32,
    pub high_threshold: f32,
    pub magnitude: MagnitudeMode,
    pub border: BorderPolicy,
}

impl Default for EdgeParams {
    fn default() -> Self {
        Self {
            sigma: 1.4,
            low_threshold: 40.0,
            high_threshold: 100.0,
            magnitude: MagnitudeMode::Euclidean,
            border: BorderPolicy::Reflect,
        }
    }
}

impl EdgeParams {
    pub fn validate(&self) -> Result<(), EdgeError> {
        let (low, high) = (self.low_threshold, self.high_threshold);
        if !(low.is_finite() && high.is_finite()) || low > high || low < 0.0 {
            return Err(EdgeError::InvalidThresholds { low, high });
        }
        Ok(())
    }
}

/// Per-pixel gradient magnitude and quantized direction.
#[derive(Clone, Debug)]
pub struct GradientField {
    width: usize,
    height: usize,
    magnitude: Vec<f32>,
    direction: Vec<Direction>,
}

impl GradientField {
    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    pub fn magnitude(&self) -> &[f32] {
        &self.magnitude
    }

    pub fn direction(&self) -> &[Direction] {
        &self.direction
    }

    #[inline]
    fn magnitude_at(&self, x: i32, y: i32) -> f32 {
        if x < 0 || y < 0 || x as usize >= self.width || y as usize >= self.height {
            return 0.0;
        }
        self.magnitude[y as usize * self.width + x as usize]
    }
}

/// Gaussian smoothing; returns an `f32` copy unchanged when `sigma <= 0`.
///
/// The kernel is cropped per axis to fit images narrower than its support.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "debug", skip(src), fields(width = src.width(), height = src.height()))
)]
pub fn smooth<T: Sample>(
    src: &PixelView<'_, T>,
    sigma: f32,
    border: BorderPolicy,
) -> Result<PixelBuffer<f32>, EdgeError> {
    if sigma <= 0.0 {
        return Ok(src.map(Sample::to_f32));
    }
    let k = Kernel1d::gaussian(sigma)?;
    let row = k.truncated(src.width());
    let col = k.truncated(src.height());
    Ok(convolve_separable(src, &row, &col, border)?)
}

/// Sobel gradient of an already smoothed image.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "debug", skip(src), fields(width = src.width(), height = src.height()))
)]
pub fn gradient(
    src: &PixelView<'_, f32>,
    mode: MagnitudeMode,
    border: BorderPolicy,
) -> Result<GradientField, EdgeError> {
    let gx = convolve(src, &Kernel::sobel_x(), border)?;
    let gy = convolve(src, &Kernel::sobel_y(), border)?;

    let mut magnitude = Vec::with_capacity(gx.data().len());
    let mut direction = Vec::with_capacity(gx.data().len());
    for (&x, &y) in gx.data().iter().zip(gy.data()) {
        magnitude.push(match mode {
            MagnitudeMode::Euclidean => (x * x + y * y).sqrt(),
            MagnitudeMode::L1 => x.abs() + y.abs(),
        });
        direction.push(Direction::from_gradient(x, y));
    }

    Ok(GradientField {
        width: src.width(),
        height: src.height(),
        magnitude,
        direction,
    })
}

/// Zero every pixel that is not a local maximum along its gradient direction.
///
/// A pixel survives if it is strictly greater than the neighbour behind it
/// and not smaller than the neighbour ahead, so a two-pixel plateau keeps
/// exactly its first (darker-side) pixel.
pub fn non_maximum_suppression(grad: &GradientField) -> Result<PixelBuffer<f32>, EdgeError> {
    let (w, h) = (grad.width, grad.height);
    let mut out = vec![0.0f32; w * h];
    for y in 0..h {
        for x in 0..w {
            let i = y * w + x;
            let m = grad.magnitude[i];
            if m <= 0.0 {
                continue;
            }
            let (dx, dy) = grad.direction[i].offset();
            let (xi, yi) = (x as i32, y as i32);
            let ahead = grad.magnitude_at(xi + dx, yi + dy);
            let behind = grad.magnitude_at(xi - dx, yi - dy);
            if m > behind && m >= ahead {
                out[i] = m;
            }
        }
    }
    Ok(PixelBuffer::from_vec(w, h, out)?)
}

/// Dual-threshold edge tracking over 8-connectivity.
pub fn hysteresis(
    thinned: &PixelView<'_, f32>,
    directions: &[Direction],
    low: f32,
    high: f32,
) -> Result<EdgeMap, EdgeError> {
    if !(low.is_finite() && high.is_finite()) || low > high {
        return Err(EdgeError::InvalidThresholds { low, high });
    }
    let (w, h) = (thinned.width(), thinned.height());
    if directions.len() != w * h {
        return Err(ImageError::BufferSizeMismatch {
            expected: w * h,
            got: directions.len(),
        }
        .into());
    }

    let mag = thinned.data();
    let mut cells: Vec<Option<Direction>> = vec![None; w * h];
    let mut stack: Vec<usize> = Vec::new();

    for (i, &m) in mag.iter().enumerate() {
        if m >= high && m > 0.0 && cells[i].is_none() {
            cells[i] = Some(directions[i]);
            stack.push(i);
            while let Some(j) = stack.pop() {
                let (x, y) = ((j % w) as i32, (j / w) as i32);
                for dy in -1..=1 {
                    for dx in -1..=1 {
                        let (nx, ny) = (x + dx, y + dy);
                        if nx < 0 || ny < 0 || nx as usize >= w || ny as usize >= h {
                            continue;
                        }
                        let k = ny as usize * w + nx as usize;
                        if cells[k].is_none() && mag[k] >= low && mag[k] > 0.0 {
                            cells[k] = Some(directions[k]);
                            stack.push(k);
                        }
                    }
                }
            }
        }
    }

    Ok(EdgeMap::from_cells(w, h, cells))
}

/// Full Canny pipeline.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "info", skip(src, params), fields(width = src.width(), height = src.height()))
)]
pub fn detect_edges<T: Sample>(
    src: &PixelView<'_, T>,
    params: &EdgeParams,
) -> Result<EdgeMap, EdgeError> {
    params.validate()?;
    let (w, h) = (src.width(), src.height());
    if w < 3 || h < 3 {
        debug!("canny: {w}x{h} is below the Sobel support, no edges");
        return Ok(EdgeMap::new(w, h)?);
    }
    let smoothed = smooth(src, params.sigma, params.border)?;
    let grad = gradient(&smoothed.view(), params.magnitude, params.border)?;
    let thinned = non_maximum_suppression(&grad)?;
    let edges = hysteresis(
        &thinned.view(),
        grad.direction(),
        params.low_threshold,
        params.high_threshold,
    )?;
    debug!(
        "canny: {}x{} -> {} edge pixels (sigma={}, low={}, high={})",
        src.width(),
        src.height(),
        edges.edge_count(),
        params.sigma,
        params.low_threshold,
        params.high_threshold
    );
    Ok(edges)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step_image(w: usize, h: usize, at: usize) -> PixelBuffer<u8> {
        PixelBuffer::from_fn(w, h, |x, _| if x < at { 0 } else { 255 }).unwrap()
    }

    #[test]
    fn uniform_image_has_no_edges() {
        let img = PixelBuffer::filled(64, 48, 128u8).unwrap();
        let edges = detect_edges(&img.view(), &EdgeParams::default()).unwrap();
        assert!(edges.is_empty());
    }

    #[test]
    fn tiny_uniform_images_have_no_edges() {
        for size in [1, 2, 3, 5, 8, 10] {
            let img = PixelBuffer::filled(size, size, 100u8).unwrap();
            let edges = detect_edges(&img.view(), &EdgeParams::default()).unwrap();
            assert_eq!((edges.width(), edges.height()), (size, size));
            assert!(edges.is_empty(), "{size}x{size}");
        }
        let strip = PixelBuffer::filled(40, 2, 100u8).unwrap();
        assert!(detect_edges(&strip.view(), &EdgeParams::default())
            .unwrap()
            .is_empty());
    }

    #[test]
    fn small_step_still_yields_edges() {
        let img = step_image(8, 8, 4);
        let edges = detect_edges(&img.view(), &EdgeParams::default()).unwrap();
        assert!(!edges.is_empty());
    }

    #[test]
    fn vertical_step_gives_thin_horizontal_edge() {
        let img = step_image(200, 60, 100);
        let edges = detect_edges(&img.view(), &EdgeParams::default()).unwrap();
        assert!(!edges.is_empty());
        for (x, _, dir) in edges.iter_edges() {
            assert!((98..=101).contains(&x), "edge at column {x}");
            assert!(dir.is_horizontal(), "unexpected direction {dir:?}");
        }
        // one pixel per row
        assert_eq!(edges.edge_count(), 60);
    }

    #[test]
    fn step_direction_points_towards_light() {
        let img = step_image(40, 20, 20);
        let edges = detect_edges(&img.view(), &EdgeParams::default()).unwrap();
        assert!(edges.iter_edges().all(|(_, _, d)| d == Direction::East));
    }

    #[test]
    fn inverted_thresholds_are_rejected() {
        let params = EdgeParams {
            low_threshold: 120.0,
            high_threshold: 60.0,
            ..EdgeParams::default()
        };
        let img = step_image(32, 32, 16);
        assert_eq!(
            detect_edges(&img.view(), &params),
            Err(EdgeError::InvalidThresholds {
                low: 120.0,
                high: 60.0
            })
        );
    }

    #[test]
    fn weak_pixels_need_a_strong_neighbour() {
        let mag = PixelBuffer::from_vec(5, 1, vec![50.0f32, 0.0, 50.0, 150.0, 50.0]).unwrap();
        let dirs = vec![Direction::East; 5];
        let edges = hysteresis(&mag.view(), &dirs, 40.0, 100.0).unwrap();
        assert!(!edges.is_edge(0, 0));
        assert!(edges.is_edge(2, 0));
        assert!(edges.is_edge(3, 0));
        assert!(edges.is_edge(4, 0));
    }

    #[test]
    fn plateau_keeps_single_pixel() {
        let img = PixelBuffer::from_vec(4, 1, vec![0.0f32, 10.0, 10.0, 0.0]).unwrap();
        let grad = GradientField {
            width: 4,
            height: 1,
            magnitude: img.data().to_vec(),
            direction: vec![Direction::East; 4],
        };
        let thin = non_maximum_suppression(&grad).unwrap();
        assert_eq!(thin.data(), &[0.0, 10.0, 0.0, 0.0]);
    }

    #[test]
    fn smoothing_can_be_disabled() {
        let img = step_image(8, 8, 4);
        let out = smooth(&img.view(), 0.0, BorderPolicy::Reflect).unwrap();
        assert_eq!(out.get(3, 0), Some(0.0));
        assert_eq!(out.get(4, 0), Some(255.0));
    }
}
