//! Generic 2D convolution over pixel buffers.
//!
//! Kernels are applied correlation-style (not flipped), which is the usual
//! convention for image filters: `sobel_x` responds positively to intensity
//! increasing towards +x.

use serde::{Deserialize, Serialize};

use crate::image::{ImageError, PixelBuffer, PixelView, Sample};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Errors raised by the convolution engine.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ConvolutionError {
    #[error("invalid kernel: {reason}")]
    InvalidKernel { reason: String },
    #[error(transparent)]
    Image(#[from] ImageError),
}

fn invalid(reason: impl Into<String>) -> ConvolutionError {
    ConvolutionError::InvalidKernel {
        reason: reason.into(),
    }
}

/// How samples outside the image are synthesized.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BorderPolicy {
    /// Replicate the nearest edge pixel.
    Clamp,
    /// Mirror including the edge pixel (`cba|abc|cba`).
    #[default]
    Reflect,
    /// Treat outside samples as zero.
    Zero,
}

impl BorderPolicy {
    /// Map a possibly out-of-range index into `0..n`; `None` reads as zero.
    #[inline]
    fn resolve(self, i: isize, n: usize) -> Option<usize> {
        let n = n as isize;
        if (0..n).contains(&i) {
            return Some(i as usize);
        }
        match self {
            BorderPolicy::Zero => None,
            BorderPolicy::Clamp => Some(i.clamp(0, n - 1) as usize),
            BorderPolicy::Reflect => {
                let r = if i < 0 { -i - 1 } else { 2 * n - i - 1 };
                Some(r.clamp(0, n - 1) as usize)
            }
        }
    }
}

/// Odd-sized 2D kernel with an optional normalization divisor.
#[derive(Clone, Debug, PartialEq)]
pub struct Kernel {
    width: usize,
    height: usize,
    weights: Vec<f32>, // row-major
    divisor: Option<f32>,
}

impl Kernel {
    pub fn new(
        width: usize,
        height: usize,
        weights: Vec<f32>,
        divisor: Option<f32>,
    ) -> Result<Self, ConvolutionError> {
        if width % 2 == 0 || height % 2 == 0 {
            return Err(invalid(format!(
                "kernel dimensions must be odd (got {width}x{height})"
            )));
        }
        if weights.len() != width * height {
            return Err(invalid(format!(
                "expected {} weights for a {width}x{height} kernel, got {}",
                width * height,
                weights.len()
            )));
        }
        if let Some(d) = divisor {
            if d == 0.0 || !d.is_finite() {
                return Err(invalid("divisor must be finite and non-zero"));
            }
        }
        Ok(Self {
            width,
            height,
            weights,
            divisor,
        })
    }

    /// 1×1 identity kernel.
    pub fn identity() -> Self {
        Self {
            width: 1,
            height: 1,
            weights: vec![1.0],
            divisor: None,
        }
    }

    pub fn sobel_x() -> Self {
        Self {
            width: 3,
            height: 3,
            weights: vec![-1.0, 0.0, 1.0, -2.0, 0.0, 2.0, -1.0, 0.0, 1.0],
            divisor: None,
        }
    }

    pub fn sobel_y() -> Self {
        Self {
            width: 3,
            height: 3,
            weights: vec![-1.0, -2.0, -1.0, 0.0, 0.0, 0.0, 1.0, 2.0, 1.0],
            divisor: None,
        }
    }

    /// Normalized box filter of odd `size`.
    pub fn box_filter(size: usize) -> Result<Self, ConvolutionError> {
        Self::new(
            size,
            size,
            vec![1.0; size * size],
            Some((size * size) as f32),
        )
    }

    /// Normalized Gaussian, radius `ceil(3 sigma)`.
    pub fn gaussian(sigma: f32) -> Result<Self, ConvolutionError> {
        let k = Kernel1d::gaussian(sigma)?;
        let n = k.len();
        let mut weights = Vec::with_capacity(n * n);
        for wy in k.weights() {
            for wx in k.weights() {
                weights.push(wy * wx);
            }
        }
        Self::new(n, n, weights, None)
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn weights(&self) -> &[f32] {
        &self.weights
    }

    #[inline]
    pub fn divisor(&self) -> Option<f32> {
        self.divisor
    }

    #[inline]
    fn scale(&self) -> f32 {
        self.divisor.map_or(1.0, |d| 1.0 / d)
    }
}

/// Odd-length 1D kernel for separable filtering.
#[derive(Clone, Debug, PartialEq)]
pub struct Kernel1d {
    weights: Vec<f32>,
}

impl Kernel1d {
    pub fn new(weights: Vec<f32>) -> Result<Self, ConvolutionError> {
        if weights.len() % 2 == 0 {
            return Err(invalid(format!(
                "1D kernel length must be odd (got {})",
                weights.len()
            )));
        }
        Ok(Self { weights })
    }

    pub fn gaussian(sigma: f32) -> Result<Self, ConvolutionError> {
        if !(sigma.is_finite() && sigma > 0.0) {
            return Err(invalid(format!("gaussian sigma must be positive (got {sigma})")));
        }
        let radius = (3.0 * sigma).ceil().max(1.0) as usize;
        let denom = 2.0 * sigma * sigma;
        let mut weights: Vec<f32> = (0..=2 * radius)
            .map(|i| {
                let d = i as f32 - radius as f32;
                (-d * d / denom).exp()
            })
            .collect();
        let sum: f32 = weights.iter().sum();
        for w in &mut weights {
            *w /= sum;
        }
        Ok(Self { weights })
    }

    /// Symmetric crop to at most `max_len` taps (rounded down to odd),
    /// rescaled to keep the weight sum.
    pub fn truncated(&self, max_len: usize) -> Self {
        let len = self.weights.len();
        if max_len >= len || max_len == 0 {
            return self.clone();
        }
        let keep = if max_len % 2 == 0 { max_len - 1 } else { max_len };
        let cut = (len - keep) / 2;
        let total: f32 = self.weights.iter().sum();
        let mut weights = self.weights[cut..cut + keep].to_vec();
        let kept: f32 = weights.iter().sum();
        if kept != 0.0 {
            let scale = total / kept;
            for w in &mut weights {
                *w *= scale;
            }
        }
        Self { weights }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.weights.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    #[inline]
    pub fn weights(&self) -> &[f32] {
        &self.weights
    }
}

/// Convolve `src` with `kernel`, producing a same-sized `f32` buffer.
///
/// Fails with [`ConvolutionError::InvalidKernel`] if the kernel is larger
/// than the image in either dimension.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "debug", skip(src, kernel), fields(width = src.width(), height = src.height()))
)]
pub fn convolve<T: Sample>(
    src: &PixelView<'_, T>,
    kernel: &Kernel,
    border: BorderPolicy,
) -> Result<PixelBuffer<f32>, ConvolutionError> {
    let (w, h) = (src.width(), src.height());
    if kernel.width > w || kernel.height > h {
        return Err(invalid(format!(
            "{}x{} kernel does not fit a {w}x{h} image",
            kernel.width, kernel.height
        )));
    }

    let rx = kernel.width / 2;
    let ry = kernel.height / 2;
    let scale = kernel.scale();
    let data = src.data();
    let mut out = vec![0.0f32; w * h];

    for y in 0..h {
        let interior_y = y >= ry && y + ry < h;
        for x in 0..w {
            let mut acc = 0.0f32;
            if interior_y && x >= rx && x + rx < w {
                for ky in 0..kernel.height {
                    let row = (y + ky - ry) * w;
                    let krow = &kernel.weights[ky * kernel.width..(ky + 1) * kernel.width];
                    for (kx, &wgt) in krow.iter().enumerate() {
                        acc += wgt * data[row + x + kx - rx].to_f32();
                    }
                }
            } else {
                for ky in 0..kernel.height {
                    let Some(sy) = border.resolve(y as isize + ky as isize - ry as isize, h) else {
                        continue;
                    };
                    for kx in 0..kernel.width {
                        let Some(sx) = border.resolve(x as isize + kx as isize - rx as isize, w)
                        else {
                            continue;
                        };
                        acc += kernel.weights[ky * kernel.width + kx] * data[sy * w + sx].to_f32();
                    }
                }
            }
            out[y * w + x] = acc * scale;
        }
    }

    Ok(PixelBuffer::from_vec(w, h, out)?)
}

/// Separable convolution: `row` along x, then `col` along y.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "debug", skip(src, row, col), fields(width = src.width(), height = src.height()))
)]
pub fn convolve_separable<T: Sample>(
    src: &PixelView<'_, T>,
    row: &Kernel1d,
    col: &Kernel1d,
    border: BorderPolicy,
) -> Result<PixelBuffer<f32>, ConvolutionError> {
    let (w, h) = (src.width(), src.height());
    if row.len() > w || col.len() > h {
        return Err(invalid(format!(
            "{}x{} separable kernel does not fit a {w}x{h} image",
            row.len(),
            col.len()
        )));
    }

    let data = src.data();
    let rx = row.len() / 2;
    let mut tmp = vec![0.0f32; w * h];
    for y in 0..h {
        let base = y * w;
        for x in 0..w {
            let mut acc = 0.0f32;
            for (k, &wgt) in row.weights.iter().enumerate() {
                if let Some(sx) = border.resolve(x as isize + k as isize - rx as isize, w) {
                    acc += wgt * data[base + sx].to_f32();
                }
            }
            tmp[base + x] = acc;
        }
    }

    let ry = col.len() / 2;
    let mut out = vec![0.0f32; w * h];
    for y in 0..h {
        for (k, &wgt) in col.weights.iter().enumerate() {
            let Some(sy) = border.resolve(y as isize + k as isize - ry as isize, h) else {
                continue;
            };
            let src_row = &tmp[sy * w..(sy + 1) * w];
            let dst_row = &mut out[y * w..(y + 1) * w];
            for (d, &s) in dst_row.iter_mut().zip(src_row) {
                *d += wgt * s;
            }
        }
    }

    Ok(PixelBuffer::from_vec(w, h, out)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn ramp(w: usize, h: usize) -> PixelBuffer<u8> {
        PixelBuffer::from_fn(w, h, |x, y| ((x * 7 + y * 13) % 256) as u8).unwrap()
    }

    #[test]
    fn identity_kernel_returns_identical_pixels() {
        let img = ramp(17, 11);
        for border in [BorderPolicy::Clamp, BorderPolicy::Reflect, BorderPolicy::Zero] {
            let out = convolve(&img.view(), &Kernel::identity(), border).unwrap();
            assert_eq!(out.width(), 17);
            assert_eq!(out.height(), 11);
            for (a, b) in out.data().iter().zip(img.data()) {
                assert_eq!(*a, *b as f32);
            }
        }
    }

    #[test]
    fn even_kernels_are_rejected() {
        let err = Kernel::new(2, 3, vec![0.0; 6], None).unwrap_err();
        assert!(matches!(err, ConvolutionError::InvalidKernel { .. }));
        assert!(Kernel1d::new(vec![1.0, 1.0]).is_err());
    }

    #[test]
    fn weight_count_and_divisor_are_validated() {
        assert!(Kernel::new(3, 3, vec![1.0; 8], None).is_err());
        assert!(Kernel::new(3, 3, vec![1.0; 9], Some(0.0)).is_err());
    }

    #[test]
    fn kernel_larger_than_image_is_rejected() {
        let img = ramp(4, 4);
        let k = Kernel::box_filter(5).unwrap();
        assert!(matches!(
            convolve(&img.view(), &k, BorderPolicy::Clamp),
            Err(ConvolutionError::InvalidKernel { .. })
        ));
    }

    #[test]
    fn box_filter_preserves_constant_image_under_clamp_and_reflect() {
        let img = PixelBuffer::filled(6, 5, 40u8).unwrap();
        let k = Kernel::box_filter(3).unwrap();
        for border in [BorderPolicy::Clamp, BorderPolicy::Reflect] {
            let out = convolve(&img.view(), &k, border).unwrap();
            assert!(out.data().iter().all(|&v| (v - 40.0).abs() < 1e-4));
        }
        let zero = convolve(&img.view(), &k, BorderPolicy::Zero).unwrap();
        // corner pixel sees 4 of 9 taps
        assert_relative_eq!(zero.get(0, 0).unwrap(), 40.0 * 4.0 / 9.0, epsilon = 1e-4);
        assert_relative_eq!(zero.get(2, 2).unwrap(), 40.0, epsilon = 1e-4);
    }

    #[test]
    fn sobel_x_responds_to_horizontal_ramp() {
        let img = PixelBuffer::from_fn(8, 8, |x, _| (x * 10) as u8).unwrap();
        let gx = convolve(&img.view(), &Kernel::sobel_x(), BorderPolicy::Clamp).unwrap();
        let gy = convolve(&img.view(), &Kernel::sobel_y(), BorderPolicy::Clamp).unwrap();
        assert_relative_eq!(gx.get(4, 4).unwrap(), 80.0);
        assert_relative_eq!(gy.get(4, 4).unwrap(), 0.0);
    }

    #[test]
    fn gaussian_is_normalized() {
        let k = Kernel1d::gaussian(1.4).unwrap();
        assert_eq!(k.len(), 11);
        assert_relative_eq!(k.weights().iter().sum::<f32>(), 1.0, epsilon = 1e-5);
        assert!(Kernel1d::gaussian(0.0).is_err());
    }

    #[test]
    fn truncated_gaussian_keeps_its_sum() {
        let k = Kernel1d::gaussian(1.4).unwrap();
        for (max_len, len) in [(1, 1), (2, 1), (5, 5), (8, 7), (11, 11), (40, 11)] {
            let t = k.truncated(max_len);
            assert_eq!(t.len(), len, "max_len {max_len}");
            assert_relative_eq!(t.weights().iter().sum::<f32>(), 1.0, epsilon = 1e-5);
        }
        let t = k.truncated(3);
        assert!(t.weights()[1] > t.weights()[0]);
        assert_relative_eq!(t.weights()[0], t.weights()[2]);

        let img = PixelBuffer::filled(4, 3, 90u8).unwrap();
        let out = convolve_separable(
            &img.view(),
            &k.truncated(4),
            &k.truncated(3),
            BorderPolicy::Reflect,
        )
        .unwrap();
        assert!(out.data().iter().all(|&v| (v - 90.0).abs() < 1e-3));
    }

    #[test]
    fn separable_matches_full_convolution() {
        let img = ramp(23, 19);
        let k1 = Kernel1d::gaussian(1.0).unwrap();
        let k2 = Kernel::gaussian(1.0).unwrap();
        for border in [BorderPolicy::Clamp, BorderPolicy::Reflect, BorderPolicy::Zero] {
            let a = convolve_separable(&img.view(), &k1, &k1, border).unwrap();
            let b = convolve(&img.view(), &k2, border).unwrap();
            for (p, q) in a.data().iter().zip(b.data()) {
                assert_relative_eq!(*p, *q, epsilon = 1e-2);
            }
        }
    }

    #[test]
    fn reflect_mirrors_including_edge() {
        assert_eq!(BorderPolicy::Reflect.resolve(-1, 5), Some(0));
        assert_eq!(BorderPolicy::Reflect.resolve(-2, 5), Some(1));
        assert_eq!(BorderPolicy::Reflect.resolve(5, 5), Some(4));
        assert_eq!(BorderPolicy::Clamp.resolve(7, 5), Some(4));
        assert_eq!(BorderPolicy::Zero.resolve(-1, 5), None);
    }
}
