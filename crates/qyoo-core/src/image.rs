//! Row-major pixel buffers with explicit ownership.
//!
//! [`PixelBuffer`] owns its samples and releases them on drop; [`PixelView`]
//! borrows caller memory and never releases it. Both guarantee
//! `data.len() == width * height` and non-zero dimensions.

use std::fmt::Debug;

/// Errors raised when constructing or accessing pixel buffers.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ImageError {
    #[error("invalid image dimensions (width={width}, height={height})")]
    InvalidDimensions { width: usize, height: usize },
    #[error("invalid pixel buffer length (expected {expected} samples, got {got})")]
    BufferSizeMismatch { expected: usize, got: usize },
    #[error("pixel ({x}, {y}) outside {width}x{height} image")]
    OutOfBounds {
        x: usize,
        y: usize,
        width: usize,
        height: usize,
    },
}

/// Scalar pixel sample.
pub trait Sample: Copy + Default + PartialOrd + Debug + Send + Sync + 'static {
    fn to_f32(self) -> f32;
    /// Convert back from `f32`, rounding and saturating for integer types.
    fn from_f32(v: f32) -> Self;
}

impl Sample for u8 {
    #[inline]
    fn to_f32(self) -> f32 {
        self as f32
    }
    #[inline]
    fn from_f32(v: f32) -> Self {
        v.round().clamp(0.0, 255.0) as u8
    }
}

impl Sample for u16 {
    #[inline]
    fn to_f32(self) -> f32 {
        self as f32
    }
    #[inline]
    fn from_f32(v: f32) -> Self {
        v.round().clamp(0.0, u16::MAX as f32) as u16
    }
}

impl Sample for f32 {
    #[inline]
    fn to_f32(self) -> f32 {
        self
    }
    #[inline]
    fn from_f32(v: f32) -> Self {
        v
    }
}

fn check_dims(width: usize, height: usize, len: usize) -> Result<(), ImageError> {
    if width == 0 || height == 0 {
        return Err(ImageError::InvalidDimensions { width, height });
    }
    let Some(expected) = width.checked_mul(height) else {
        return Err(ImageError::InvalidDimensions { width, height });
    };
    if len != expected {
        return Err(ImageError::BufferSizeMismatch { expected, got: len });
    }
    Ok(())
}

/// Borrowed, read-only view over caller-owned samples.
#[derive(Clone, Copy, Debug)]
pub struct PixelView<'a, T = u8> {
    width: usize,
    height: usize,
    data: &'a [T], // row-major, len = w*h
}

impl<'a, T: Sample> PixelView<'a, T> {
    pub fn new(width: usize, height: usize, data: &'a [T]) -> Result<Self, ImageError> {
        check_dims(width, height, data.len())?;
        Ok(Self {
            width,
            height,
            data,
        })
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
    pub fn data(&self) -> &'a [T] {
        self.data
    }

    /// Bounds-checked read.
    #[inline]
    pub fn get(&self, x: usize, y: usize) -> Option<T> {
        if x >= self.width || y >= self.height {
            return None;
        }
        Some(self.data[y * self.width + x])
    }

    /// Read with signed coordinates; `None` outside the image.
    #[inline]
    pub fn get_signed(&self, x: i32, y: i32) -> Option<T> {
        if x < 0 || y < 0 {
            return None;
        }
        self.get(x as usize, y as usize)
    }

    /// One image row. Panics only if `y >= height`, like slice indexing.
    #[inline]
    pub fn row(&self, y: usize) -> &'a [T] {
        let start = y * self.width;
        &self.data[start..start + self.width]
    }

    /// Copy the samples into an owned buffer.
    pub fn to_owned_buffer(&self) -> PixelBuffer<T> {
        PixelBuffer {
            width: self.width,
            height: self.height,
            data: self.data.to_vec(),
        }
    }

    /// Convert every sample into another sample type.
    pub fn map<U: Sample>(&self, mut f: impl FnMut(T) -> U) -> PixelBuffer<U> {
        PixelBuffer {
            width: self.width,
            height: self.height,
            data: self.data.iter().map(|&v| f(v)).collect(),
        }
    }

    /// Observed `(min, max)` sample values.
    pub fn min_max(&self) -> (T, T) {
        let mut lo = self.data[0];
        let mut hi = self.data[0];
        for &v in &self.data[1..] {
            if v < lo {
                lo = v;
            }
            if v > hi {
                hi = v;
            }
        }
        (lo, hi)
    }
}

impl PixelView<'_, u8> {
    /// Contrast-stretched owned copy; see [`PixelBuffer::contrast_stretch`].
    pub fn stretched(&self) -> PixelBuffer<u8> {
        let mut out = self.to_owned_buffer();
        out.contrast_stretch();
        out
    }
}

/// Owned pixel buffer.
#[derive(Clone, Debug, PartialEq)]
pub struct PixelBuffer<T = u8> {
    width: usize,
    height: usize,
    data: Vec<T>,
}

impl<T: Sample> PixelBuffer<T> {
    /// Blank buffer filled with `T::default()` (zero).
    pub fn new(width: usize, height: usize) -> Result<Self, ImageError> {
        Self::filled(width, height, T::default())
    }

    pub fn filled(width: usize, height: usize, value: T) -> Result<Self, ImageError> {
        if width == 0 || height == 0 {
            return Err(ImageError::InvalidDimensions { width, height });
        }
        let len = width
            .checked_mul(height)
            .ok_or(ImageError::InvalidDimensions { width, height })?;
        Ok(Self {
            width,
            height,
            data: vec![value; len],
        })
    }

    /// Take ownership of `data` (row-major).
    pub fn from_vec(width: usize, height: usize, data: Vec<T>) -> Result<Self, ImageError> {
        check_dims(width, height, data.len())?;
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Build a buffer by evaluating `f(x, y)` for every pixel.
    pub fn from_fn(
        width: usize,
        height: usize,
        mut f: impl FnMut(usize, usize) -> T,
    ) -> Result<Self, ImageError> {
        let mut out = Self::new(width, height)?;
        for y in 0..height {
            for x in 0..width {
                out.data[y * width + x] = f(x, y);
            }
        }
        Ok(out)
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
    pub fn data(&self) -> &[T] {
        &self.data
    }

    /// Mutable samples; the length cannot change through a slice.
    #[inline]
    pub fn data_mut(&mut self) -> &mut [T] {
        &mut self.data
    }

    pub fn into_raw(self) -> Vec<T> {
        self.data
    }

    #[inline]
    pub fn view(&self) -> PixelView<'_, T> {
        PixelView {
            width: self.width,
            height: self.height,
            data: &self.data,
        }
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> Option<T> {
        self.view().get(x, y)
    }

    /// Bounds-checked write.
    pub fn set(&mut self, x: usize, y: usize, value: T) -> Result<(), ImageError> {
        if x >= self.width || y >= self.height {
            return Err(ImageError::OutOfBounds {
                x,
                y,
                width: self.width,
                height: self.height,
            });
        }
        self.data[y * self.width + x] = value;
        Ok(())
    }

    pub fn map<U: Sample>(&self, f: impl FnMut(T) -> U) -> PixelBuffer<U> {
        self.view().map(f)
    }
}

impl PixelBuffer<u8> {
    /// Linearly remap the observed `[min, max]` range onto `[0, 255]` in place.
    ///
    /// Flat images are left untouched. Applying the stretch to an already
    /// stretched buffer is a no-op.
    pub fn contrast_stretch(&mut self) {
        let (lo, hi) = self.view().min_max();
        if lo >= hi || (lo == 0 && hi == 255) {
            return;
        }
        let range = (hi - lo) as u32;
        let mut lut = [0u8; 256];
        for (v, slot) in lut.iter_mut().enumerate().skip(lo as usize).take(range as usize + 1) {
            let shifted = v as u32 - lo as u32;
            *slot = ((shifted * 255 + range / 2) / range) as u8;
        }
        for v in &mut self.data {
            *v = lut[*v as usize];
        }
    }
}

impl PixelBuffer<f32> {
    /// Round and saturate into an 8-bit buffer.
    pub fn to_u8(&self) -> PixelBuffer<u8> {
        self.map(u8::from_f32)
    }
}

#[inline]
fn get_or_zero<T: Sample>(src: &PixelView<'_, T>, x: i32, y: i32) -> f32 {
    src.get_signed(x, y).map_or(0.0, Sample::to_f32)
}

/// Bilinear sample at sub-pixel position `(x, y)`; pixel centres sit on
/// integer coordinates and samples outside the image read as zero.
#[inline]
pub fn sample_bilinear<T: Sample>(src: &PixelView<'_, T>, x: f32, y: f32) -> f32 {
    let x0 = x.floor() as i32;
    let y0 = y.floor() as i32;
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let p00 = get_or_zero(src, x0, y0);
    let p10 = get_or_zero(src, x0 + 1, y0);
    let p01 = get_or_zero(src, x0, y0 + 1);
    let p11 = get_or_zero(src, x0 + 1, y0 + 1);

    let a = p00 + fx * (p10 - p00);
    let b = p01 + fx * (p11 - p01);
    a + fy * (b - a)
}
