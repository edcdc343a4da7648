//! Core types and utilities for Qyoo marker detection.
//!
//! This crate is intentionally small: pixel buffers with explicit ownership,
//! a generic convolution engine, and the 2D geometry (lines, affine
//! transforms) shared by the feature extractor and the marker matcher.
//! It does *not* know anything about the marker itself.

mod affine;
mod convolution;
mod geometry;
mod image;
mod logger;

pub use affine::{estimate_affine, AffineError, AffineTransform};
pub use convolution::{
    convolve, convolve_separable, BorderPolicy, ConvolutionError, Kernel, Kernel1d,
};
pub use geometry::{angle_between_lines, polygon_area, Line, LineSegment};
pub use image::{sample_bilinear, ImageError, PixelBuffer, PixelView, Sample};

/// Re-exported so downstream crates agree on the point type.
pub use nalgebra::{Point2, Vector2};

#[cfg(feature = "tracing")]
pub use logger::init_tracing;

pub use logger::init_with_level;
