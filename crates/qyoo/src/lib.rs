//! High-level facade for the `qyoo-*` workspace.
//!
//! This crate provides:
//! - re-exports of the core, feature and marker crates,
//! - (feature `image`) an [`ImageBridge`](bridge::ImageBridge) for
//!   `image::GrayImage` and end-to-end helpers in [`detect`],
//! - (feature `cli`) the `qyoo` command-line tool.
//!
//! ## Quickstart
//!
//! ```no_run
//! use image::ImageReader;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let img = ImageReader::open("frame.png")?.decode()?.to_luma8();
//! let result = qyoo::detect::detect_image_default(&img)?;
//! println!("{:?} payload={:?}", result.status, result.payload);
//! # Ok(())
//! # }
//! ```
//!
//! ## API map
//! - `qyoo::core`: pixel buffers, convolution, lines and affine transforms.
//! - `qyoo::features`: Canny edges, contour chains, corner candidates.
//! - `qyoo::marker`: marker model, matcher, decoder, renderer and pipelines.
//! - `qyoo::bridge` / `qyoo::detect` (feature `image`): `image` crate glue.

pub use qyoo_core as core;
pub use qyoo_features as features;
pub use qyoo_marker as marker;

pub use qyoo_marker::{
    detect_marker, DetectError, DetectionResult, DetectionStatus, MarkerModel, MarkerModelSpec,
    QyooDetector, QyooDetectorParams, StagedDetector,
};

#[cfg(feature = "image")]
pub mod bridge;
#[cfg(feature = "image")]
pub mod detect;
