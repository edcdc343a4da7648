//! Conversion between platform images and Qyoo pixel buffers.

use ::image::GrayImage;
use qyoo_core::{ImageError, PixelBuffer, PixelView};

/// Errors produced while converting images.
#[derive(thiserror::Error, Debug)]
pub enum BridgeError {
    #[error(transparent)]
    Image(#[from] ImageError),
    #[error("image dimensions {width}x{height} exceed the platform image limits")]
    TooLarge { width: usize, height: usize },
}

/// Two-way conversion between a platform image type and 8-bit pixel buffers.
pub trait ImageBridge {
    type Image;
    type Error: std::error::Error;

    fn to_pixel_buffer(&self, image: &Self::Image) -> Result<PixelBuffer<u8>, Self::Error>;
    fn from_pixel_buffer(&self, view: &PixelView<'_, u8>) -> Result<Self::Image, Self::Error>;
}

/// Bridge for `image::GrayImage`.
#[derive(Clone, Copy, Debug, Default)]
pub struct LumaBridge;

impl ImageBridge for LumaBridge {
    type Image = GrayImage;
    type Error = BridgeError;

    fn to_pixel_buffer(&self, image: &GrayImage) -> Result<PixelBuffer<u8>, BridgeError> {
        Ok(PixelBuffer::from_vec(
            image.width() as usize,
            image.height() as usize,
            image.as_raw().clone(),
        )?)
    }

    fn from_pixel_buffer(&self, view: &PixelView<'_, u8>) -> Result<GrayImage, BridgeError> {
        let too_large = || BridgeError::TooLarge {
            width: view.width(),
            height: view.height(),
        };
        let w = u32::try_from(view.width()).map_err(|_| too_large())?;
        let h = u32::try_from(view.height()).map_err(|_| too_large())?;
        GrayImage::from_raw(w, h, view.data().to_vec()).ok_or_else(too_large)
    }
}

/// Borrow an `image::GrayImage` as a pixel view without copying.
pub fn gray_view(img: &GrayImage) -> Result<PixelView<'_, u8>, ImageError> {
    PixelView::new(img.width() as usize, img.height() as usize, img.as_raw())
}
