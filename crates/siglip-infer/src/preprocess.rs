//! Image preprocessing for the SigLIP2 vision tower.
//!
//! Stretch-resize to a square, 8-bit sRGB, channel-first, then
//! `(x - 0.5) / 0.5` per channel so pixels land in [-1, 1]. No cropping and
//! no letterboxing: outputs must match the reference pipeline, which
//! distorts non-square images.

use std::path::Path;

use image::imageops::FilterType;
use image::DynamicImage;
use ndarray::Array4;

use siglip_core::{Error, Result};

/// Per-channel mean, from the checkpoints' preprocessor config.
pub const IMAGE_MEAN: [f32; 3] = [0.5, 0.5, 0.5];

/// Per-channel standard deviation.
pub const IMAGE_STD: [f32; 3] = [0.5, 0.5, 0.5];

pub const DEFAULT_IMAGE_SIZE: u32 = 224;

/// Turns images into `[1, 3, size, size]` tensors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImagePreprocessor {
    size: u32,
}

impl Default for ImagePreprocessor {
    fn default() -> Self {
        Self::new(DEFAULT_IMAGE_SIZE)
    }
}

impl ImagePreprocessor {
    pub fn new(size: u32) -> Self {
        Self { size }
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    /// Load an image file and preprocess it.
    pub fn preprocess(&self, path: impl AsRef<Path>) -> Result<Array4<f32>> {
        let path = path.as_ref();
        let image = image::open(path)
            .map_err(|e| Error::Image(format!("Failed to load {}: {}", path.display(), e)))?;
        Ok(self.preprocess_image(&image))
    }

    /// Decode an encoded image (PNG, JPEG, ...) held in memory.
    pub fn preprocess_bytes(&self, bytes: &[u8]) -> Result<Array4<f32>> {
        let image = image::load_from_memory(bytes)
            .map_err(|e| Error::Image(format!("Failed to decode image: {}", e)))?;
        Ok(self.preprocess_image(&image))
    }

    pub fn preprocess_image(&self, image: &DynamicImage) -> Array4<f32> {
        let rgb = image
            .resize_exact(self.size, self.size, FilterType::Lanczos3)
            .to_rgb8();
        let side = self.size as usize;

        Array4::from_shape_fn((1, 3, side, side), |(_, c, y, x)| {
            let value = rgb.get_pixel(x as u32, y as u32)[c] as f32 / 255.0;
            (value - IMAGE_MEAN[c]) / IMAGE_STD[c]
        })
    }
}
