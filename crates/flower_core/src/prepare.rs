//! Decoding and normalisation of user-supplied image bytes.

use crate::error::ClassifyError;
use image::{DynamicImage, ImageReader, RgbaImage, imageops::FilterType};
use ndarray::Array4;
use serde::{Deserialize, Serialize};
use std::io::Cursor;

/// Largest encoded buffer accepted for decoding.
pub const MAX_ENCODED_BYTES: usize = 50 * 1024 * 1024;

/// Input geometry and normalisation expected by the classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrepareConfig {
    pub input_size: u32,
    pub mean: [f32; 3],
    pub std: [f32; 3],
}

impl Default for PrepareConfig {
    fn default() -> Self {
        Self {
            input_size: 224,
            mean: [0.485, 0.456, 0.406],
            std: [0.229, 0.224, 0.225],
        }
    }
}

/// Classifier-ready tensor in NCHW layout, shape `(1, 3, size, size)`.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedImage {
    tensor: Array4<f32>,
}

impl PreparedImage {
    pub fn tensor(&self) -> &Array4<f32> {
        &self.tensor
    }

    pub fn shape(&self) -> &[usize] {
        self.tensor.shape()
    }

    /// Side length of the square input.
    pub fn size(&self) -> usize {
        self.tensor.shape()[2]
    }
}

/// Turns encoded image bytes into a [`PreparedImage`].
#[derive(Debug, Clone, Default)]
pub struct ImagePreparer {
    config: PrepareConfig,
}

impl ImagePreparer {
    pub fn new(config: PrepareConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PrepareConfig {
        &self.config
    }

    /// Decode `bytes` (format sniffed from content) and normalise them.
    pub fn prepare(&self, bytes: &[u8]) -> Result<PreparedImage, ClassifyError> {
        let img = decode(bytes)?;
        let size = self.config.input_size;
        let resized = resize_to_square(img, size);
        let PrepareConfig { mean, std, .. } = &self.config;
        let mut tensor = Array4::<f32>::zeros((1, 3, size as usize, size as usize));
        for (x, y, pixel) in resized.enumerate_pixels() {
            let [r, g, b, _] = pixel.0;
            let (row, col) = (y as usize, x as usize);
            tensor[[0, 0, row, col]] = normalize_channel(r, mean[0], std[0]);
            tensor[[0, 1, row, col]] = normalize_channel(g, mean[1], std[1]);
            tensor[[0, 2, row, col]] = normalize_channel(b, mean[2], std[2]);
        }
        Ok(PreparedImage { tensor })
    }
}

fn decode(bytes: &[u8]) -> Result<DynamicImage, ClassifyError> {
    if bytes.is_empty() {
        return Err(ClassifyError::Decode("image data is empty".into()));
    }
    if bytes.len() > MAX_ENCODED_BYTES {
        return Err(ClassifyError::Decode(format!(
            "image data too large: {} bytes (max {MAX_ENCODED_BYTES})",
            bytes.len()
        )));
    }
    let reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| ClassifyError::Decode(e.to_string()))?;
    if reader.format().is_none() {
        return Err(ClassifyError::Decode("unrecognised image format".into()));
    }
    let img = reader.decode()?;
    if img.width() == 0 || img.height() == 0 {
        return Err(ClassifyError::Decode(format!(
            "invalid image dimensions: {}x{}",
            img.width(),
            img.height()
        )));
    }
    Ok(img)
}

fn resize_to_square(img: DynamicImage, size: u32) -> RgbaImage {
    img.resize_exact(size, size, FilterType::Triangle)
        .to_rgba8()
}

fn normalize_channel(value: u8, mean: f32, std: f32) -> f32 {
    let v = value as f32 / 255.0;
    (v - mean) / std
}
