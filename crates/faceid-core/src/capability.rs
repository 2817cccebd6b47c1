//! Seams for the two external ML capabilities, plus the adapter that turns
//! raw extractor output into pipeline descriptors.

use crate::types::{ChannelOrder, Descriptor, Detection, Frame, NormalizationPolicy};
use image::RgbImage;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("detection failed: {0}")]
    Failed(String),
}

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("extractor cannot process crop: {0}")]
    Failed(String),
    #[error("extractor returned an empty descriptor")]
    Empty,
    #[error("extractor returned a non-finite value at component {0}")]
    NonFinite(usize),
}

/// Maps a frame to candidate face regions with confidence scores.
pub trait FaceDetector: Send {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>, DetectorError>;
}

/// Maps a cropped face to a fixed-length vector.
pub trait DescriptorExtractor: Send {
    /// Channel order the model was trained on.
    fn expected_order(&self) -> ChannelOrder;

    /// Run the model on a crop whose pixels are already in [`expected_order`](Self::expected_order).
    fn embed(&mut self, crop: &RgbImage) -> Result<Vec<f32>, ExtractionError>;
}

impl<T: FaceDetector + ?Sized> FaceDetector for Box<T> {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>, DetectorError> {
        (**self).detect(frame)
    }
}

impl<T: DescriptorExtractor + ?Sized> DescriptorExtractor for Box<T> {
    fn expected_order(&self) -> ChannelOrder {
        (**self).expected_order()
    }

    fn embed(&mut self, crop: &RgbImage) -> Result<Vec<f32>, ExtractionError> {
        (**self).embed(crop)
    }
}

/// Wraps a [`DescriptorExtractor`] with the deployment's colour conversion and
/// normalization policy. Nothing downstream ever sees un-normalized output.
pub struct Embedder<E> {
    extractor: E,
    policy: NormalizationPolicy,
}

impl<E: DescriptorExtractor> Embedder<E> {
    pub fn new(extractor: E, policy: NormalizationPolicy) -> Self {
        Self { extractor, policy }
    }

    pub fn policy(&self) -> NormalizationPolicy {
        self.policy
    }

    pub fn extract(&mut self, crop: &Frame) -> Result<Descriptor, ExtractionError> {
        let target = self.extractor.expected_order();
        let raw = if crop.order == target {
            self.extractor.embed(&crop.image)?
        } else {
            self.extractor.embed(&swap_red_blue(&crop.image))?
        };

        if raw.is_empty() {
            return Err(ExtractionError::Empty);
        }
        if let Some(i) = raw.iter().position(|v| !v.is_finite()) {
            return Err(ExtractionError::NonFinite(i));
        }

        Ok(Descriptor::new(self.policy.apply(raw)))
    }
}

/// BGR ↔ RGB conversion: exchange the first and third channel of every pixel.
pub fn swap_red_blue(image: &RgbImage) -> RgbImage {
    let mut out = image.clone();
    for pixel in out.pixels_mut() {
        pixel.0.swap(0, 2);
    }
    out
}
