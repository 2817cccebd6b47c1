//! ArcFace descriptor extractor via ONNX Runtime.
//!
//! Returns the raw model output; normalization belongs to the pipeline's
//! embedder so index and threshold agree on one policy.

use faceid_core::capability::{DescriptorExtractor, ExtractionError};
use faceid_core::types::ChannelOrder;
use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;

const ARCFACE_INPUT_SIZE: u32 = 112;
const ARCFACE_MEAN: f32 = 127.5;
const ARCFACE_STD: f32 = 127.5;

pub struct ArcFaceExtractor {
    session: Session,
}

impl ArcFaceExtractor {
    pub fn load(model_path: &Path, intra_threads: usize) -> Result<Self, ExtractionError> {
        if !model_path.exists() {
            return Err(ExtractionError::ModelNotFound(model_path.display().to_string()));
        }

        let session = crate::open_session(model_path, intra_threads)
            .map_err(|e| ExtractionError::Failed(format!("loading {}: {e}", model_path.display())))?;

        tracing::info!(
            path = %model_path.display(),
            inputs = ?session.inputs().iter().map(|i| i.name()).collect::<Vec<_>>(),
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "loaded ArcFace model"
        );

        Ok(Self { session })
    }
}

impl DescriptorExtractor for ArcFaceExtractor {
    fn expected_order(&self) -> ChannelOrder {
        ChannelOrder::Rgb
    }

    fn embed(&mut self, crop: &RgbImage) -> Result<Vec<f32>, ExtractionError> {
        if crop.width() == 0 || crop.height() == 0 {
            return Err(ExtractionError::Failed("empty crop".into()));
        }
        let input = preprocess(crop);

        let tensor = TensorRef::from_array_view(input.view())
            .map_err(|e| ExtractionError::Failed(format!("input tensor: {e}")))?;
        let outputs = self
            .session
            .run(ort::inputs![tensor])
            .map_err(|e| ExtractionError::Failed(format!("inference: {e}")))?;
        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| ExtractionError::Failed(format!("embedding extraction: {e}")))?;

        Ok(raw.to_vec())
    }
}

/// Resize to 112×112 and lay out as NCHW with symmetric normalization.
fn preprocess(crop: &RgbImage) -> Array4<f32> {
    let resized = imageops::resize(crop, ARCFACE_INPUT_SIZE, ARCFACE_INPUT_SIZE, FilterType::Triangle);
    let side = ARCFACE_INPUT_SIZE as usize;
    let mut tensor = Array4::<f32>::zeros((1, 3, side, side));
    for (x, y, pixel) in resized.enumerate_pixels() {
        for c in 0..3 {
            tensor[[0, c, y as usize, x as usize]] = (pixel[c] as f32 - ARCFACE_MEAN) / ARCFACE_STD;
        }
    }
    tensor
}
