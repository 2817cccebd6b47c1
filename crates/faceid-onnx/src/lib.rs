//! faceid-onnx — ONNX Runtime adapters for the detector and extractor capabilities.
//!
//! A YOLO-style single-class face detector and an ArcFace-style descriptor
//! extractor, both CPU-only.

pub mod detector;
pub mod extractor;

pub use detector::YoloFaceDetector;
pub use extractor::ArcFaceExtractor;

use ort::session::Session;
use std::path::Path;

const DEFAULT_INTRA_THREADS: usize = 2;

pub(crate) fn open_session(model_path: &Path, intra_threads: usize) -> Result<Session, ort::Error> {
    let threads = if intra_threads == 0 { DEFAULT_INTRA_THREADS } else { intra_threads };
    let session = Session::builder()?
        .with_intra_threads(threads)?
        .commit_from_file(model_path)?;
    Ok(session)
}
