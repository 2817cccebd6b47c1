//! Single-class YOLO face detector via ONNX Runtime.
//!
//! The model takes a letterboxed NCHW RGB tensor in [0, 1] and emits one
//! `[1, 5, N]` tensor of `(cx, cy, w, h, conf)` rows in input-pixel space.

use faceid_core::capability::{DetectorError, FaceDetector};
use faceid_core::types::{ChannelOrder, Detection, Frame};
use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;

const YOLO_INPUT_SIZE: u32 = 640;
const YOLO_PAD_VALUE: u8 = 114;
const YOLO_ROW_WIDTH: usize = 5;
/// Raw rows below this never reach NMS.
const YOLO_PREFILTER_CONFIDENCE: f32 = 0.25;
const YOLO_NMS_THRESHOLD: f32 = 0.45;

/// Scale and offsets that map letterboxed coordinates back to the frame.
#[derive(Debug, Clone, Copy)]
struct Letterbox {
    scale: f32,
    pad_x: f32,
    pad_y: f32,
}

pub struct YoloFaceDetector {
    session: Session,
    input_size: u32,
}

impl YoloFaceDetector {
    pub fn load(model_path: &Path, intra_threads: usize) -> Result<Self, DetectorError> {
        if !model_path.exists() {
            return Err(DetectorError::ModelNotFound(model_path.display().to_string()));
        }

        let session = crate::open_session(model_path, intra_threads)
            .map_err(|e| DetectorError::Failed(format!("loading {}: {e}", model_path.display())))?;

        tracing::info!(
            path = %model_path.display(),
            inputs = ?session.inputs().iter().map(|i| i.name()).collect::<Vec<_>>(),
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "loaded YOLO face model"
        );

        Ok(Self {
            session,
            input_size: YOLO_INPUT_SIZE,
        })
    }
}

impl FaceDetector for YoloFaceDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>, DetectorError> {
        let rgb = match frame.order {
            ChannelOrder::Rgb => frame.image.clone(),
            ChannelOrder::Bgr => faceid_core::capability::swap_red_blue(&frame.image),
        };
        let (input, letterbox) = preprocess(&rgb, self.input_size);

        let tensor = TensorRef::from_array_view(input.view())
            .map_err(|e| DetectorError::Failed(format!("input tensor: {e}")))?;
        let outputs = self
            .session
            .run(ort::inputs![tensor])
            .map_err(|e| DetectorError::Failed(format!("inference: {e}")))?;
        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| DetectorError::Failed(format!("output tensor: {e}")))?;

        let candidates = decode(raw, &letterbox, YOLO_PREFILTER_CONFIDENCE)?;
        let kept = nms(candidates, YOLO_NMS_THRESHOLD);
        let clipped: Vec<Detection> = kept
            .into_iter()
            .map(|d| clip(d, frame.width(), frame.height()))
            .collect();
        tracing::debug!(count = clipped.len(), "yolo detections");
        Ok(clipped)
    }
}

/// Letterbox `image` into a square `size` canvas and lay it out as NCHW in [0, 1].
fn preprocess(image: &RgbImage, size: u32) -> (Array4<f32>, Letterbox) {
    let (w, h) = image.dimensions();
    let scale = (size as f32 / w.max(1) as f32).min(size as f32 / h.max(1) as f32);
    let new_w = ((w as f32 * scale).round() as u32).clamp(1, size);
    let new_h = ((h as f32 * scale).round() as u32).clamp(1, size);
    let pad_x = (size - new_w) / 2;
    let pad_y = (size - new_h) / 2;

    let resized = imageops::resize(image, new_w, new_h, FilterType::Triangle);
    let mut canvas = RgbImage::from_pixel(size, size, image::Rgb([YOLO_PAD_VALUE; 3]));
    imageops::overlay(&mut canvas, &resized, pad_x as i64, pad_y as i64);

    let side = size as usize;
    let mut tensor = Array4::<f32>::zeros((1, 3, side, side));
    for (x, y, pixel) in canvas.enumerate_pixels() {
        for c in 0..3 {
            tensor[[0, c, y as usize, x as usize]] = pixel[c] as f32 / 255.0;
        }
    }

    let letterbox = Letterbox {
        scale,
        pad_x: pad_x as f32,
        pad_y: pad_y as f32,
    };
    (tensor, letterbox)
}

/// Decode a channel-major `[1, 5, N]` output into frame-space detections.
fn decode(raw: &[f32], letterbox: &Letterbox, threshold: f32) -> Result<Vec<Detection>, DetectorError> {
    if raw.len() % YOLO_ROW_WIDTH != 0 {
        return Err(DetectorError::Failed(format!(
            "expected a [1, {YOLO_ROW_WIDTH}, N] output, got {} values",
            raw.len()
        )));
    }
    let n = raw.len() / YOLO_ROW_WIDTH;
    let channel = |c: usize, i: usize| raw[c * n + i];

    let mut detections = Vec::new();
    for i in 0..n {
        let confidence = channel(4, i);
        if !(confidence >= threshold) {
            continue;
        }
        let (cx, cy) = (channel(0, i), channel(1, i));
        let (half_w, half_h) = (channel(2, i) / 2.0, channel(3, i) / 2.0);
        let unmap_x = |v: f32| (v - letterbox.pad_x) / letterbox.scale;
        let unmap_y = |v: f32| (v - letterbox.pad_y) / letterbox.scale;
        detections.push(Detection::new(
            unmap_x(cx - half_w),
            unmap_y(cy - half_h),
            unmap_x(cx + half_w),
            unmap_y(cy + half_h),
            confidence,
        ));
    }
    Ok(detections)
}

fn clip(d: Detection, width: u32, height: u32) -> Detection {
    let (w, h) = (width as f32, height as f32);
    Detection::new(
        d.x1.clamp(0.0, w),
        d.y1.clamp(0.0, h),
        d.x2.clamp(0.0, w),
        d.y2.clamp(0.0, h),
        d.confidence,
    )
}

/// Greedy non-maximum suppression, highest confidence first.
fn nms(mut detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut keep: Vec<Detection> = Vec::new();
    for det in detections {
        if keep.iter().all(|k| iou(k, &det) <= iou_threshold) {
            keep.push(det);
        }
    }
    keep
}

fn iou(a: &Detection, b: &Detection) -> f32 {
    let inter_w = (a.x2.min(b.x2) - a.x1.max(b.x1)).max(0.0);
    let inter_h = (a.y2.min(b.y2) - a.y1.max(b.y1)).max(0.0);
    let inter = inter_w * inter_h;
    let union = a.area() + b.area() - inter;
    if union > 0.0 {
        inter / union
    } else {
        0.0
    }
}
