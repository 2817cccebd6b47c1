//! Candidate selection — pick one face per frame and cut a padded crop around it.

use crate::types::{Detection, Frame};
use image::imageops;

/// Default margin added on every side of the selected rectangle.
pub const DEFAULT_CROP_PADDING: u32 = 10;

/// Default minimum detector confidence for a detection to be considered.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.5;

/// Pixel rectangle inside a frame: `[x, x + width) × [y, y + height)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Choose the largest-area detection whose confidence is at least `confidence_threshold`.
///
/// Equal areas keep the first one encountered, so the result depends only on
/// the input order.
pub fn select<'a, I>(detections: I, confidence_threshold: f32) -> Option<Detection>
where
    I: IntoIterator<Item = &'a Detection>,
{
    let mut best: Option<&Detection> = None;

    for det in detections {
        // Written so that a NaN confidence never passes.
        if !(det.confidence >= confidence_threshold) {
            continue;
        }
        // Strictly greater: later detections with the same area never replace an earlier one.
        let better = match best {
            None => true,
            Some(prev) => det.area() > prev.area(),
        };
        if better {
            best = Some(det);
        }
    }

    best.copied()
}

/// Expand `detection` by `pad` pixels on each side and clip it to the frame.
///
/// Returns `None` when nothing of the rectangle remains inside the frame.
pub fn crop_rect(frame_width: u32, frame_height: u32, detection: &Detection, pad: u32) -> Option<CropRect> {
    let pad = i64::from(pad);
    let clip = |v: i64, max: u32| v.clamp(0, i64::from(max));

    // `as` truncates toward zero and saturates on NaN/inf, matching integer pixel slicing.
    let x1 = clip(detection.x1 as i64 - pad, frame_width);
    let y1 = clip(detection.y1 as i64 - pad, frame_height);
    let x2 = clip(detection.x2 as i64 + pad, frame_width);
    let y2 = clip(detection.y2 as i64 + pad, frame_height);

    if x2 <= x1 || y2 <= y1 {
        return None;
    }

    Some(CropRect {
        x: x1 as u32,
        y: y1 as u32,
        width: (x2 - x1) as u32,
        height: (y2 - y1) as u32,
    })
}

/// Cut the padded candidate crop out of `frame`, keeping the frame's channel order.
pub fn crop(frame: &Frame, detection: &Detection, pad: u32) -> Option<Frame> {
    let rect = crop_rect(frame.width(), frame.height(), detection, pad)?;
    let image = imageops::crop_imm(&frame.image, rect.x, rect.y, rect.width, rect.height).to_image();
    Some(Frame::new(image, frame.order))
}
