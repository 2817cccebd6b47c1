use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Largest squared Euclidean distance between two unit vectors.
pub const UNIT_MAX_SQUARED_DISTANCE: f32 = 4.0;

/// A candidate face region reported by a detector, in frame pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    /// Detector confidence in [0, 1].
    pub confidence: f32,
}

impl Detection {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32, confidence: f32) -> Self {
        Self { x1, y1, x2, y2, confidence }
    }

    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }

    /// Rectangle area; degenerate rectangles report 0.
    pub fn area(&self) -> f32 {
        self.width().max(0.0) * self.height().max(0.0)
    }
}

/// Byte order of the three colour channels in a pixel buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelOrder {
    Rgb,
    Bgr,
}

/// A captured colour frame.
///
/// Pixels are stored in an [`RgbImage`] buffer, but the bytes of each pixel
/// follow `order`. Camera pipelines often hand over BGR data.
#[derive(Clone)]
pub struct Frame {
    pub image: RgbImage,
    pub order: ChannelOrder,
}

impl Frame {
    pub fn new(image: RgbImage, order: ChannelOrder) -> Self {
        Self { image, order }
    }

    pub fn rgb(image: RgbImage) -> Self {
        Self::new(image, ChannelOrder::Rgb)
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// How extractor output is post-processed before it reaches the index.
///
/// Chosen once per deployment; an index must never mix policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NormalizationPolicy {
    /// Extractor output is stored unmodified.
    Raw,
    /// Extractor output is divided by its Euclidean norm.
    Unit,
}

impl NormalizationPolicy {
    pub fn apply(&self, values: Vec<f32>) -> Vec<f32> {
        match self {
            NormalizationPolicy::Raw => values,
            NormalizationPolicy::Unit => {
                let norm = l2_norm(&values);
                if norm > 0.0 {
                    values.into_iter().map(|v| v / norm).collect()
                } else {
                    values
                }
            }
        }
    }

    /// Tag written into the persisted index header.
    pub fn tag(&self) -> u8 {
        match self {
            NormalizationPolicy::Raw => 0,
            NormalizationPolicy::Unit => 1,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(NormalizationPolicy::Raw),
            1 => Some(NormalizationPolicy::Unit),
            _ => None,
        }
    }
}

impl fmt::Display for NormalizationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NormalizationPolicy::Raw => f.write_str("raw"),
            NormalizationPolicy::Unit => f.write_str("unit"),
        }
    }
}

impl FromStr for NormalizationPolicy {
    type Err = ThresholdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "raw" => Ok(NormalizationPolicy::Raw),
            "unit" | "unit-norm" | "l2" => Ok(NormalizationPolicy::Unit),
            other => Err(ThresholdError::UnknownPolicy(other.to_string())),
        }
    }
}

/// Fixed-length face descriptor produced by the extractor adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Descriptor {
    pub values: Vec<f32>,
}

impl Descriptor {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    pub fn zeros(dimension: usize) -> Self {
        Self { values: vec![0.0; dimension] }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.values
    }

    pub fn norm(&self) -> f32 {
        l2_norm(&self.values)
    }

    /// Squared Euclidean distance. Both descriptors must share a dimension.
    pub fn squared_distance(&self, other: &Descriptor) -> f32 {
        squared_l2(&self.values, &other.values)
    }
}

pub(crate) fn l2_norm(values: &[f32]) -> f32 {
    values.iter().map(|v| v * v).sum::<f32>().sqrt()
}

pub(crate) fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum()
}

#[derive(Error, Debug, PartialEq)]
pub enum ThresholdError {
    #[error("distance threshold must be a finite positive number, got {0}")]
    NotPositive(f32),
    #[error("distance threshold {value} exceeds {max} — unreachable under unit normalization")]
    AboveUnitRange { value: f32, max: f32 },
    #[error("unknown normalization policy '{0}' (expected 'raw' or 'unit')")]
    UnknownPolicy(String),
}

/// Squared-distance cutoff for a match, bound to the policy it was chosen for.
///
/// A raw-space threshold (around 5.0 for ArcFace) and a unit-space threshold
/// (around 0.9–1.2) are not interchangeable, so the two travel together.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistanceThreshold {
    value: f32,
    policy: NormalizationPolicy,
}

impl DistanceThreshold {
    pub fn new(value: f32, policy: NormalizationPolicy) -> Result<Self, ThresholdError> {
        if !value.is_finite() || value <= 0.0 {
            return Err(ThresholdError::NotPositive(value));
        }
        if policy == NormalizationPolicy::Unit && value > UNIT_MAX_SQUARED_DISTANCE {
            return Err(ThresholdError::AboveUnitRange {
                value,
                max: UNIT_MAX_SQUARED_DISTANCE,
            });
        }
        Ok(Self { value, policy })
    }

    pub fn value(&self) -> f32 {
        self.value
    }

    pub fn policy(&self) -> NormalizationPolicy {
        self.policy
    }

    /// Inclusive: a distance equal to the threshold is a match.
    pub fn accepts(&self, distance: f32) -> bool {
        distance <= self.value
    }
}
