//! Exact nearest-neighbour index over fixed-dimension descriptors.
//!
//! Vectors live in one contiguous row-major buffer and are addressed by their
//! insertion position. Search is a linear scan.

use crate::types::{squared_l2, Descriptor};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum IndexError {
    #[error("dimension mismatch: index holds {expected}-dim vectors, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("index is empty")]
    EmptyIndex,
    #[error("position {position} out of range (index holds {len} vectors)")]
    OutOfRange { position: usize, len: usize },
    #[error("index dimension must be at least 1")]
    ZeroDimension,
}

/// Nearest stored vector for a query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub position: usize,
    /// Squared Euclidean distance to the query.
    pub distance: f32,
}

/// Append-only flat L2 index.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorIndex {
    dimension: usize,
    data: Vec<f32>,
}

impl VectorIndex {
    /// Create an empty index that only accepts `dimension`-length vectors.
    pub fn create(dimension: usize) -> Result<Self, IndexError> {
        if dimension == 0 {
            return Err(IndexError::ZeroDimension);
        }
        Ok(Self { dimension, data: Vec::new() })
    }

    /// Rebuild an index from a flat row-major buffer (used when loading from disk).
    pub(crate) fn from_flat(dimension: usize, data: Vec<f32>) -> Result<Self, IndexError> {
        if dimension == 0 {
            return Err(IndexError::ZeroDimension);
        }
        if data.len() % dimension != 0 {
            return Err(IndexError::DimensionMismatch {
                expected: dimension,
                actual: data.len() % dimension,
            });
        }
        Ok(Self { dimension, data })
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.data.len() / self.dimension
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub(crate) fn as_flat(&self) -> &[f32] {
        &self.data
    }

    /// Append a vector and return its position. The index is untouched on error.
    pub fn add(&mut self, vector: &Descriptor) -> Result<usize, IndexError> {
        self.check_dimension(vector.len())?;
        let position = self.len();
        self.data.extend_from_slice(vector.as_slice());
        Ok(position)
    }

    /// Find the single nearest stored vector (k = 1).
    ///
    /// Exact ties resolve to the lowest position.
    pub fn search(&self, query: &Descriptor) -> Result<Neighbor, IndexError> {
        self.check_dimension(query.len())?;
        if self.is_empty() {
            return Err(IndexError::EmptyIndex);
        }

        let mut best = Neighbor { position: 0, distance: f32::INFINITY };
        for (position, row) in self.data.chunks_exact(self.dimension).enumerate() {
            let distance = squared_l2(row, query.as_slice());
            if distance < best.distance {
                best = Neighbor { position, distance };
            }
        }

        Ok(best)
    }

    /// Copy out the vector stored at `position`.
    pub fn reconstruct(&self, position: usize) -> Result<Descriptor, IndexError> {
        let len = self.len();
        if position >= len {
            return Err(IndexError::OutOfRange { position, len });
        }
        let start = position * self.dimension;
        Ok(Descriptor::new(self.data[start..start + self.dimension].to_vec()))
    }

    /// Drop every vector at or after `len`. Used to undo an append whose
    /// persistence failed.
    pub(crate) fn truncate(&mut self, len: usize) {
        self.data.truncate(len * self.dimension);
    }

    /// Iterate stored vectors in position order.
    pub fn vectors(&self) -> impl Iterator<Item = &[f32]> + '_ {
        self.data.chunks_exact(self.dimension)
    }

    fn check_dimension(&self, actual: usize) -> Result<(), IndexError> {
        if actual != self.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                actual,
            });
        }
        Ok(())
    }
}
