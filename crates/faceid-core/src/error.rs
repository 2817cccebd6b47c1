use crate::capability::{DetectorError, ExtractionError};
use crate::index::IndexError;
use crate::store::StoreError;
use std::fmt;
use thiserror::Error;

/// Everything a processing cycle can fail with.
///
/// None of these end the frame loop: the caller reports the error and moves
/// on to the next frame. `CorruptDatabase` at startup is the exception and
/// should stop the process before anything writes to the pair.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("no face candidate in this frame")]
    NoCandidate,
    #[error("detector failed: {0}")]
    Detection(#[from] DetectorError),
    #[error("descriptor extraction failed: {0}")]
    ExtractionFailure(#[from] ExtractionError),
    #[error("dimension mismatch: index holds {expected}-dim descriptors, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("no faces enrolled")]
    EmptyIndex,
    #[error("position {position} out of range ({len} enrolled)")]
    OutOfRange { position: usize, len: usize },
    #[error("corrupt database: {0}")]
    CorruptDatabase(String),
    #[error("failed to persist database: {0}")]
    Persistence(StoreError),
    #[error("remote verifier unavailable: {0}")]
    RemoteUnavailable(String),
}

/// Stable, matchable name for each error variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NoCandidate,
    Detection,
    ExtractionFailure,
    DimensionMismatch,
    EmptyIndex,
    OutOfRange,
    CorruptDatabase,
    Persistence,
    RemoteUnavailable,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NoCandidate => "no_candidate",
            ErrorKind::Detection => "detection_failure",
            ErrorKind::ExtractionFailure => "extraction_failure",
            ErrorKind::DimensionMismatch => "dimension_mismatch",
            ErrorKind::EmptyIndex => "empty_index",
            ErrorKind::OutOfRange => "out_of_range",
            ErrorKind::CorruptDatabase => "corrupt_database",
            ErrorKind::Persistence => "persistence_failure",
            ErrorKind::RemoteUnavailable => "remote_unavailable",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::NoCandidate => ErrorKind::NoCandidate,
            PipelineError::Detection(_) => ErrorKind::Detection,
            PipelineError::ExtractionFailure(_) => ErrorKind::ExtractionFailure,
            PipelineError::DimensionMismatch { .. } => ErrorKind::DimensionMismatch,
            PipelineError::EmptyIndex => ErrorKind::EmptyIndex,
            PipelineError::OutOfRange { .. } => ErrorKind::OutOfRange,
            PipelineError::CorruptDatabase(_) => ErrorKind::CorruptDatabase,
            PipelineError::Persistence(_) => ErrorKind::Persistence,
            PipelineError::RemoteUnavailable(_) => ErrorKind::RemoteUnavailable,
        }
    }
}

impl From<IndexError> for PipelineError {
    fn from(err: IndexError) -> Self {
        match err {
            IndexError::DimensionMismatch { expected, actual } => {
                PipelineError::DimensionMismatch { expected, actual }
            }
            IndexError::EmptyIndex => PipelineError::EmptyIndex,
            IndexError::OutOfRange { position, len } => PipelineError::OutOfRange { position, len },
            IndexError::ZeroDimension => PipelineError::ExtractionFailure(ExtractionError::Empty),
        }
    }
}

impl From<StoreError> for PipelineError {
    fn from(err: StoreError) -> Self {
        if err.is_corruption() {
            PipelineError::CorruptDatabase(err.to_string())
        } else {
            PipelineError::Persistence(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_errors_map_to_taxonomy() {
        let e: PipelineError = IndexError::EmptyIndex.into();
        assert_eq!(e.kind(), ErrorKind::EmptyIndex);
        let e: PipelineError = IndexError::DimensionMismatch { expected: 128, actual: 512 }.into();
        assert_eq!(e.kind(), ErrorKind::DimensionMismatch);
        let e: PipelineError = IndexError::OutOfRange { position: 3, len: 1 }.into();
        assert_eq!(e.kind(), ErrorKind::OutOfRange);
    }

    #[test]
    fn test_store_corruption_maps_to_corrupt_database() {
        let e: PipelineError = StoreError::Corrupt("labels missing".into()).into();
        assert_eq!(e.kind(), ErrorKind::CorruptDatabase);

        let io = StoreError::Io {
            path: "x".into(),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        let e: PipelineError = io.into();
        assert_eq!(e.kind(), ErrorKind::Persistence);
    }

    #[test]
    fn test_kind_names_are_distinct() {
        let kinds = [
            ErrorKind::NoCandidate,
            ErrorKind::Detection,
            ErrorKind::ExtractionFailure,
            ErrorKind::DimensionMismatch,
            ErrorKind::EmptyIndex,
            ErrorKind::OutOfRange,
            ErrorKind::CorruptDatabase,
            ErrorKind::Persistence,
            ErrorKind::RemoteUnavailable,
        ];
        let mut names: Vec<&str> = kinds.iter().map(ErrorKind::as_str).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), kinds.len());
    }
}
