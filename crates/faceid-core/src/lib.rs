//! faceid-core — face enrollment and verification pipeline.
//!
//! Picks one face per frame, turns it into a descriptor through pluggable
//! detector/extractor capabilities, and keeps an exact L2 index of enrolled
//! faces in lockstep with their labels on disk. Verification is delegated to
//! a remote attestation service.

pub mod capability;
pub mod controller;
pub mod database;
pub mod error;
pub mod index;
pub mod labels;
pub mod remote;
pub mod selector;
pub mod store;
pub mod types;

pub use capability::{DescriptorExtractor, Embedder, FaceDetector};
pub use controller::{Command, Controller, ControllerSettings, Outcome};
pub use database::{FaceDatabase, SharedDatabase};
pub use error::{ErrorKind, PipelineError};
pub use remote::{HttpVerifier, HttpVerifierConfig, RemoteVerifier};
pub use store::{DatabasePaths, DatabaseStore};
pub use types::{ChannelOrder, Descriptor, Detection, DistanceThreshold, Frame, NormalizationPolicy};
