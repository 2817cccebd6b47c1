//! Enrollment/verification controller.
//!
//! One controller serves one camera stream and runs each cycle to completion:
//! detect, select, crop, extract, then register, search or verify. The shared
//! database is the only state visible to other streams.

use crate::capability::{DescriptorExtractor, Embedder, FaceDetector};
use crate::database::SharedDatabase;
use crate::error::PipelineError;
use crate::remote::{EnrollRequest, RemoteError, RemoteResponse, RemoteVerifier, VerifyRequest};
use crate::selector::{self, DEFAULT_CONFIDENCE_THRESHOLD, DEFAULT_CROP_PADDING};
use crate::types::{Descriptor, Detection, DistanceThreshold, Frame};
use std::fmt;
use std::sync::Arc;

/// What the operator asked for this cycle, decoupled from how input is polled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Register,
    Search,
    Verify,
    Quit,
    /// Detect only; report the candidate without touching the database.
    None,
}

/// Where the controller is within the current cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    Idle,
    Detecting,
    NoCandidate,
    CandidateReady,
    Registering,
    Searching,
    Verifying,
}

/// Per-deployment tuning.
#[derive(Debug, Clone, Copy)]
pub struct ControllerSettings {
    pub confidence_threshold: f32,
    pub crop_padding: u32,
    pub distance_threshold: DistanceThreshold,
}

impl ControllerSettings {
    pub fn new(distance_threshold: DistanceThreshold) -> Self {
        Self {
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            crop_padding: DEFAULT_CROP_PADDING,
            distance_threshold,
        }
    }
}

/// The selected detection and its padded crop.
#[derive(Clone)]
pub struct Candidate {
    pub detection: Detection,
    pub crop: Frame,
}

/// Remote answer to an enrollment commit.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteStatus {
    Accepted,
    Rejected { status: u16 },
    Unavailable(String),
}

/// Why a verification did not unlock.
#[derive(Debug, Clone, PartialEq)]
pub enum DenialReason {
    Rejected { status: u16 },
    Unavailable(String),
}

/// Classified result of one cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Candidate {
        detection: Detection,
    },
    Registered {
        label: String,
        position: usize,
        /// `None` when no remote verifier is configured.
        remote: Option<RemoteStatus>,
    },
    Match {
        label: String,
        distance: f32,
    },
    NoMatch {
        distance: f32,
    },
    Unlocked {
        label: String,
        distance: f32,
        matched: bool,
    },
    Denied {
        label: String,
        distance: f32,
        matched: bool,
        reason: DenialReason,
    },
    Quit,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Candidate { detection } => write!(
                f,
                "CANDIDATE ({:.0},{:.0})-({:.0},{:.0}) conf={:.2}",
                detection.x1, detection.y1, detection.x2, detection.y2, detection.confidence
            ),
            Outcome::Registered { label, position, remote } => {
                write!(f, "REGISTERED {label} at {position}")?;
                match remote {
                    Some(RemoteStatus::Accepted) => write!(f, " (remote commit ok)"),
                    Some(RemoteStatus::Rejected { status }) => write!(f, " (remote rejected: {status})"),
                    Some(RemoteStatus::Unavailable(e)) => write!(f, " (remote unavailable: {e})"),
                    None => Ok(()),
                }
            }
            Outcome::Match { label, distance } => write!(f, "MATCH {label} dist={distance:.4}"),
            Outcome::NoMatch { distance } => write!(f, "NO MATCH dist={distance:.4}"),
            Outcome::Unlocked { label, distance, .. } => {
                write!(f, "UNLOCKED {label} dist={distance:.4}")
            }
            Outcome::Denied { label, distance, reason, .. } => {
                write!(f, "DENIED nearest={label} dist={distance:.4}")?;
                match reason {
                    DenialReason::Rejected { status } => write!(f, " (remote status {status})"),
                    DenialReason::Unavailable(e) => write!(f, " (remote unavailable: {e})"),
                }
            }
            Outcome::Quit => write!(f, "QUIT"),
        }
    }
}

pub struct Controller<D, E> {
    detector: D,
    embedder: Embedder<E>,
    database: SharedDatabase,
    verifier: Option<Arc<dyn RemoteVerifier>>,
    settings: ControllerSettings,
    state: CycleState,
}

impl<D: FaceDetector, E: DescriptorExtractor> Controller<D, E> {
    pub fn new(
        detector: D,
        embedder: Embedder<E>,
        database: SharedDatabase,
        settings: ControllerSettings,
    ) -> Self {
        if embedder.policy() != settings.distance_threshold.policy() {
            tracing::warn!(
                extractor = %embedder.policy(),
                threshold = %settings.distance_threshold.policy(),
                "distance threshold was chosen for a different normalization policy"
            );
        }
        Self {
            detector,
            embedder,
            database,
            verifier: None,
            settings,
            state: CycleState::Idle,
        }
    }

    pub fn with_verifier(mut self, verifier: Arc<dyn RemoteVerifier>) -> Self {
        self.verifier = Some(verifier);
        self
    }

    pub fn state(&self) -> CycleState {
        self.state
    }

    pub fn settings(&self) -> &ControllerSettings {
        &self.settings
    }

    pub fn database(&self) -> &SharedDatabase {
        &self.database
    }

    /// Run one full cycle on `frame`. The controller is back in `Idle` afterwards,
    /// whatever the result.
    pub fn cycle(&mut self, frame: &Frame, command: Command) -> Result<Outcome, PipelineError> {
        if command == Command::Quit {
            return Ok(Outcome::Quit);
        }

        let result = self.run_cycle(frame, command);
        if let Err(e) = &result {
            tracing::warn!(operation = ?command, kind = %e.kind(), error = %e, "cycle failed");
        }
        self.state = CycleState::Idle;
        result
    }

    fn run_cycle(&mut self, frame: &Frame, command: Command) -> Result<Outcome, PipelineError> {
        let candidate = self.detect(frame)?.ok_or(PipelineError::NoCandidate)?;
        match command {
            Command::Register => self.register(&candidate),
            Command::Search => self.search(&candidate),
            Command::Verify => self.verify(&candidate),
            Command::None => Ok(Outcome::Candidate { detection: candidate.detection }),
            Command::Quit => Ok(Outcome::Quit),
        }
    }

    /// Detect faces in `frame` and prepare the single candidate, if any.
    pub fn detect(&mut self, frame: &Frame) -> Result<Option<Candidate>, PipelineError> {
        self.state = CycleState::Detecting;
        let detections = self.detector.detect(frame)?;
        tracing::debug!(count = detections.len(), "detections");

        let candidate = selector::select(&detections, self.settings.confidence_threshold)
            .and_then(|detection| {
                selector::crop(frame, &detection, self.settings.crop_padding)
                    .map(|crop| Candidate { detection, crop })
            });

        self.state = if candidate.is_some() {
            CycleState::CandidateReady
        } else {
            CycleState::NoCandidate
        };
        Ok(candidate)
    }

    /// Enroll the candidate under a freshly generated label.
    pub fn register(&mut self, candidate: &Candidate) -> Result<Outcome, PipelineError> {
        self.require_candidate()?;
        self.state = CycleState::Registering;

        // Inference runs outside the lock; only the append + save is exclusive.
        let descriptor = self.embedder.extract(&candidate.crop)?;
        let enrolled = self.database.write().register(&descriptor)?;

        let remote = self.verifier.as_ref().map(|verifier| {
            let request = EnrollRequest {
                face_index: &enrolled.label,
                embedding: descriptor.as_slice(),
            };
            let status = match verifier.enroll(&request) {
                Ok(resp) if resp.is_success() => RemoteStatus::Accepted,
                Ok(resp) => RemoteStatus::Rejected { status: resp.status },
                Err(e) => RemoteStatus::Unavailable(e.to_string()),
            };
            if status != RemoteStatus::Accepted {
                tracing::warn!(label = %enrolled.label, ?status, "remote enrollment commit failed");
            }
            status
        });

        Ok(Outcome::Registered {
            label: enrolled.label,
            position: enrolled.position,
            remote,
        })
    }

    /// Local nearest-neighbour lookup. Read-only.
    pub fn search(&mut self, candidate: &Candidate) -> Result<Outcome, PipelineError> {
        self.require_candidate()?;
        self.require_enrolled()?;
        self.state = CycleState::Searching;

        let descriptor = self.embedder.extract(&candidate.crop)?;
        let nearest = self.database.read().nearest(&descriptor)?;

        if self.settings.distance_threshold.accepts(nearest.distance) {
            tracing::info!(label = %nearest.label, distance = nearest.distance, "match");
            Ok(Outcome::Match { label: nearest.label, distance: nearest.distance })
        } else {
            tracing::info!(distance = nearest.distance, "no match");
            Ok(Outcome::NoMatch { distance: nearest.distance })
        }
    }

    /// Search locally, then let the remote verifier decide.
    ///
    /// Without a local match the nearest label is still sent, paired with a
    /// zero enrolled vector.
    pub fn verify(&mut self, candidate: &Candidate) -> Result<Outcome, PipelineError> {
        self.require_candidate()?;
        let verifier = self
            .verifier
            .clone()
            .ok_or_else(|| PipelineError::RemoteUnavailable("no remote verifier configured".into()))?;
        self.require_enrolled()?;
        self.state = CycleState::Verifying;

        let live = self.embedder.extract(&candidate.crop)?;
        let (nearest, enrolled, matched) = {
            let db = self.database.read();
            let nearest = db.nearest(&live)?;
            let matched = self.settings.distance_threshold.accepts(nearest.distance);
            let enrolled = if matched {
                db.reconstruct(nearest.position)?
            } else {
                Descriptor::zeros(live.len())
            };
            (nearest, enrolled, matched)
        };

        tracing::info!(
            label = %nearest.label,
            distance = nearest.distance,
            matched,
            "sending verification to remote"
        );
        let request = VerifyRequest {
            face_index: &nearest.label,
            embedding: live.as_slice(),
            enrolled: enrolled.as_slice(),
        };
        let outcome = classify_verification(verifier.verify(&request), nearest.label.clone(), nearest.distance, matched);
        match &outcome {
            Outcome::Unlocked { .. } => tracing::info!(label = %nearest.label, "unlocked"),
            _ => tracing::info!(label = %nearest.label, "access denied"),
        }
        Ok(outcome)
    }

    fn require_candidate(&self) -> Result<(), PipelineError> {
        match self.state {
            CycleState::CandidateReady => Ok(()),
            _ => Err(PipelineError::NoCandidate),
        }
    }

    fn require_enrolled(&self) -> Result<(), PipelineError> {
        if self.database.read().is_empty() {
            return Err(PipelineError::EmptyIndex);
        }
        Ok(())
    }
}

fn classify_verification(
    response: Result<RemoteResponse, RemoteError>,
    label: String,
    distance: f32,
    matched: bool,
) -> Outcome {
    match response {
        Ok(resp) if resp.is_success() => Outcome::Unlocked { label, distance, matched },
        Ok(resp) => Outcome::Denied {
            label,
            distance,
            matched,
            reason: DenialReason::Rejected { status: resp.status },
        },
        Err(e) => Outcome::Denied {
            label,
            distance,
            matched,
            reason: DenialReason::Unavailable(e.to_string()),
        },
    }
}
