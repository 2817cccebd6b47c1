//! Client side of the remote attestation service.
//!
//! The service is opaque: it accepts JSON bodies on two endpoints and answers
//! with a status code. 200 is acceptance; every other status is rejection.

use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_ENROLL_PATH: &str = "/enroll";
pub const DEFAULT_VERIFY_PATH: &str = "/verify";
pub const DEFAULT_ENROLL_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_VERIFY_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RemoteError {
    #[error("remote verifier request timed out")]
    Timeout,
    #[error("network error: {0}")]
    Network(String),
    #[error("failed to encode request: {0}")]
    Encode(String),
}

/// `POST <enroll>` body.
#[derive(Debug, Serialize)]
pub struct EnrollRequest<'a> {
    pub face_index: &'a str,
    pub embedding: &'a [f32],
}

/// `POST <verify>` body.
#[derive(Debug, Serialize)]
pub struct VerifyRequest<'a> {
    pub face_index: &'a str,
    pub embedding: &'a [f32],
    pub enrolled: &'a [f32],
}

/// Status and body of a completed exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteResponse {
    pub status: u16,
    pub body: String,
}

impl RemoteResponse {
    pub fn is_success(&self) -> bool {
        self.status == 200
    }
}

/// Request/response channel to the attestation service.
pub trait RemoteVerifier: Send + Sync {
    fn enroll(&self, request: &EnrollRequest<'_>) -> Result<RemoteResponse, RemoteError>;
    fn verify(&self, request: &VerifyRequest<'_>) -> Result<RemoteResponse, RemoteError>;
}

/// Endpoint layout and timeouts for [`HttpVerifier`].
#[derive(Debug, Clone)]
pub struct HttpVerifierConfig {
    pub base_url: String,
    pub enroll_path: String,
    pub verify_path: String,
    pub enroll_timeout: Duration,
    pub verify_timeout: Duration,
}

impl HttpVerifierConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            enroll_path: DEFAULT_ENROLL_PATH.to_string(),
            verify_path: DEFAULT_VERIFY_PATH.to_string(),
            enroll_timeout: DEFAULT_ENROLL_TIMEOUT,
            verify_timeout: DEFAULT_VERIFY_TIMEOUT,
        }
    }
}

/// JSON-over-HTTP verifier backed by blocking `ureq` agents.
pub struct HttpVerifier {
    enroll_url: String,
    verify_url: String,
    enroll_agent: ureq::Agent,
    verify_agent: ureq::Agent,
}

impl HttpVerifier {
    pub fn new(config: HttpVerifierConfig) -> Self {
        let base = config.base_url.trim_end_matches('/');
        Self {
            enroll_url: join_url(base, &config.enroll_path),
            verify_url: join_url(base, &config.verify_path),
            enroll_agent: agent_with_timeout(config.enroll_timeout),
            verify_agent: agent_with_timeout(config.verify_timeout),
        }
    }

    pub fn enroll_url(&self) -> &str {
        &self.enroll_url
    }

    pub fn verify_url(&self) -> &str {
        &self.verify_url
    }
}

impl RemoteVerifier for HttpVerifier {
    fn enroll(&self, request: &EnrollRequest<'_>) -> Result<RemoteResponse, RemoteError> {
        post_json(&self.enroll_agent, &self.enroll_url, request)
    }

    fn verify(&self, request: &VerifyRequest<'_>) -> Result<RemoteResponse, RemoteError> {
        post_json(&self.verify_agent, &self.verify_url, request)
    }
}

fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base, path.trim_start_matches('/'))
}

fn agent_with_timeout(timeout: Duration) -> ureq::Agent {
    let config = ureq::Agent::config_builder()
        .timeout_global(Some(timeout))
        // Error statuses are answers, not transport failures.
        .http_status_as_error(false)
        .build();
    ureq::Agent::new_with_config(config)
}

fn post_json<T: Serialize>(agent: &ureq::Agent, url: &str, body: &T) -> Result<RemoteResponse, RemoteError> {
    let body_bytes = serde_json::to_vec(body).map_err(|e| RemoteError::Encode(e.to_string()))?;

    let mut response = agent
        .post(url)
        .header("Content-Type", "application/json")
        .send(&body_bytes[..])
        .map_err(classify)?;

    let status = response.status().as_u16();
    // The status is the verdict; an unreadable body does not change it.
    let body = response.body_mut().read_to_string().unwrap_or_default();

    tracing::debug!(url, status, "remote verifier responded");
    Ok(RemoteResponse { status, body })
}

fn classify(err: ureq::Error) -> RemoteError {
    match err {
        ureq::Error::Timeout(_) => RemoteError::Timeout,
        ureq::Error::Io(ref e) if e.kind() == std::io::ErrorKind::TimedOut => RemoteError::Timeout,
        other => RemoteError::Network(other.to_string()),
    }
}
