use faceid_core::remote::{
    HttpVerifierConfig, DEFAULT_ENROLL_PATH, DEFAULT_ENROLL_TIMEOUT, DEFAULT_VERIFY_PATH,
    DEFAULT_VERIFY_TIMEOUT,
};
use faceid_core::selector::{DEFAULT_CONFIDENCE_THRESHOLD, DEFAULT_CROP_PADDING};
use faceid_core::types::{DistanceThreshold, NormalizationPolicy, ThresholdError};
use faceid_core::{ControllerSettings, DatabasePaths};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

const DEFAULT_DETECTOR_MODEL: &str = "models/yolov8n-face.onnx";
const DEFAULT_EXTRACTOR_MODEL: &str = "models/arcface_r100.onnx";
const DEFAULT_INDEX_PATH: &str = "face_db.index";
const DEFAULT_LABELS_PATH: &str = "face_labels.json";
const DEFAULT_INTRA_THREADS: usize = 2;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config file {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: String, value: String },
    #[error("distance_threshold is required (set FACEID_DISTANCE_THRESHOLD or distance_threshold in the config file)")]
    MissingThreshold,
    #[error("invalid distance threshold: {0}")]
    Threshold(#[from] ThresholdError),
}

/// On-disk layout of the optional TOML file. Every key may be omitted.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub detector_model: Option<PathBuf>,
    pub extractor_model: Option<PathBuf>,
    pub index_path: Option<PathBuf>,
    pub labels_path: Option<PathBuf>,
    pub confidence_threshold: Option<f32>,
    pub crop_padding: Option<u32>,
    pub normalization: Option<String>,
    pub distance_threshold: Option<f32>,
    pub remote_url: Option<String>,
    pub enroll_path: Option<String>,
    pub verify_path: Option<String>,
    pub enroll_timeout_secs: Option<u64>,
    pub verify_timeout_secs: Option<u64>,
    pub intra_threads: Option<usize>,
}

impl FileConfig {
    pub fn read(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Resolved deployment configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub detector_model: PathBuf,
    pub extractor_model: PathBuf,
    pub index_path: PathBuf,
    pub labels_path: PathBuf,
    pub confidence_threshold: f32,
    pub crop_padding: u32,
    pub normalization: NormalizationPolicy,
    pub distance_threshold: DistanceThreshold,
    /// Base URL of the attestation service; verification is unavailable without it.
    pub remote_url: Option<String>,
    pub enroll_path: String,
    pub verify_path: String,
    pub enroll_timeout: Duration,
    pub verify_timeout: Duration,
    pub intra_threads: usize,
}

impl Config {
    /// Load the optional TOML file (explicit path, else `FACEID_CONFIG`) and
    /// overlay `FACEID_*` environment variables.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        Self::resolve(read_file(explicit)?, |key| std::env::var(key).ok())
    }

    /// Merge `file` with the variables returned by `env`. Environment wins.
    pub fn resolve(file: FileConfig, env: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let normalization = match env("FACEID_NORMALIZATION").or(file.normalization) {
            Some(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue {
                key: "normalization".into(),
                value: raw,
            })?,
            None => NormalizationPolicy::Raw,
        };

        let threshold = parsed(&env, "FACEID_DISTANCE_THRESHOLD")?
            .or(file.distance_threshold)
            .ok_or(ConfigError::MissingThreshold)?;
        let distance_threshold = DistanceThreshold::new(threshold, normalization)?;

        let confidence_threshold = parsed(&env, "FACEID_CONFIDENCE_THRESHOLD")?
            .or(file.confidence_threshold)
            .unwrap_or(DEFAULT_CONFIDENCE_THRESHOLD);
        if !(0.0..=1.0).contains(&confidence_threshold) {
            return Err(ConfigError::InvalidValue {
                key: "confidence_threshold".into(),
                value: confidence_threshold.to_string(),
            });
        }

        let path = |key: &str, from_file: Option<PathBuf>, default: &str| {
            env(key).map(PathBuf::from).or(from_file).unwrap_or_else(|| PathBuf::from(default))
        };
        let remote_url = env("FACEID_REMOTE_URL")
            .or(file.remote_url)
            .filter(|url| !url.trim().is_empty());

        Ok(Self {
            detector_model: path("FACEID_DETECTOR_MODEL", file.detector_model, DEFAULT_DETECTOR_MODEL),
            extractor_model: path("FACEID_EXTRACTOR_MODEL", file.extractor_model, DEFAULT_EXTRACTOR_MODEL),
            index_path: path("FACEID_INDEX_PATH", file.index_path, DEFAULT_INDEX_PATH),
            labels_path: path("FACEID_LABELS_PATH", file.labels_path, DEFAULT_LABELS_PATH),
            confidence_threshold,
            crop_padding: parsed(&env, "FACEID_CROP_PADDING")?
                .or(file.crop_padding)
                .unwrap_or(DEFAULT_CROP_PADDING),
            normalization,
            distance_threshold,
            remote_url,
            enroll_path: env("FACEID_ENROLL_PATH")
                .or(file.enroll_path)
                .unwrap_or_else(|| DEFAULT_ENROLL_PATH.to_string()),
            verify_path: env("FACEID_VERIFY_PATH")
                .or(file.verify_path)
                .unwrap_or_else(|| DEFAULT_VERIFY_PATH.to_string()),
            enroll_timeout: parsed(&env, "FACEID_ENROLL_TIMEOUT_SECS")?
                .or(file.enroll_timeout_secs)
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_ENROLL_TIMEOUT),
            verify_timeout: parsed(&env, "FACEID_VERIFY_TIMEOUT_SECS")?
                .or(file.verify_timeout_secs)
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_VERIFY_TIMEOUT),
            intra_threads: parsed(&env, "FACEID_INTRA_THREADS")?
                .or(file.intra_threads)
                .unwrap_or(DEFAULT_INTRA_THREADS),
        })
    }

    /// Only the artifact locations, for read-only tooling that needs no threshold.
    pub fn load_paths(explicit: Option<&Path>) -> Result<DatabasePaths, ConfigError> {
        let file = read_file(explicit)?;
        Ok(Self::resolve_paths(&file, |key| std::env::var(key).ok()))
    }

    fn resolve_paths(file: &FileConfig, env: impl Fn(&str) -> Option<String>) -> DatabasePaths {
        let index = env("FACEID_INDEX_PATH")
            .map(PathBuf::from)
            .or_else(|| file.index_path.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_INDEX_PATH));
        let labels = env("FACEID_LABELS_PATH")
            .map(PathBuf::from)
            .or_else(|| file.labels_path.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_LABELS_PATH));
        DatabasePaths::new(index, labels)
    }

    pub fn database_paths(&self) -> DatabasePaths {
        DatabasePaths::new(self.index_path.clone(), self.labels_path.clone())
    }

    pub fn controller_settings(&self) -> ControllerSettings {
        ControllerSettings {
            confidence_threshold: self.confidence_threshold,
            crop_padding: self.crop_padding,
            distance_threshold: self.distance_threshold,
        }
    }

    pub fn verifier_config(&self) -> Option<HttpVerifierConfig> {
        self.remote_url.as_ref().map(|url| HttpVerifierConfig {
            base_url: url.clone(),
            enroll_path: self.enroll_path.clone(),
            verify_path: self.verify_path.clone(),
            enroll_timeout: self.enroll_timeout,
            verify_timeout: self.verify_timeout,
        })
    }
}

fn read_file(explicit: Option<&Path>) -> Result<FileConfig, ConfigError> {
    let path = explicit
        .map(Path::to_path_buf)
        .or_else(|| std::env::var_os("FACEID_CONFIG").map(PathBuf::from));
    match path {
        Some(path) => {
            tracing::info!(path = %path.display(), "reading config file");
            FileConfig::read(&path)
        }
        None => Ok(FileConfig::default()),
    }
}

/// Parse an environment variable if present. Unlike an absent key, a value
/// that does not parse is an error.
fn parsed<T: std::str::FromStr>(
    env: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>, ConfigError> {
    match env(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { key: key.to_string(), value: raw }),
        None => Ok(None),
    }
}
