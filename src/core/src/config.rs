use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Result, StowageError};

/// Stowage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StowageConfig {
    /// Root directory holding image layouts and their JSON sidecars
    pub image_root: PathBuf,

    /// Pull policy used when callers don't pass one explicitly
    pub pull_policy: PullPolicy,

    /// Signature trust policy handed to the copy tool
    #[serde(with = "serde_yaml::with::singleton_map")]
    pub trust_policy: TrustPolicy,

    /// Program used to copy images between transports
    pub copy_program: String,

    /// Program used to build images from a Dockerfile
    pub build_program: String,

    /// Log level
    pub log_level: LogLevel,
}

impl Default for StowageConfig {
    fn default() -> Self {
        Self {
            image_root: stowage_home().join("images"),
            pull_policy: PullPolicy::New,
            trust_policy: TrustPolicy::Default,
            copy_program: "skopeo".to_string(),
            build_program: "docker".to_string(),
            log_level: LogLevel::Info,
        }
    }
}

impl StowageConfig {
    /// Load configuration from a YAML file.
    ///
    /// Fields missing from the file keep their default values.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path).map_err(|e| {
            StowageError::ConfigError(format!(
                "failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;

        serde_yaml::from_str(&data).map_err(|e| {
            StowageError::ConfigError(format!(
                "failed to parse config file {}: {}",
                path.display(),
                e
            ))
        })
    }

    /// Load `~/.stowage/config.yaml` if it exists, otherwise defaults.
    pub fn load_default() -> Result<Self> {
        let path = Self::default_path();
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load(&path)
    }

    /// Default config file location.
    pub fn default_path() -> PathBuf {
        stowage_home().join("config.yaml")
    }
}

/// Stowage home directory (`~/.stowage`, or `./.stowage` without a home).
fn stowage_home() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".stowage"))
        .unwrap_or_else(|| PathBuf::from(".stowage"))
}

/// Rule governing reuse of a locally cached image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PullPolicy {
    /// Only use the local copy; fail if there is none.
    Never,
    /// Use the local copy if present, otherwise fetch.
    New,
    /// Fetch again even if a local copy exists.
    Update,
}

impl Default for PullPolicy {
    fn default() -> Self {
        Self::New
    }
}

impl std::fmt::Display for PullPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Never => write!(f, "never"),
            Self::New => write!(f, "new"),
            Self::Update => write!(f, "update"),
        }
    }
}

impl std::str::FromStr for PullPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "never" => Ok(Self::Never),
            "new" => Ok(Self::New),
            "update" => Ok(Self::Update),
            _ => Err(format!(
                "unknown pull policy: '{}' (supported: never, new, update)",
                s
            )),
        }
    }
}

/// Signature trust policy passed to the copy collaborator.
///
/// Opaque to the store; only the copier interprets it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TrustPolicy {
    /// The system-wide policy of the copy tool
    Default,
    /// A policy file at the given path
    File(PathBuf),
    /// Accept any image without signature checks
    InsecureAcceptAnything,
}

impl Default for TrustPolicy {
    fn default() -> Self {
        Self::Default
    }
}

/// Log level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}
