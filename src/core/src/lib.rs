//! Stowage Core - Foundational Types
//!
//! Error types, configuration, and the pull policy shared by the
//! stowage runtime and CLI.

pub mod config;
pub mod error;

// Re-export commonly used types
pub use config::{LogLevel, PullPolicy, StowageConfig, TrustPolicy};
pub use error::{Result, StowageError};

/// Stowage version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
