//! Stowage runtime: image resolution, local OCI store, and builds.
//!
//! Content transfer and image builds are delegated to external tools
//! (`skopeo`, `docker`) through the [`process::ProcessRunner`] capability.

#![allow(clippy::result_large_err)]

pub mod oci;
pub mod process;

// Re-export common types
pub use oci::{BuildTool, DockerBuildTool, ImageBuilder};
pub use oci::{ImageCopier, ImageMetadata, ImagePort, ImageStore, SkopeoCopier};
pub use process::{ProcessInvocation, ProcessOutput, ProcessRunner, SystemProcessRunner};

/// Stowage runtime version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
