//! Transport families of image references.
//!
//! The substring before the first `:` of a reference names its transport.
//! Only the Docker families need special handling: their content is fetched
//! into a `dir:` layout first so the Docker config can be read before the
//! image is converted to OCI.

use std::path::Path;

/// Prefix of references served by the local Docker daemon.
pub const DOCKER_DAEMON_PREFIX: &str = "docker-daemon:";

/// Transport/format family of an image reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportFamily {
    /// `docker:` registry references
    Docker,
    /// `docker-daemon:` references
    DockerDaemon,
    /// `oci:` and every other transport
    Other,
}

impl TransportFamily {
    /// Classify a reference by its transport prefix.
    pub fn of(reference: &str) -> Self {
        match reference.split_once(':').map(|(transport, _)| transport) {
            Some("docker") => Self::Docker,
            Some("docker-daemon") => Self::DockerDaemon,
            _ => Self::Other,
        }
    }

    /// Whether the source is Docker-formatted and needs config normalization.
    pub fn is_docker(self) -> bool {
        matches!(self, Self::Docker | Self::DockerDaemon)
    }
}

/// `dir:` transport reference for a local directory.
pub fn dir_transport(path: &Path) -> String {
    format!("dir:{}", path.display())
}

/// `oci:` transport reference for a local OCI layout.
pub fn oci_transport(path: &Path) -> String {
    format!("oci:{}", path.display())
}

/// Tag handed to the build tool for a reference.
pub fn build_tag(reference: &str) -> &str {
    reference
        .strip_prefix(DOCKER_DAEMON_PREFIX)
        .unwrap_or(reference)
}
