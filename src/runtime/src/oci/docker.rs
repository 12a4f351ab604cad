//! Docker image config normalization.
//!
//! Docker-formatted sources are first copied into a `dir:` layout:
//!
//! ```text
//! tmp/
//! ├── manifest.json        (Docker v2 schema 2 manifest)
//! ├── <config-hex>.tar     (container config JSON)
//! └── <layer-hex>.tar ...
//! ```
//!
//! The config named by the manifest is read and merged into
//! [`ImageMetadata`] the same way an OCI config is.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use stowage_core::error::{Result, StowageError};

use super::image::{read_json, split_digest};
use super::metadata::{ImageMetadata, ImageRuntimeConfig};

/// Media type of a Docker v1 container config.
pub const DOCKER_CONFIG_MEDIA_TYPE: &str = "application/vnd.docker.container.image.v1+json";

#[derive(Debug, Deserialize)]
struct DockerManifest {
    config: DockerDescriptor,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DockerDescriptor {
    #[serde(default)]
    media_type: String,
    digest: String,
}

#[derive(Debug, Default, Deserialize)]
struct DockerImage {
    #[serde(default)]
    config: Option<DockerContainerConfig>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct DockerContainerConfig {
    entrypoint: Option<Vec<String>>,
    cmd: Option<Vec<String>>,
    working_dir: Option<String>,
    env: Option<Vec<String>>,
    exposed_ports: Option<BTreeMap<String, serde_json::Value>>,
    volumes: Option<BTreeMap<String, serde_json::Value>>,
}

impl From<DockerContainerConfig> for ImageRuntimeConfig {
    fn from(config: DockerContainerConfig) -> Self {
        Self {
            entrypoint: config.entrypoint,
            cmd: config.cmd,
            working_dir: config.working_dir,
            env: config.env.unwrap_or_default(),
            exposed_ports: config.exposed_ports.unwrap_or_default().into_keys().collect(),
            volumes: config.volumes.unwrap_or_default().into_keys().collect(),
        }
    }
}

/// Read the Docker config of a `dir:` layout.
///
/// # Errors
///
/// - `UnsupportedFormat` if the config media type is not
///   [`DOCKER_CONFIG_MEDIA_TYPE`] or the config digest is malformed
/// - `ResolutionFailed` if the manifest or config cannot be read
pub fn load_docker_config(dir: &Path) -> Result<ImageRuntimeConfig> {
    let manifest: DockerManifest = read_json(&dir.join("manifest.json"))?;

    if manifest.config.media_type != DOCKER_CONFIG_MEDIA_TYPE {
        return Err(StowageError::UnsupportedFormat(format!(
            "unsupported docker image manifest config media type {:?}",
            manifest.config.media_type
        )));
    }

    let (_, encoded) = split_digest(&manifest.config.digest)?;
    let image: DockerImage = read_json(&config_blob_path(dir, encoded))?;

    Ok(image.config.unwrap_or_default().into())
}

/// Normalize the Docker config of a `dir:` layout into `merge_into`.
///
/// `merge_into` is left unmodified on error.
pub fn normalize_docker_config(dir: &Path, merge_into: &mut ImageMetadata) -> Result<()> {
    let config = load_docker_config(dir)?;
    merge_into.merge(&config);
    Ok(())
}

/// Config blobs are named `<hex>.tar`; newer layouts drop the suffix.
fn config_blob_path(dir: &Path, encoded: &str) -> PathBuf {
    let tar = dir.join(format!("{}.tar", encoded));
    if tar.exists() {
        return tar;
    }
    let bare = dir.join(encoded);
    if bare.exists() {
        bare
    } else {
        tar
    }
}
