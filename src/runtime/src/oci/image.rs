//! OCI manifest chain resolution.
//!
//! Walks `index.json` → manifest blob → config blob of a local OCI layout
//! and merges each config's runtime defaults into [`ImageMetadata`].

use std::path::{Path, PathBuf};

use oci_spec::image::{ImageConfiguration, ImageIndex, ImageManifest};
use serde::de::DeserializeOwned;
use stowage_core::error::{Result, StowageError};

use super::metadata::{ImageMetadata, ImageRuntimeConfig};

/// Runtime configs read from every manifest of an OCI layout.
#[derive(Debug)]
pub struct ManifestChain {
    /// One config per manifest, in index order
    configs: Vec<ImageRuntimeConfig>,
}

impl ManifestChain {
    /// Load the full chain of an OCI layout.
    ///
    /// Every manifest listed in the index contributes; there is no
    /// platform filtering, so multi-platform indexes yield several configs.
    ///
    /// # Errors
    ///
    /// - `UnsupportedFormat` if a digest has no `algorithm:` prefix
    /// - `ResolutionFailed` if a file is missing or not valid JSON
    ///
    /// Config blobs are decoded as OCI image configurations, which require
    /// `architecture`, `os` and `rootfs`. A blob without them is a
    /// `ResolutionFailed` here, even though the Docker normalizer accepts a
    /// config holding only the runtime section.
    pub fn load(root_dir: &Path) -> Result<Self> {
        let index: ImageIndex = read_json(&root_dir.join("index.json"))?;

        if index.manifests().len() > 1 {
            tracing::warn!(
                directory = %root_dir.display(),
                manifests = index.manifests().len(),
                "Index lists several manifests; merging all of them"
            );
        }

        let mut configs = Vec::with_capacity(index.manifests().len());
        for descriptor in index.manifests() {
            let manifest: ImageManifest = read_json(&blob_path(root_dir, descriptor.digest())?)?;
            let config_path = blob_path(root_dir, manifest.config().digest())?;
            let config: ImageConfiguration = read_json(&config_path)?;
            configs.push(runtime_config(&config));
        }

        Ok(Self { configs })
    }

    /// Configs in index order.
    pub fn configs(&self) -> &[ImageRuntimeConfig] {
        &self.configs
    }

    /// Merge every config into `dest`, in index order.
    pub fn merge_into(&self, dest: &mut ImageMetadata) {
        for config in &self.configs {
            dest.merge(config);
        }
    }
}

/// Resolve the manifest chain of `oci_dir` into `merge_into`.
///
/// Nothing is merged unless the whole chain loads.
pub fn resolve_manifest_chain(oci_dir: &Path, merge_into: &mut ImageMetadata) -> Result<()> {
    ManifestChain::load(oci_dir)?.merge_into(merge_into);
    Ok(())
}

/// Split a digest into its algorithm and encoded parts.
///
/// `sha256:abcd1234` → `("sha256", "abcd1234")`. Both parts become path
/// segments, so they must be non-empty and free of separators.
pub fn split_digest(digest: &str) -> Result<(&str, &str)> {
    let (algorithm, encoded) = digest.split_once(':').ok_or_else(|| {
        StowageError::UnsupportedFormat(format!("digest {:?} has no algorithm prefix", digest))
    })?;

    for part in [algorithm, encoded] {
        if part.is_empty() || part == "." || part == ".." || part.contains(['/', '\\']) {
            return Err(StowageError::UnsupportedFormat(format!(
                "digest {:?} is not a valid blob address",
                digest
            )));
        }
    }

    Ok((algorithm, encoded))
}

/// Path of a blob inside an OCI layout: `blobs/<algorithm>/<encoded>`.
pub fn blob_path(root_dir: &Path, digest: &str) -> Result<PathBuf> {
    let (algorithm, encoded) = split_digest(digest)?;
    Ok(root_dir.join("blobs").join(algorithm).join(encoded))
}

/// Read and decode a JSON document of an image layout.
pub(crate) fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read(path).map_err(|e| StowageError::ResolutionFailed {
        path: path.to_path_buf(),
        message: format!("failed to read: {}", e),
    })?;

    serde_json::from_slice(&content).map_err(|e| StowageError::ResolutionFailed {
        path: path.to_path_buf(),
        message: format!("failed to parse: {}", e),
    })
}

fn runtime_config(oci_config: &ImageConfiguration) -> ImageRuntimeConfig {
    let Some(config) = oci_config.config() else {
        return ImageRuntimeConfig::default();
    };

    ImageRuntimeConfig {
        entrypoint: config.entrypoint().clone(),
        cmd: config.cmd().clone(),
        working_dir: config.working_dir().clone(),
        env: config.env().clone().unwrap_or_default(),
        exposed_ports: config.exposed_ports().clone().unwrap_or_default(),
        volumes: config.volumes().clone().unwrap_or_default(),
    }
}
