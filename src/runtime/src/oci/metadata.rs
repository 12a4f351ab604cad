//! Resolved image metadata and its JSON sidecar.
//!
//! Every resolved image is described by an [`ImageMetadata`] record that is
//! persisted next to its OCI layout as `<imageRoot>/<name>.json`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use stowage_core::error::{Result, StowageError};
use thiserror::Error;

/// Resolved, persisted record for one image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageMetadata {
    /// Original reference string (unique key)
    pub name: String,
    /// Absolute path of the local OCI layout
    pub directory: PathBuf,
    /// Entrypoint followed by default arguments
    #[serde(default)]
    pub exec: Vec<String>,
    #[serde(default)]
    pub working_directory: String,
    /// Container path → volume id (declared, not bound)
    #[serde(default)]
    pub mount_points: BTreeMap<String, String>,
    /// Exposed port spec (e.g. "80/tcp") → port
    #[serde(default)]
    pub ports: BTreeMap<String, ImagePort>,
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
}

/// A port exposed by an image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImagePort {
    pub protocol: String,
    pub port: u16,
}

/// Runtime defaults extracted from an image config blob.
///
/// Both the OCI manifest chain and the Docker config normalizer produce
/// this shape so they share one merge rule.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageRuntimeConfig {
    pub entrypoint: Option<Vec<String>>,
    pub cmd: Option<Vec<String>>,
    pub working_dir: Option<String>,
    /// `KEY=VALUE` entries
    pub env: Vec<String>,
    /// Exposed port specs such as `80/tcp`
    pub exposed_ports: Vec<String>,
    /// Declared volume paths
    pub volumes: Vec<String>,
}

/// Why a sidecar could not be loaded.
#[derive(Debug, Error)]
pub enum SidecarError {
    /// No sidecar exists for the image
    #[error("sidecar not found")]
    NotFound,

    /// The sidecar exists but is not valid metadata
    #[error("sidecar is corrupt: {0}")]
    Corrupt(String),

    /// Any other I/O failure
    #[error("failed to read sidecar: {0}")]
    Io(std::io::Error),
}

impl ImageMetadata {
    /// Empty metadata for an image stored at `directory`.
    pub fn new(name: &str, directory: &Path) -> Self {
        Self {
            name: name.to_string(),
            directory: directory.to_path_buf(),
            exec: Vec::new(),
            working_directory: String::new(),
            mount_points: BTreeMap::new(),
            ports: BTreeMap::new(),
            environment: BTreeMap::new(),
        }
    }

    /// Merge runtime defaults from one config blob.
    ///
    /// Entrypoint then cmd are appended to `exec`. For the other fields
    /// the first value seen wins.
    pub fn merge(&mut self, config: &ImageRuntimeConfig) {
        if let Some(entrypoint) = &config.entrypoint {
            self.exec.extend(entrypoint.iter().cloned());
        }
        if let Some(cmd) = &config.cmd {
            self.exec.extend(cmd.iter().cloned());
        }

        if self.working_directory.is_empty() {
            if let Some(dir) = config.working_dir.as_deref().filter(|d| !d.is_empty()) {
                self.working_directory = dir.to_string();
            }
        }

        for entry in &config.env {
            match entry.split_once('=') {
                Some((key, value)) if !key.is_empty() => {
                    self.environment
                        .entry(key.to_string())
                        .or_insert_with(|| value.to_string());
                }
                _ => tracing::debug!(entry = %entry, "Skipping malformed environment entry"),
            }
        }

        for spec in &config.exposed_ports {
            match parse_exposed_port(spec) {
                Some(port) => {
                    self.ports.entry(spec.clone()).or_insert(port);
                }
                None => tracing::warn!(port = %spec, "Skipping unparseable exposed port"),
            }
        }

        for path in &config.volumes {
            self.mount_points
                .entry(path.clone())
                .or_insert_with(|| volume_id(path));
        }
    }

    /// Read a sidecar file.
    pub fn read_sidecar(path: &Path) -> std::result::Result<Self, SidecarError> {
        let data = std::fs::read(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => SidecarError::NotFound,
            _ => SidecarError::Io(e),
        })?;

        serde_json::from_slice(&data).map_err(|e| SidecarError::Corrupt(e.to_string()))
    }

    /// Write the sidecar atomically (write tmp, rename).
    pub fn write_sidecar(&self, path: &Path) -> Result<()> {
        let data = serde_json::to_vec_pretty(self)?;
        let tmp_path = path.with_extension("json.tmp");

        std::fs::write(&tmp_path, &data).map_err(|e| StowageError::PersistenceFailed {
            path: tmp_path.clone(),
            message: e.to_string(),
        })?;
        std::fs::rename(&tmp_path, path).map_err(|e| {
            let _ = std::fs::remove_file(&tmp_path);
            StowageError::PersistenceFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            }
        })
    }
}

/// Parse an exposed port spec (`80/tcp`, `53/udp`, `8080`).
fn parse_exposed_port(spec: &str) -> Option<ImagePort> {
    let (port, protocol) = match spec.split_once('/') {
        Some((port, protocol)) if !protocol.is_empty() => (port, protocol),
        Some((port, _)) => (port, "tcp"),
        None => (spec, "tcp"),
    };
    Some(ImagePort {
        protocol: protocol.to_lowercase(),
        port: port.trim().parse().ok()?,
    })
}

/// Volume id for a container path: lower-cased, runs of characters outside
/// `[a-z0-9]` collapsed to `-`, leading and trailing `-` trimmed.
pub fn volume_id(path: &str) -> String {
    let mut id = String::with_capacity(path.len());
    for c in path.to_lowercase().chars() {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            id.push(c);
        } else if !id.ends_with('-') {
            id.push('-');
        }
    }
    id.trim_matches('-').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn exec_config(entrypoint: Option<&[&str]>, cmd: Option<&[&str]>) -> ImageRuntimeConfig {
        let to_vec = |v: &[&str]| v.iter().map(|s| s.to_string()).collect();
        ImageRuntimeConfig {
            entrypoint: entrypoint.map(to_vec),
            cmd: cmd.map(to_vec),
            ..Default::default()
        }
    }

    #[test]
    fn test_merge_entrypoint_before_cmd() {
        let mut meta = ImageMetadata::new("oci:/a", Path::new("/store/a"));
        meta.merge(&exec_config(Some(&["/bin/sh"]), Some(&["-c", "echo hi"])));
        assert_eq!(meta.exec, vec!["/bin/sh", "-c", "echo hi"]);
    }

    #[test]
    fn test_merge_appends_across_configs() {
        let mut meta = ImageMetadata::new("oci:/a", Path::new("/store/a"));
        meta.merge(&exec_config(Some(&["/a"]), None));
        meta.merge(&exec_config(None, Some(&["b"])));
        assert_eq!(meta.exec, vec!["/a", "b"]);
    }

    #[test]
    fn test_merge_extended_fields() {
        let mut meta = ImageMetadata::new("oci:/a", Path::new("/store/a"));
        meta.merge(&ImageRuntimeConfig {
            working_dir: Some("/app".to_string()),
            env: vec![
                "PATH=/usr/bin:/bin".to_string(),
                "EMPTY=".to_string(),
                "OPTS=a=b".to_string(),
                "NOVALUE".to_string(),
            ],
            exposed_ports: vec!["80/tcp".to_string(), "53/udp".to_string(), "x/tcp".to_string()],
            volumes: vec!["/var/lib/Data".to_string()],
            ..Default::default()
        });
        meta.merge(&ImageRuntimeConfig {
            working_dir: Some("/other".to_string()),
            env: vec!["PATH=/override".to_string()],
            ..Default::default()
        });

        assert_eq!(meta.working_directory, "/app");
        assert_eq!(meta.environment["PATH"], "/usr/bin:/bin");
        assert_eq!(meta.environment["EMPTY"], "");
        assert_eq!(meta.environment["OPTS"], "a=b");
        assert!(!meta.environment.contains_key("NOVALUE"));
        assert_eq!(
            meta.ports["80/tcp"],
            ImagePort { protocol: "tcp".to_string(), port: 80 }
        );
        assert_eq!(meta.ports["53/udp"].protocol, "udp");
        assert_eq!(meta.ports.len(), 2);
        assert_eq!(meta.mount_points["/var/lib/Data"], "var-lib-data");
    }

    #[test]
    fn test_parse_exposed_port_defaults_to_tcp() {
        assert_eq!(
            parse_exposed_port("8080"),
            Some(ImagePort { protocol: "tcp".to_string(), port: 8080 })
        );
        assert_eq!(parse_exposed_port("70000/tcp"), None);
    }

    #[test]
    fn test_volume_id() {
        assert_eq!(volume_id("/var/lib/Data"), "var-lib-data");
        assert_eq!(volume_id("/data//cache_dir/"), "data-cache-dir");
        assert_eq!(volume_id("/"), "");
    }

    #[test]
    fn test_sidecar_field_names() {
        let meta = ImageMetadata::new("oci:/images/alpine", Path::new("/store/x"));
        let value = serde_json::to_value(&meta).unwrap();
        let mut keys: Vec<&str> = value.as_object().unwrap().keys().map(|k| k.as_str()).collect();
        keys.sort();
        assert_eq!(
            keys,
            vec![
                "directory",
                "environment",
                "exec",
                "mountPoints",
                "name",
                "ports",
                "workingDirectory"
            ]
        );
    }

    #[test]
    fn test_sidecar_write_and_read() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("abc.json");

        let mut meta = ImageMetadata::new("oci:/images/alpine", &tmp.path().join("abc"));
        meta.merge(&exec_config(Some(&["/bin/busybox"]), None));
        meta.write_sidecar(&path).unwrap();

        assert!(!tmp.path().join("abc.json.tmp").exists());
        let loaded = ImageMetadata::read_sidecar(&path).unwrap();
        assert_eq!(loaded, meta);
    }

    #[test]
    fn test_read_sidecar_not_found() {
        let tmp = TempDir::new().unwrap();
        let result = ImageMetadata::read_sidecar(&tmp.path().join("missing.json"));
        assert!(matches!(result, Err(SidecarError::NotFound)));
    }

    #[test]
    fn test_read_sidecar_corrupt() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("bad.json");
        std::fs::write(&path, "{ not json").unwrap();

        let result = ImageMetadata::read_sidecar(&path);
        assert!(matches!(result, Err(SidecarError::Corrupt(_))));
    }

    #[test]
    fn test_read_sidecar_other_io() {
        // Reading a directory is an I/O error other than NotFound
        let tmp = TempDir::new().unwrap();
        let result = ImageMetadata::read_sidecar(tmp.path());
        assert!(matches!(result, Err(SidecarError::Io(_))));
    }

    #[test]
    fn test_read_sidecar_tolerates_missing_maps() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("old.json");
        std::fs::write(&path, r#"{"name":"docker:a","directory":"/s/a","exec":["/a"]}"#).unwrap();

        let meta = ImageMetadata::read_sidecar(&path).unwrap();
        assert_eq!(meta.exec, vec!["/a"]);
        assert!(meta.ports.is_empty());
    }
}
