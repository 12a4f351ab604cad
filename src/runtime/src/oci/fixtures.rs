//! Test fixtures: on-disk OCI and Docker layouts, fake collaborators.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use stowage_core::error::{Result, StowageError};

use super::copy::ImageCopier;
use super::docker::DOCKER_CONFIG_MEDIA_TYPE;

/// Encoded digest of the config blob written by [`write_docker_dir`].
pub const DOCKER_CONFIG_HEX: &str = "c0ffee00";

/// Runtime section of a config blob.
#[derive(Debug, Clone, Default)]
pub struct OciConfig {
    pub entrypoint: Option<Vec<String>>,
    pub cmd: Option<Vec<String>>,
    pub working_dir: Option<String>,
    pub env: Vec<String>,
    pub exposed_ports: Vec<String>,
    pub volumes: Vec<String>,
}

impl OciConfig {
    pub fn exec(entrypoint: Option<&[&str]>, cmd: Option<&[&str]>) -> Self {
        let to_vec = |v: &[&str]| v.iter().map(|s| s.to_string()).collect();
        Self {
            entrypoint: entrypoint.map(to_vec),
            cmd: cmd.map(to_vec),
            ..Default::default()
        }
    }

    /// The `config` object shared by OCI and Docker config blobs,
    /// or None when nothing is set.
    fn runtime_section(&self) -> Option<Value> {
        let mut section = Map::new();
        if let Some(entrypoint) = &self.entrypoint {
            section.insert("Entrypoint".into(), json!(entrypoint));
        }
        if let Some(cmd) = &self.cmd {
            section.insert("Cmd".into(), json!(cmd));
        }
        if let Some(dir) = &self.working_dir {
            section.insert("WorkingDir".into(), json!(dir));
        }
        if !self.env.is_empty() {
            section.insert("Env".into(), json!(self.env));
        }
        if !self.exposed_ports.is_empty() {
            let ports: Map<String, Value> =
                self.exposed_ports.iter().map(|p| (p.clone(), json!({}))).collect();
            section.insert("ExposedPorts".into(), Value::Object(ports));
        }
        if !self.volumes.is_empty() {
            let volumes: Map<String, Value> =
                self.volumes.iter().map(|v| (v.clone(), json!({}))).collect();
            section.insert("Volumes".into(), Value::Object(volumes));
        }
        (!section.is_empty()).then_some(Value::Object(section))
    }

    fn image_config(&self) -> Value {
        let mut config = json!({
            "architecture": "amd64",
            "os": "linux",
            "rootfs": { "type": "layers", "diff_ids": [] },
            "history": []
        });
        if let Some(section) = self.runtime_section() {
            config["config"] = section;
        }
        config
    }
}

/// Write a single-manifest OCI layout (`manifest0`, `config0`).
pub fn write_oci_image(dir: &Path, config: &OciConfig) {
    write_oci_index(dir, std::slice::from_ref(config));
}

/// Write an OCI layout whose index lists one manifest per config,
/// with blobs `manifest<i>` and `config<i>`.
pub fn write_oci_index(dir: &Path, configs: &[OciConfig]) {
    let blobs = dir.join("blobs/sha256");
    fs::create_dir_all(&blobs).unwrap();
    fs::write(dir.join("oci-layout"), r#"{"imageLayoutVersion":"1.0.0"}"#).unwrap();

    let mut manifests = Vec::new();
    for (i, config) in configs.iter().enumerate() {
        let config_content = config.image_config().to_string();
        fs::write(blobs.join(format!("config{}", i)), &config_content).unwrap();

        let manifest = json!({
            "schemaVersion": 2,
            "mediaType": "application/vnd.oci.image.manifest.v1+json",
            "config": {
                "mediaType": "application/vnd.oci.image.config.v1+json",
                "digest": format!("sha256:config{}", i),
                "size": config_content.len()
            },
            "layers": []
        })
        .to_string();
        fs::write(blobs.join(format!("manifest{}", i)), &manifest).unwrap();

        manifests.push(json!({
            "mediaType": "application/vnd.oci.image.manifest.v1+json",
            "digest": format!("sha256:manifest{}", i),
            "size": manifest.len()
        }));
    }

    let index = json!({
        "schemaVersion": 2,
        "mediaType": "application/vnd.oci.image.index.v1+json",
        "manifests": manifests
    });
    fs::write(dir.join("index.json"), index.to_string()).unwrap();
}

/// Write a Docker `dir:` layout with the given config media type.
pub fn write_docker_dir(dir: &Path, media_type: &str, config: &OciConfig) {
    fs::create_dir_all(dir).unwrap();

    let mut image = json!({ "architecture": "amd64", "os": "linux" });
    if let Some(section) = config.runtime_section() {
        image["config"] = section;
    }
    let image = image.to_string();
    fs::write(dir.join(format!("{}.tar", DOCKER_CONFIG_HEX)), &image).unwrap();

    let manifest = json!({
        "schemaVersion": 2,
        "mediaType": "application/vnd.docker.distribution.manifest.v2+json",
        "config": {
            "mediaType": media_type,
            "digest": format!("sha256:{}", DOCKER_CONFIG_HEX),
            "size": image.len()
        },
        "layers": []
    });
    fs::write(dir.join("manifest.json"), manifest.to_string()).unwrap();
}

/// Copier that materializes fixture layouts instead of transferring images.
///
/// `oci:<path>` destinations receive an OCI layout built from `config`;
/// `dir:<path>` destinations receive a Docker layout with `media_type`.
pub struct FakeCopier {
    pub config: OciConfig,
    pub media_type: String,
    /// Fail copies whose destination starts with this prefix
    pub fail_destination: Option<String>,
    calls: Mutex<Vec<(String, String)>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeCopier {
    pub fn new(config: OciConfig) -> Self {
        Self {
            config,
            media_type: DOCKER_CONFIG_MEDIA_TYPE.to_string(),
            fail_destination: None,
            calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn failing(config: OciConfig, destination_prefix: &str) -> Self {
        Self {
            fail_destination: Some(destination_prefix.to_string()),
            ..Self::new(config)
        }
    }

    /// `(source, destination)` of every copy, in order.
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }

    /// Highest number of copies that ran at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Local directories that `dir:` copies were written to.
    pub fn dir_destinations(&self) -> Vec<PathBuf> {
        self.calls()
            .iter()
            .filter_map(|(_, dest)| dest.strip_prefix("dir:").map(PathBuf::from))
            .collect()
    }
}

#[async_trait]
impl ImageCopier for FakeCopier {
    async fn copy_image(&self, source: &str, destination: &str) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push((source.to_string(), destination.to_string()));

        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);
        tokio::task::yield_now().await;
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if let Some(prefix) = &self.fail_destination {
            if destination.starts_with(prefix.as_str()) {
                return Err(StowageError::FetchFailed {
                    source_ref: source.to_string(),
                    destination: destination.to_string(),
                    message: "simulated copy failure".to_string(),
                });
            }
        }

        if let Some(path) = destination.strip_prefix("oci:") {
            write_oci_image(Path::new(path), &self.config);
        } else if let Some(path) = destination.strip_prefix("dir:") {
            write_docker_dir(Path::new(path), &self.media_type, &self.config);
        }
        Ok(())
    }
}
