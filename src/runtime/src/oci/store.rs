//! Disk-based image store with a process-lifetime cache.
//!
//! Each resolved image lives under the image root as an OCI layout plus a
//! JSON sidecar describing its runtime metadata:
//!
//! ```text
//! <imageRoot>/
//! ├── <base64url(reference)>/        (OCI layout)
//! │   ├── index.json
//! │   └── blobs/<algorithm>/<digest>
//! ├── <base64url(reference)>.json    (ImageMetadata sidecar)
//! └── .tmp/                          (fetch staging area)
//! ```
//!
//! Resolution consults the in-memory map first, then the sidecar, and only
//! then fetches through the [`ImageCopier`], as the [`PullPolicy`] allows.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use stowage_core::config::{PullPolicy, StowageConfig};
use stowage_core::error::{Result, StowageError};
use tokio::sync::{Mutex, RwLock};

use super::copy::{ImageCopier, SkopeoCopier};
use super::docker::normalize_docker_config;
use super::image::resolve_manifest_chain;
use super::metadata::{ImageMetadata, SidecarError};
use super::naming::directory_name;
use super::transport::{dir_transport, oci_transport, TransportFamily};
use crate::process::SystemProcessRunner;

/// Scratch directory under the image root. The leading dot keeps it out of
/// the base64url namespace used for image directories.
const TMP_DIR_NAME: &str = ".tmp";

/// Outcome of looking for a usable local copy.
enum LocalImage {
    Found(ImageMetadata),
    Missing(String),
}

/// Image store with an in-memory cache in front of the on-disk layouts.
pub struct ImageStore {
    /// Root directory for image storage
    image_root: PathBuf,
    /// Copy collaborator
    copier: Arc<dyn ImageCopier>,
    /// Policy used by [`ImageStore::image`]
    pull_policy: PullPolicy,
    /// In-memory cache: reference → metadata
    images: RwLock<HashMap<String, ImageMetadata>>,
    /// One lock per reference so a fetch runs at most once at a time
    fetch_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl ImageStore {
    /// Create a new image store.
    ///
    /// Creates the image root if it doesn't exist. The root is made
    /// absolute so persisted `directory` paths are absolute.
    pub fn new(
        image_root: &Path,
        copier: Arc<dyn ImageCopier>,
        pull_policy: PullPolicy,
    ) -> Result<Self> {
        std::fs::create_dir_all(image_root).map_err(|e| StowageError::PersistenceFailed {
            path: image_root.to_path_buf(),
            message: format!("failed to create image root: {}", e),
        })?;
        let image_root =
            std::fs::canonicalize(image_root).map_err(|e| StowageError::PersistenceFailed {
                path: image_root.to_path_buf(),
                message: format!("failed to resolve image root: {}", e),
            })?;

        Ok(Self {
            image_root,
            copier,
            pull_policy,
            images: RwLock::new(HashMap::new()),
            fetch_locks: Mutex::new(HashMap::new()),
        })
    }

    /// Create a store that copies with `skopeo` as configured.
    pub fn from_config(config: &StowageConfig) -> Result<Self> {
        let copier = SkopeoCopier::new(
            Arc::new(SystemProcessRunner),
            config.copy_program.clone(),
            config.trust_policy.clone(),
        );
        Self::new(&config.image_root, Arc::new(copier), config.pull_policy)
    }

    /// Get the image root path.
    pub fn image_root(&self) -> &Path {
        &self.image_root
    }

    /// Policy used by [`ImageStore::image`].
    pub fn pull_policy(&self) -> PullPolicy {
        self.pull_policy
    }

    /// OCI layout directory of a reference.
    pub fn image_directory(&self, reference: &str) -> PathBuf {
        self.image_root.join(directory_name(reference))
    }

    /// Sidecar path of a reference.
    pub fn sidecar_path(&self, reference: &str) -> PathBuf {
        self.image_root
            .join(format!("{}.json", directory_name(reference)))
    }

    /// Metadata already resolved by this store, if any.
    pub async fn cached(&self, reference: &str) -> Option<ImageMetadata> {
        self.images.read().await.get(reference).cloned()
    }

    /// Resolve with the store's default pull policy.
    pub async fn image(&self, reference: &str) -> Result<ImageMetadata> {
        self.resolve(reference, self.pull_policy).await
    }

    /// Resolve an image reference to local metadata.
    ///
    /// An image resolved earlier in this process is returned as-is whatever
    /// the policy. Otherwise:
    ///
    /// - `Never` loads the local copy or fails without writing anything
    /// - `New` loads the local copy, fetching only if it is unusable
    /// - `Update` always fetches, replacing any local copy
    pub async fn resolve(&self, reference: &str, policy: PullPolicy) -> Result<ImageMetadata> {
        if reference.is_empty() {
            return Err(StowageError::InvalidReference(reference.to_string()));
        }

        if let Some(image) = self.cached(reference).await {
            tracing::debug!(reference = %reference, "Using cached image");
            return Ok(image);
        }

        let lock = self.fetch_lock(reference).await;
        let result = {
            let _guard = lock.lock().await;
            self.resolve_locked(reference, policy).await
        };
        self.release_fetch_lock(reference, lock).await;
        result
    }

    /// Resolve while holding the reference's fetch lock.
    async fn resolve_locked(&self, reference: &str, policy: PullPolicy) -> Result<ImageMetadata> {
        // A concurrent caller may have resolved it while we waited
        if let Some(image) = self.cached(reference).await {
            return Ok(image);
        }

        let image = self
            .resolve_uncached(reference, policy)
            .await
            .map_err(|e| e.for_image(reference))?;

        self.images
            .write()
            .await
            .insert(reference.to_string(), image.clone());
        Ok(image)
    }

    async fn resolve_uncached(&self, reference: &str, policy: PullPolicy) -> Result<ImageMetadata> {
        let directory = self.image_directory(reference);

        if policy != PullPolicy::Update {
            match self.load_local(reference, &directory)? {
                LocalImage::Found(image) => {
                    tracing::debug!(
                        reference = %reference,
                        directory = %directory.display(),
                        "Loaded image from local store"
                    );
                    return Ok(image);
                }
                LocalImage::Missing(reason) if policy == PullPolicy::Never => {
                    return Err(StowageError::LocalImageUnavailable {
                        reference: reference.to_string(),
                        reason,
                    });
                }
                LocalImage::Missing(reason) => {
                    tracing::debug!(reference = %reference, reason = %reason, "Image not in local store");
                }
            }
        }

        tracing::info!(reference = %reference, policy = %policy, "Fetching image");
        let image = self.fetch(reference, &directory).await?;
        image.write_sidecar(&self.sidecar_path(reference))?;

        tracing::info!(
            reference = %reference,
            directory = %directory.display(),
            exec = ?image.exec,
            "Image stored"
        );
        Ok(image)
    }

    /// Look for a usable local copy.
    ///
    /// Only I/O failures other than "not found" are errors; anything else
    /// that makes the local copy unusable is a miss.
    fn load_local(&self, reference: &str, directory: &Path) -> Result<LocalImage> {
        let sidecar = self.sidecar_path(reference);
        let has_index = directory.join("index.json").is_file();

        match ImageMetadata::read_sidecar(&sidecar) {
            Ok(image) if image.name != reference => Ok(LocalImage::Missing(format!(
                "sidecar {} belongs to {:?}",
                sidecar.display(),
                image.name
            ))),
            Ok(_) if !has_index => {
                tracing::warn!(
                    reference = %reference,
                    directory = %directory.display(),
                    "Sidecar present but image layout has no index.json"
                );
                Ok(LocalImage::Missing("image layout has no index.json".to_string()))
            }
            Ok(image) if image.directory != directory => {
                // Image root was moved or mounted elsewhere since the sidecar was written
                let image = ImageMetadata {
                    directory: directory.to_path_buf(),
                    ..image
                };
                if let Err(e) = image.write_sidecar(&sidecar) {
                    tracing::warn!(
                        reference = %reference,
                        error = %e,
                        "Failed to rewrite sidecar for relocated image"
                    );
                }
                Ok(LocalImage::Found(image))
            }
            Ok(image) => Ok(LocalImage::Found(image)),
            Err(SidecarError::NotFound) if has_index => {
                // Layout without sidecar: rebuild metadata from the manifest chain
                let mut image = ImageMetadata::new(reference, directory);
                match resolve_manifest_chain(directory, &mut image) {
                    Ok(()) => {
                        image.write_sidecar(&sidecar)?;
                        Ok(LocalImage::Found(image))
                    }
                    Err(e) => {
                        tracing::warn!(
                            reference = %reference,
                            error = %e,
                            "Local image layout is unusable"
                        );
                        Ok(LocalImage::Missing(format!("local image layout unusable: {}", e)))
                    }
                }
            }
            Err(SidecarError::NotFound) => {
                Ok(LocalImage::Missing("not in local store".to_string()))
            }
            Err(SidecarError::Corrupt(message)) => {
                tracing::warn!(
                    reference = %reference,
                    sidecar = %sidecar.display(),
                    error = %message,
                    "Ignoring corrupt image sidecar"
                );
                Ok(LocalImage::Missing(format!("corrupt sidecar: {}", message)))
            }
            Err(SidecarError::Io(e)) => Err(StowageError::PersistenceFailed {
                path: sidecar,
                message: e.to_string(),
            }),
        }
    }

    /// Fetch an image and install it at `directory`.
    ///
    /// Content is copied into a staging directory under `.tmp` and only
    /// replaces the existing layout once it has been fully resolved, so a
    /// failed fetch leaves any previous copy intact. The staging directory
    /// is removed on every exit path.
    async fn fetch(&self, reference: &str, directory: &Path) -> Result<ImageMetadata> {
        let staging = self.staging_dir()?;
        let layout = staging.path().join("oci");
        let destination = oci_transport(&layout);
        let mut image = ImageMetadata::new(reference, directory);

        if TransportFamily::of(reference).is_docker() {
            // Docker sources land in a dir: layout first so their config can be read
            let docker_dir = staging.path().join("docker");
            let docker_ref = dir_transport(&docker_dir);
            self.copy(reference, &docker_ref).await?;
            normalize_docker_config(&docker_dir, &mut image)?;
            self.copy(&docker_ref, &destination).await?;
        } else {
            self.copy(reference, &destination).await?;
            resolve_manifest_chain(&layout, &mut image)?;
        }

        let index = layout.join("index.json");
        if !index.is_file() {
            return Err(StowageError::ResolutionFailed {
                path: index,
                message: "copy produced no OCI index".to_string(),
            });
        }

        install_layout(&layout, directory, &staging.path().join("previous"))?;

        let staging_path = staging.path().to_path_buf();
        if let Err(e) = staging.close() {
            tracing::warn!(
                path = %staging_path.display(),
                error = %e,
                "Failed to remove staging directory"
            );
        }
        Ok(image)
    }

    /// Create a scoped staging directory under `<imageRoot>/.tmp`.
    fn staging_dir(&self) -> Result<tempfile::TempDir> {
        let tmp_root = self.image_root.join(TMP_DIR_NAME);
        std::fs::create_dir_all(&tmp_root).map_err(|e| StowageError::PersistenceFailed {
            path: tmp_root.clone(),
            message: format!("failed to create temp directory: {}", e),
        })?;
        tempfile::Builder::new()
            .prefix("image-")
            .tempdir_in(&tmp_root)
            .map_err(|e| StowageError::PersistenceFailed {
                path: tmp_root,
                message: format!("failed to create temp directory: {}", e),
            })
    }

    /// Run the copier, attaching source and destination to any error.
    async fn copy(&self, source: &str, destination: &str) -> Result<()> {
        self.copier
            .copy_image(source, destination)
            .await
            .map_err(|e| match e {
                e @ StowageError::FetchFailed { .. } => e,
                other => StowageError::FetchFailed {
                    source_ref: source.to_string(),
                    destination: destination.to_string(),
                    message: other.to_string(),
                },
            })
    }

    async fn fetch_lock(&self, reference: &str) -> Arc<Mutex<()>> {
        let mut locks = self.fetch_locks.lock().await;
        locks
            .entry(reference.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drop a reference's fetch lock once no other caller holds it.
    async fn release_fetch_lock(&self, reference: &str, lock: Arc<Mutex<()>>) {
        let mut locks = self.fetch_locks.lock().await;
        // Only the map and `lock` remain when nobody else is waiting
        let idle = Arc::strong_count(&lock) == 2;
        drop(lock);
        if idle {
            locks.remove(reference);
        }
    }
}

/// Move a fully fetched `layout` into place at `directory`.
///
/// Any existing layout is first moved aside to `previous` and restored if
/// the swap fails.
fn install_layout(layout: &Path, directory: &Path, previous: &Path) -> Result<()> {
    let had_previous = directory.exists();
    if had_previous {
        std::fs::rename(directory, previous).map_err(|e| StowageError::PersistenceFailed {
            path: directory.to_path_buf(),
            message: format!("failed to move aside existing image directory: {}", e),
        })?;
    }

    if let Err(e) = std::fs::rename(layout, directory) {
        if had_previous {
            if let Err(restore) = std::fs::rename(previous, directory) {
                tracing::warn!(
                    directory = %directory.display(),
                    error = %restore,
                    "Failed to restore previous image directory"
                );
            }
        }
        return Err(StowageError::PersistenceFailed {
            path: directory.to_path_buf(),
            message: format!("failed to install image directory: {}", e),
        });
    }
    Ok(())
}
