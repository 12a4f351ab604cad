//! Build-if-absent orchestration.
//!
//! Images that can only come from a local Dockerfile are built into the
//! Docker daemon and then imported into the store like any other image.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use stowage_core::config::{PullPolicy, StowageConfig};
use stowage_core::error::Result;

use super::tool::{BuildTool, DockerBuildTool};
use crate::oci::metadata::ImageMetadata;
use crate::oci::store::ImageStore;
use crate::oci::transport::build_tag;
use crate::process::SystemProcessRunner;

/// Builds images that are not yet in the store.
pub struct ImageBuilder {
    store: Arc<ImageStore>,
    tool: Arc<dyn BuildTool>,
}

impl ImageBuilder {
    pub fn new(store: Arc<ImageStore>, tool: Arc<dyn BuildTool>) -> Self {
        Self { store, tool }
    }

    /// Builder running the configured build program.
    pub fn from_config(store: Arc<ImageStore>, config: &StowageConfig) -> Self {
        let tool = DockerBuildTool::new(Arc::new(SystemProcessRunner), config.build_program.clone());
        Self::new(store, Arc::new(tool))
    }

    pub fn store(&self) -> &Arc<ImageStore> {
        &self.store
    }

    /// Return the stored image for `reference`, building it first if absent.
    ///
    /// The build runs from the Dockerfile's directory with `context` as the
    /// working directory (defaulting to the Dockerfile's directory). The
    /// result is then imported with [`PullPolicy::Update`].
    pub async fn build_image(
        &self,
        reference: &str,
        dockerfile: &Path,
        context: Option<&Path>,
    ) -> Result<ImageMetadata> {
        match self.store.resolve(reference, PullPolicy::Never).await {
            Ok(image) => {
                tracing::debug!(reference = %reference, "Image already stored, skipping build");
                return Ok(image);
            }
            Err(e) => {
                tracing::debug!(reference = %reference, reason = %e, "Image not stored, building");
            }
        }

        let tag = build_tag(reference);
        let dockerfile_dir = dockerfile_dir(dockerfile);
        let context_dir = match context {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => dockerfile_dir.clone(),
        };

        tracing::info!(
            reference = %reference,
            tag = %tag,
            dockerfile = %dockerfile.display(),
            context = %context_dir.display(),
            "Building image"
        );
        self.tool
            .build(tag, &dockerfile_dir, &context_dir)
            .await
            .map_err(|e| e.for_image(reference))?;
        tracing::info!(reference = %reference, tag = %tag, "Image built");

        self.store.resolve(reference, PullPolicy::Update).await
    }
}

/// Parent directory of a Dockerfile; `.` for a bare file name.
fn dockerfile_dir(dockerfile: &Path) -> PathBuf {
    match dockerfile.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}
