//! Image copy collaborator.
//!
//! Transferring and verifying image content between transports is
//! delegated to an [`ImageCopier`]. The default implementation shells out
//! to `skopeo copy` with the configured trust policy.

use std::sync::Arc;

use async_trait::async_trait;
use stowage_core::config::TrustPolicy;
use stowage_core::error::{Result, StowageError};

use crate::process::{ProcessInvocation, ProcessRunner};

/// Copies an image between two transport-addressed locations.
#[async_trait]
pub trait ImageCopier: Send + Sync {
    /// Copy `source` to `destination` (e.g. `docker:alpine:3` → `oci:/store/x`).
    async fn copy_image(&self, source: &str, destination: &str) -> Result<()>;
}

/// [`ImageCopier`] backed by the `skopeo` command-line tool.
pub struct SkopeoCopier {
    runner: Arc<dyn ProcessRunner>,
    program: String,
    trust_policy: TrustPolicy,
}

impl SkopeoCopier {
    /// Create a copier running `program` with a fixed trust policy.
    pub fn new(
        runner: Arc<dyn ProcessRunner>,
        program: impl Into<String>,
        trust_policy: TrustPolicy,
    ) -> Self {
        Self {
            runner,
            program: program.into(),
            trust_policy,
        }
    }

    /// Build the `skopeo copy` invocation. Policy flags are global options
    /// and go before the subcommand.
    fn invocation(&self, source: &str, destination: &str) -> ProcessInvocation {
        let inv = ProcessInvocation::new(&self.program);
        let inv = match &self.trust_policy {
            TrustPolicy::Default => inv,
            TrustPolicy::File(path) => inv.arg("--policy").arg(path.display().to_string()),
            TrustPolicy::InsecureAcceptAnything => inv.arg("--insecure-policy"),
        };
        inv.args(["copy", source, destination])
    }
}

#[async_trait]
impl ImageCopier for SkopeoCopier {
    async fn copy_image(&self, source: &str, destination: &str) -> Result<()> {
        let invocation = self.invocation(source, destination);
        tracing::debug!(
            source = %source,
            destination = %destination,
            "Copying image"
        );

        let output = self.runner.run(&invocation).await?;
        if !output.success {
            return Err(StowageError::FetchFailed {
                source_ref: source.to_string(),
                destination: destination.to_string(),
                message: output.failure_message(),
            });
        }
        Ok(())
    }
}
