//! Build tool collaborator.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use stowage_core::error::{Result, StowageError};

use crate::process::{ProcessInvocation, ProcessRunner};

/// Builds an image from a Dockerfile directory into the local daemon.
#[async_trait]
pub trait BuildTool: Send + Sync {
    /// Build the Dockerfile in `dockerfile_dir` and tag the result `tag`,
    /// running the tool with `context_dir` as its working directory.
    async fn build(&self, tag: &str, dockerfile_dir: &Path, context_dir: &Path) -> Result<()>;
}

/// [`BuildTool`] backed by `docker build`.
pub struct DockerBuildTool {
    runner: Arc<dyn ProcessRunner>,
    program: String,
}

impl DockerBuildTool {
    pub fn new(runner: Arc<dyn ProcessRunner>, program: impl Into<String>) -> Self {
        Self {
            runner,
            program: program.into(),
        }
    }

    fn invocation(&self, tag: &str, dockerfile_dir: &Path, context_dir: &Path) -> ProcessInvocation {
        ProcessInvocation::new(&self.program)
            .args(["build", "-t", tag, "--rm"])
            .arg(dockerfile_dir.display().to_string())
            .current_dir(context_dir)
    }
}

#[async_trait]
impl BuildTool for DockerBuildTool {
    async fn build(&self, tag: &str, dockerfile_dir: &Path, context_dir: &Path) -> Result<()> {
        let invocation = self.invocation(tag, dockerfile_dir, context_dir);
        let output = self.runner.run(&invocation).await?;
        if !output.success {
            return Err(StowageError::BuildFailed {
                tag: tag.to_string(),
                message: output.failure_message(),
            });
        }
        Ok(())
    }
}
