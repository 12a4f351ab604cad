//! Image build support.
//!
//! Images missing from the store can be produced from a Dockerfile by an
//! external build tool and then imported from the Docker daemon.
//!
//! ```text
//! stowage build docker-daemon:myapp:dev --file ./Dockerfile
//! ```

pub mod orchestrator;
pub mod tool;

pub use orchestrator::ImageBuilder;
pub use tool::{BuildTool, DockerBuildTool};
