//! OCI image resolution and storage.
//!
//! Image references are resolved to a local OCI layout plus runtime
//! metadata, fetching through an external copy tool when needed.
//!
//! # Resolution
//!
//! ```text
//! reference
//!   ├─ in-memory cache hit ──────────────────────────► ImageMetadata
//!   ├─ sidecar <root>/<name>.json ───────────────────► ImageMetadata
//!   └─ fetch (policy permitting)
//!        ├─ docker:, docker-daemon:
//!        │    copy → dir:<root>/.tmp/image-*  → normalize Docker config
//!        │    copy → oci:<root>/<name>
//!        └─ other transports
//!             copy → oci:<root>/<name>        → resolve manifest chain
//! ```

pub mod build;
pub mod copy;
pub mod docker;
#[cfg(test)]
pub(crate) mod fixtures;
pub mod image;
pub mod metadata;
pub mod naming;
pub mod store;
pub mod transport;

pub use build::{BuildTool, DockerBuildTool, ImageBuilder};
pub use copy::{ImageCopier, SkopeoCopier};
pub use docker::{load_docker_config, normalize_docker_config};
pub use image::{blob_path, resolve_manifest_chain, split_digest, ManifestChain};
pub use metadata::{ImageMetadata, ImagePort, ImageRuntimeConfig, SidecarError};
pub use naming::{directory_name, reference_for};
pub use store::ImageStore;
pub use transport::{build_tag, TransportFamily};
