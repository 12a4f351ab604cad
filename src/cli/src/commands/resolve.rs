//! `stowage resolve` command.

use clap::Args;
use stowage_core::{PullPolicy, StowageConfig};

#[derive(Args)]
pub struct ResolveArgs {
    /// Image reference with transport (e.g., "docker:alpine:3", "oci:/images/alpine")
    pub reference: String,

    /// Pull policy: never, new, or update (default: from config)
    #[arg(long)]
    pub pull: Option<PullPolicy>,
}

pub async fn execute(
    args: ResolveArgs,
    config: &StowageConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = super::open_image_store(config)?;
    let policy = args.pull.unwrap_or(config.pull_policy);

    let image = store.resolve(&args.reference, policy).await?;
    println!("{}", serde_json::to_string_pretty(&image)?);

    Ok(())
}
