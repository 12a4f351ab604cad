//! `stowage build` command: build an image from a Dockerfile if it is
//! not already stored, then import it.

use std::path::PathBuf;

use clap::Args;
use stowage_core::StowageConfig;
use stowage_runtime::ImageBuilder;

#[derive(Args)]
pub struct BuildArgs {
    /// Image reference to build (e.g., "docker-daemon:myapp:dev")
    pub reference: String,

    /// Path to the Dockerfile
    #[arg(short = 'f', long = "file")]
    pub file: PathBuf,

    /// Build context directory (default: the Dockerfile's directory)
    #[arg(long)]
    pub context: Option<PathBuf>,
}

pub async fn execute(
    args: BuildArgs,
    config: &StowageConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = super::open_image_store(config)?;
    let builder = ImageBuilder::from_config(store, config);

    let image = builder
        .build_image(&args.reference, &args.file, args.context.as_deref())
        .await?;
    println!("{}", serde_json::to_string_pretty(&image)?);

    Ok(())
}
