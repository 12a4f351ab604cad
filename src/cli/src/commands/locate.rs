//! `stowage locate` command.

use std::path::Path;

use clap::Args;
use stowage_core::{StowageConfig, StowageError};
use stowage_runtime::oci::reference_for;

#[derive(Args)]
pub struct LocateArgs {
    /// Image reference, or a store entry name or path with --reverse
    pub target: String,

    /// Print the image reference a store directory or sidecar belongs to
    #[arg(long)]
    pub reverse: bool,
}

pub async fn execute(
    args: LocateArgs,
    config: &StowageConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", locate(&args, config)?);
    Ok(())
}

fn locate(args: &LocateArgs, config: &StowageConfig) -> Result<String, Box<dyn std::error::Error>> {
    if args.reverse {
        let name = Path::new(&args.target)
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or(&args.target);
        let name = name.strip_suffix(".json").unwrap_or(name);
        return reference_for(name)
            .ok_or_else(|| format!("{:?} is not a store entry name", args.target).into());
    }

    if args.target.is_empty() {
        return Err(StowageError::InvalidReference(args.target.clone()).into());
    }
    let store = super::open_image_store(config)?;
    Ok(store.image_directory(&args.target).display().to_string())
}
