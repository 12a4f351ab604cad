//! CLI command definitions and dispatch.

mod build;
mod locate;
mod resolve;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use stowage_core::StowageConfig;
use stowage_runtime::ImageStore;

/// Stowage: resolve container image references into a local OCI store.
#[derive(Parser)]
#[command(name = "stowage", version, about)]
pub struct Cli {
    /// Config file (default: ~/.stowage/config.yaml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Image store root, overriding the config file
    #[arg(long, global = true)]
    pub image_root: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Subcommand)]
pub enum Command {
    /// Resolve an image reference and print its metadata as JSON
    Resolve(resolve::ResolveArgs),
    /// Build an image from a Dockerfile unless it is already stored
    Build(build::BuildArgs),
    /// Print the store directory of an image reference
    Locate(locate::LocateArgs),
}

/// Load the config file named on the command line (or the default one)
/// and apply command-line overrides.
pub fn load_config(cli: &Cli) -> Result<StowageConfig, Box<dyn std::error::Error>> {
    let mut config = match &cli.config {
        Some(path) => StowageConfig::load(path)?,
        None => StowageConfig::load_default()?,
    };
    if let Some(root) = &cli.image_root {
        config.image_root = root.clone();
    }
    Ok(config)
}

/// Open the image store described by `config`.
pub(crate) fn open_image_store(
    config: &StowageConfig,
) -> Result<Arc<ImageStore>, Box<dyn std::error::Error>> {
    Ok(Arc::new(ImageStore::from_config(config)?))
}

/// Dispatch a parsed CLI to the appropriate command handler.
pub async fn dispatch(cli: Cli, config: StowageConfig) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Command::Resolve(args) => resolve::execute(args, &config).await,
        Command::Build(args) => build::execute(args, &config).await,
        Command::Locate(args) => locate::execute(args, &config).await,
    }
}
