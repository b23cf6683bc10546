#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

mod args;
mod routes;

use std::path::PathBuf;

use args::Args;
use clap::Parser;
use keel_config::Config;
use keel_server::Builder;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load configuration
    let home = args.home.clone().unwrap_or_else(|| PathBuf::from("."));
    let config = match args.config {
        Some(ref path) => Config::load(path)?,
        None => Config::discover(&home)?,
    };
    let config = config.apply_overrides(args.overrides());

    // Build server; logging comes up here
    let server = Builder::from_config(&config).register(routes::router()).build()?;

    match args.config {
        Some(ref path) => tracing::info!(config_path = %path.display(), "starting keel"),
        None => tracing::info!(home = %config.server.home_dir.display(), "starting keel"),
    }

    server.serve().await?;

    tracing::info!("keel stopped");
    Ok(())
}
