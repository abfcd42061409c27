//! iom-server: a personal audio playback server.
//!
//! Clients upload tracks over HTTP and drive playback with play/pause/next/previous.
//! Tracks go into a rolling queue (small in-memory window, overflow cache, disk
//! spillover); an advance loop decodes, resamples and plays them through CPAL.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use iom_server::cli::Args;
use iom_server::config::{ServerConfig, ServerSettings};
use iom_server::runtime;

fn main() -> Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,iom_server=info,iom_player=info")
        }))
        .init();

    if args.list_devices {
        return runtime::list_devices();
    }

    let file = match args.config.as_deref() {
        Some(path) => ServerConfig::load(path)?,
        None => ServerConfig::default(),
    };
    let settings = ServerSettings::resolve(&args, file);
    runtime::run_server(settings)
}
