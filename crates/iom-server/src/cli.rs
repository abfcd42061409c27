use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

/// Default cap on a single upload.
pub const DEFAULT_MAX_UPLOAD: usize = 256 * 1024 * 1024;

#[derive(Parser, Debug, Clone)]
#[command(name = "iom-server", version)]
pub struct Args {
    /// HTTP bind address, e.g. 0.0.0.0:8080
    #[arg(long, default_value = "0.0.0.0:8080")]
    pub bind: SocketAddr,

    /// Audio output buffer in milliseconds
    #[arg(long)]
    pub buffer: Option<u64>,

    /// Largest accepted upload in bytes
    #[arg(long, default_value_t = DEFAULT_MAX_UPLOAD)]
    pub max_upload: usize,

    /// Root directory: static files are served from <root>/html, spill files land here
    #[arg(long, default_value = ".")]
    pub root: PathBuf,

    /// Optional config file (TOML) with [queue] and [player] tables
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Use a specific output device by substring match
    #[arg(long)]
    pub device: Option<String>,

    /// List output devices and exit
    #[arg(long)]
    pub list_devices: bool,
}
