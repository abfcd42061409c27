//! Configuration loading and resolution.
//!
//! The optional TOML file supplies queue and player tuning; command-line values
//! win over file values, and anything left unset falls back to library defaults.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use iom_player::{PlayerConfig, QueueConfig};
use serde::Deserialize;

use crate::cli::Args;

/// Top-level server configuration loaded from TOML.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    pub queue: Option<QueueSection>,
    pub player: Option<PlayerSection>,
}

/// `[queue]` table.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QueueSection {
    pub persist_to_disk: Option<bool>,
    pub filename_prefix: Option<String>,
    pub filename_suffix: Option<String>,
    pub window_radius: Option<usize>,
    pub overcache_enabled: Option<bool>,
    pub overcache_size: Option<usize>,
    pub load_timeout_ms: Option<u64>,
    /// Relative paths are resolved against `--root`.
    pub spill_dir: Option<PathBuf>,
}

/// `[player]` table.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlayerSection {
    pub output_sample_rate: Option<u32>,
    pub resample_quality: Option<u8>,
    pub buffered_ms: Option<u64>,
}

impl ServerConfig {
    /// Load configuration from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let raw =
            std::fs::read_to_string(path).with_context(|| format!("read config {:?}", path))?;
        Self::parse(&raw).with_context(|| format!("parse config {:?}", path))
    }

    pub fn parse(raw: &str) -> Result<Self> {
        Ok(toml::from_str::<ServerConfig>(raw)?)
    }
}

/// Everything the runtime needs, with CLI overrides applied.
#[derive(Clone, Debug)]
pub struct ServerSettings {
    pub bind: SocketAddr,
    pub max_upload: usize,
    pub root: PathBuf,
    pub device: Option<String>,
    pub queue: QueueConfig,
    pub player: PlayerConfig,
}

impl ServerSettings {
    /// Merge `file` (if any) under `args`.
    pub fn resolve(args: &Args, file: ServerConfig) -> Self {
        let queue_file = file.queue.unwrap_or_default();
        let player_file = file.player.unwrap_or_default();

        let mut queue = QueueConfig::default();
        if let Some(v) = queue_file.persist_to_disk {
            queue.persist_to_disk = v;
        }
        if let Some(v) = queue_file.filename_prefix {
            queue.filename_prefix = v;
        }
        if let Some(v) = queue_file.filename_suffix {
            queue.filename_suffix = v;
        }
        if let Some(v) = queue_file.window_radius {
            queue.window_radius = v;
        }
        if let Some(v) = queue_file.overcache_enabled {
            queue.overcache_enabled = v;
        }
        if let Some(v) = queue_file.overcache_size {
            queue.overcache_size = v;
        }
        if let Some(ms) = queue_file.load_timeout_ms {
            queue.load_timeout = Duration::from_millis(ms);
        }
        queue.spill_dir = match queue_file.spill_dir {
            Some(dir) if dir.is_absolute() => dir,
            Some(dir) => args.root.join(dir),
            None => args.root.clone(),
        };

        let mut player = PlayerConfig::default();
        if let Some(v) = player_file.output_sample_rate {
            player.output_sample_rate = v;
        }
        if let Some(v) = player_file.resample_quality {
            player.resample_quality = v;
        }
        if let Some(ms) = args.buffer.or(player_file.buffered_ms) {
            player.buffered_time = Duration::from_millis(ms);
        }

        Self {
            bind: args.bind,
            max_upload: args.max_upload,
            root: args.root.clone(),
            device: args
                .device
                .as_deref()
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .map(str::to_string),
            queue,
            player,
        }
    }

    /// Directory served as static content.
    pub fn html_dir(&self) -> PathBuf {
        self.root.join("html")
    }
}
