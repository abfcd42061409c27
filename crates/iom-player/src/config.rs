//! Queue and player tuning.

use std::path::PathBuf;
use std::time::Duration;

/// Spill-file name prefix used when the configured one is empty.
pub const DEFAULT_FILENAME_PREFIX: &str = "persisted";
/// Spill-file name suffix used when the configured one is empty.
pub const DEFAULT_FILENAME_SUFFIX: &str = ".file";

/// Rolling queue tuning. Read-only once the queue is built.
#[derive(Clone, Debug)]
pub struct QueueConfig {
    /// Spill items that roll out of the window behind the cursor, so they can be revisited.
    pub persist_to_disk: bool,
    /// Spill-file name prefix (`<prefix><index><suffix>`).
    pub filename_prefix: String,
    /// Spill-file name suffix.
    pub filename_suffix: String,
    /// Items kept in memory on each side of the current one.
    pub window_radius: usize,
    /// Whether the overcache is used at all.
    pub overcache_enabled: bool,
    /// Overcache slot count.
    pub overcache_size: usize,
    /// Upper bound on how long navigation waits for a background load.
    pub load_timeout: Duration,
    /// Directory holding spill files.
    pub spill_dir: PathBuf,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            persist_to_disk: true,
            filename_prefix: DEFAULT_FILENAME_PREFIX.to_string(),
            filename_suffix: DEFAULT_FILENAME_SUFFIX.to_string(),
            window_radius: 2,
            overcache_enabled: true,
            overcache_size: 4,
            load_timeout: Duration::from_secs(1),
            spill_dir: PathBuf::from("."),
        }
    }
}

impl QueueConfig {
    /// Apply the integrity rules: radius at least 1, non-empty file name parts.
    pub(crate) fn normalized(mut self) -> Self {
        if self.window_radius < 1 {
            self.window_radius = 1;
        }
        if self.filename_prefix.is_empty() {
            self.filename_prefix = DEFAULT_FILENAME_PREFIX.to_string();
        }
        if self.filename_suffix.is_empty() {
            self.filename_suffix = DEFAULT_FILENAME_SUFFIX.to_string();
        }
        if !self.overcache_enabled {
            self.overcache_size = 0;
        }
        self
    }
}

/// Playback tuning shared by the decode/resample/output stages.
#[derive(Clone, Debug)]
pub struct PlayerConfig {
    /// Output buffer length; sizes the device buffer and the stage queues.
    pub buffered_time: Duration,
    /// Sample rate every track is resampled to before output.
    pub output_sample_rate: u32,
    /// Resampler quality, 1 (cheapest) to 8 (best).
    pub resample_quality: u8,
    /// Decoder/resampler chunk size in frames.
    pub chunk_frames: usize,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            buffered_time: Duration::from_millis(100),
            output_sample_rate: 44_100,
            resample_quality: 4,
            chunk_frames: 1024,
        }
    }
}

impl PlayerConfig {
    /// Device buffer size in frames for the configured rate and buffered time.
    pub fn buffer_frames(&self) -> u32 {
        let frames = (self.output_sample_rate as f64 * self.buffered_time.as_secs_f64()).ceil();
        (frames as u32).max(1)
    }

    /// Stage queue target in seconds. Never shorter than one second so decode can run ahead.
    pub fn stage_buffer_seconds(&self) -> f32 {
        self.buffered_time.as_secs_f32().max(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalized_forces_radius_and_names() {
        let cfg = QueueConfig {
            window_radius: 0,
            filename_prefix: String::new(),
            filename_suffix: String::new(),
            ..QueueConfig::default()
        }
        .normalized();
        assert_eq!(cfg.window_radius, 1);
        assert_eq!(cfg.filename_prefix, "persisted");
        assert_eq!(cfg.filename_suffix, ".file");
    }

    #[test]
    fn normalized_disables_overcache_slots() {
        let cfg = QueueConfig {
            overcache_enabled: false,
            overcache_size: 8,
            ..QueueConfig::default()
        }
        .normalized();
        assert_eq!(cfg.overcache_size, 0);
    }

    #[test]
    fn buffer_frames_follows_rate_and_time() {
        let cfg = PlayerConfig {
            buffered_time: Duration::from_millis(100),
            output_sample_rate: 48_000,
            ..PlayerConfig::default()
        };
        assert_eq!(cfg.buffer_frames(), 4_800);
    }

    #[test]
    fn stage_buffer_seconds_has_floor() {
        let cfg = PlayerConfig::default();
        assert_eq!(cfg.stage_buffer_seconds(), 1.0);
    }
}
