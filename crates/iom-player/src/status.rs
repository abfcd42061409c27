use serde::Serialize;

use crate::output::TrackInfo;

/// Snapshot of the coordinator returned to the HTTP layer.
#[derive(Clone, Debug, Default, Serialize, PartialEq, Eq)]
pub struct PlayerStatus {
    /// Absolute index of the current queue item.
    pub index: Option<u64>,
    /// Items appended so far.
    pub queued: u64,
    pub paused: bool,
    /// Whether the advance loop is running.
    pub handling: bool,
    pub output_initialized: bool,
    /// Rate the output device is running at.
    pub output_rate: Option<u32>,
    /// Track handed to the output most recently.
    pub now_playing: Option<TrackInfo>,
    /// Last per-item failure; cleared when a track starts.
    pub last_error: Option<String>,
}
