//! Shared application state.
//!
//! One [`AppState`] is built by the composition root and handed to every handler.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use iom_player::Player;

pub struct AppState {
    pub player: Arc<Player>,
    /// Upper bound on a single upload body.
    pub max_upload: usize,
    requests: AtomicU64,
    started: Instant,
}

impl AppState {
    pub fn new(player: Arc<Player>, max_upload: usize) -> Self {
        Self {
            player,
            max_upload,
            requests: AtomicU64::new(0),
            started: Instant::now(),
        }
    }

    /// Count a handled request. Returns the new total.
    pub fn count_request(&self) -> u64 {
        self.requests.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn request_count(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }
}
