//! Output capability.
//!
//! The coordinator talks to the sound device only through [`AudioOutput`]: one
//! initialization per session, then a sequence of clear/play calls, each carrying a
//! single stream and a completion callback.

use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;

use crate::samples::SampleQueue;
use crate::sniff::ContainerFormat;

/// Identifies the stream handed to [`AudioOutput::play`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TrackInfo {
    /// Absolute queue index of the item.
    pub index: u64,
    pub format: ContainerFormat,
    /// Native rate before resampling.
    pub source_rate: u32,
    pub source_channels: usize,
}

/// Invoked once when a stream is exhausted naturally.
///
/// Never invoked for a stream that was cleared first.
pub type DoneCallback = Box<dyn FnOnce() + Send + 'static>;

/// A sink holding at most one active stream.
pub trait AudioOutput: Send {
    /// Open the device. Returns the sample rate actually in use, which may differ from
    /// `sample_rate` if the device cannot run at it.
    fn init(&mut self, sample_rate: u32, buffer_frames: u32) -> Result<u32>;

    /// Start playing `samples` (interleaved, already at the initialized rate).
    fn play(&mut self, samples: Arc<SampleQueue>, info: TrackInfo, on_done: DoneCallback)
    -> Result<()>;

    /// Drop the active stream without firing its callback. No-op when idle.
    fn clear(&mut self);

    /// Output silence without draining the active stream while paused.
    fn set_paused(&mut self, paused: bool);
}
