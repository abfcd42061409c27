//! Playback coordinator.
//!
//! [`Player`] owns the rolling queue and the output. Control calls (play/pause/next/
//! previous) are cheap and non-blocking from the caller's point of view; the actual
//! work runs on an advance loop thread that reacts to single-slot signals:
//!
//! - `Advance`: move the queue forward and start the new current item
//! - `Replay`: start the current item again (after a backward step)
//! - `Finished(gen)`: the output drained stream `gen`; advance if it is still current
//!
//! The loop is spawned by [`Player::play`] and exits once the queue runs out.

use std::io::Read;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, Sender, bounded};

use crate::config::{PlayerConfig, QueueConfig};
use crate::decode::decode_source;
use crate::error::QueueResult;
use crate::output::{AudioOutput, TrackInfo};
use crate::resample::{ResampleConfig, start_resampler};
use crate::rolling::RollingQueue;
use crate::source::ByteSource;
use crate::status::PlayerStatus;

/// How long a control call waits for the loop to accept a signal.
const SIGNAL_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Signal {
    Advance,
    Replay,
    Finished(u64),
    Stop,
}

/// Session-wide playback coordinator.
pub struct Player {
    shared: Arc<Shared>,
}

struct Shared {
    config: PlayerConfig,
    queue: Mutex<RollingQueue>,
    output: Mutex<Box<dyn AudioOutput>>,
    signal_tx: Sender<Signal>,
    signal_rx: Receiver<Signal>,
    paused: AtomicBool,
    handling: AtomicBool,
    output_initialized: AtomicBool,
    closed: AtomicBool,
    generation: AtomicU64,
    now: Mutex<NowPlaying>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

#[derive(Default)]
struct NowPlaying {
    track: Option<TrackInfo>,
    output_rate: Option<u32>,
    last_error: Option<String>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Step {
    Forward,
    Replay,
}

impl Player {
    pub fn new(
        queue_config: QueueConfig,
        config: PlayerConfig,
        output: Box<dyn AudioOutput>,
    ) -> Self {
        let (signal_tx, signal_rx) = bounded(1);
        Self {
            shared: Arc::new(Shared {
                config,
                queue: Mutex::new(RollingQueue::new(queue_config)),
                output: Mutex::new(output),
                signal_tx,
                signal_rx,
                paused: AtomicBool::new(false),
                handling: AtomicBool::new(false),
                output_initialized: AtomicBool::new(false),
                closed: AtomicBool::new(false),
                generation: AtomicU64::new(0),
                now: Mutex::new(NowPlaying::default()),
                worker: Mutex::new(None),
            }),
        }
    }

    /// Append a track. Returns its absolute queue index.
    pub fn enqueue(&self, item: Box<dyn ByteSource>) -> QueueResult<u64> {
        let index = self.shared.queue.lock().unwrap().append(item)?;
        tracing::debug!(index, "track enqueued");
        Ok(index)
    }

    /// Copy a transient reader (an upload body) into memory and append it.
    pub fn enqueue_copy<R: Read + ?Sized>(&self, reader: &mut R) -> QueueResult<u64> {
        let index = self.shared.queue.lock().unwrap().append_copy(reader)?;
        tracing::debug!(index, "track enqueued");
        Ok(index)
    }

    /// Resume if paused; start the advance loop if it is idle and something is queued.
    pub fn play(&self) {
        let shared = &self.shared;
        if shared.closed.load(Ordering::SeqCst) {
            return;
        }
        if shared.paused.swap(false, Ordering::SeqCst) {
            shared.output.lock().unwrap().set_paused(false);
            tracing::info!("playback resumed");
        }

        {
            let queue = shared.queue.lock().unwrap();
            if shared.handling.load(Ordering::SeqCst) || !queue.has_next() {
                return;
            }
            shared.handling.store(true, Ordering::SeqCst);
        }

        while shared.signal_rx.try_recv().is_ok() {}

        let loop_shared = shared.clone();
        let spawned = thread::Builder::new()
            .name("iom-advance".into())
            .spawn(move || advance_loop(loop_shared));
        match spawned {
            Ok(handle) => {
                *shared.worker.lock().unwrap() = Some(handle);
                tracing::info!("advance loop started");
                self.signal(Signal::Advance);
            }
            Err(e) => {
                shared.handling.store(false, Ordering::SeqCst);
                tracing::error!("failed to spawn advance loop: {e}");
            }
        }
    }

    /// Pause output. Idempotent.
    pub fn pause(&self) {
        if !self.shared.paused.swap(true, Ordering::SeqCst) {
            self.shared.output.lock().unwrap().set_paused(true);
            tracing::info!("playback paused");
        }
    }

    /// Ask the loop to move forward. The loop decides whether there is anything to move to.
    pub fn next(&self) {
        self.signal(Signal::Advance);
    }

    /// Step the queue back one item and replay what is then current.
    pub fn previous(&self) {
        {
            let mut queue = self.shared.queue.lock().unwrap();
            if !queue.has_previous() {
                return;
            }
            if let Err(e) = queue.previous() {
                tracing::warn!("previous failed: {e}");
                self.shared.now.lock().unwrap().last_error = Some(e.to_string());
                return;
            }
        }
        self.signal(Signal::Replay);
    }

    pub fn status(&self) -> PlayerStatus {
        let shared = &self.shared;
        let (index, queued) = {
            let queue = shared.queue.lock().unwrap();
            (queue.index(), queue.len())
        };
        let now = shared.now.lock().unwrap();
        PlayerStatus {
            index,
            queued,
            paused: shared.paused.load(Ordering::SeqCst),
            handling: shared.handling.load(Ordering::SeqCst),
            output_initialized: shared.output_initialized.load(Ordering::SeqCst),
            output_rate: now.output_rate,
            now_playing: now.track.clone(),
            last_error: now.last_error.clone(),
        }
    }

    /// Stop the loop, clear the output and close the queue (removing spill files).
    pub fn shutdown(&self) -> QueueResult<()> {
        let shared = &self.shared;
        if shared.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let _ = shared.signal_tx.try_send(Signal::Stop);
        let worker = shared.worker.lock().unwrap().take();
        if let Some(handle) = worker {
            if handle.join().is_err() {
                tracing::error!("advance loop panicked");
            }
        }
        shared.output.lock().unwrap().clear();
        let result = shared.queue.lock().unwrap().close();
        tracing::info!("player shut down");
        result
    }

    /// Deliver a signal to a running loop. Dropped with a warning otherwise.
    fn signal(&self, signal: Signal) {
        if !self.shared.handling.load(Ordering::SeqCst) {
            tracing::debug!(?signal, "advance loop idle, signal dropped");
            return;
        }
        if let Err(e) = self.shared.signal_tx.send_timeout(signal, SIGNAL_TIMEOUT) {
            tracing::warn!(?signal, "advance loop did not accept signal: {e}");
        }
    }
}

fn advance_loop(shared: Arc<Shared>) {
    while let Ok(signal) = shared.signal_rx.recv() {
        if shared.closed.load(Ordering::SeqCst) {
            break;
        }
        let step = match signal {
            Signal::Advance => Step::Forward,
            Signal::Finished(generation)
                if generation == shared.generation.load(Ordering::SeqCst) =>
            {
                Step::Forward
            }
            Signal::Finished(_) => continue,
            Signal::Replay => Step::Replay,
            Signal::Stop => break,
        };

        if step == Step::Forward && shared.finish_if_exhausted() {
            tracing::info!("queue finished");
            return;
        }

        if let Err(e) = shared.start_item(step) {
            tracing::warn!("track failed: {e:#}");
            shared.output.lock().unwrap().clear();
            shared.now.lock().unwrap().last_error = Some(format!("{e:#}"));
        }
    }

    shared.output.lock().unwrap().clear();
    shared.handling.store(false, Ordering::SeqCst);
    tracing::info!("advance loop stopped");
}

impl Shared {
    /// Enter the terminal state when nothing follows the current item.
    ///
    /// Checked under the queue lock so a concurrent `play` either sees the loop
    /// running or sees it gone, never a loop about to exit.
    fn finish_if_exhausted(&self) -> bool {
        let queue = self.queue.lock().unwrap();
        if queue.has_next() {
            return false;
        }
        self.output.lock().unwrap().clear();
        self.handling.store(false, Ordering::SeqCst);
        drop(queue);
        true
    }

    /// Move (or stay) in the queue, then decode, resample and hand the item to the output.
    fn start_item(&self, step: Step) -> Result<()> {
        let (index, track) = {
            let mut queue = self.queue.lock().unwrap();
            let source = match step {
                Step::Forward => queue.next()?,
                Step::Replay => queue.now()?,
            };
            let track = decode_source(source, self.config.stage_buffer_seconds())
                .context("decode")?;
            let index = queue.index().unwrap_or_default();
            (index, track)
        };

        let info = TrackInfo {
            index,
            format: track.format,
            source_rate: track.spec.rate,
            source_channels: track.spec.channels.count(),
        };
        tracing::info!(
            index,
            format = ?info.format,
            rate = info.source_rate,
            channels = info.source_channels,
            codec = track.codec.as_deref().unwrap_or("unknown"),
            duration_ms = ?track.duration_ms,
            "starting track"
        );

        let mut output = self.output.lock().unwrap();
        let output_rate = self.ensure_output(&mut **output)?;

        let samples = if track.spec.rate == output_rate {
            track.samples
        } else {
            start_resampler(
                track.samples,
                track.spec,
                output_rate,
                ResampleConfig {
                    chunk_frames: self.config.chunk_frames,
                    buffer_seconds: self.config.stage_buffer_seconds(),
                    quality: self.config.resample_quality,
                },
            )
            .context("start resampler")?
        };

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let done_tx = self.signal_tx.clone();
        let on_done = Box::new(move || {
            if done_tx.try_send(Signal::Finished(generation)).is_err() {
                tracing::debug!(generation, "completion not delivered, signal pending");
            }
        });

        output.clear();
        output.set_paused(self.paused.load(Ordering::SeqCst));
        output.play(samples, info.clone(), on_done)?;
        drop(output);

        let mut now = self.now.lock().unwrap();
        now.track = Some(info);
        now.last_error = None;
        Ok(())
    }

    /// Initialize the output the first time a track is ready. Returns the output rate.
    fn ensure_output(&self, output: &mut dyn AudioOutput) -> Result<u32> {
        if self.output_initialized.load(Ordering::SeqCst) {
            if let Some(rate) = self.now.lock().unwrap().output_rate {
                return Ok(rate);
            }
        }
        let rate = output
            .init(self.config.output_sample_rate, self.config.buffer_frames())
            .context("initialize output")?;
        self.output_initialized.store(true, Ordering::SeqCst);
        self.now.lock().unwrap().output_rate = Some(rate);
        tracing::info!(rate, "output initialized");
        Ok(rate)
    }
}
