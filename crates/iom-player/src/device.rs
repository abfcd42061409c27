//! Output device discovery, selection and the CPAL-backed [`AudioOutput`].
//!
//! Thin wrappers around CPAL for:
//! - listing available output devices
//! - selecting either the default device or a device by substring match
//! - picking a stream config and buffer size for a target rate

use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use anyhow::{Context, Result, anyhow};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{Receiver, Sender, bounded, select, unbounded};

use crate::output::{AudioOutput, DoneCallback, TrackInfo};
use crate::playback::{self, Deck, SharedDeck};
use crate::samples::SampleQueue;

/// Pick the first output device matching `needle` (case-insensitive), or the default device.
///
/// Returns an error if no suitable device is found.
pub fn pick_device(host: &cpal::Host, needle: Option<&str>) -> Result<cpal::Device> {
    let mut devices: Vec<cpal::Device> = host
        .output_devices()
        .context("No output devices")?
        .collect();

    if let Some(needle) = needle {
        if let Some(d) = devices.drain(..).find(|d| {
            d.description()
                .ok()
                .map(|n| matches_device_name(&n.name(), needle))
                .unwrap_or(false)
        }) {
            return Ok(d);
        }
        return Err(anyhow!("No output device matched: {needle}"));
    }

    host.default_output_device()
        .ok_or_else(|| anyhow!("No default output device"))
}

/// Choose the output config closest to `target_rate`.
///
/// Prefers the exact rate, then the highest supported rate below it, then the lowest
/// above it. Ties are broken by sample format (`f32` first).
pub fn pick_output_config(
    device: &cpal::Device,
    target_rate: u32,
) -> Result<cpal::SupportedStreamConfig> {
    let ranges: Vec<cpal::SupportedStreamConfigRange> =
        device.supported_output_configs()?.collect();

    let mut best: Option<(bool, u32, u8, cpal::SupportedStreamConfig)> = None;
    for range in ranges {
        let rate = pick_rate_for_range(range.min_sample_rate(), range.max_sample_rate(), target_rate);
        let below = rate <= target_rate;
        let format_rank = sample_format_rank(range.sample_format());
        let replace = match &best {
            None => true,
            Some((b_below, b_rate, b_rank, _)) => {
                is_better_candidate(below, rate, format_rank, *b_below, *b_rate, *b_rank)
            }
        };
        if replace {
            best = Some((below, rate, format_rank, range.with_sample_rate(rate)));
        }
    }

    best.map(|(_, _, _, cfg)| cfg)
        .ok_or_else(|| anyhow!("No supported output configs"))
}

/// Fixed buffer size closest to `requested` frames, clamped to what the device reports.
///
/// Returns `None` when the device only supports its default buffer size.
pub fn pick_buffer_size(
    config: &cpal::SupportedStreamConfig,
    requested: u32,
) -> Option<cpal::BufferSize> {
    match config.buffer_size() {
        cpal::SupportedBufferSize::Range { min, max } => {
            Some(cpal::BufferSize::Fixed(requested.clamp(*min, (*max).max(*min))))
        }
        cpal::SupportedBufferSize::Unknown => None,
    }
}

/// Print available output devices to stdout.
pub fn list_devices(host: &cpal::Host) -> Result<()> {
    let devices = host.output_devices().context("No output devices")?;
    for (i, d) in devices.enumerate() {
        println!("#{i}: {}", d.description()?);
    }
    Ok(())
}

fn pick_rate_for_range(min: u32, max: u32, target: u32) -> u32 {
    target.clamp(min, max.max(min))
}

fn sample_format_rank(format: cpal::SampleFormat) -> u8 {
    match format {
        cpal::SampleFormat::F32 => 0,
        cpal::SampleFormat::I32 => 1,
        cpal::SampleFormat::I16 => 2,
        cpal::SampleFormat::U16 => 3,
        _ => 10,
    }
}

fn is_better_candidate(
    below: bool,
    rate: u32,
    format_rank: u8,
    best_below: bool,
    best_rate: u32,
    best_rank: u8,
) -> bool {
    if below != best_below {
        below && !best_below
    } else if rate != best_rate {
        rate > best_rate
    } else {
        format_rank < best_rank
    }
}

fn matches_device_name(name: &str, needle: &str) -> bool {
    let needle = needle.trim();
    if needle.is_empty() {
        return false;
    }
    name.to_lowercase().contains(&needle.to_lowercase())
}

/// [`AudioOutput`] backed by a CPAL output stream.
///
/// The stream is opened once by [`AudioOutput::init`] on a dedicated thread, which
/// also runs completion callbacks off the real-time thread. Tracks are swapped
/// through a shared deck without rebuilding the stream.
pub struct CpalOutput {
    device: Option<String>,
    deck: SharedDeck,
    worker: Option<OutputWorker>,
}

struct OutputWorker {
    sample_rate: u32,
    shutdown: Sender<()>,
    join: JoinHandle<()>,
}

impl CpalOutput {
    /// `device` selects the output by substring; `None` uses the host default.
    pub fn new(device: Option<String>) -> Self {
        Self {
            device,
            deck: Arc::new(Mutex::new(Deck::default())),
            worker: None,
        }
    }
}

impl AudioOutput for CpalOutput {
    fn init(&mut self, sample_rate: u32, buffer_frames: u32) -> Result<u32> {
        if let Some(worker) = &self.worker {
            return Ok(worker.sample_rate);
        }

        let (ready_tx, ready_rx) = bounded::<Result<u32>>(1);
        let (shutdown_tx, shutdown_rx) = bounded::<()>(1);
        let deck = self.deck.clone();
        let needle = self.device.clone();

        let join = thread::Builder::new()
            .name("iom-output".into())
            .spawn(move || {
                let (done_tx, done_rx) = unbounded::<DoneCallback>();
                let opened = open_stream(needle.as_deref(), sample_rate, buffer_frames, &deck, done_tx);
                let stream = match opened {
                    Ok((stream, rate)) => {
                        let _ = ready_tx.send(Ok(rate));
                        stream
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                run_notifier(&done_rx, &shutdown_rx);
                drop(stream);
            })
            .context("spawn output thread")?;

        let rate = ready_rx
            .recv()
            .map_err(|_| anyhow!("output thread exited before opening the device"))??;
        self.worker = Some(OutputWorker {
            sample_rate: rate,
            shutdown: shutdown_tx,
            join,
        });
        Ok(rate)
    }

    fn play(
        &mut self,
        samples: Arc<SampleQueue>,
        info: TrackInfo,
        on_done: DoneCallback,
    ) -> Result<()> {
        if self.worker.is_none() {
            return Err(anyhow!("output device not initialized"));
        }
        self.deck.lock().unwrap().load(samples, info, on_done);
        Ok(())
    }

    fn clear(&mut self) {
        self.deck.lock().unwrap().eject();
    }

    fn set_paused(&mut self, paused: bool) {
        self.deck.lock().unwrap().set_paused(paused);
    }
}

impl Drop for CpalOutput {
    fn drop(&mut self) {
        self.deck.lock().unwrap().eject();
        if let Some(worker) = self.worker.take() {
            let _ = worker.shutdown.send(());
            let _ = worker.join.join();
        }
    }
}

fn open_stream(
    needle: Option<&str>,
    sample_rate: u32,
    buffer_frames: u32,
    deck: &SharedDeck,
    done_tx: Sender<DoneCallback>,
) -> Result<(cpal::Stream, u32)> {
    let host = cpal::default_host();
    let device = pick_device(&host, needle)?;
    let config = pick_output_config(&device, sample_rate)?;

    let mut stream_config: cpal::StreamConfig = config.clone().into();
    if let Some(size) = pick_buffer_size(&config, buffer_frames) {
        stream_config.buffer_size = size;
    }

    let device_name = device
        .description()
        .map(|d| d.name().to_string())
        .unwrap_or_else(|_| "unknown".to_string());
    tracing::info!(
        device = %device_name,
        rate = stream_config.sample_rate,
        channels = stream_config.channels,
        format = ?config.sample_format(),
        buffer = ?stream_config.buffer_size,
        "output device opened"
    );

    let stream = playback::build_output_stream(
        &device,
        &stream_config,
        config.sample_format(),
        deck,
        done_tx,
    )?;
    stream.play().context("start output stream")?;
    Ok((stream, stream_config.sample_rate))
}

/// Run completion callbacks until shutdown is requested.
fn run_notifier(done_rx: &Receiver<DoneCallback>, shutdown_rx: &Receiver<()>) {
    loop {
        select! {
            recv(done_rx) -> msg => match msg {
                Ok(done) => done(),
                Err(_) => break,
            },
            recv(shutdown_rx) -> _ => break,
        }
    }
}
