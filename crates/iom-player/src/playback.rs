//! Playback stage (CPAL output stream).
//!
//! One output stream lives for the whole session. Tracks are swapped in and out of a
//! shared [`Deck`]; the real-time callback:
//! - refills a small local buffer from the active track without blocking
//! - applies basic channel mapping (mono↔stereo, best-effort otherwise)
//! - converts `f32` samples to the device sample format
//! - hands the track's completion callback to a notifier once it is drained

use std::sync::{Arc, Mutex};

use anyhow::{Result, anyhow};
use cpal::traits::DeviceTrait;
use crossbeam_channel::Sender;

use crate::output::{DoneCallback, TrackInfo};
use crate::samples::{PopStrategy, SampleQueue};

/// Frames pulled from the active track per refill.
const REFILL_MAX_FRAMES: usize = 1024;

/// State shared between the output owner and the audio callback.
#[derive(Default)]
pub(crate) struct Deck {
    active: Option<ActiveTrack>,
    paused: bool,
}

pub(crate) type SharedDeck = Arc<Mutex<Deck>>;

struct ActiveTrack {
    info: TrackInfo,
    samples: Arc<SampleQueue>,
    src: Vec<f32>,
    pos: usize,
    on_done: Option<DoneCallback>,
}

impl Deck {
    /// Replace the active track. The previous one is closed without completing.
    pub(crate) fn load(&mut self, samples: Arc<SampleQueue>, info: TrackInfo, on_done: DoneCallback) {
        self.eject();
        self.active = Some(ActiveTrack {
            info,
            samples,
            src: Vec::new(),
            pos: 0,
            on_done: Some(on_done),
        });
    }

    /// Drop the active track and close its queue so upstream stages stop.
    pub(crate) fn eject(&mut self) {
        if let Some(track) = self.active.take() {
            tracing::debug!(index = track.info.index, "output stream cleared");
            track.samples.close();
        }
    }

    pub(crate) fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }

    #[cfg(test)]
    fn active_index(&self) -> Option<u64> {
        self.active.as_ref().map(|t| t.info.index)
    }

    /// Fill `out` (interleaved, `channels_out` wide) from the active track.
    ///
    /// Returns the track's completion callback once it has been fully played; the
    /// track is unloaded at that point. Underruns and pauses produce silence.
    pub(crate) fn render(&mut self, out: &mut [f32], channels_out: usize) -> Option<DoneCallback> {
        out.fill(0.0);
        if self.paused || channels_out == 0 {
            return None;
        }
        let track = self.active.as_mut()?;

        let frames = out.len() / channels_out;
        for frame in 0..frames {
            if track.pos >= track.src.len() {
                track.pos = 0;
                track.src.clear();
                match track.samples.pop(PopStrategy::NonBlocking {
                    max_frames: REFILL_MAX_FRAMES,
                }) {
                    Some(v) => track.src = v,
                    None => break,
                }
            }
            for ch in 0..channels_out {
                out[frame * channels_out + ch] = next_sample_mapped(track, channels_out, ch);
            }
        }

        if track.pos >= track.src.len() && track.samples.is_finished() {
            let done = track.on_done.take();
            tracing::debug!(index = track.info.index, "output stream drained");
            self.active = None;
            return done;
        }
        None
    }
}

/// Build a CPAL output stream that plays whatever `deck` holds.
///
/// Completion callbacks are forwarded to `done_tx` instead of being run on the
/// real-time thread.
pub(crate) fn build_output_stream(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    sample_format: cpal::SampleFormat,
    deck: &SharedDeck,
    done_tx: Sender<DoneCallback>,
) -> Result<cpal::Stream> {
    match sample_format {
        cpal::SampleFormat::F32 => build_stream::<f32>(device, config, deck, done_tx),
        cpal::SampleFormat::I16 => build_stream::<i16>(device, config, deck, done_tx),
        cpal::SampleFormat::I32 => build_stream::<i32>(device, config, deck, done_tx),
        cpal::SampleFormat::U16 => build_stream::<u16>(device, config, deck, done_tx),
        other => Err(anyhow!("Unsupported sample format: {other:?}")),
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    deck: &SharedDeck,
    done_tx: Sender<DoneCallback>,
) -> Result<cpal::Stream>
where
    T: cpal::Sample + cpal::SizedSample + cpal::FromSample<f32>,
{
    let channels_out = config.channels as usize;
    let deck_cb = deck.clone();
    let mut scratch: Vec<f32> = Vec::new();

    let err_fn = |err| tracing::warn!("stream error: {err}");

    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _| {
            if scratch.len() < data.len() {
                scratch.resize(data.len(), 0.0);
            }
            let buf = &mut scratch[..data.len()];
            let done = deck_cb.lock().unwrap().render(buf, channels_out);
            for (dst, src) in data.iter_mut().zip(buf.iter()) {
                *dst = <T as cpal::Sample>::from_sample::<f32>(*src);
            }
            if let Some(done) = done {
                let _ = done_tx.send(done);
            }
        },
        err_fn,
        None,
    )?;

    Ok(stream)
}

/// Read one output sample for `dst_ch`, applying a simple channel mapping.
///
/// Mapping rules:
/// - mono → stereo: duplicate channel 0
/// - stereo → mono: average L/R
/// - other layouts: clamp to available channels
///
/// `track.pos` advances once per destination frame (after the last channel).
fn next_sample_mapped(track: &mut ActiveTrack, dst_channels: usize, dst_ch: usize) -> f32 {
    if track.pos >= track.src.len() {
        return 0.0;
    }

    let src_channels = track.samples.channels();
    let frame_start = track.pos;
    let get_src = |ch: usize| -> f32 {
        if ch < src_channels && frame_start + ch < track.src.len() {
            track.src[frame_start + ch]
        } else {
            0.0
        }
    };

    let out = match (src_channels, dst_channels) {
        (1, 1) => get_src(0),
        (2, 2) => get_src(dst_ch.min(1)),
        (2, 1) => 0.5 * (get_src(0) + get_src(1)),
        (1, 2) => get_src(0),
        _ => get_src(dst_ch.min(src_channels.saturating_sub(1))),
    };

    if dst_ch + 1 == dst_channels {
        track.pos += src_channels;
    }
    out
}
