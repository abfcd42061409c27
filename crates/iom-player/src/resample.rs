//! Streaming resample stage.
//!
//! Uses Rubato to convert decoded interleaved `f32` audio from the source rate
//! to the configured output rate. Runs in a background thread and writes into a
//! bounded [`SampleQueue`] consumed by the output stage.

use std::sync::Arc;
use std::thread;

use anyhow::Result;
use audioadapter_buffers::direct::InterleavedSlice;
use rubato::{
    Async, FixedAsync, Indexing, Resampler, SincInterpolationParameters, SincInterpolationType,
    WindowFunction, calculate_cutoff,
};
use symphonia::core::audio::SignalSpec;

use crate::samples::{PopStrategy, SampleQueue, calc_max_buffered_samples};

/// Configuration for the streaming resampler stage.
#[derive(Clone, Copy, Debug)]
pub struct ResampleConfig {
    /// Input chunk size in frames for the steady-state loop.
    pub chunk_frames: usize,
    /// Target buffering (seconds) for the output queue.
    pub buffer_seconds: f32,
    /// 1 (cheapest) to 8 (best); scales the sinc length and oversampling.
    pub quality: u8,
}

/// Sinc parameters for a quality level.
fn sinc_params(quality: u8) -> SincInterpolationParameters {
    let q = quality.clamp(1, 8) as usize;
    let sinc_len = 32 * q;
    let window = WindowFunction::BlackmanHarris2;
    let interpolation = if q >= 4 {
        SincInterpolationType::Cubic
    } else {
        SincInterpolationType::Linear
    };
    SincInterpolationParameters {
        sinc_len,
        f_cutoff: calculate_cutoff(sinc_len, window),
        interpolation,
        oversampling_factor: 64 * q,
        window,
    }
}

/// Start a background resampler thread.
///
/// Reads from `srcq` at `src_spec.rate` and produces `dst_rate` samples into a new
/// queue. The output queue closes once `srcq` is drained; closing the output queue
/// early stops the thread and closes `srcq`. If the resampler cannot be built both
/// queues are closed and the track plays as silence.
pub fn start_resampler(
    srcq: Arc<SampleQueue>,
    src_spec: SignalSpec,
    dst_rate: u32,
    cfg: ResampleConfig,
) -> Result<Arc<SampleQueue>> {
    let src_rate = src_spec.rate;
    let channels = src_spec.channels.count();

    let max_buffered_samples = calc_max_buffered_samples(dst_rate, channels, cfg.buffer_seconds);
    let dstq = Arc::new(SampleQueue::new(channels, max_buffered_samples));

    let f_ratio = dst_rate as f64 / src_rate as f64;
    let params = sinc_params(cfg.quality);
    let chunk_in_frames = cfg.chunk_frames.max(1);

    let dstq_thread = dstq.clone();
    thread::spawn(move || {
        let mut resampler: Box<dyn Resampler<f32>> = match Async::<f32>::new_sinc(
            f_ratio,
            1.1,
            &params,
            chunk_in_frames,
            channels,
            FixedAsync::Input,
        ) {
            Ok(r) => Box::new(r),
            Err(e) => {
                tracing::error!("resampler init error: {e:#}");
                srcq.close();
                dstq_thread.close();
                return;
            }
        };

        let out_frames = resampler.output_frames_max().max(chunk_in_frames);
        let mut out_interleaved = vec![0.0f32; channels * out_frames];
        let mut indexing = Indexing {
            input_offset: 0,
            output_offset: 0,
            active_channels_mask: None,
            partial_len: None,
        };

        loop {
            let Some(interleaved) = srcq.pop(PopStrategy::BlockingExact {
                frames: chunk_in_frames,
            }) else {
                break;
            };
            indexing.partial_len = None;
            if !process_chunk(
                resampler.as_mut(),
                &interleaved,
                channels,
                chunk_in_frames,
                &mut out_interleaved,
                &indexing,
                &dstq_thread,
            ) {
                break;
            }
        }

        while !dstq_thread.is_done() {
            let Some(tail) = srcq.pop(PopStrategy::BlockingUpTo {
                max_frames: chunk_in_frames,
            }) else {
                break;
            };
            let tail_frames = tail.len() / channels;
            indexing.partial_len = Some(tail_frames);
            if !process_chunk(
                resampler.as_mut(),
                &tail,
                channels,
                tail_frames,
                &mut out_interleaved,
                &indexing,
                &dstq_thread,
            ) {
                break;
            }
        }

        srcq.close();
        dstq_thread.close();
    });

    Ok(dstq)
}

/// Resample one chunk into `dstq`. Returns `false` when the stage should stop.
fn process_chunk(
    resampler: &mut dyn Resampler<f32>,
    input: &[f32],
    channels: usize,
    frames: usize,
    out_interleaved: &mut [f32],
    indexing: &Indexing,
    dstq: &SampleQueue,
) -> bool {
    let input_adapter = match InterleavedSlice::new(input, channels, frames) {
        Ok(a) => a,
        Err(e) => {
            tracing::error!("interleaved slice (input) error: {e:#}");
            return false;
        }
    };

    let out_capacity_frames = out_interleaved.len() / channels;
    let mut output_adapter =
        match InterleavedSlice::new_mut(out_interleaved, channels, out_capacity_frames) {
            Ok(a) => a,
            Err(e) => {
                tracing::error!("interleaved slice (output) error: {e:#}");
                return false;
            }
        };

    let (_nbr_in, nbr_out) =
        match resampler.process_into_buffer(&input_adapter, &mut output_adapter, Some(indexing)) {
            Ok(x) => x,
            Err(e) => {
                tracing::error!("resampler process error: {e:#}");
                return false;
            }
        };

    let produced_samples = nbr_out * channels;
    if produced_samples > 0 {
        dstq.push_interleaved_blocking(&out_interleaved[..produced_samples]);
    }
    !dstq.is_done()
}
