//! Decode stage.
//!
//! Reads a queued [`ByteSource`] into memory, sniffs its container from magic bytes,
//! then uses Symphonia to:
//! - probe the container with the sniffed extension as hint
//! - decode packets into interleaved `f32` samples
//! - push samples into a bounded [`SampleQueue`] from a background thread

use std::io::Cursor;
use std::sync::Arc;
use std::thread;

use anyhow::Result;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::CodecParameters;
use symphonia::core::{
    audio::SignalSpec, codecs::DecoderOptions, formats::FormatOptions, io::MediaSourceStream,
    meta::MetadataOptions, probe::Hint,
};

use crate::error::DecodeError;
use crate::samples::{SampleQueue, calc_max_buffered_samples};
use crate::sniff::{ContainerFormat, detect_container};
use crate::source::{ByteSource, read_all};

/// A track whose decoder thread is running.
pub struct DecodedTrack {
    /// Sniffed container.
    pub format: ContainerFormat,
    /// Native sample rate and channel layout.
    pub spec: SignalSpec,
    /// Decoded interleaved samples; closed on EOF or error.
    pub samples: Arc<SampleQueue>,
    /// Best-effort duration.
    pub duration_ms: Option<u64>,
    /// Best-effort codec label.
    pub codec: Option<String>,
}

/// Sniff and start decoding a queued item.
///
/// The source is rewound before it is read and left rewound afterwards.
pub fn decode_source(
    source: &mut dyn ByteSource,
    buffer_seconds: f32,
) -> Result<DecodedTrack, DecodeError> {
    let data = read_all(source)?;
    decode_bytes(data, buffer_seconds)
}

/// Sniff and start decoding an in-memory buffer.
pub fn decode_bytes(data: Vec<u8>, buffer_seconds: f32) -> Result<DecodedTrack, DecodeError> {
    let format = detect_container(&data).ok_or(DecodeError::UnsupportedFormat)?;

    let mut hint = Hint::new();
    hint.with_extension(format.extension());

    let mss = MediaSourceStream::new(Box::new(Cursor::new(data)), Default::default());
    let probed = symphonia::default::get_probe().format(
        &hint,
        mss,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;

    let reader = probed.format;
    let track = reader.default_track().ok_or(DecodeError::MissingTrack)?;
    let channels = track
        .codec_params
        .channels
        .ok_or(DecodeError::MissingParams("channels"))?;
    let rate = track
        .codec_params
        .sample_rate
        .ok_or(DecodeError::MissingParams("sample rate"))?;
    let spec = SignalSpec::new(rate, channels);

    let codec_params: CodecParameters = track.codec_params.clone();
    let duration_ms = duration_ms_from_codec_params(&codec_params);
    let codec = codec_name_from_params(&codec_params);

    let max_buffered_samples = calc_max_buffered_samples(rate, channels.count(), buffer_seconds);
    let samples = Arc::new(SampleQueue::new(channels.count(), max_buffered_samples));

    let samples_for_thread = samples.clone();
    thread::spawn(move || {
        if let Err(e) = decode_format_loop(reader, codec_params, &samples_for_thread) {
            tracing::error!("decoder thread error: {e:#}");
        }
        samples_for_thread.close();
    });

    Ok(DecodedTrack {
        format,
        spec,
        samples,
        duration_ms,
        codec,
    })
}

/// Decode packets and push interleaved `f32` into `samples` until EOF or close.
fn decode_format_loop(
    mut reader: Box<dyn symphonia::core::formats::FormatReader>,
    codec_params: CodecParameters,
    samples: &Arc<SampleQueue>,
) -> Result<()> {
    let mut decoder =
        symphonia::default::get_codecs().make(&codec_params, &DecoderOptions::default())?;

    loop {
        let packet = match reader.next_packet() {
            Ok(p) => p,
            Err(_) => break, // EOF
        };

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(_) => continue,
        };

        let mut sample_buf = SampleBuffer::<f32>::new(decoded.frames() as u64, *decoded.spec());
        sample_buf.copy_interleaved_ref(decoded);

        samples.push_interleaved_blocking(sample_buf.samples());
        if samples.is_done() {
            break;
        }
    }

    Ok(())
}

/// Best-effort duration in milliseconds from codec metadata.
fn duration_ms_from_codec_params(codec_params: &CodecParameters) -> Option<u64> {
    let frames = codec_params.n_frames?;
    let rate = codec_params.sample_rate? as u64;
    if rate == 0 {
        return None;
    }
    Some(frames.saturating_mul(1000) / rate)
}

fn codec_name_from_params(params: &CodecParameters) -> Option<String> {
    use symphonia::core::codecs::*;
    let name = match params.codec {
        CODEC_TYPE_FLAC => "FLAC",
        CODEC_TYPE_MP3 => "MP3",
        CODEC_TYPE_VORBIS => "VORBIS",
        CODEC_TYPE_PCM_S16LE | CODEC_TYPE_PCM_S16BE => "PCM_S16",
        CODEC_TYPE_PCM_S24LE | CODEC_TYPE_PCM_S24BE => "PCM_S24",
        CODEC_TYPE_PCM_S32LE | CODEC_TYPE_PCM_S32BE => "PCM_S32",
        CODEC_TYPE_PCM_F32LE | CODEC_TYPE_PCM_F32BE => "PCM_F32",
        _ => return None,
    };
    Some(name.to_string())
}
