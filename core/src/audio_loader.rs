//! Stereo-preserving PCM decode via `symphonia`.
//!
//! `fingerprint-server`'s loader downmixes to mono on decode, which is fine
//! for that service's simplified analyzer but wrong here: the mastering
//! pipeline's stereo-width and phase-correlation steps need both channels
//! intact, so this loader keeps every channel symphonia reports, interleaved
//! the same way `PcmBuffer` expects.

use crate::error::{CoreError, Result};
use crate::pcm::PcmBuffer;
use std::fs::File;
use std::path::Path;

use symphonia::core::audio::AudioBufferRef;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::{MediaSourceStream, ReadOnlySource};
use symphonia::core::probe::Hint;

/// Decode an audio file at `path` into an interleaved, full-channel
/// `PcmBuffer`. Runs synchronously; callers on an async runtime should wrap
/// this in `tokio::task::spawn_blocking` the way `fingerprint-server` does.
pub fn load(path: &Path) -> Result<PcmBuffer> {
    let file = File::open(path).map_err(|e| CoreError::DecodeError(format!("{}: {e}", path.display())))?;
    let source = ReadOnlySource::new(file);
    let mss = MediaSourceStream::new(Box::new(source), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension() {
        hint.with_extension(&ext.to_string_lossy());
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &Default::default())
        .map_err(|e| CoreError::DecodeError(format!("failed to probe format: {e}")))?;

    let mut format = probed.format;
    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.sample_rate.is_some())
        .ok_or_else(|| CoreError::DecodeError("no audio tracks found".to_string()))?
        .clone();

    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| CoreError::DecodeError("no sample rate found".to_string()))?;
    let channels = track
        .codec_params
        .channels
        .ok_or_else(|| CoreError::DecodeError("no channel info found".to_string()))?
        .count() as u16;

    tracing::debug!(sample_rate, channels, path = %path.display(), "decoding audio");

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| CoreError::DecodeError(format!("no decoder for codec: {e}")))?;

    let mut samples = Vec::new();
    loop {
        match format.next_packet() {
            Ok(packet) => match decoder.decode(&packet) {
                Ok(buf) => collect_interleaved(&mut samples, &buf, channels as usize),
                Err(symphonia::core::errors::Error::DecodeError(_)) => continue,
                Err(e) => return Err(CoreError::DecodeError(e.to_string())),
            },
            Err(symphonia::core::errors::Error::IoError(_)) => break,
            Err(symphonia::core::errors::Error::Unsupported(_)) => break,
            Err(e) => return Err(CoreError::DecodeError(e.to_string())),
        }
    }

    if samples.is_empty() {
        return Err(CoreError::DecodeError("no audio samples decoded".to_string()));
    }

    let mut pcm = PcmBuffer::new(sample_rate, channels.max(1), samples);
    let clamped = pcm.clamp_non_finite();
    if clamped > 0 {
        tracing::warn!(clamped, path = %path.display(), "clamped non-finite samples during decode");
    }
    Ok(pcm)
}

/// Append every frame of `buf` to `samples`, interleaved, preserving up to
/// `channels` channels (never downmixing).
fn collect_interleaved(samples: &mut Vec<f64>, buf: &AudioBufferRef, channels: usize) {
    macro_rules! process_buffer {
        ($buf:expr, $norm_fn:expr) => {{
            let n_frames = $buf.frames();
            let ch_count = std::cmp::min(channels, $buf.spec().channels.count()).max(1);
            for frame_idx in 0..n_frames {
                for ch in 0..ch_count {
                    samples.push($norm_fn($buf.chan(ch)[frame_idx]));
                }
            }
        }};
    }

    match buf {
        AudioBufferRef::F32(fbuf) => process_buffer!(fbuf, |v: f32| v as f64),
        AudioBufferRef::F64(fbuf) => process_buffer!(fbuf, |v: f64| v),
        AudioBufferRef::S8(ibuf) => process_buffer!(ibuf, |v: i8| v as f64 / i8::MAX as f64),
        AudioBufferRef::S16(ibuf) => process_buffer!(ibuf, |v: i16| v as f64 / i16::MAX as f64),
        AudioBufferRef::S24(ibuf) => process_buffer!(ibuf, |v: symphonia::core::sample::i24| v
            .into_i32() as f64
            / (2_i32.pow(23) - 1) as f64),
        AudioBufferRef::S32(ibuf) => process_buffer!(ibuf, |v: i32| v as f64 / i32::MAX as f64),
        AudioBufferRef::U8(ubuf) => process_buffer!(ubuf, |v: u8| ((v as f64 / 255.0) - 0.5) * 2.0),
        AudioBufferRef::U16(ubuf) => {
            process_buffer!(ubuf, |v: u16| ((v as f64 / 65535.0) - 0.5) * 2.0)
        }
        AudioBufferRef::U24(ubuf) => process_buffer!(ubuf, |v: symphonia::core::sample::u24| {
            let norm = v.into_u32() as f64 / (2_u32.pow(24) - 1) as f64;
            (norm - 0.5) * 2.0
        }),
        AudioBufferRef::U32(ubuf) => {
            process_buffer!(ubuf, |v: u32| ((v as f64 / u32::MAX as f64) - 0.5) * 2.0)
        }
    }
}
