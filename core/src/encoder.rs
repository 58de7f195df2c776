//! WebM/Opus progressive chunk encoder (spec §4.5, detailed in
//! `SPEC_FULL.md` §4.8).
//!
//! Stateful per `(track, preset_hash)`: the first call emits a WebM init
//! segment (EBML header + track entry) followed by that chunk's clusters;
//! every later call on the same encoder emits cluster-only bytes with
//! timestamps continuing from where the previous call left off, so a
//! browser `MediaSource` can append them back to back.

use crate::error::{CoreError, Result};
use crate::interface::EncodedChunkEnvelope;
use crate::pcm::PcmBuffer;
use audiopus::coder::Encoder as OpusEncoder;
use audiopus::{Application, Channels as OpusChannels, SampleRate};
use parking_lot::Mutex;
use std::io::{self, Seek, SeekFrom, Write};
use std::sync::Arc;
use webm::mux::{AudioCodecId, Segment, Writer};

/// Opus operates natively at 48 kHz; all DSP upstream runs at the source
/// analysis rate, and is resampled only here, at the encoder boundary.
const OPUS_SAMPLE_RATE: u32 = 48_000;
/// 20ms frames at 48kHz, a standard Opus frame size.
const OPUS_FRAME_SAMPLES: usize = 960;
const OPUS_MAX_PACKET_BYTES: usize = 4000;

/// A `Write + Seek` sink backed by a shared, growable buffer so the caller
/// can drain newly written bytes between chunk builds without the `webm`
/// crate ever finalizing (and thereby closing) the segment.
#[derive(Clone)]
struct SharedSink {
    buf: Arc<Mutex<Vec<u8>>>,
    pos: usize,
}

impl SharedSink {
    fn new(buf: Arc<Mutex<Vec<u8>>>) -> Self {
        Self { buf, pos: 0 }
    }
}

impl Write for SharedSink {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let mut buf = self.buf.lock();
        let end = self.pos + data.len();
        if end > buf.len() {
            buf.resize(end, 0);
        }
        buf[self.pos..end].copy_from_slice(data);
        self.pos = end;
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Seek for SharedSink {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let len = self.buf.lock().len() as i64;
        let new_pos = match pos {
            SeekFrom::Start(p) => p as i64,
            SeekFrom::End(p) => len + p,
            SeekFrom::Current(p) => self.pos as i64 + p,
        };
        if new_pos < 0 {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "seek before start"));
        }
        self.pos = new_pos as usize;
        Ok(self.pos as u64)
    }
}

/// One chunk's worth of encoded WebM/Opus bytes plus the envelope metadata
/// describing it.
pub struct ChunkEncoder {
    opus: OpusEncoder,
    segment: Segment<Writer<SharedSink>>,
    track_num: u64,
    sink_buf: Arc<Mutex<Vec<u8>>>,
    drained_up_to: usize,
    source_sample_rate: u32,
    channels: u16,
    next_timestamp_ns: u64,
    resample_carry: Vec<f64>,
    first_chunk_emitted: bool,
}

impl ChunkEncoder {
    pub fn new(source_sample_rate: u32, channels: u16) -> Result<Self> {
        let opus_channels = if channels >= 2 {
            OpusChannels::Stereo
        } else {
            OpusChannels::Mono
        };
        let opus = OpusEncoder::new(SampleRate::Hz48000, opus_channels, Application::Audio)
            .map_err(|e| CoreError::EncoderError(format!("opus encoder init failed: {e}")))?;

        let buf = Arc::new(Mutex::new(Vec::new()));
        let sink = SharedSink::new(buf.clone());
        let writer = Writer::new(sink);
        let mut segment = Segment::new(writer)
            .ok_or_else(|| CoreError::EncoderError("failed to open webm segment".to_string()))?;
        let track_num = segment.add_audio_track(
            OPUS_SAMPLE_RATE as i32,
            channels.max(1) as i32,
            None,
            AudioCodecId::Opus,
        );

        Ok(Self {
            opus,
            segment,
            track_num,
            sink_buf: buf,
            drained_up_to: 0,
            source_sample_rate,
            channels: channels.max(1),
            next_timestamp_ns: 0,
            resample_carry: Vec::new(),
            first_chunk_emitted: false,
        })
    }

    /// Encode one chunk's audio and drain the bytes the `webm` muxer has
    /// written since the last call. `crossfade_samples` and `preset_hash`
    /// are forwarded into the returned envelope unchanged, for the caller's
    /// bookkeeping.
    pub fn encode_chunk(
        &mut self,
        pcm: &PcmBuffer,
        crossfade_samples: usize,
        preset_hash: u64,
    ) -> Result<EncodedChunkEnvelope> {
        let resampled = self.resample_to_opus_rate(pcm);
        let audible_samples = pcm.frame_count();

        let channels = self.channels as usize;
        let frame_len = OPUS_FRAME_SAMPLES * channels;
        let mut offset = 0;
        let mut packet_buf = vec![0u8; OPUS_MAX_PACKET_BYTES];

        while offset < resampled.len() {
            let end = (offset + frame_len).min(resampled.len());
            let mut frame: Vec<f32> = resampled[offset..end].iter().map(|&s| s as f32).collect();
            if frame.len() < frame_len {
                frame.resize(frame_len, 0.0);
            }

            let encoded_len = self
                .opus
                .encode_float(&frame, &mut packet_buf)
                .map_err(|e| CoreError::EncoderError(format!("opus encode failed: {e}")))?;

            let timestamp_ns = self.next_timestamp_ns;
            let frame_duration_ns =
                (OPUS_FRAME_SAMPLES as u64 * 1_000_000_000) / OPUS_SAMPLE_RATE as u64;
            self.next_timestamp_ns += frame_duration_ns;

            let accepted =
                self.segment
                    .add_frame(self.track_num, &packet_buf[..encoded_len], timestamp_ns, true);
            if !accepted {
                return Err(CoreError::EncoderError(
                    "webm muxer rejected audio frame".to_string(),
                ));
            }

            offset += frame_len;
        }

        let bytes = {
            let buf = self.sink_buf.lock();
            buf[self.drained_up_to..].to_vec()
        };
        self.drained_up_to = self.sink_buf.lock().len();

        let is_init_segment = !self.first_chunk_emitted;
        self.first_chunk_emitted = true;

        Ok(EncodedChunkEnvelope {
            bytes,
            is_init_segment,
            audible_samples,
            crossfade_samples,
            preset_hash,
        })
    }

    /// Linear-interpolation resample from the source analysis rate to
    /// Opus's native 48 kHz. Adequate for a soft-ceiling-limited mastering
    /// signal; not a band-limited resampler, so ultrasonic imaging above
    /// roughly source_rate/2 is not filtered before decimation.
    fn resample_to_opus_rate(&mut self, pcm: &PcmBuffer) -> Vec<f64> {
        if self.source_sample_rate == OPUS_SAMPLE_RATE {
            return pcm.samples.clone();
        }

        let channels = self.channels as usize;
        let frame_count = pcm.frame_count();
        if frame_count == 0 {
            return Vec::new();
        }

        let ratio = OPUS_SAMPLE_RATE as f64 / self.source_sample_rate as f64;
        let out_frames = (frame_count as f64 * ratio).round() as usize;
        let mut out = Vec::with_capacity(out_frames * channels);

        for i in 0..out_frames {
            let src_pos = i as f64 / ratio;
            let src_index = src_pos.floor() as usize;
            let frac = src_pos - src_index as f64;
            let next_index = (src_index + 1).min(frame_count.saturating_sub(1));

            for c in 0..channels {
                let a = pcm.samples.get(src_index * channels + c).copied().unwrap_or(0.0);
                let b = pcm.samples.get(next_index * channels + c).copied().unwrap_or(a);
                out.push(a + (b - a) * frac);
            }
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine_pcm(sr: u32, channels: u16, frames: usize) -> PcmBuffer {
        let mut samples = Vec::with_capacity(frames * channels as usize);
        for i in 0..frames {
            let t = i as f64 / sr as f64;
            let v = (2.0 * std::f64::consts::PI * 440.0 * t).sin() * 0.2;
            for _ in 0..channels {
                samples.push(v);
            }
        }
        PcmBuffer::new(sr, channels, samples)
    }

    #[test]
    fn first_chunk_marks_init_segment() {
        let mut encoder = ChunkEncoder::new(44100, 2).expect("encoder init");
        let pcm = sine_pcm(44100, 2, 44100 / 2);
        let envelope = encoder.encode_chunk(&pcm, 8820, 42).unwrap();
        assert!(envelope.is_init_segment);
        assert!(!envelope.bytes.is_empty());
    }

    #[test]
    fn second_chunk_is_not_init_segment() {
        let mut encoder = ChunkEncoder::new(44100, 2).expect("encoder init");
        let pcm = sine_pcm(44100, 2, 44100 / 2);
        let first = encoder.encode_chunk(&pcm, 8820, 42).unwrap();
        let second = encoder.encode_chunk(&pcm, 8820, 42).unwrap();
        assert!(first.is_init_segment);
        assert!(!second.is_init_segment);
    }

    #[test]
    fn resample_preserves_frame_ratio() {
        let mut encoder = ChunkEncoder::new(44100, 1).expect("encoder init");
        let pcm = sine_pcm(44100, 1, 44100);
        let resampled = encoder.resample_to_opus_rate(&pcm);
        let expected = (44100.0 * (48000.0 / 44100.0)).round() as usize;
        assert_eq!(resampled.len(), expected);
    }
}
