//! Chunked, stateful mastering pipeline (spec §4.4).
//!
//! Each chunk is processed as: frequency shaping (3-band EQ) -> adaptive
//! compression -> stereo width -> loudness-target level smoothing -> soft
//! limiting -> character-preservation blend -> crossfade stitch against the
//! previous chunk's tail. EQ and compressor envelope state carry across
//! chunk boundaries for the lifetime of a `MasteringPipeline`; the caller is
//! responsible for keeping one pipeline per `(track, preset_hash)` stream.

use crate::classifier::AdaptiveParameters;
use crate::config::CoreConfig;
use crate::error::{CoreError, Result};
use crate::pcm::PcmBuffer;
use auralis_dsp::biquad_filter::MultiBandEQ;
use auralis_dsp::compressor::{Compressor, CompressorConfig, CompressorState, DetectionMode};
use auralis_dsp::crossfade::equal_power_crossfade;
use auralis_dsp::limiter::{LimiterConfig, SoftLimiter};
use ndarray::Array2;

/// Gain-smoothing bounds for the per-chunk loudness-matching step. Not part
/// of `CoreConfig` because they bound an internal control loop, not a
/// user-facing tuning knob (spec §6.4 enumerates only the knobs a caller is
/// expected to override).
const LEVEL_GAIN_MIN_DB: f64 = -12.0;
const LEVEL_GAIN_MAX_DB: f64 = 12.0;

/// Granularity at which the compressor re-ticks its envelope followers
/// within one chunk window. Small enough that `attack_ms`/`release_ms`
/// (typically tens to low hundreds of ms) actually shape the gain contour
/// across a multi-second chunk rather than settling to one static value.
const COMPRESSOR_SUBBLOCK_MS: f64 = 10.0;

fn compressor_sub_block_samples(sample_rate: u32) -> usize {
    ((sample_rate as f64 * COMPRESSOR_SUBBLOCK_MS / 1000.0).round() as usize).max(1)
}

/// One chunk's input window: `context_frames` leading frames of pre-roll,
/// followed by up to `chunk_len` audible frames, followed by up to
/// `context_frames` worth of trailing post-context (less at the head/tail
/// of a track, where no context is available on that side). Both context
/// regions let stateful filters resettle around the cut and are discarded
/// after processing; only the audible region ships.
pub struct ChunkDescriptor {
    pub chunk_index: usize,
    pub pcm: PcmBuffer,
    pub context_frames: usize,
    pub chunk_len: usize,
    pub params: AdaptiveParameters,
}

/// Output of one chunk build: exactly the chunk's own frames, already
/// crossfaded against the previous chunk's tail when one exists.
pub struct ProcessedChunk {
    pub chunk_index: usize,
    pub pcm: PcmBuffer,
    pub clamped_non_finite: usize,
}

struct EqState {
    eq: MultiBandEQ,
    gains: (f64, f64, f64),
    channels: usize,
}

struct CompressorBank {
    compressors: Vec<Compressor>,
    config: CompressorConfig,
}

/// Stateful per-stream mastering pipeline. Construct once per
/// `(track, preset_hash)` and reuse across chunk builds; construct a fresh
/// one whenever the preset (and therefore the parameter template) changes.
pub struct MasteringPipeline {
    sample_rate: u32,
    channels: u16,
    eq_state: Option<EqState>,
    compressor_bank: Option<CompressorBank>,
    previous_gain_db: f64,
    prev_tail: Option<Vec<Vec<f64>>>,
    crossfade_samples: usize,
    soft_ceiling_dbfs: f64,
    max_db_delta_per_chunk: f64,
}

impl MasteringPipeline {
    pub fn new(sample_rate: u32, channels: u16, config: &CoreConfig) -> Self {
        Self {
            sample_rate,
            channels,
            eq_state: None,
            compressor_bank: None,
            previous_gain_db: 0.0,
            prev_tail: None,
            crossfade_samples: config.crossfade_samples(sample_rate),
            soft_ceiling_dbfs: config.soft_ceiling_dbfs,
            max_db_delta_per_chunk: config.max_db_delta_per_chunk,
        }
    }

    /// Drop all carried state, including compressor envelopes. Call when a
    /// stream is cancelled or the track changes underneath a reused
    /// pipeline instance — there is no "previous chunk" left to stay
    /// continuous with.
    pub fn reset(&mut self) {
        self.eq_state = None;
        self.compressor_bank = None;
        self.previous_gain_db = 0.0;
        self.prev_tail = None;
    }

    /// Drop the state a preset change invalidates, but not the compressor
    /// envelopes. Spec §4.4: "Compressor envelope state is retained across
    /// the parameter change... but the target gain trend is reset". The EQ
    /// cascade and crossfade tail belong to the old parameter template and
    /// the old output levels respectively, so those still reset; the
    /// compressor bank itself is left alone and `ensure_compressors` carries
    /// its envelope state into the rebuilt bank for the new ratio/threshold.
    pub fn reset_for_preset_change(&mut self) {
        self.eq_state = None;
        self.previous_gain_db = 0.0;
        self.prev_tail = None;
    }

    fn ensure_eq(&mut self, gains: (f64, f64, f64), channels: usize) -> &mut MultiBandEQ {
        let needs_rebuild = match &self.eq_state {
            Some(state) => {
                state.channels != channels
                    || (state.gains.0 - gains.0).abs() > 1e-9
                    || (state.gains.1 - gains.1).abs() > 1e-9
                    || (state.gains.2 - gains.2).abs() > 1e-9
            }
            None => true,
        };
        if needs_rebuild {
            tracing::debug!(?gains, channels, "rebuilding EQ cascade for new parameter template");
            self.eq_state = Some(EqState {
                eq: MultiBandEQ::three_band(self.sample_rate as f64, gains.0, gains.1, gains.2, channels),
                gains,
                channels,
            });
        }
        &mut self.eq_state.as_mut().unwrap().eq
    }

    fn ensure_compressors(&mut self, params: &AdaptiveParameters, channels: usize) -> &mut CompressorBank {
        let new_config = CompressorConfig {
            sample_rate: self.sample_rate as usize,
            threshold_db: params.compressor_threshold_db,
            ratio: params.compressor_ratio,
            knee_db: params.compressor_knee_db,
            attack_ms: params.compressor_attack_ms,
            release_ms: params.compressor_release_ms,
            makeup_gain_db: 0.0,
        };

        let needs_rebuild = match &self.compressor_bank {
            Some(bank) => {
                bank.compressors.len() != channels
                    || (bank.config.threshold_db - new_config.threshold_db).abs() > 1e-9
                    || (bank.config.ratio - new_config.ratio).abs() > 1e-9
                    || (bank.config.knee_db - new_config.knee_db).abs() > 1e-9
                    || (bank.config.attack_ms - new_config.attack_ms).abs() > 1e-9
                    || (bank.config.release_ms - new_config.release_ms).abs() > 1e-9
            }
            None => true,
        };

        if needs_rebuild {
            let carried_state: Vec<Option<CompressorState>> = match &self.compressor_bank {
                Some(bank) => bank.compressors.iter().map(|c| Some(c.export_state())).collect(),
                None => vec![None; channels],
            };
            let mut compressors = Vec::with_capacity(channels);
            for i in 0..channels {
                let mut c = Compressor::new(new_config.clone());
                if let Some(Some(state)) = carried_state.get(i) {
                    c.restore_state(*state);
                }
                compressors.push(c);
            }
            self.compressor_bank = Some(CompressorBank {
                compressors,
                config: new_config,
            });
        }
        self.compressor_bank.as_mut().unwrap()
    }

    /// Process one chunk window, returning exactly the audible frames for
    /// this chunk (at most `descriptor.chunk_len`, fewer only for a final,
    /// shorter-than-nominal chunk at the end of a track).
    pub fn process_chunk(&mut self, descriptor: ChunkDescriptor) -> Result<ProcessedChunk> {
        let ChunkDescriptor {
            chunk_index,
            pcm,
            context_frames,
            chunk_len: nominal_chunk_len,
            params,
        } = descriptor;

        let total_frames = pcm.frame_count();
        if total_frames <= context_frames {
            return Err(CoreError::InputTooShort);
        }
        // The window is `context_frames` leading + up to `nominal_chunk_len`
        // audible + whatever trailing post-context fit (spec §3: "chunk_len
        // + 2*context_len samples", less at the ends of a track).
        let audible_len = nominal_chunk_len.min(total_frames - context_frames);
        let channels = self.channels.max(1) as usize;

        let dry_planar = pcm.to_planar();

        let mut frames = Array2::<f64>::zeros((channels, total_frames));
        for (c, plane) in dry_planar.iter().enumerate().take(channels) {
            for (i, &s) in plane.iter().enumerate() {
                frames[[c, i]] = s;
            }
        }

        let eq_gains = (params.eq_bass_db, params.eq_mid_db, params.eq_treble_db);
        let eq = self.ensure_eq(eq_gains, channels);
        let eq_out = eq.process_stereo(&frames.view());

        let sub_block_len = compressor_sub_block_samples(self.sample_rate);
        let bank = self.ensure_compressors(&params, channels);
        let mut compressed: Vec<Vec<f64>> = Vec::with_capacity(channels);
        for (c, compressor) in bank.compressors.iter_mut().enumerate() {
            let channel_audio: Vec<f64> = eq_out.index_axis(ndarray::Axis(0), c).iter().copied().collect();
            // Tick the envelope followers once per sub-block rather than
            // once for the whole (multi-second) window: `Compressor::process`
            // advances each `EnvelopeFollower` exactly one step per call, so
            // calling it once over the entire chunk collapses attack/release
            // into a single static gain. Sub-blocking lets the configured
            // attack_ms/release_ms actually shape the gain within a chunk.
            let mut out = Vec::with_capacity(channel_audio.len());
            for block in channel_audio.chunks(sub_block_len) {
                let (processed_block, _info) = compressor.process(block, DetectionMode::Hybrid);
                out.extend(processed_block);
            }
            compressed.push(out);
        }

        let widened = apply_stereo_width(&compressed, params.stereo_width_factor);

        let (leveled, new_gain_db) = apply_level_smoothing(
            &widened,
            self.previous_gain_db,
            params.target_lufs,
            self.max_db_delta_per_chunk,
        );
        self.previous_gain_db = new_gain_db;

        let limiter = SoftLimiter::new(&LimiterConfig {
            soft_ceiling_dbfs: self.soft_ceiling_dbfs,
        });
        let limited: Vec<Vec<f64>> = leveled
            .iter()
            .map(|channel| channel.iter().map(|&s| limiter.apply_sample(s)).collect())
            .collect();

        let preserve = params.preserve_character.clamp(0.0, 1.0);
        let blended: Vec<Vec<f64>> = limited
            .iter()
            .enumerate()
            .map(|(c, processed_channel)| {
                let dry = &dry_planar[c.min(dry_planar.len() - 1)];
                processed_channel
                    .iter()
                    .enumerate()
                    .map(|(i, &wet)| {
                        let dry_sample = dry.get(i).copied().unwrap_or(0.0);
                        preserve * dry_sample + (1.0 - preserve) * wet
                    })
                    .collect()
            })
            .collect();

        // Drop both the leading context and the trailing post-context;
        // only the audible region ships (spec §4.4 step 1).
        let chunk_only: Vec<Vec<f64>> = blended
            .iter()
            .map(|channel| channel[context_frames..context_frames + audible_len].to_vec())
            .collect();

        let stitched = self.crossfade_stitch(chunk_index, chunk_only)?;

        let mut interleaved = vec![0.0; audible_len * channels];
        for (c, channel) in stitched.iter().enumerate() {
            for (i, &s) in channel.iter().enumerate() {
                interleaved[i * channels + c] = s;
            }
        }
        let mut out_pcm = PcmBuffer::new(self.sample_rate, self.channels, interleaved);
        let clamped_non_finite = out_pcm.clamp_non_finite();

        Ok(ProcessedChunk {
            chunk_index,
            pcm: out_pcm,
            clamped_non_finite,
        })
    }

    fn crossfade_stitch(&mut self, chunk_index: usize, chunk: Vec<Vec<f64>>) -> Result<Vec<Vec<f64>>> {
        let fade_len = self.crossfade_samples.min(chunk.first().map(|c| c.len()).unwrap_or(0) / 2);

        let stitched = if chunk_index > 0 && fade_len > 0 {
            if let Some(tail) = &self.prev_tail {
                let mut out = chunk.clone();
                for (c, channel) in out.iter_mut().enumerate() {
                    if let Some(tail_channel) = tail.get(c) {
                        if tail_channel.len() == fade_len && channel.len() >= fade_len {
                            let head = &channel[..fade_len];
                            let blended =
                                equal_power_crossfade(tail_channel, head).map_err(|e| CoreError::DspError {
                                    step: "crossfade-stitch",
                                    chunk_index,
                                    cause: e.to_string(),
                                })?;
                            channel[..fade_len].copy_from_slice(&blended);
                        }
                    }
                }
                out
            } else {
                chunk
            }
        } else {
            chunk
        };

        if fade_len > 0 {
            self.prev_tail = Some(
                stitched
                    .iter()
                    .map(|channel| {
                        let len = channel.len();
                        channel[len.saturating_sub(fade_len)..].to_vec()
                    })
                    .collect(),
            );
        }

        Ok(stitched)
    }
}

/// Mid/side stereo width scaling. `side *= width_factor`; mono passes through.
fn apply_stereo_width(channels: &[Vec<f64>], width_factor: f64) -> Vec<Vec<f64>> {
    if channels.len() != 2 {
        return channels.to_vec();
    }
    let len = channels[0].len().min(channels[1].len());
    let mut left = Vec::with_capacity(len);
    let mut right = Vec::with_capacity(len);
    for i in 0..len {
        let l = channels[0][i];
        let r = channels[1][i];
        let mid = (l + r) / 2.0;
        let side = (l - r) / 2.0 * width_factor;
        left.push(mid + side);
        right.push(mid - side);
    }
    vec![left, right]
}

/// RMS-based loudness proxy in dB, used only to drive the smoothing control
/// loop below (not a calibrated LUFS meter).
fn approx_level_db(channels: &[Vec<f64>]) -> f64 {
    let mut sum_sq = 0.0;
    let mut count = 0usize;
    for channel in channels {
        for &s in channel {
            sum_sq += s * s;
            count += 1;
        }
    }
    if count == 0 {
        return -100.0;
    }
    let rms = (sum_sq / count as f64).sqrt();
    20.0 * rms.max(1e-10).log10()
}

/// `g_k = clamp(g_{k-1} + sign(d_k - g_{k-1}) * min(|d_k - g_{k-1}|, max_delta), min, max)`
/// applied as a linear gain to every sample. Returns the chosen gain for the
/// next call's `previous_gain_db`.
fn apply_level_smoothing(
    channels: &[Vec<f64>],
    previous_gain_db: f64,
    target_lufs: f64,
    max_delta: f64,
) -> (Vec<Vec<f64>>, f64) {
    let current_level_db = approx_level_db(channels);
    let desired_gain_db = target_lufs - current_level_db;
    let delta = desired_gain_db - previous_gain_db;
    let step = delta.signum() * delta.abs().min(max_delta);
    let new_gain_db = (previous_gain_db + step).clamp(LEVEL_GAIN_MIN_DB, LEVEL_GAIN_MAX_DB);
    let gain_linear = 10f64.powf(new_gain_db / 20.0);

    let leveled = channels
        .iter()
        .map(|channel| channel.iter().map(|&s| s * gain_linear).collect())
        .collect();
    (leveled, new_gain_db)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::AdaptiveParameters;

    fn identity_params() -> AdaptiveParameters {
        AdaptiveParameters {
            compressor_ratio: 1.0,
            compressor_threshold_db: 0.0,
            compressor_attack_ms: 10.0,
            compressor_release_ms: 100.0,
            compressor_knee_db: 0.0,
            eq_bass_db: 0.0,
            eq_mid_db: 0.0,
            eq_treble_db: 0.0,
            stereo_width_factor: 1.0,
            target_lufs: -14.0,
            preserve_character: 1.0,
            source_confidence: 0.0,
        }
    }

    fn sine_chunk(sr: u32, channels: u16, frames: usize) -> PcmBuffer {
        let mut samples = Vec::with_capacity(frames * channels as usize);
        for i in 0..frames {
            let t = i as f64 / sr as f64;
            let v = (2.0 * std::f64::consts::PI * 440.0 * t).sin() * 0.3;
            for _ in 0..channels {
                samples.push(v);
            }
        }
        PcmBuffer::new(sr, channels, samples)
    }

    #[test]
    fn preserve_character_one_reproduces_dry_signal() {
        let config = CoreConfig::default();
        let sr = 44100;
        let context = 100;
        let chunk_len = 2000;
        let mut pipeline = MasteringPipeline::new(sr, 1, &config);
        let pcm = sine_chunk(sr, 1, context + chunk_len);
        let descriptor = ChunkDescriptor {
            chunk_index: 0,
            pcm,
            context_frames: context,
            chunk_len,
            params: identity_params(),
        };
        let processed = pipeline.process_chunk(descriptor).unwrap();
        assert_eq!(processed.pcm.frame_count(), chunk_len);
    }

    #[test]
    fn window_shorter_than_context_is_rejected() {
        let config = CoreConfig::default();
        let mut pipeline = MasteringPipeline::new(44100, 1, &config);
        let pcm = sine_chunk(44100, 1, 50);
        let descriptor = ChunkDescriptor {
            chunk_index: 0,
            pcm,
            context_frames: 100,
            chunk_len: 2000,
            params: identity_params(),
        };
        assert!(pipeline.process_chunk(descriptor).is_err());
    }

    #[test]
    fn crossfade_tail_carries_across_chunks() {
        let config = CoreConfig::default();
        let sr = 44100;
        let context = 100;
        let chunk_len = 4000;
        let mut pipeline = MasteringPipeline::new(sr, 1, &config);

        let first = ChunkDescriptor {
            chunk_index: 0,
            pcm: sine_chunk(sr, 1, context + chunk_len),
            context_frames: context,
            chunk_len,
            params: identity_params(),
        };
        pipeline.process_chunk(first).unwrap();
        assert!(pipeline.prev_tail.is_some());

        let second = ChunkDescriptor {
            chunk_index: 1,
            pcm: sine_chunk(sr, 1, context + chunk_len),
            context_frames: context,
            chunk_len,
            params: identity_params(),
        };
        let processed = pipeline.process_chunk(second).unwrap();
        assert_eq!(processed.chunk_index, 1);
    }

    #[test]
    fn level_smoothing_step_is_bounded_by_max_delta() {
        let max_delta = 1.5;
        let (leveled, gain) = apply_level_smoothing(&[vec![0.001; 1000]], 0.0, -14.0, max_delta);
        assert!(gain.abs() <= max_delta + 1e-9);
        assert!(leveled[0].iter().all(|v| v.is_finite()));
    }

    #[test]
    fn stereo_width_zero_collapses_to_mono_content() {
        let left = vec![1.0, 0.5, -0.5];
        let right = vec![-1.0, 0.5, 0.5];
        let out = apply_stereo_width(&[left, right], 0.0);
        assert!((out[0][0] - out[1][0]).abs() < 1e-12);
    }
}
