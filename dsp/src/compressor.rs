/// Adaptive Compressor
///
/// Soft-knee compressor with peak/RMS/hybrid level detection, driven by
/// first-order envelope followers. Envelope state persists across calls to
/// `process` so a caller can carry it across chunk boundaries within the
/// same stream (see `export_state`/`restore_state`).

use crate::envelope::{EnvelopeFollower, EnvelopeConfig};

/// Detection mode for input level measurement
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DetectionMode {
    Peak,
    Rms,
    Hybrid, // 70% RMS + 30% peak
}

/// Configuration for compressor
#[derive(Debug, Clone)]
pub struct CompressorConfig {
    pub sample_rate: usize,
    pub threshold_db: f64,
    pub ratio: f64,
    pub knee_db: f64,
    pub attack_ms: f64,
    pub release_ms: f64,
    pub makeup_gain_db: f64,
}

impl Default for CompressorConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            threshold_db: -20.0,
            ratio: 4.0,
            knee_db: 6.0,
            attack_ms: 10.0,
            release_ms: 100.0,
            makeup_gain_db: 0.0,
        }
    }
}

/// Compression statistics for one `process` call.
#[derive(Debug, Clone)]
pub struct CompressionInfo {
    pub input_level_db: f64,
    pub gain_reduction_db: f64,
    pub output_gain: f64,
    pub threshold_db: f64,
    pub ratio: f64,
}

/// Envelope state carried across chunk boundaries for the same stream.
#[derive(Debug, Clone, Copy)]
pub struct CompressorState {
    pub peak_envelope: f64,
    pub rms_envelope: f64,
    pub gain_envelope: f64,
}

/// Adaptive Compressor
pub struct Compressor {
    config: CompressorConfig,
    peak_follower: EnvelopeFollower,
    rms_follower: EnvelopeFollower,
    gain_follower: EnvelopeFollower,
    gain_reduction: f64,
    previous_gain: f64,
}

impl Compressor {
    pub fn new(config: CompressorConfig) -> Self {
        let peak_follower = EnvelopeFollower::new(&EnvelopeConfig {
            sample_rate: config.sample_rate,
            attack_ms: 0.1,
            release_ms: 1.0,
        });

        let rms_follower = EnvelopeFollower::new(&EnvelopeConfig {
            sample_rate: config.sample_rate,
            attack_ms: 10.0,
            release_ms: 100.0,
        });

        let gain_follower = EnvelopeFollower::new(&EnvelopeConfig {
            sample_rate: config.sample_rate,
            attack_ms: config.attack_ms,
            release_ms: config.release_ms,
        });

        Self {
            config,
            peak_follower,
            rms_follower,
            gain_follower,
            gain_reduction: 0.0,
            previous_gain: 1.0,
        }
    }

    /// `g = min(0, -(level_db - threshold_db) * (1 - 1/ratio))`, knee-smoothed.
    fn calculate_gain_reduction(&self, level_db: f64) -> f64 {
        let threshold = self.config.threshold_db;
        let ratio = self.config.ratio;
        let knee = self.config.knee_db;

        if level_db <= threshold - knee / 2.0 {
            0.0
        } else if level_db >= threshold + knee / 2.0 {
            let over_threshold = level_db - threshold;
            -over_threshold * (1.0 - 1.0 / ratio)
        } else {
            let over_threshold = level_db - threshold + knee / 2.0;
            let knee_ratio = over_threshold / knee;
            let soft_ratio = 1.0 + knee_ratio * (ratio - 1.0) / ratio;
            -over_threshold * (1.0 - 1.0 / soft_ratio)
        }
    }

    fn detect_input_level(&mut self, audio: &[f64], mode: DetectionMode) -> f64 {
        match mode {
            DetectionMode::Peak => {
                let peak_level = audio.iter().map(|&x| x.abs()).fold(0.0f64, f64::max);
                self.peak_follower.process(peak_level)
            }
            DetectionMode::Rms => {
                let rms_level = (audio.iter().map(|&x| x * x).sum::<f64>() / audio.len() as f64).sqrt();
                self.rms_follower.process(rms_level)
            }
            DetectionMode::Hybrid => {
                let peak_level = audio.iter().map(|&x| x.abs()).fold(0.0f64, f64::max);
                let rms_level = (audio.iter().map(|&x| x * x).sum::<f64>() / audio.len() as f64).sqrt();
                0.7 * rms_level + 0.3 * peak_level
            }
        }
    }

    /// Process one window of audio, updating envelope state in place.
    pub fn process(&mut self, audio: &[f64], mode: DetectionMode) -> (Vec<f64>, CompressionInfo) {
        if audio.is_empty() {
            return (
                Vec::new(),
                CompressionInfo {
                    input_level_db: -100.0,
                    gain_reduction_db: 0.0,
                    output_gain: 1.0,
                    threshold_db: self.config.threshold_db,
                    ratio: self.config.ratio,
                },
            );
        }

        let input_level = self.detect_input_level(audio, mode);
        let input_level_db = 20.0 * input_level.max(1e-10).log10();

        let target_gain_reduction = self.calculate_gain_reduction(input_level_db);
        let smoothed_gain_reduction = self.gain_follower.process(target_gain_reduction);
        self.gain_reduction = smoothed_gain_reduction;

        let gain_linear = 10f64.powf(smoothed_gain_reduction / 20.0);
        let makeup_gain = 10f64.powf(self.config.makeup_gain_db / 20.0);
        let final_gain = gain_linear * makeup_gain;

        let processed_audio: Vec<f64> = audio.iter().map(|&sample| sample * final_gain).collect();
        self.previous_gain = final_gain;

        let info = CompressionInfo {
            input_level_db,
            gain_reduction_db: smoothed_gain_reduction,
            output_gain: final_gain,
            threshold_db: self.config.threshold_db,
            ratio: self.config.ratio,
        };

        (processed_audio, info)
    }

    pub fn reset(&mut self) {
        self.peak_follower.reset();
        self.rms_follower.reset();
        self.gain_follower.reset();
        self.gain_reduction = 0.0;
        self.previous_gain = 1.0;
    }

    pub fn get_state(&self) -> (f64, f64) {
        (self.gain_reduction, self.previous_gain)
    }

    /// Snapshot envelope follower state for carry-over to the next chunk.
    pub fn export_state(&self) -> CompressorState {
        CompressorState {
            peak_envelope: self.peak_follower.get_envelope(),
            rms_envelope: self.rms_follower.get_envelope(),
            gain_envelope: self.gain_follower.get_envelope(),
        }
    }

    /// Restore envelope follower state carried over from the previous chunk.
    pub fn restore_state(&mut self, state: CompressorState) {
        self.peak_follower.set_envelope(state.peak_envelope);
        self.rms_follower.set_envelope(state.rms_envelope);
        self.gain_follower.set_envelope(state.gain_envelope);
    }
}

/// Convenience function for one-shot compression (no state carry-over).
pub fn compress(
    audio: &[f64],
    config: &CompressorConfig,
    mode: DetectionMode,
) -> (Vec<f64>, CompressionInfo) {
    let mut compressor = Compressor::new(config.clone());
    compressor.process(audio, mode)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compressor_creation() {
        let config = CompressorConfig::default();
        let compressor = Compressor::new(config);
        let (gr, gain) = compressor.get_state();
        assert_eq!(gr, 0.0);
        assert_eq!(gain, 1.0);
    }

    #[test]
    fn test_compress_silence() {
        let audio = vec![0.0; 1000];
        let config = CompressorConfig::default();
        let (processed, info) = compress(&audio, &config, DetectionMode::Rms);

        assert_eq!(processed.len(), audio.len());
        assert!(info.gain_reduction_db >= -1.0);
    }

    #[test]
    fn test_compress_loud_signal() {
        let audio = vec![0.8; 1000];
        let mut config = CompressorConfig::default();
        config.threshold_db = -10.0;
        config.ratio = 4.0;

        let (processed, info) = compress(&audio, &config, DetectionMode::Peak);

        assert!(info.gain_reduction_db < 0.0);
        assert!(processed.iter().all(|&x| x.abs() <= 1.0));
    }

    #[test]
    fn test_detection_modes() {
        let audio: Vec<f64> = (0..1000).map(|i| (i as f64 * 0.01).sin() * 0.5).collect();
        let config = CompressorConfig::default();

        let (_, info_peak) = compress(&audio, &config, DetectionMode::Peak);
        let (_, info_rms) = compress(&audio, &config, DetectionMode::Rms);
        let (_, info_hybrid) = compress(&audio, &config, DetectionMode::Hybrid);

        assert!(info_peak.input_level_db.is_finite());
        assert!(info_rms.input_level_db.is_finite());
        assert!(info_hybrid.input_level_db.is_finite());
    }

    #[test]
    fn test_state_carries_over_chunk_boundary() {
        let config = CompressorConfig::default();
        let mut compressor = Compressor::new(config.clone());

        let loud = vec![0.8; 4096];
        compressor.process(&loud, DetectionMode::Rms);
        let state = compressor.export_state();
        assert!(state.gain_envelope < 0.0);

        let mut next_chunk_compressor = Compressor::new(config);
        next_chunk_compressor.restore_state(state);
        assert_eq!(next_chunk_compressor.export_state().gain_envelope, state.gain_envelope);
    }
}
