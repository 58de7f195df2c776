/// Envelope Follower for Dynamics Processing
///
/// First-order attack/release envelope follower used by the compressor's
/// gain computer and by the limiter's predecessor. Operates on f64 level
/// values (not raw samples) throughout, per the pipeline's numeric
/// convention.

#[derive(Debug, Clone)]
pub struct EnvelopeConfig {
    pub sample_rate: usize,
    pub attack_ms: f64,
    pub release_ms: f64,
}

impl Default for EnvelopeConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            attack_ms: 10.0,
            release_ms: 100.0,
        }
    }
}

/// Tracks the envelope of an audio signal with configurable attack/release times.
#[derive(Debug, Clone)]
pub struct EnvelopeFollower {
    attack_coeff: f64,
    release_coeff: f64,
    envelope: f64,
}

impl EnvelopeFollower {
    pub fn new(config: &EnvelopeConfig) -> Self {
        let attack_coeff = Self::ms_to_coefficient(config.attack_ms, config.sample_rate);
        let release_coeff = Self::ms_to_coefficient(config.release_ms, config.sample_rate);

        Self {
            attack_coeff,
            release_coeff,
            envelope: 0.0,
        }
    }

    /// `exp(-1.0 / (time_ms * 0.001 * sample_rate))`
    fn ms_to_coefficient(time_ms: f64, sample_rate: usize) -> f64 {
        let time_samples = time_ms * 0.001 * sample_rate as f64;
        (-1.0 / time_samples.max(1e-9)).exp()
    }

    /// Process a single input level sample, returning the smoothed envelope.
    pub fn process(&mut self, input_level: f64) -> f64 {
        let coeff = if input_level > self.envelope {
            self.attack_coeff
        } else {
            self.release_coeff
        };

        self.envelope = input_level + (self.envelope - input_level) * coeff;
        self.envelope
    }

    pub fn process_buffer(&mut self, input_levels: &[f64]) -> Vec<f64> {
        input_levels.iter().map(|&lvl| self.process(lvl)).collect()
    }

    pub fn reset(&mut self) {
        self.envelope = 0.0;
    }

    pub fn get_envelope(&self) -> f64 {
        self.envelope
    }

    /// Restore a carried-over envelope value (cross-chunk state continuity).
    pub fn set_envelope(&mut self, value: f64) {
        self.envelope = value;
    }
}

/// One-shot envelope following without state preservation across calls.
pub fn envelope_follow(
    input_levels: &[f64],
    sample_rate: usize,
    attack_ms: f64,
    release_ms: f64,
) -> Vec<f64> {
    let config = EnvelopeConfig {
        sample_rate,
        attack_ms,
        release_ms,
    };

    let mut follower = EnvelopeFollower::new(&config);
    follower.process_buffer(input_levels)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_follower_creation() {
        let config = EnvelopeConfig {
            sample_rate: 44100,
            attack_ms: 10.0,
            release_ms: 100.0,
        };
        let follower = EnvelopeFollower::new(&config);
        assert_eq!(follower.get_envelope(), 0.0);
    }

    #[test]
    fn test_single_sample_processing() {
        let config = EnvelopeConfig {
            sample_rate: 44100,
            attack_ms: 1.0,
            release_ms: 10.0,
        };
        let mut follower = EnvelopeFollower::new(&config);

        let output1 = follower.process(1.0);
        assert!(output1 > 0.0 && output1 < 1.0);

        let output2 = follower.process(0.0);
        assert!(output2 > 0.0 && output2 < output1);
    }

    #[test]
    fn test_buffer_processing() {
        let config = EnvelopeConfig {
            sample_rate: 44100,
            attack_ms: 5.0,
            release_ms: 50.0,
        };
        let mut follower = EnvelopeFollower::new(&config);

        let input = vec![0.1, 0.5, 0.9, 0.7, 0.3, 0.1];
        let output = follower.process_buffer(&input);

        assert_eq!(output.len(), input.len());
        assert!(follower.get_envelope() > 0.0);
    }

    #[test]
    fn test_reset() {
        let config = EnvelopeConfig::default();
        let mut follower = EnvelopeFollower::new(&config);

        follower.process(1.0);
        assert!(follower.get_envelope() > 0.0);

        follower.reset();
        assert_eq!(follower.get_envelope(), 0.0);
    }

    #[test]
    fn test_set_envelope_restores_carry_over_state() {
        let config = EnvelopeConfig::default();
        let mut follower = EnvelopeFollower::new(&config);
        follower.set_envelope(0.42);
        assert_eq!(follower.get_envelope(), 0.42);
    }

    #[test]
    fn test_envelope_follow_function() {
        let input = vec![0.1, 0.5, 0.9, 0.7, 0.3];
        let output = envelope_follow(&input, 44100, 5.0, 50.0);

        assert_eq!(output.len(), input.len());
        assert!(output.iter().all(|&v| v >= 0.0));
    }
}
