/// Soft ceiling limiter.
///
/// Stateless tanh saturator: `y = ceiling * tanh(k*x)`, with `k` solved so
/// that an input of 0.9 maps to approximately 0.9 (near-transparent at
/// ordinary program levels) while `|y| <= ceiling` holds for every input,
/// including inputs above full scale. `ceiling` is the configured soft
/// ceiling in linear amplitude (default -0.5 dBFS).
///
/// This replaces a lookahead/ISR/oversampling brick-wall design: the
/// mastering pipeline's final stage wants a cheap, always-bounded, stateless
/// saturator rather than a true peak limiter with attack/release dynamics.

const REFERENCE_INPUT: f64 = 0.9;
const REFERENCE_OUTPUT_FRACTION: f64 = 0.9;

#[derive(Debug, Clone, Copy)]
pub struct LimiterConfig {
    pub soft_ceiling_dbfs: f64,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            soft_ceiling_dbfs: -0.5,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct LimitingInfo {
    pub input_peak_db: f64,
    pub output_peak_db: f64,
    pub ceiling_db: f64,
}

/// Precomputed saturation curve for a given ceiling.
#[derive(Debug, Clone, Copy)]
pub struct SoftLimiter {
    ceiling_linear: f64,
    k: f64,
    ceiling_db: f64,
}

impl SoftLimiter {
    pub fn new(config: &LimiterConfig) -> Self {
        let ceiling_linear = 10f64.powf(config.soft_ceiling_dbfs / 20.0);
        // Solve k from: ceiling * tanh(k * REFERENCE_INPUT) = REFERENCE_OUTPUT_FRACTION
        let target = (REFERENCE_OUTPUT_FRACTION / ceiling_linear).clamp(-0.999_999, 0.999_999);
        let k = target.atanh() / REFERENCE_INPUT;
        Self {
            ceiling_linear,
            k,
            ceiling_db: config.soft_ceiling_dbfs,
        }
    }

    #[inline]
    pub fn apply_sample(&self, x: f64) -> f64 {
        self.ceiling_linear * (self.k * x).tanh()
    }

    pub fn process(&self, audio: &[f64]) -> (Vec<f64>, LimitingInfo) {
        let input_peak = audio.iter().fold(0.0f64, |m, &x| m.max(x.abs()));
        let output: Vec<f64> = audio.iter().map(|&x| self.apply_sample(x)).collect();
        let output_peak = output.iter().fold(0.0f64, |m, &x| m.max(x.abs()));

        let info = LimitingInfo {
            input_peak_db: 20.0 * input_peak.max(1e-10).log10(),
            output_peak_db: 20.0 * output_peak.max(1e-10).log10(),
            ceiling_db: self.ceiling_db,
        };
        (output, info)
    }
}

/// Convenience one-shot limiting function.
pub fn limit(audio: &[f64], config: &LimiterConfig) -> (Vec<f64>, LimitingInfo) {
    SoftLimiter::new(config).process(audio)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ceiling_never_exceeded() {
        let limiter = SoftLimiter::new(&LimiterConfig::default());
        let ceiling = 10f64.powf(-0.5 / 20.0);
        for x in [-100.0, -5.0, -1.0, -0.9, 0.0, 0.5, 0.9, 1.0, 5.0, 100.0] {
            let y = limiter.apply_sample(x);
            assert!(y.abs() <= ceiling + 1e-12, "x={} y={} ceiling={}", x, y, ceiling);
        }
    }

    #[test]
    fn test_reference_point_near_transparent() {
        let limiter = SoftLimiter::new(&LimiterConfig::default());
        let y = limiter.apply_sample(0.9);
        assert!((y - 0.9).abs() < 0.01, "y={}", y);
    }

    #[test]
    fn test_near_linear_at_low_levels() {
        let limiter = SoftLimiter::new(&LimiterConfig::default());
        let y = limiter.apply_sample(0.1);
        assert!((y - 0.1).abs() < 0.02);
    }

    #[test]
    fn test_odd_symmetry() {
        let limiter = SoftLimiter::new(&LimiterConfig::default());
        for x in [0.1, 0.5, 0.9, 2.0] {
            assert!((limiter.apply_sample(x) + limiter.apply_sample(-x)).abs() < 1e-12);
        }
    }

    #[test]
    fn test_silence_passes_through_near_zero() {
        let (output, info) = limit(&vec![0.0; 1000], &LimiterConfig::default());
        assert!(output.iter().all(|&x| x == 0.0));
        assert!(info.input_peak_db <= -90.0);
    }
}
