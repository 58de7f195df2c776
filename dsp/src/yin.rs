/// YIN Fundamental Frequency Detection
///
/// Reference:
/// de Cheveigné, Alain & Kawahara, Hideki.
/// "YIN, a fundamental frequency estimator for speech and music."
/// JASA 111, 2002.

const FRAME_LENGTH: usize = 2048;
const HOP_LENGTH: usize = 512;
const DEFAULT_THRESHOLD: f64 = 0.15;

/// Detect fundamental frequency using the YIN algorithm.
///
/// # Arguments
/// * `y` - Audio signal [n_samples]
/// * `sr` - Sample rate (Hz)
/// * `fmin` - Minimum frequency (Hz)
/// * `fmax` - Maximum frequency (Hz)
///
/// # Returns
/// Fundamental frequency estimates [n_frames], 0 for unvoiced frames.
pub fn yin(y: &[f64], sr: usize, fmin: f64, fmax: f64) -> Vec<f64> {
    if y.len() < FRAME_LENGTH {
        return Vec::new();
    }

    let n_frames = (y.len() - FRAME_LENGTH) / HOP_LENGTH + 1;
    let mut f0_contour = vec![0.0; n_frames];

    let tau_min = (sr as f64 / fmax).floor().max(1.0) as usize;
    let tau_max = ((sr as f64 / fmin).ceil() as usize).min(FRAME_LENGTH / 2);

    let mut diff = vec![0.0f64; tau_max + 1];
    let mut cmnd = vec![1.0f64; tau_max + 1];

    for frame_idx in 0..n_frames {
        let start = frame_idx * HOP_LENGTH;
        let frame = &y[start..start + FRAME_LENGTH];

        difference_function(frame, tau_max, &mut diff);
        cumulative_mean_normalized_difference(&diff, tau_max, &mut cmnd);

        if let Some(tau) = absolute_threshold(&cmnd, tau_min, tau_max, DEFAULT_THRESHOLD) {
            let refined_tau = parabolic_interpolation(&cmnd, tau);
            if refined_tau > 0.0 {
                f0_contour[frame_idx] = sr as f64 / refined_tau;
            }
        }
    }

    f0_contour
}

/// `d(tau) = sum_i (x[i] - x[i+tau])^2` for `tau` in `0..=tau_max`.
fn difference_function(frame: &[f64], tau_max: usize, out: &mut [f64]) {
    out[0] = 0.0;
    let n = frame.len();
    for tau in 1..=tau_max {
        let mut sum = 0.0;
        let limit = n - tau;
        for i in 0..limit {
            let d = frame[i] - frame[i + tau];
            sum += d * d;
        }
        out[tau] = sum;
    }
}

/// `d'(tau) = d(tau) / ((1/tau) * sum_{i=1}^{tau} d(i))`, with `d'(0) = 1`.
fn cumulative_mean_normalized_difference(diff: &[f64], tau_max: usize, out: &mut [f64]) {
    out[0] = 1.0;
    let mut running_sum = 0.0;
    for tau in 1..=tau_max {
        running_sum += diff[tau];
        out[tau] = if running_sum > 0.0 {
            diff[tau] * tau as f64 / running_sum
        } else {
            1.0
        };
    }
}

/// Find the smallest `tau >= tau_min` that is a local minimum below `threshold`.
/// Returns `None` (unvoiced) if no candidate crosses the threshold.
fn absolute_threshold(cmnd: &[f64], tau_min: usize, tau_max: usize, threshold: f64) -> Option<usize> {
    let mut tau = tau_min.max(1);
    while tau < tau_max {
        if cmnd[tau] < threshold {
            while tau + 1 < tau_max && cmnd[tau + 1] < cmnd[tau] {
                tau += 1;
            }
            return Some(tau);
        }
        tau += 1;
    }
    None
}

/// Parabolic interpolation around `tau` for sub-sample precision.
fn parabolic_interpolation(cmnd: &[f64], tau: usize) -> f64 {
    if tau == 0 || tau + 1 >= cmnd.len() {
        return tau as f64;
    }
    let (s0, s1, s2) = (cmnd[tau - 1], cmnd[tau], cmnd[tau + 1]);
    let denom = 2.0 * s1 - s2 - s0;
    if denom.abs() < 1e-12 {
        tau as f64
    } else {
        tau as f64 + (s2 - s0) / (2.0 * denom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn sine(freq: f64, sr: usize, n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| (2.0 * PI * freq * i as f64 / sr as f64).sin())
            .collect()
    }

    #[test]
    fn test_yin_frame_count() {
        let audio = vec![0.0; 44100];
        let f0 = yin(&audio, 44100, 50.0, 2000.0);
        assert_eq!(f0.len(), (audio.len() - 2048) / 512 + 1);
    }

    #[test]
    fn test_yin_too_short_returns_empty() {
        let audio = vec![0.0; 100];
        assert!(yin(&audio, 44100, 50.0, 2000.0).is_empty());
    }

    #[test]
    fn test_yin_detects_known_pitch() {
        let sr = 44100;
        let audio = sine(220.0, sr, sr * 2);
        let f0 = yin(&audio, sr, 80.0, 500.0);
        let voiced: Vec<f64> = f0.iter().copied().filter(|&f| f > 0.0).collect();
        assert!(!voiced.is_empty());
        let mean = voiced.iter().sum::<f64>() / voiced.len() as f64;
        assert!((mean - 220.0).abs() < 5.0, "mean f0 {} not near 220 Hz", mean);
    }

    #[test]
    fn test_yin_silence_is_unvoiced() {
        let audio = vec![0.0; 44100];
        let f0 = yin(&audio, 44100, 50.0, 2000.0);
        assert!(f0.iter().all(|&f| f == 0.0));
    }
}
