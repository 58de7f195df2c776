/// FFT-based frequency distribution analysis
/// Divides the audio spectrum into 7 perceptual frequency bands

use rustfft::num_complex::Complex;
use rustfft::FftPlanner;
use std::f64::consts::PI;

/// Frequency bands for distribution analysis
#[derive(Debug, Clone, Copy)]
pub struct FrequencyBands {
    pub sub_bass: f64,  // 20-60 Hz
    pub bass: f64,       // 60-250 Hz
    pub low_mid: f64,    // 250-500 Hz
    pub mid: f64,        // 500-2000 Hz
    pub upper_mid: f64,  // 2000-4000 Hz
    pub presence: f64,   // 4000-6000 Hz
    pub air: f64,        // 6000-20000 Hz
}

impl FrequencyBands {
    pub fn to_array(&self) -> [f64; 7] {
        [
            self.sub_bass,
            self.bass,
            self.low_mid,
            self.mid,
            self.upper_mid,
            self.presence,
            self.air,
        ]
    }

    pub fn sum(&self) -> f64 {
        self.sub_bass + self.bass + self.low_mid + self.mid + self.upper_mid + self.presence + self.air
    }
}

fn apply_hann_window(signal: &mut [Complex<f64>]) {
    let n = signal.len() as f64;
    for (i, sample) in signal.iter_mut().enumerate() {
        let window = 0.5 * (1.0 - ((2.0 * PI * i as f64) / n).cos());
        sample.re *= window;
        sample.im *= window;
    }
}

fn compute_psd(spectrum: &[Complex<f64>]) -> Vec<f64> {
    spectrum
        .iter()
        .map(|c| (c.norm_sqr() / (spectrum.len() as f64).powi(2)).max(1e-10))
        .collect()
}

fn hz_to_bin(hz: f64, sample_rate: u32, fft_size: usize) -> usize {
    ((hz * fft_size as f64) / sample_rate as f64).floor() as usize
}

fn integrate_power_range(psd: &[f64], start_bin: usize, end_bin: usize) -> f64 {
    if start_bin >= psd.len() {
        return 0.0;
    }
    let end = end_bin.min(psd.len());
    psd[start_bin..end].iter().sum::<f64>()
}

/// Compute frequency distribution across 7 perceptual bands (sum = 1.0).
///
/// Bands: sub-bass (20-60 Hz), bass (60-250), low-mid (250-500), mid
/// (500-2000), upper-mid (2000-4000), presence (4000-6000), air (6000-20000).
pub fn compute_frequency_distribution(audio: &[f64], sample_rate: u32) -> FrequencyBands {
    if audio.is_empty() {
        return uniform_distribution();
    }

    // Use up to 30 seconds as a representative sample.
    let analysis_len = ((30.0 * sample_rate as f64) as usize).min(audio.len());
    let analysis_audio = &audio[..analysis_len];

    let fft_size = (analysis_len as f64).log2().ceil() as u32;
    let fft_size = 2usize.pow(fft_size);

    let mut fft_input: Vec<Complex<f64>> = vec![Complex { re: 0.0, im: 0.0 }; fft_size];
    for (i, &sample) in analysis_audio.iter().enumerate() {
        fft_input[i].re = sample;
    }

    apply_hann_window(&mut fft_input);

    let mut planner = FftPlanner::new();
    let fft = planner.plan_fft_forward(fft_size);
    fft.process(&mut fft_input);

    let psd = compute_psd(&fft_input);

    let nyquist = sample_rate as f64 / 2.0;
    let freqs = [20.0, 60.0, 250.0, 500.0, 2000.0, 4000.0, 6000.0, 20000.0];

    let mut bins = [0usize; 8];
    for (i, &freq) in freqs.iter().enumerate() {
        bins[i] = hz_to_bin(freq.min(nyquist), sample_rate, fft_size);
    }

    let mut distribution = [0.0f64; 7];
    for i in 0..7 {
        distribution[i] = integrate_power_range(&psd, bins[i], bins[i + 1]);
    }

    let total: f64 = distribution.iter().sum();
    if total > 0.0 {
        for band in &mut distribution {
            *band /= total;
        }
    } else {
        for band in &mut distribution {
            *band = 1.0 / 7.0;
        }
    }

    FrequencyBands {
        sub_bass: distribution[0],
        bass: distribution[1],
        low_mid: distribution[2],
        mid: distribution[3],
        upper_mid: distribution[4],
        presence: distribution[5],
        air: distribution[6],
    }
}

fn uniform_distribution() -> FrequencyBands {
    FrequencyBands {
        sub_bass: 1.0 / 7.0,
        bass: 1.0 / 7.0,
        low_mid: 1.0 / 7.0,
        mid: 1.0 / 7.0,
        upper_mid: 1.0 / 7.0,
        presence: 1.0 / 7.0,
        air: 1.0 / 7.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frequency_distribution_empty() {
        let distribution = compute_frequency_distribution(&[], 48000);
        assert!((distribution.sum() - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_frequency_distribution_silence() {
        let audio = vec![0.0; 48000];
        let distribution = compute_frequency_distribution(&audio, 48000);
        assert!((distribution.sum() - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_frequency_distribution_sine_bass() {
        let sample_rate = 48000;
        let freq = 100.0;
        let duration = 2.0;
        let samples = (duration * sample_rate as f64) as usize;
        let audio: Vec<f64> = (0..samples)
            .map(|i| {
                let t = i as f64 / sample_rate as f64;
                (2.0 * PI * freq * t).sin()
            })
            .collect();

        let distribution = compute_frequency_distribution(&audio, sample_rate);

        assert!(distribution.bass > distribution.sub_bass);
        assert!(distribution.bass > distribution.presence);
        assert!((distribution.sum() - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_frequency_distribution_sine_presence() {
        let sample_rate = 48000;
        let freq = 5000.0;
        let duration = 2.0;
        let samples = (duration * sample_rate as f64) as usize;
        let audio: Vec<f64> = (0..samples)
            .map(|i| {
                let t = i as f64 / sample_rate as f64;
                (2.0 * PI * freq * t).sin()
            })
            .collect();

        let distribution = compute_frequency_distribution(&audio, sample_rate);

        assert!(distribution.presence > distribution.sub_bass);
        assert!(distribution.presence > distribution.bass);
        assert!((distribution.sum() - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_frequency_distribution_normalized() {
        let audio: Vec<f64> = (0..48000).map(|i| (i as f64 * 0.01).sin()).collect();
        let distribution = compute_frequency_distribution(&audio, 48000);
        assert!((distribution.sum() - 1.0).abs() < 0.01);
    }
}
