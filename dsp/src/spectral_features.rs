/// Spectral feature analysis (centroid, rolloff, flatness)
/// These features describe the "shape" and "color" of the audio spectrum

use std::f64::consts::PI;

/// Compute spectral centroid (center of mass of spectrum)
/// Higher values = brighter/more high-frequency content
/// Range: 0.0 - Nyquist frequency (Hz)
///
/// # Arguments
/// * `psd` - Power spectral density (from FFT)
/// * `freqs` - Frequency values for each bin (Hz)
///
/// # Returns
/// Spectral centroid in Hz
pub fn compute_spectral_centroid(psd: &[f64], freqs: &[f64]) -> f64 {
    if psd.is_empty() || psd.len() != freqs.len() {
        return 0.0;
    }

    let total_power: f64 = psd.iter().sum();
    if total_power < 1e-10 {
        return 0.0;
    }

    let weighted_sum: f64 = psd
        .iter()
        .zip(freqs.iter())
        .map(|(power, freq)| power * freq)
        .sum();

    weighted_sum / total_power
}

/// Compute spectral rolloff (frequency containing 85% of energy)
/// Lower = more concentrated energy, Higher = spread energy
/// Range: 0.0 - Nyquist frequency (Hz)
///
/// # Arguments
/// * `psd` - Power spectral density
/// * `freqs` - Frequency values for each bin
/// * `rolloff` - Threshold percentage (0.0 - 1.0), typically 0.85
///
/// # Returns
/// Rolloff frequency in Hz
pub fn compute_spectral_rolloff(psd: &[f64], freqs: &[f64], rolloff: f64) -> f64 {
    if psd.is_empty() || psd.len() != freqs.len() {
        return 0.0;
    }

    let total_power: f64 = psd.iter().sum();
    if total_power < 1e-10 {
        return 0.0;
    }

    let threshold = rolloff * total_power;
    let mut cumulative = 0.0;

    for (power, freq) in psd.iter().zip(freqs.iter()) {
        cumulative += power;
        if cumulative >= threshold {
            return *freq;
        }
    }

    freqs[freqs.len() - 1]
}

/// Compute spectral flatness (Wiener entropy)
/// Measures noisiness vs tonality
/// Range: 0.0 (pure tone) to 1.0 (white noise)
///
/// Flatness = (geometric_mean) / (arithmetic_mean)
/// where geometric_mean = exp(mean(log(psd)))
///       arithmetic_mean = mean(psd)
///
/// # Arguments
/// * `psd` - Power spectral density
///
/// # Returns
/// Spectral flatness (0.0 = tone, 1.0 = noise)
pub fn compute_spectral_flatness(psd: &[f64]) -> f64 {
    if psd.is_empty() {
        return 0.0;
    }

    // Filter out zeros to avoid log(0)
    let nonzero_psd: Vec<f64> = psd.iter().filter(|&&p| p > 1e-10).copied().collect();
    if nonzero_psd.is_empty() {
        return 0.0;
    }

    // Geometric mean = exp(mean(log(psd)))
    let log_sum: f64 = nonzero_psd.iter().map(|&p| p.ln()).sum();
    let geometric_mean = (log_sum / nonzero_psd.len() as f64).exp();

    // Arithmetic mean
    let arithmetic_mean: f64 = nonzero_psd.iter().sum::<f64>() / nonzero_psd.len() as f64;

    if arithmetic_mean < 1e-10 {
        return 0.0;
    }

    // Flatness = geometric / arithmetic (0 to 1)
    (geometric_mean / arithmetic_mean).clamp(0.0, 1.0)
}

/// Helper: Convert audio to frequency domain
/// Returns (frequencies, psd)
pub fn audio_to_freq_domain(audio: &[f64], sample_rate: u32) -> (Vec<f64>, Vec<f64>) {
    use rustfft::num_complex::Complex;
    use rustfft::FftPlanner;

    if audio.is_empty() {
        return (vec![], vec![]);
    }

    // FFT setup
    let fft_size = (audio.len() as f64).log2().ceil() as u32;
    let fft_size = 2usize.pow(fft_size);

    let mut fft_input: Vec<Complex<f64>> = vec![Complex { re: 0.0, im: 0.0 }; fft_size];
    for (i, &sample) in audio.iter().enumerate() {
        fft_input[i].re = sample;
    }

    // Apply Hann window
    let n = audio.len() as f64;
    for (i, sample) in fft_input.iter_mut().enumerate().take(audio.len()) {
        let window = 0.5 * (1.0 - ((2.0 * PI * i as f64) / n).cos());
        sample.re *= window;
    }

    // Compute FFT
    let mut planner = FftPlanner::new();
    let fft = planner.plan_fft_forward(fft_size);
    fft.process(&mut fft_input);

    // Compute PSD
    let psd: Vec<f64> = fft_input
        .iter()
        .map(|c| c.norm_sqr() / (fft_size as f64).powi(2))
        .collect();

    // Compute frequencies
    let freqs: Vec<f64> = (0..fft_size / 2)
        .map(|i| (i as f64 * sample_rate as f64) / fft_size as f64)
        .collect();

    (freqs, psd[..fft_size / 2].to_vec())
}
