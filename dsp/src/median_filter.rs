/// 2D median filtering for spectrograms, used by HPSS to separate sustained
/// (harmonic) content from transient (percussive) content.
use ndarray::Array2;

/// Apply median filter with vertical kernel (frequency-wise).
/// Smears short, wide-band transients into the estimate; what survives is
/// content sustained across frequency bins within a single time frame.
pub fn median_filter_vertical(data: &Array2<f64>, kernel_size: usize) -> Array2<f64> {
    let (n_freq, n_frames) = data.dim();
    let mut output = Array2::<f64>::zeros((n_freq, n_frames));
    let half_kernel = kernel_size / 2;

    for j in 0..n_frames {
        let mut values = Vec::with_capacity(kernel_size);
        for i in 0..n_freq {
            let start = i.saturating_sub(half_kernel);
            let end = (i + half_kernel + 1).min(n_freq);

            values.clear();
            values.extend((start..end).map(|k| data[[k, j]]));
            values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
            output[[i, j]] = values[values.len() / 2];
        }
    }

    output
}

/// Apply median filter with horizontal kernel (time-wise).
/// Smears sustained tones into the estimate; what survives is energy that
/// is narrow in time but spread across frequency - i.e. percussive onsets.
pub fn median_filter_horizontal(data: &Array2<f64>, kernel_size: usize) -> Array2<f64> {
    let (n_freq, n_frames) = data.dim();
    let mut output = Array2::<f64>::zeros((n_freq, n_frames));
    let half_kernel = kernel_size / 2;

    for i in 0..n_freq {
        let mut values = Vec::with_capacity(kernel_size);
        for j in 0..n_frames {
            let start = j.saturating_sub(half_kernel);
            let end = (j + half_kernel + 1).min(n_frames);

            values.clear();
            values.extend((start..end).map(|k| data[[i, k]]));
            values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
            output[[i, j]] = values[values.len() / 2];
        }
    }

    output
}
