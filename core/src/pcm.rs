/// Decoded audio, immutable once constructed. Samples are interleaved when
/// `channels == 2` (L, R, L, R, ...); mono otherwise.
#[derive(Debug, Clone)]
pub struct PcmBuffer {
    pub sample_rate: u32,
    pub channels: u16,
    pub samples: Vec<f64>,
}

impl PcmBuffer {
    pub fn new(sample_rate: u32, channels: u16, samples: Vec<f64>) -> Self {
        Self { sample_rate, channels, samples }
    }

    pub fn frame_count(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.samples.len() / self.channels as usize
        }
    }

    pub fn duration_sec(&self) -> f64 {
        self.frame_count() as f64 / self.sample_rate as f64
    }

    /// Mono downmix (average of channels). No-op copy when already mono.
    pub fn to_mono(&self) -> Vec<f64> {
        if self.channels <= 1 {
            return self.samples.clone();
        }
        let ch = self.channels as usize;
        self.samples
            .chunks_exact(ch)
            .map(|frame| frame.iter().sum::<f64>() / ch as f64)
            .collect()
    }

    /// Per-channel planar view: `[left, right]` for stereo, `[mono]` otherwise.
    pub fn to_planar(&self) -> Vec<Vec<f64>> {
        let ch = self.channels.max(1) as usize;
        let mut planes = vec![Vec::with_capacity(self.frame_count()); ch];
        for frame in self.samples.chunks_exact(ch) {
            for (c, &s) in frame.iter().enumerate() {
                planes[c].push(s);
            }
        }
        planes
    }

    pub fn is_stereo(&self) -> bool {
        self.channels == 2
    }

    /// Clamp NaN/Inf transients to 0, returning the count clamped.
    pub fn clamp_non_finite(&mut self) -> usize {
        let mut count = 0;
        for s in self.samples.iter_mut() {
            if !s.is_finite() {
                *s = 0.0;
                count += 1;
            }
        }
        count
    }

    /// Extract `[start, end)` frames as a new owned buffer, clamping to bounds.
    pub fn slice_frames(&self, start: usize, end: usize) -> PcmBuffer {
        let ch = self.channels.max(1) as usize;
        let frames = self.frame_count();
        let start = start.min(frames);
        let end = end.min(frames).max(start);
        let samples = self.samples[start * ch..end * ch].to_vec();
        PcmBuffer::new(self.sample_rate, self.channels, samples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mono_downmix_averages_channels() {
        let buf = PcmBuffer::new(44100, 2, vec![1.0, -1.0, 0.5, 0.5]);
        assert_eq!(buf.to_mono(), vec![0.0, 0.5]);
    }

    #[test]
    fn planar_splits_interleaved_stereo() {
        let buf = PcmBuffer::new(44100, 2, vec![1.0, 2.0, 3.0, 4.0]);
        let planes = buf.to_planar();
        assert_eq!(planes[0], vec![1.0, 3.0]);
        assert_eq!(planes[1], vec![2.0, 4.0]);
    }

    #[test]
    fn clamp_non_finite_counts_and_zeroes() {
        let mut buf = PcmBuffer::new(44100, 1, vec![1.0, f64::NAN, f64::INFINITY, 0.5]);
        let count = buf.clamp_non_finite();
        assert_eq!(count, 2);
        assert_eq!(buf.samples, vec![1.0, 0.0, 0.0, 0.5]);
    }

    #[test]
    fn slice_frames_clamps_to_bounds() {
        let buf = PcmBuffer::new(44100, 1, vec![0.0, 1.0, 2.0, 3.0]);
        let s = buf.slice_frames(2, 100);
        assert_eq!(s.samples, vec![2.0, 3.0]);
    }
}
