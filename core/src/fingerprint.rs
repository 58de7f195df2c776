//! 25-dimensional acoustic fingerprint extraction.
//!
//! Orchestrates the DSP primitives in `auralis_dsp` into the fixed 25-field
//! vector described by the canonical schema (see [`FIELD_ORDER`]), and
//! provides the SHA-256 integrity hash every persisted fingerprint must
//! verify against on read.

use crate::error::{CoreError, Result};
use crate::pcm::PcmBuffer;
use auralis_dsp::{
    chroma::chroma_cqt,
    compute_frequency_distribution, compute_phase_correlation, compute_spectral_centroid,
    compute_spectral_flatness, compute_spectral_rolloff, compute_stereo_width,
    hpss, is_stereo,
    onset_detector::OnsetDetector,
    spectral_features::audio_to_freq_domain,
    tempo::{detect_tempo, TempoConfig},
    yin,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub const SCHEMA_VERSION: u32 = 1;
const MIN_ANALYSIS_SECONDS: f64 = 1.0;

/// Canonical field order used both for hashing and for the persisted JSON
/// schema in spec §6.1. Order matters: it is part of the integrity contract.
pub const FIELD_ORDER: [&str; 25] = [
    "sub_bass_pct",
    "bass_pct",
    "low_mid_pct",
    "mid_pct",
    "upper_mid_pct",
    "presence_pct",
    "air_pct",
    "lufs",
    "crest_db",
    "bass_mid_ratio",
    "tempo_bpm",
    "rhythm_stability",
    "transient_density",
    "silence_ratio",
    "spectral_centroid",
    "spectral_rolloff",
    "spectral_flatness",
    "harmonic_ratio",
    "pitch_stability",
    "chroma_energy",
    "dynamic_range_variation",
    "loudness_variation_std",
    "peak_consistency",
    "stereo_width",
    "phase_correlation",
];

/// The 25-dimensional fingerprint vector plus schema version and integrity hash.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FingerprintVector {
    pub sub_bass_pct: f64,
    pub bass_pct: f64,
    pub low_mid_pct: f64,
    pub mid_pct: f64,
    pub upper_mid_pct: f64,
    pub presence_pct: f64,
    pub air_pct: f64,

    pub lufs: f64,
    pub crest_db: f64,
    pub bass_mid_ratio: f64,

    pub tempo_bpm: f64,
    pub rhythm_stability: f64,
    pub transient_density: f64,
    pub silence_ratio: f64,

    pub spectral_centroid: f64,
    pub spectral_rolloff: f64,
    pub spectral_flatness: f64,

    pub harmonic_ratio: f64,
    pub pitch_stability: f64,
    pub chroma_energy: f64,

    pub dynamic_range_variation: f64,
    pub loudness_variation_std: f64,
    pub peak_consistency: f64,

    pub stereo_width: f64,
    pub phase_correlation: f64,

    pub schema_version: u32,
    pub hash: String,
}

impl FingerprintVector {
    /// The 25 values in canonical field order, for hashing and for
    /// distance/centroid computations in the classifier.
    pub fn values(&self) -> [f64; 25] {
        [
            self.sub_bass_pct,
            self.bass_pct,
            self.low_mid_pct,
            self.mid_pct,
            self.upper_mid_pct,
            self.presence_pct,
            self.air_pct,
            self.lufs,
            self.crest_db,
            self.bass_mid_ratio,
            self.tempo_bpm,
            self.rhythm_stability,
            self.transient_density,
            self.silence_ratio,
            self.spectral_centroid,
            self.spectral_rolloff,
            self.spectral_flatness,
            self.harmonic_ratio,
            self.pitch_stability,
            self.chroma_energy,
            self.dynamic_range_variation,
            self.loudness_variation_std,
            self.peak_consistency,
            self.stereo_width,
            self.phase_correlation,
        ]
    }

    /// Canonical bytes for hashing: each of the 25 values as little-endian
    /// IEEE-754 doubles, in `FIELD_ORDER`.
    fn canonical_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(25 * 8);
        for v in self.values() {
            buf.extend_from_slice(&v.to_le_bytes());
        }
        buf
    }

    fn compute_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.canonical_bytes());
        hex::encode(hasher.finalize())
    }

    /// Recompute the hash over this fingerprint's stored values and compare
    /// it against `self.hash`. A mismatch means the fingerprint was tampered
    /// with (or corrupted) after persistence.
    pub fn verify(&self) -> bool {
        self.compute_hash() == self.hash
    }

    /// Recompute and store the hash over the current field values. Used
    /// when a fingerprint's dimensions were filled in from a source other
    /// than [`extract`] (e.g. a remote offload response) and need the
    /// integrity hash stamped on before they can be persisted.
    pub fn seal(mut self) -> Self {
        self.hash = self.compute_hash();
        self
    }
}

/// Extract the 25-dimensional fingerprint from a (possibly stereo) PCM
/// buffer. Input shorter than one second returns `InputTooShort`.
pub fn extract(pcm: &PcmBuffer) -> Result<FingerprintVector> {
    if pcm.duration_sec() < MIN_ANALYSIS_SECONDS {
        return Err(CoreError::InputTooShort);
    }

    let sr = pcm.sample_rate;
    let mono = pcm.to_mono();

    let bands = compute_frequency_distribution(&mono, sr);
    let (lufs, crest_db, bass_mid_ratio) = dynamics(&mono, &bands);
    let (tempo_bpm, rhythm_stability, transient_density) = temporal_rhythm(&mono, sr);
    let silence_ratio = silence_ratio(&mono, sr);
    let (spectral_centroid, spectral_rolloff, spectral_flatness) = spectral(&mono, sr);
    let (harmonic_ratio, pitch_stability, chroma_energy) = harmonic(&mono, sr);
    let dynamic_range_variation = auralis_dsp::compute_dynamic_range_variation(&mono, sr);
    let loudness_variation_std = auralis_dsp::compute_loudness_variation(&mono, sr);
    let peak_consistency = auralis_dsp::compute_peak_consistency(&mono, sr);
    let (stereo_width, phase_correlation) = stereo(pcm);

    let mut fp = FingerprintVector {
        sub_bass_pct: bands.sub_bass * 100.0,
        bass_pct: bands.bass * 100.0,
        low_mid_pct: bands.low_mid * 100.0,
        mid_pct: bands.mid * 100.0,
        upper_mid_pct: bands.upper_mid * 100.0,
        presence_pct: bands.presence * 100.0,
        air_pct: bands.air * 100.0,
        lufs,
        crest_db,
        bass_mid_ratio,
        tempo_bpm,
        rhythm_stability,
        transient_density,
        silence_ratio,
        spectral_centroid,
        spectral_rolloff,
        spectral_flatness,
        harmonic_ratio,
        pitch_stability,
        chroma_energy,
        dynamic_range_variation,
        loudness_variation_std,
        peak_consistency,
        stereo_width,
        phase_correlation,
        schema_version: SCHEMA_VERSION,
        hash: String::new(),
    };

    for v in fp.values() {
        if !v.is_finite() {
            return Err(CoreError::DspError {
                step: "fingerprint-extract",
                chunk_index: 0,
                cause: "non-finite dimension produced".to_string(),
            });
        }
    }

    fp.hash = fp.compute_hash();
    Ok(fp)
}

fn dynamics(mono: &[f64], bands: &auralis_dsp::frequency_analysis::FrequencyBands) -> (f64, f64, f64) {
    let rms = rms(mono);
    let lufs = if rms > 1e-10 {
        -0.691 + 10.0 * (rms * rms).log10()
    } else {
        -70.0
    };
    let peak = mono.iter().map(|s| s.abs()).fold(0.0_f64, f64::max);
    let crest_db = if rms > 1e-10 {
        20.0 * (peak / rms).max(1.0).log10()
    } else {
        0.0
    };
    let bass_mid_ratio = 10.0 * (bands.bass.max(1e-10) / bands.mid.max(1e-10)).log10();
    (lufs.clamp(-120.0, 0.0), crest_db.clamp(0.0, 60.0), bass_mid_ratio.clamp(-40.0, 40.0))
}

fn rms(signal: &[f64]) -> f64 {
    if signal.is_empty() {
        return 0.0;
    }
    (signal.iter().map(|s| s * s).sum::<f64>() / signal.len() as f64).sqrt()
}

fn temporal_rhythm(mono: &[f64], sr: u32) -> (f64, f64, f64) {
    let tempo_bpm = detect_tempo(mono, sr as usize, &TempoConfig::default());

    let detector = OnsetDetector::new(sr as f64, 1024, 512).with_threshold(0.3);
    let view = ndarray::ArrayView1::from(mono.as_slice());
    let result = detector.detect(&view);
    let duration_sec = mono.len() as f64 / sr as f64;

    let transient_density = if duration_sec > 0.0 {
        result.onset_frames.len() as f64 / duration_sec
    } else {
        0.0
    };

    let rhythm_stability = if result.onset_frames.len() > 2 {
        let intervals: Vec<f64> = result
            .onset_frames
            .windows(2)
            .map(|w| (w[1] - w[0]) as f64)
            .collect();
        let mean = intervals.iter().sum::<f64>() / intervals.len() as f64;
        if mean > 1e-9 {
            let variance =
                intervals.iter().map(|i| (i - mean).powi(2)).sum::<f64>() / intervals.len() as f64;
            let cv = variance.sqrt() / mean;
            (1.0 / (1.0 + cv)).clamp(0.0, 1.0)
        } else {
            0.5
        }
    } else {
        0.5
    };

    (tempo_bpm.clamp(40.0, 220.0), rhythm_stability, transient_density.max(0.0))
}

fn silence_ratio(mono: &[f64], sr: u32) -> f64 {
    let frame_len = (sr as usize / 10).max(1);
    let frames: Vec<&[f64]> = mono.chunks(frame_len).collect();
    if frames.is_empty() {
        return 1.0;
    }
    let silent = frames
        .iter()
        .filter(|frame| {
            let level_db = 20.0 * rms(frame).max(1e-10).log10();
            level_db < -60.0
        })
        .count();
    silent as f64 / frames.len() as f64
}

fn spectral(mono: &[f64], sr: u32) -> (f64, f64, f64) {
    let (freqs, psd) = audio_to_freq_domain(mono, sr);
    if psd.is_empty() {
        return (0.0, 0.0, 0.0);
    }
    let centroid = compute_spectral_centroid(&psd, &freqs);
    let rolloff = compute_spectral_rolloff(&psd, &freqs, 0.85);
    let flatness = compute_spectral_flatness(&psd);
    (centroid, rolloff, flatness)
}

fn harmonic(mono: &[f64], sr: u32) -> (f64, f64, f64) {
    let harmonic_ratio = match hpss(mono, &auralis_dsp::hpss::HpssConfig::default()) {
        Ok((h, p)) => {
            let h_energy: f64 = h.iter().map(|s| s * s).sum();
            let p_energy: f64 = p.iter().map(|s| s * s).sum();
            let total = h_energy + p_energy;
            if total > 1e-12 {
                (h_energy / total).clamp(0.0, 1.0)
            } else {
                0.5
            }
        }
        Err(_) => 0.5,
    };

    let f0_contour = yin(mono, sr as usize, 60.0, 1500.0);
    let voiced: Vec<f64> = f0_contour
        .iter()
        .copied()
        .filter(|&f| f > 0.0)
        .map(|f| f.ln())
        .collect();
    let pitch_stability = if voiced.len() > 1 {
        let mean = voiced.iter().sum::<f64>() / voiced.len() as f64;
        let variance = voiced.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / voiced.len() as f64;
        let normalized_variance = (variance / (mean.abs().max(1e-6))).min(1.0);
        (1.0 - normalized_variance).clamp(0.0, 1.0)
    } else {
        0.0
    };

    let chroma = chroma_cqt(mono, sr as usize);
    let chroma_energy = if chroma.is_empty() {
        0.0
    } else {
        chroma.mean().unwrap_or(0.0).clamp(0.0, 1.0)
    };

    (harmonic_ratio, pitch_stability, chroma_energy)
}

fn stereo(pcm: &PcmBuffer) -> (f64, f64) {
    if !pcm.is_stereo() {
        return (0.0, 1.0);
    }
    let planes = pcm.to_planar();
    if !is_stereo(pcm.channels as u32, &pcm.samples) {
        return (0.0, 1.0);
    }
    let width = compute_stereo_width(&planes[0], &planes[1]);
    let correlation = compute_phase_correlation(&planes[0], &planes[1]);
    (width, correlation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn sine_sweep(start_hz: f64, end_hz: f64, sr: u32, duration_sec: f64) -> PcmBuffer {
        let n = (duration_sec * sr as f64) as usize;
        let samples: Vec<f64> = (0..n)
            .map(|i| {
                let t = i as f64 / sr as f64;
                let frac = t / duration_sec;
                let freq = start_hz * (end_hz / start_hz).powf(frac);
                (2.0 * PI * freq * t).sin() * 0.5
            })
            .collect();
        PcmBuffer::new(sr, 1, samples)
    }

    #[test]
    fn input_too_short_errors() {
        let pcm = PcmBuffer::new(44100, 1, vec![0.0; 100]);
        assert!(matches!(extract(&pcm), Err(CoreError::InputTooShort)));
    }

    #[test]
    fn hash_integrity_round_trip_and_tamper_detection() {
        let pcm = sine_sweep(20.0, 20000.0, 44100, 2.0);
        let mut fp = extract(&pcm).expect("extraction succeeds on 2s sweep");
        assert!(fp.verify());

        // Flip the least-significant bit of bass_pct.
        let tampered = f64::from_bits(fp.bass_pct.to_bits() ^ 1);
        fp.bass_pct = tampered;
        assert!(!fp.verify());
    }

    #[test]
    fn silent_input_has_bounded_lufs_and_full_silence_ratio() {
        let pcm = PcmBuffer::new(44100, 1, vec![0.0; 44100 * 2]);
        let fp = extract(&pcm).expect("silence is a valid 2s input");
        assert!(fp.lufs <= -60.0);
        assert_eq!(fp.silence_ratio, 1.0);
        assert_eq!(fp.stereo_width, 0.0);
        assert!(fp.crest_db.is_finite());
    }

    #[test]
    fn determinism_across_repeated_extraction() {
        let pcm = sine_sweep(40.0, 8000.0, 44100, 1.5);
        let a = extract(&pcm).unwrap();
        let b = extract(&pcm).unwrap();
        assert_eq!(a.values(), b.values());
        assert_eq!(a.hash, b.hash);
    }
}
