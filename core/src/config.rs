use serde::{Deserialize, Serialize};

/// Recognized configuration options (spec §6.4). All fields have the
/// documented defaults; a config is plain data, no I/O.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    pub chunk_duration_sec: f64,
    pub context_duration_sec: f64,
    pub crossfade_ms: f64,
    pub analysis_sample_rate: u32,
    pub classifier_confidence_threshold: f64,
    pub hybrid_dominance_threshold: f64,
    pub hybrid_sum_threshold: f64,
    pub hybrid_top_k: usize,
    pub max_db_delta_per_chunk: f64,
    pub soft_ceiling_dbfs: f64,
    pub t1_max_chunks: usize,
    pub t2_max_chunks: usize,
    pub predictive_window: usize,
    pub build_timeout_factor: f64,
    pub fingerprint_workers: usize,
    pub track_idle_timeout_sec: u64,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            chunk_duration_sec: 30.0,
            context_duration_sec: 5.0,
            crossfade_ms: 200.0,
            analysis_sample_rate: 44100,
            classifier_confidence_threshold: 0.65,
            hybrid_dominance_threshold: 0.50,
            hybrid_sum_threshold: 0.70,
            hybrid_top_k: 3,
            max_db_delta_per_chunk: 1.5,
            soft_ceiling_dbfs: -0.5,
            t1_max_chunks: 8,
            t2_max_chunks: 64,
            predictive_window: 3,
            build_timeout_factor: 2.0,
            fingerprint_workers: 16,
            track_idle_timeout_sec: 60,
        }
    }
}

impl CoreConfig {
    pub fn chunk_len_samples(&self, sample_rate: u32) -> usize {
        (self.chunk_duration_sec * sample_rate as f64).round() as usize
    }

    pub fn context_len_samples(&self, sample_rate: u32) -> usize {
        (self.context_duration_sec * sample_rate as f64).round() as usize
    }

    pub fn crossfade_samples(&self, sample_rate: u32) -> usize {
        let raw = (self.crossfade_ms / 1000.0 * sample_rate as f64).round() as usize;
        raw.min(self.chunk_len_samples(sample_rate) / 4)
    }

    pub fn build_timeout_sec(&self) -> f64 {
        self.chunk_duration_sec * self.build_timeout_factor
    }
}
