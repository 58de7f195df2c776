/// Auralis DSP - audio signal processing primitives
///
/// - HPSS: Harmonic/Percussive Source Separation
/// - YIN: Fundamental frequency detection
/// - Chroma: Constant-Q chromagram features
/// - Tempo: Spectral flux onset detection for tempo estimation
/// - Envelope: Attack/release envelope follower for dynamics processing
/// - Compressor: Dynamic range compressor with peak/RMS/hybrid detection
/// - Limiter: Stateless tanh soft-ceiling limiter
/// - Crossfade: Equal-power chunk-stitching crossfade

pub mod error;

// Core DSP modules
pub mod hpss;
pub mod yin;
pub mod chroma;
pub mod tempo;
pub mod median_filter;
pub mod envelope;
pub mod compressor;
pub mod limiter;
pub mod crossfade;
pub mod biquad_filter;
pub mod onset_detector;

// Fingerprinting modules (25D audio analysis)
pub mod frequency_analysis;
pub mod spectral_features;
pub mod variation_analysis;
pub mod stereo_analysis;

// Re-export main functions for convenience
pub use error::{DspError, Result};
pub use hpss::hpss;
pub use yin::yin;
pub use chroma::chroma_cqt;
pub use tempo::detect_tempo;
pub use envelope::{envelope_follow, EnvelopeFollower, EnvelopeConfig};
pub use compressor::{compress, Compressor, CompressorConfig, CompressorState, DetectionMode, CompressionInfo};
pub use limiter::{limit, SoftLimiter, LimiterConfig, LimitingInfo};
pub use crossfade::equal_power_crossfade;

// Fingerprinting exports
pub use frequency_analysis::compute_frequency_distribution;
pub use spectral_features::{compute_spectral_centroid, compute_spectral_rolloff, compute_spectral_flatness, audio_to_freq_domain};
pub use variation_analysis::{compute_dynamic_range_variation, compute_loudness_variation, compute_peak_consistency};
pub use stereo_analysis::{compute_stereo_width, compute_phase_correlation, is_stereo};
