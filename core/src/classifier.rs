//! Recording-type classifier and adaptive parameter mapper (spec §4.3).
//!
//! A deterministic rule set over a low-dimensional projection of the
//! fingerprint produces a `(RecordingType, confidence)` pair; the mapper then
//! turns that into an `AdaptiveParameters` struct for a chosen preset and
//! intensity. Both stages are pure functions — no I/O, no shared state.

use crate::config::CoreConfig;
use crate::fingerprint::FingerprintVector;
use serde::{Deserialize, Serialize};

/// Closed set of recording-style tags the classifier can emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecordingType {
    Studio,
    Bootleg,
    Metal,
    VintageAnalog,
    HiRes,
    BrightMaster,
    DamagedStudio,
    Unknown,
}

impl RecordingType {
    pub const CLASSIFIABLE: [RecordingType; 7] = [
        RecordingType::Studio,
        RecordingType::Bootleg,
        RecordingType::Metal,
        RecordingType::VintageAnalog,
        RecordingType::HiRes,
        RecordingType::BrightMaster,
        RecordingType::DamagedStudio,
    ];
}

/// Named user-facing mastering intent (spec §4.3, §GLOSSARY).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Preset {
    Gentle,
    Punchy,
    Warm,
    Bright,
    Adaptive,
}

/// Dominant-dimension projection used for classification: a subset of the
/// 25-dim fingerprint that separates recording styles well without the
/// noise of dimensions that vary for reasons unrelated to mastering history
/// (tempo, rhythm stability, etc. are excluded).
#[derive(Debug, Clone, Copy)]
struct Projection {
    lufs: f64,
    crest_db: f64,
    bass_mid_ratio: f64,
    spectral_centroid: f64,
    stereo_width: f64,
    spectral_flatness: f64,
}

impl Projection {
    fn from_fingerprint(fp: &FingerprintVector) -> Self {
        Self {
            lufs: fp.lufs,
            crest_db: fp.crest_db,
            bass_mid_ratio: fp.bass_mid_ratio,
            spectral_centroid: fp.spectral_centroid,
            stereo_width: fp.stereo_width,
            spectral_flatness: fp.spectral_flatness,
        }
    }

    /// Euclidean distance in a unit-scaled projection space. Each axis is
    /// divided by a characteristic spread so no single dimension (e.g.
    /// centroid in Hz vs. width in [0,1]) dominates the distance.
    fn distance(&self, other: &Projection) -> f64 {
        let d_lufs = (self.lufs - other.lufs) / 12.0;
        let d_crest = (self.crest_db - other.crest_db) / 8.0;
        let d_bmr = (self.bass_mid_ratio - other.bass_mid_ratio) / 10.0;
        let d_centroid = (self.spectral_centroid - other.spectral_centroid) / 2000.0;
        let d_width = (self.stereo_width - other.stereo_width) / 0.5;
        let d_flatness = (self.spectral_flatness - other.spectral_flatness) / 0.3;
        (d_lufs * d_lufs
            + d_crest * d_crest
            + d_bmr * d_bmr
            + d_centroid * d_centroid
            + d_width * d_width
            + d_flatness * d_flatness)
            .sqrt()
    }
}

/// Static centroid table, one row per classifiable recording type. Values
/// are representative of the acoustic style each tag names, not measured
/// from a reference corpus (no such corpus exists for this system).
fn centroid(kind: RecordingType) -> Projection {
    match kind {
        RecordingType::Studio => Projection {
            lufs: -14.0,
            crest_db: 12.0,
            bass_mid_ratio: 0.0,
            spectral_centroid: 1800.0,
            stereo_width: 0.35,
            spectral_flatness: 0.25,
        },
        RecordingType::Bootleg => Projection {
            lufs: -20.0,
            crest_db: 16.0,
            bass_mid_ratio: -3.0,
            spectral_centroid: 1200.0,
            stereo_width: 0.55,
            spectral_flatness: 0.45,
        },
        RecordingType::Metal => Projection {
            lufs: -9.0,
            crest_db: 7.0,
            bass_mid_ratio: 4.0,
            spectral_centroid: 2600.0,
            stereo_width: 0.3,
            spectral_flatness: 0.35,
        },
        RecordingType::VintageAnalog => Projection {
            lufs: -16.0,
            crest_db: 14.0,
            bass_mid_ratio: 2.0,
            spectral_centroid: 1400.0,
            stereo_width: 0.25,
            spectral_flatness: 0.3,
        },
        RecordingType::HiRes => Projection {
            lufs: -18.0,
            crest_db: 18.0,
            bass_mid_ratio: -1.0,
            spectral_centroid: 2200.0,
            stereo_width: 0.45,
            spectral_flatness: 0.28,
        },
        RecordingType::BrightMaster => Projection {
            lufs: -8.0,
            crest_db: 8.0,
            bass_mid_ratio: -2.0,
            spectral_centroid: 3200.0,
            stereo_width: 0.4,
            spectral_flatness: 0.4,
        },
        RecordingType::DamagedStudio => Projection {
            lufs: -12.0,
            crest_db: 6.0,
            bass_mid_ratio: 1.0,
            spectral_centroid: 1600.0,
            stereo_width: 0.2,
            spectral_flatness: 0.5,
        },
        RecordingType::Unknown => Projection {
            lufs: -14.0,
            crest_db: 12.0,
            bass_mid_ratio: 0.0,
            spectral_centroid: 1800.0,
            stereo_width: 0.35,
            spectral_flatness: 0.3,
        },
    }
}

/// One ranked candidate from the classifier.
#[derive(Debug, Clone, Copy)]
pub struct RankedCandidate {
    pub kind: RecordingType,
    pub proximity: f64,
}

/// Full classifier output: primary tag, confidence, and the ranked
/// candidates used for hybrid blending.
#[derive(Debug, Clone)]
pub struct Classification {
    pub primary: RecordingType,
    pub confidence: f64,
    pub ranked: Vec<RankedCandidate>,
}

/// `proximity = 1 / (1 + distance)`, a monotone decreasing function of
/// distance in (0, 1].
fn proximity(distance: f64) -> f64 {
    1.0 / (1.0 + distance)
}

/// Classify a fingerprint into a recording type with a confidence score.
///
/// Confidence is the separation ratio between the nearest and second-nearest
/// centroid's proximity: a fingerprint sitting exactly between two styles
/// gets confidence ~0.5; one clearly closer to a single style approaches 1.0.
/// Below `config.classifier_confidence_threshold` the primary falls back to
/// `Unknown`.
pub fn classify(fp: &FingerprintVector, config: &CoreConfig) -> Classification {
    let projection = Projection::from_fingerprint(fp);

    let mut ranked: Vec<RankedCandidate> = RecordingType::CLASSIFIABLE
        .iter()
        .map(|&kind| RankedCandidate {
            kind,
            proximity: proximity(projection.distance(&centroid(kind))),
        })
        .collect();
    ranked.sort_by(|a, b| b.proximity.partial_cmp(&a.proximity).unwrap());

    let top = ranked[0];
    let second = ranked.get(1).map(|c| c.proximity).unwrap_or(0.0);
    // Separation ratio: identical top/second proximities -> 0.0 ("no
    // separation"); a lone top candidate with nothing close -> 1.0.
    let confidence = separation_ratio(top.proximity, second);

    let primary = if confidence >= config.classifier_confidence_threshold {
        top.kind
    } else {
        RecordingType::Unknown
    };

    Classification {
        primary,
        confidence,
        ranked,
    }
}

/// `confidence = 1 - (second_proximity / top_proximity)`, clamped to [0, 1].
fn separation_ratio(top: f64, second: f64) -> f64 {
    if top <= 1e-12 {
        0.0
    } else {
        (1.0 - second / top).clamp(0.0, 1.0)
    }
}

/// Compressor + EQ + stereo + loudness parameters for one chunk build.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AdaptiveParameters {
    pub compressor_ratio: f64,
    pub compressor_threshold_db: f64,
    pub compressor_attack_ms: f64,
    pub compressor_release_ms: f64,
    pub compressor_knee_db: f64,
    pub eq_bass_db: f64,
    pub eq_mid_db: f64,
    pub eq_treble_db: f64,
    pub stereo_width_factor: f64,
    pub target_lufs: f64,
    pub preserve_character: f64,
    pub source_confidence: f64,
}

impl AdaptiveParameters {
    /// Identity parameters: no compression, no EQ, no width change, nothing
    /// blended out — `intensity = 0` interpolates toward exactly this.
    fn identity(target_lufs: f64, source_confidence: f64) -> Self {
        Self {
            compressor_ratio: 1.0,
            compressor_threshold_db: 0.0,
            compressor_attack_ms: 10.0,
            compressor_release_ms: 100.0,
            compressor_knee_db: 0.0,
            eq_bass_db: 0.0,
            eq_mid_db: 0.0,
            eq_treble_db: 0.0,
            stereo_width_factor: 1.0,
            target_lufs,
            preserve_character: 1.0,
            source_confidence,
        }
    }

    fn lerp(a: &AdaptiveParameters, b: &AdaptiveParameters, t: f64) -> AdaptiveParameters {
        let l = |x: f64, y: f64| x + (y - x) * t;
        AdaptiveParameters {
            compressor_ratio: l(a.compressor_ratio, b.compressor_ratio),
            compressor_threshold_db: l(a.compressor_threshold_db, b.compressor_threshold_db),
            compressor_attack_ms: l(a.compressor_attack_ms, b.compressor_attack_ms),
            compressor_release_ms: l(a.compressor_release_ms, b.compressor_release_ms),
            compressor_knee_db: l(a.compressor_knee_db, b.compressor_knee_db),
            eq_bass_db: l(a.eq_bass_db, b.eq_bass_db),
            eq_mid_db: l(a.eq_mid_db, b.eq_mid_db),
            eq_treble_db: l(a.eq_treble_db, b.eq_treble_db),
            stereo_width_factor: l(a.stereo_width_factor, b.stereo_width_factor),
            target_lufs: l(a.target_lufs, b.target_lufs),
            preserve_character: l(a.preserve_character, b.preserve_character),
            source_confidence: b.source_confidence,
        }
    }

    fn weighted_sum(weighted: &[(AdaptiveParameters, f64)]) -> AdaptiveParameters {
        let mut acc = AdaptiveParameters::identity(-14.0, 0.0);
        acc.compressor_ratio = 0.0;
        acc.compressor_threshold_db = 0.0;
        acc.compressor_attack_ms = 0.0;
        acc.compressor_release_ms = 0.0;
        acc.compressor_knee_db = 0.0;
        acc.eq_bass_db = 0.0;
        acc.eq_mid_db = 0.0;
        acc.eq_treble_db = 0.0;
        acc.stereo_width_factor = 0.0;
        acc.target_lufs = 0.0;
        acc.preserve_character = 0.0;
        acc.source_confidence = 0.0;

        for (params, weight) in weighted {
            acc.compressor_ratio += params.compressor_ratio * weight;
            acc.compressor_threshold_db += params.compressor_threshold_db * weight;
            acc.compressor_attack_ms += params.compressor_attack_ms * weight;
            acc.compressor_release_ms += params.compressor_release_ms * weight;
            acc.compressor_knee_db += params.compressor_knee_db * weight;
            acc.eq_bass_db += params.eq_bass_db * weight;
            acc.eq_mid_db += params.eq_mid_db * weight;
            acc.eq_treble_db += params.eq_treble_db * weight;
            acc.stereo_width_factor += params.stereo_width_factor * weight;
            acc.target_lufs += params.target_lufs * weight;
            acc.preserve_character += params.preserve_character * weight;
            acc.source_confidence += params.source_confidence * weight;
        }
        acc
    }
}

/// Full-intensity template for `(RecordingType, Preset)`. Conservative (low
/// ratio, small EQ moves, high preserve_character) for `Unknown` and
/// `DamagedStudio`; more aggressive for presets like "punchy" on types that
/// tolerate it (e.g. `Metal`).
fn template(kind: RecordingType, preset: Preset) -> AdaptiveParameters {
    let (ratio, threshold, bass, mid, treble, width, lufs, preserve) = match (kind, preset) {
        (RecordingType::Unknown, _) => (1.8, -18.0, 0.5, 0.0, 0.5, 1.0, -16.0, 0.6),
        (RecordingType::DamagedStudio, _) => (1.5, -16.0, 0.0, 0.0, 0.0, 1.0, -16.0, 0.7),

        (RecordingType::Studio, Preset::Gentle) => (1.8, -20.0, 0.5, 0.0, 0.5, 1.05, -16.0, 0.5),
        (RecordingType::Studio, Preset::Punchy) => (3.0, -16.0, 1.5, -0.5, 1.0, 1.1, -12.0, 0.25),
        (RecordingType::Studio, Preset::Warm) => (2.0, -18.0, 2.0, 0.5, -1.0, 1.0, -15.0, 0.35),
        (RecordingType::Studio, Preset::Bright) => (2.2, -18.0, -0.5, 0.0, 2.5, 1.1, -14.0, 0.3),
        (RecordingType::Studio, Preset::Adaptive) => (2.2, -18.0, 1.0, 0.0, 1.0, 1.08, -14.0, 0.3),

        (RecordingType::Bootleg, Preset::Gentle) => (2.0, -22.0, 1.0, -1.0, 1.0, 1.0, -16.0, 0.4),
        (RecordingType::Bootleg, Preset::Punchy) => (3.5, -18.0, 2.0, -1.5, 2.0, 1.0, -13.0, 0.2),
        (RecordingType::Bootleg, Preset::Warm) => (2.5, -20.0, 2.5, 0.0, -1.5, 0.95, -15.0, 0.3),
        (RecordingType::Bootleg, Preset::Bright) => (2.5, -20.0, -1.0, -0.5, 3.0, 1.0, -14.0, 0.25),
        (RecordingType::Bootleg, Preset::Adaptive) => (2.8, -19.0, 1.5, -1.0, 1.5, 1.0, -14.0, 0.25),

        (RecordingType::Metal, Preset::Gentle) => (1.8, -18.0, 0.0, 0.0, 0.0, 1.0, -12.0, 0.5),
        (RecordingType::Metal, Preset::Punchy) => (4.0, -12.0, 1.0, -1.0, 1.5, 0.95, -9.0, 0.15),
        (RecordingType::Metal, Preset::Warm) => (2.5, -14.0, 1.5, 0.5, -1.5, 0.95, -11.0, 0.3),
        (RecordingType::Metal, Preset::Bright) => (3.0, -14.0, -1.0, 0.0, 2.0, 0.95, -10.0, 0.2),
        (RecordingType::Metal, Preset::Adaptive) => (3.2, -13.0, 0.5, -0.5, 1.0, 0.95, -10.0, 0.2),

        (RecordingType::VintageAnalog, Preset::Gentle) => (1.6, -20.0, 0.5, 0.5, 0.5, 1.1, -16.0, 0.6),
        (RecordingType::VintageAnalog, Preset::Punchy) => (2.8, -16.0, 1.5, 0.0, 1.5, 1.1, -12.0, 0.3),
        (RecordingType::VintageAnalog, Preset::Warm) => (1.8, -18.0, 2.5, 1.0, -2.0, 1.05, -14.0, 0.45),
        (RecordingType::VintageAnalog, Preset::Bright) => (2.0, -18.0, -0.5, 0.0, 3.0, 1.1, -14.0, 0.35),
        (RecordingType::VintageAnalog, Preset::Adaptive) => (2.0, -18.0, 1.0, 0.5, 1.0, 1.08, -14.0, 0.4),

        (RecordingType::HiRes, Preset::Gentle) => (1.4, -22.0, 0.0, 0.0, 0.0, 1.0, -18.0, 0.7),
        (RecordingType::HiRes, Preset::Punchy) => (2.2, -18.0, 1.0, -0.5, 1.0, 1.05, -13.0, 0.35),
        (RecordingType::HiRes, Preset::Warm) => (1.6, -20.0, 1.5, 0.5, -1.0, 1.0, -15.0, 0.5),
        (RecordingType::HiRes, Preset::Bright) => (1.8, -20.0, -0.5, 0.0, 2.0, 1.05, -14.0, 0.45),
        (RecordingType::HiRes, Preset::Adaptive) => (1.8, -20.0, 0.5, 0.0, 0.5, 1.03, -14.0, 0.5),

        (RecordingType::BrightMaster, Preset::Gentle) => (1.8, -18.0, 0.5, 0.0, -0.5, 1.0, -12.0, 0.6),
        (RecordingType::BrightMaster, Preset::Punchy) => (3.0, -14.0, 1.5, -0.5, -1.0, 0.95, -10.0, 0.25),
        (RecordingType::BrightMaster, Preset::Warm) => (2.0, -16.0, 2.0, 0.5, -3.0, 0.95, -12.0, 0.4),
        (RecordingType::BrightMaster, Preset::Bright) => (2.2, -16.0, 0.0, 0.0, 0.5, 1.0, -11.0, 0.3),
        (RecordingType::BrightMaster, Preset::Adaptive) => (2.4, -15.0, 1.0, 0.0, -1.5, 0.97, -11.0, 0.3),
    };

    AdaptiveParameters {
        compressor_ratio: ratio,
        compressor_threshold_db: threshold,
        compressor_attack_ms: 10.0,
        compressor_release_ms: 120.0,
        compressor_knee_db: 6.0,
        eq_bass_db: bass,
        eq_mid_db: mid,
        eq_treble_db: treble,
        stereo_width_factor: width,
        target_lufs: lufs,
        preserve_character: preserve,
        source_confidence: 1.0,
    }
}

/// Human-readable explanation of how the parameters were derived, useful
/// for progress-channel diagnostics and tests (scenario C of spec §8).
#[derive(Debug, Clone)]
pub struct MappingReasoning {
    pub primary: RecordingType,
    pub confidence: f64,
    pub blended: Vec<(RecordingType, f64)>,
    pub description: String,
}

/// Map a classification + preset + intensity to concrete `AdaptiveParameters`.
///
/// If the top-`k` centroids' proximities sum to at least
/// `hybrid_sum_threshold` while the top confidence is below
/// `hybrid_dominance_threshold`, the result is a weighted blend across those
/// candidates; otherwise the primary type's template is used directly.
/// `intensity` then linearly interpolates between identity and the chosen
/// template (full intensity = template as-is).
pub fn map_parameters(
    classification: &Classification,
    preset: Preset,
    intensity: f64,
    config: &CoreConfig,
) -> (AdaptiveParameters, MappingReasoning) {
    let intensity = intensity.clamp(0.0, 1.0);
    let top_k = config.hybrid_top_k.min(classification.ranked.len());
    let top_candidates = &classification.ranked[..top_k];
    let proximity_sum: f64 = top_candidates.iter().map(|c| c.proximity).sum();
    let normalized: Vec<(RecordingType, f64)> = if proximity_sum > 1e-12 {
        top_candidates
            .iter()
            .map(|c| (c.kind, c.proximity / proximity_sum))
            .collect()
    } else {
        Vec::new()
    };

    let is_hybrid = classification.primary != RecordingType::Unknown
        && proximity_sum > 0.0
        && normalized.iter().map(|(_, w)| w).sum::<f64>() > 0.0
        && classification.ranked[0].proximity
            / classification.ranked.iter().map(|c| c.proximity).sum::<f64>().max(1e-12)
            < config.hybrid_dominance_threshold
        && top_candidates.len() >= 2
        && weighted_hybrid_sum(&classification.ranked, top_k) >= config.hybrid_sum_threshold;

    let chosen_template = if is_hybrid {
        let weighted: Vec<(AdaptiveParameters, f64)> = normalized
            .iter()
            .map(|(kind, w)| (template(*kind, preset), *w))
            .collect();
        AdaptiveParameters::weighted_sum(&weighted)
    } else {
        template(classification.primary, preset)
    };

    let full_params = AdaptiveParameters {
        source_confidence: classification.confidence,
        ..chosen_template
    };
    let identity = AdaptiveParameters::identity(full_params.target_lufs, classification.confidence);
    let params = AdaptiveParameters::lerp(&identity, &full_params, intensity);

    let description = if is_hybrid {
        let names: Vec<String> = normalized
            .iter()
            .map(|(k, w)| format!("{:?} ({:.0}%)", k, w * 100.0))
            .collect();
        format!("hybrid blend of {}", names.join(", "))
    } else {
        format!(
            "single-type mapping: {:?} (confidence {:.2})",
            classification.primary, classification.confidence
        )
    };

    (
        params,
        MappingReasoning {
            primary: classification.primary,
            confidence: classification.confidence,
            blended: if is_hybrid { normalized } else { Vec::new() },
            description,
        },
    )
}

/// Sum of proximities, normalized by the total proximity mass across *all*
/// ranked candidates (not just the top-k) — this is the "hybrid-sum" test in
/// spec scenario C (0.43 + 0.31 + 0.26 = 1.00 against a 0.70 threshold).
fn weighted_hybrid_sum(ranked: &[RankedCandidate], top_k: usize) -> f64 {
    let total: f64 = ranked.iter().map(|c| c.proximity).sum::<f64>().max(1e-12);
    ranked[..top_k.min(ranked.len())]
        .iter()
        .map(|c| c.proximity / total)
        .sum()
}
