//! Two-tier cache + streaming controller (spec §4.5): serves pre-encoded
//! chunks with at-most-one-concurrent-build-per-`(track, chunk, preset)`
//! semantics, falling back to a dry pass-through when a build exceeds its
//! soft deadline and the active preset tolerates it.

use crate::cache::{CacheKey, CacheTier, TwoTierCache};
use crate::classifier::{self, AdaptiveParameters, Classification, Preset};
use crate::config::CoreConfig;
use crate::encoder::ChunkEncoder;
use crate::error::{CoreError, Result};
use crate::interface::EncodedChunkEnvelope;
use crate::pcm::PcmBuffer;
use crate::pipeline::{ChunkDescriptor, MasteringPipeline};
use dashmap::DashMap;
use parking_lot::Mutex as SyncMutex;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;

/// A registered track's decoded audio plus the stateful processing objects
/// tied to it. One `TrackStream` backs every `(track, preset_hash)`
/// combination a caller has streamed so far. Also holds the
/// `TrackCacheState` bookkeeping of spec §3: last-touched timestamp (for
/// abandonment cleanup) and the handles of in-flight predictive-window
/// builds (for cancellation on track change/abandonment).
struct TrackStream {
    pcm: PcmBuffer,
    classification: Classification,
    pipeline: SyncMutex<MasteringPipeline>,
    encoder: SyncMutex<ChunkEncoder>,
    current_preset_hash: SyncMutex<Option<u64>>,
    last_touched: SyncMutex<Instant>,
    predictive_handles: SyncMutex<Vec<JoinHandle<()>>>,
}

pub struct StreamingController {
    config: CoreConfig,
    cache: TwoTierCache,
    tracks: DashMap<String, Arc<TrackStream>>,
    build_locks: DashMap<CacheKey, Arc<AsyncMutex<()>>>,
}

impl StreamingController {
    pub fn new(config: CoreConfig) -> Self {
        let cache = TwoTierCache::new(&config);
        Self {
            config,
            cache,
            tracks: DashMap::new(),
            build_locks: DashMap::new(),
        }
    }

    /// Register (or re-register) a track's decoded audio and its
    /// classification, ready to serve chunk requests for it.
    pub fn register_track(&self, track_id: &str, pcm: PcmBuffer, classification: Classification) {
        let pipeline = MasteringPipeline::new(pcm.sample_rate, pcm.channels, &self.config);
        let encoder = ChunkEncoder::new(pcm.sample_rate, pcm.channels)
            .unwrap_or_else(|e| panic!("encoder init must not fail for a registered track: {e}"));
        let stream = TrackStream {
            pcm,
            classification,
            pipeline: SyncMutex::new(pipeline),
            encoder: SyncMutex::new(encoder),
            current_preset_hash: SyncMutex::new(None),
            last_touched: SyncMutex::new(Instant::now()),
            predictive_handles: SyncMutex::new(Vec::new()),
        };
        self.tracks.insert(track_id.to_string(), Arc::new(stream));
        self.cache.invalidate_track(track_id);
    }

    /// Remove a track's stream state, cancelling any predictive-window
    /// builds still in flight for it (spec §5: "all pending predictive-
    /// window builds for the old track are cancelled at the next suspension
    /// point"; `JoinHandle::abort` cancels at the task's next await point).
    /// Builds already serving a client-requested chunk are not tracked here
    /// and so run to completion, per the same section.
    pub fn unregister_track(&self, track_id: &str) {
        if let Some((_, stream)) = self.tracks.remove(track_id) {
            for handle in stream.predictive_handles.lock().drain(..) {
                handle.abort();
            }
        }
        self.cache.invalidate_track(track_id);
    }

    /// Drop tracks that have had no chunk request for longer than
    /// `config.track_idle_timeout_sec` (spec §4.5 "Per-track cleanup").
    pub fn purge_idle_tracks(&self) {
        let timeout = Duration::from_secs(self.config.track_idle_timeout_sec);
        let stale: Vec<String> = self
            .tracks
            .iter()
            .filter(|entry| entry.value().last_touched.lock().elapsed() > timeout)
            .map(|entry| entry.key().clone())
            .collect();
        for track_id in stale {
            tracing::info!(track_id, "purging idle track after no chunk requests");
            self.unregister_track(&track_id);
        }
    }

    /// Spawn a loop that calls [`purge_idle_tracks`](Self::purge_idle_tracks)
    /// on a fixed interval for the lifetime of the returned task. A caller
    /// embedding this controller in a long-running process spawns this once;
    /// dropping (or aborting) the returned handle stops the sweep.
    pub fn spawn_idle_sweeper(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(10));
            loop {
                interval.tick().await;
                self.purge_idle_tracks();
            }
        })
    }

    /// Mark a track as freshly touched by client activity (spec's
    /// `TrackCacheState.last_touched`). Called internally on every chunk
    /// request; exposed so a caller can also refresh it on, e.g., a
    /// `player_state` heartbeat even between chunk fetches.
    pub fn touch(&self, track_id: &str) {
        if let Some(stream) = self.tracks.get(track_id) {
            *stream.last_touched.lock() = Instant::now();
        }
    }

    /// Pre-build any cache-missing chunks in `[current_chunk_index,
    /// current_chunk_index + predictive_window]` for `(track, preset,
    /// intensity)` (spec §4.5 "Predictive window"). Builds run on the
    /// controller's own executor via `request_chunk`'s single-flight path,
    /// so a client request for the same chunk arriving concurrently shares
    /// the same build rather than duplicating it. Previously spawned,
    /// still-pending handles for this track are tracked so
    /// [`unregister_track`](Self::unregister_track) can cancel them.
    pub fn spawn_predictive_builds(
        self: &Arc<Self>,
        track_id: &str,
        current_chunk_index: usize,
        preset: Preset,
        intensity: f64,
    ) {
        let Some(stream) = self.tracks.get(track_id).map(|r| r.clone()) else {
            return;
        };
        let hash = preset_hash(preset, intensity, &stream.classification);

        let mut handles = stream.predictive_handles.lock();
        handles.retain(|h| !h.is_finished());

        for offset in 0..=self.config.predictive_window {
            let chunk_index = current_chunk_index + offset;
            let key = CacheKey::new(track_id, chunk_index, hash);
            if !matches!(self.cache.get(&key).1, CacheTier::Miss) {
                continue;
            }

            let controller = self.clone();
            let track_id = track_id.to_string();
            handles.push(tokio::spawn(async move {
                if let Err(e) = controller
                    .request_chunk(&track_id, chunk_index, preset, intensity)
                    .await
                {
                    tracing::debug!(track_id, chunk_index, error = %e, "predictive build did not complete");
                }
            }));
        }
    }

    /// Serve one chunk, building it (with single-flight dedup against
    /// concurrent identical requests) if not already cached.
    pub async fn request_chunk(
        &self,
        track_id: &str,
        chunk_index: usize,
        preset: Preset,
        intensity: f64,
    ) -> Result<Arc<EncodedChunkEnvelope>> {
        let stream = self
            .tracks
            .get(track_id)
            .map(|r| r.clone())
            .ok_or(CoreError::CacheMiss)?;
        *stream.last_touched.lock() = Instant::now();
        self.cache.set_position(track_id, chunk_index);

        let (params, _reasoning) =
            classifier::map_parameters(&stream.classification, preset, intensity, &self.config);
        let hash = preset_hash(preset, intensity, &stream.classification);
        let key = CacheKey::new(track_id, chunk_index, hash);

        if let (Some(envelope), _tier) = self.cache.get(&key) {
            return Ok(envelope);
        }

        let lock = self
            .build_locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        // Another waiter may have finished the build while we were
        // queued for the lock.
        if let (Some(envelope), _tier) = self.cache.get(&key) {
            return Ok(envelope);
        }

        // Chunk builds are CPU-bound (spec §5: "DSP compute... does not
        // suspend") and must run on the blocking thread pool rather than
        // inline on the async task: an in-place `async { self.build_chunk() }`
        // never yields, so `tokio::time::timeout` could never actually
        // preempt it mid-computation. Spawning onto `spawn_blocking` gives
        // the timeout a real suspension point to race against.
        let timeout = Duration::from_secs_f64(self.config.build_timeout_sec());
        let config = self.config.clone();
        let stream_for_build = stream.clone();
        let handle = tokio::task::spawn_blocking(move || {
            build_chunk(&config, &stream_for_build, chunk_index, hash, &params)
        });
        let build = tokio::time::timeout(timeout, handle).await;

        let envelope = match build {
            Ok(join_result) => join_result.map_err(|e| CoreError::DspError {
                step: "chunk-build-task",
                chunk_index,
                cause: e.to_string(),
            })??,
            Err(_elapsed) => {
                tracing::warn!(track_id, chunk_index, "chunk build exceeded soft deadline");
                if params.preserve_character >= 0.5 {
                    build_passthrough(&self.config, &stream, chunk_index, hash)?
                } else {
                    return Err(CoreError::BuildTimeout(chunk_index));
                }
            }
        };

        let envelope = Arc::new(envelope);
        self.cache.insert(key, envelope.clone());
        Ok(envelope)
    }
}

/// Run one chunk's full mastering pipeline + encode. Free function (rather
/// than a `&self` method) so it can be moved wholesale into
/// `spawn_blocking`, which requires its closure to be `'static`.
fn build_chunk(
    config: &CoreConfig,
    stream: &TrackStream,
    chunk_index: usize,
    preset_hash: u64,
    params: &AdaptiveParameters,
) -> Result<EncodedChunkEnvelope> {
    let sample_rate = stream.pcm.sample_rate;
    let chunk_len = config.chunk_len_samples(sample_rate);
    let context_len = config.context_len_samples(sample_rate);
    let crossfade_len = config.crossfade_samples(sample_rate);

    let chunk_start = chunk_index * chunk_len;
    let window_start = chunk_start.saturating_sub(context_len);
    let context_frames = chunk_start - window_start;
    let window_end = (chunk_start + chunk_len + context_len).min(stream.pcm.frame_count());

    let window = stream.pcm.slice_frames(window_start, window_end);
    if window.frame_count() <= context_frames {
        return Err(CoreError::CacheMiss);
    }

    reset_pipeline_if_preset_changed(stream, preset_hash);

    let descriptor = ChunkDescriptor {
        chunk_index,
        pcm: window,
        context_frames,
        chunk_len,
        params: *params,
    };
    let processed = stream.pipeline.lock().process_chunk(descriptor)?;
    if processed.clamped_non_finite > 0 {
        tracing::warn!(
            chunk_index,
            count = processed.clamped_non_finite,
            "clamped non-finite samples in processed chunk"
        );
    }

    stream
        .encoder
        .lock()
        .encode_chunk(&processed.pcm, crossfade_len, preset_hash)
}

/// Timeout fallback: encode the dry window directly, skipping the
/// mastering pipeline entirely. Only used when `preserve_character` is
/// high enough that the difference is small and availability matters
/// more than the mastering effect for this chunk.
fn build_passthrough(
    config: &CoreConfig,
    stream: &TrackStream,
    chunk_index: usize,
    preset_hash: u64,
) -> Result<EncodedChunkEnvelope> {
    let sample_rate = stream.pcm.sample_rate;
    let chunk_len = config.chunk_len_samples(sample_rate);
    let crossfade_len = config.crossfade_samples(sample_rate);
    let chunk_start = chunk_index * chunk_len;
    let window = stream.pcm.slice_frames(chunk_start, chunk_start + chunk_len);

    stream.encoder.lock().encode_chunk(&window, crossfade_len, preset_hash)
}

fn reset_pipeline_if_preset_changed(stream: &TrackStream, preset_hash: u64) {
    let mut current = stream.current_preset_hash.lock();
    if *current != Some(preset_hash) {
        if current.is_some() {
            tracing::debug!("preset changed mid-stream, resetting mastering pipeline state");
            stream.pipeline.lock().reset_for_preset_change();
        }
        *current = Some(preset_hash);
    }
}

/// Stable hash over the parameters that determine a chunk's processed
/// bytes for a given `(track, chunk_index)`: preset, intensity (rounded to
/// avoid float-noise cache misses), and the track's classified recording
/// type.
fn preset_hash(preset: Preset, intensity: f64, classification: &Classification) -> u64 {
    let mut hasher = DefaultHasher::new();
    format!("{:?}", preset).hash(&mut hasher);
    ((intensity.clamp(0.0, 1.0) * 1000.0).round() as i64).hash(&mut hasher);
    format!("{:?}", classification.primary).hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::RankedCandidate;

    fn identity_classification() -> Classification {
        Classification {
            primary: crate::classifier::RecordingType::Studio,
            confidence: 0.9,
            ranked: vec![RankedCandidate {
                kind: crate::classifier::RecordingType::Studio,
                proximity: 0.9,
            }],
        }
    }

    fn sine_pcm(sr: u32, channels: u16, frames: usize) -> PcmBuffer {
        let mut samples = Vec::with_capacity(frames * channels as usize);
        for i in 0..frames {
            let t = i as f64 / sr as f64;
            let v = (2.0 * std::f64::consts::PI * 220.0 * t).sin() * 0.25;
            for _ in 0..channels {
                samples.push(v);
            }
        }
        PcmBuffer::new(sr, channels, samples)
    }

    #[tokio::test]
    async fn unregistered_track_is_a_cache_miss() {
        let controller = StreamingController::new(CoreConfig::default());
        let result = controller.request_chunk("nope", 0, Preset::Adaptive, 0.5).await;
        assert!(matches!(result, Err(CoreError::CacheMiss)));
    }

    #[tokio::test]
    async fn registered_track_serves_first_chunk() {
        let mut config = CoreConfig::default();
        config.chunk_duration_sec = 1.0;
        config.context_duration_sec = 0.1;
        let controller = StreamingController::new(config);

        let sr = 44100;
        let pcm = sine_pcm(sr, 2, sr as usize * 3);
        controller.register_track("track-1", pcm, identity_classification());

        let envelope = controller
            .request_chunk("track-1", 0, Preset::Adaptive, 0.5)
            .await
            .expect("first chunk build succeeds");
        assert!(envelope.is_init_segment);
        assert!(!envelope.bytes.is_empty());
    }

    #[tokio::test]
    async fn repeated_request_hits_cache() {
        let mut config = CoreConfig::default();
        config.chunk_duration_sec = 1.0;
        config.context_duration_sec = 0.1;
        let controller = StreamingController::new(config);

        let sr = 44100;
        let pcm = sine_pcm(sr, 2, sr as usize * 3);
        controller.register_track("track-1", pcm, identity_classification());

        let first = controller
            .request_chunk("track-1", 0, Preset::Adaptive, 0.5)
            .await
            .unwrap();
        let second = controller
            .request_chunk("track-1", 0, Preset::Adaptive, 0.5)
            .await
            .unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn predictive_builds_populate_cache_without_explicit_requests() {
        let mut config = CoreConfig::default();
        config.chunk_duration_sec = 1.0;
        config.context_duration_sec = 0.1;
        config.predictive_window = 2;
        let controller = Arc::new(StreamingController::new(config));

        let sr = 44100;
        let pcm = sine_pcm(sr, 2, sr as usize * 5);
        controller.register_track("track-1", pcm, identity_classification());

        controller.spawn_predictive_builds("track-1", 0, Preset::Adaptive, 0.5);

        // Poll briefly for the background builds to land in cache; avoids a
        // fixed sleep racing the worker pool on slow CI machines.
        for _ in 0..200 {
            let hash = preset_hash(Preset::Adaptive, 0.5, &identity_classification());
            let all_present = (0..=2).all(|i| {
                !matches!(
                    controller.cache.get(&CacheKey::new("track-1", i, hash)).1,
                    CacheTier::Miss
                )
            });
            if all_present {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("predictive builds did not populate the cache in time");
    }

    #[tokio::test]
    async fn unregister_aborts_pending_predictive_builds() {
        let mut config = CoreConfig::default();
        config.chunk_duration_sec = 1.0;
        config.context_duration_sec = 0.1;
        let controller = Arc::new(StreamingController::new(config));

        let sr = 44100;
        let pcm = sine_pcm(sr, 2, sr as usize * 3);
        controller.register_track("track-1", pcm, identity_classification());
        controller.spawn_predictive_builds("track-1", 0, Preset::Adaptive, 0.5);
        controller.unregister_track("track-1");

        let result = controller.request_chunk("track-1", 0, Preset::Adaptive, 0.5).await;
        assert!(matches!(result, Err(CoreError::CacheMiss)));
    }

    #[tokio::test]
    async fn idle_track_is_purged_past_timeout() {
        let mut config = CoreConfig::default();
        config.chunk_duration_sec = 1.0;
        config.context_duration_sec = 0.1;
        config.track_idle_timeout_sec = 0;
        let controller = StreamingController::new(config);

        let sr = 44100;
        let pcm = sine_pcm(sr, 2, sr as usize * 3);
        controller.register_track("track-1", pcm, identity_classification());
        tokio::time::sleep(Duration::from_millis(5)).await;

        controller.purge_idle_tracks();
        assert!(controller.tracks.is_empty());
    }

    /// Scenario F (spec §8): a zero-second soft deadline guarantees the
    /// `tokio::time::timeout` branch wins the race against the
    /// `spawn_blocking` build every time, regardless of how fast the DSP
    /// actually runs - exercising the fallback without needing to inject an
    /// artificially slow DSP step. `Preset::Gentle` on `Studio` at full
    /// intensity has `preserve_character == 0.5`, so the passthrough branch
    /// fires rather than a hard error.
    #[tokio::test]
    async fn build_timeout_falls_back_to_passthrough_when_preserve_character_high() {
        let mut config = CoreConfig::default();
        config.chunk_duration_sec = 1.0;
        config.context_duration_sec = 0.1;
        config.build_timeout_factor = 0.0;
        let controller = StreamingController::new(config);

        let sr = 44100;
        let pcm = sine_pcm(sr, 2, sr as usize * 3);
        controller.register_track("track-1", pcm, identity_classification());

        let envelope = controller
            .request_chunk("track-1", 0, Preset::Gentle, 1.0)
            .await
            .expect("passthrough fallback still serves a chunk");
        assert!(!envelope.bytes.is_empty());
    }

    /// Same timeout race, but `Preset::Punchy` on `Studio` at full intensity
    /// has `preserve_character == 0.25 < 0.5`, so §5/§7 require a hard
    /// `BuildTimeout` rather than a silent pass-through.
    #[tokio::test]
    async fn build_timeout_surfaces_error_when_preserve_character_low() {
        let mut config = CoreConfig::default();
        config.chunk_duration_sec = 1.0;
        config.context_duration_sec = 0.1;
        config.build_timeout_factor = 0.0;
        let controller = StreamingController::new(config);

        let sr = 44100;
        let pcm = sine_pcm(sr, 2, sr as usize * 3);
        controller.register_track("track-1", pcm, identity_classification());

        let result = controller.request_chunk("track-1", 0, Preset::Punchy, 1.0).await;
        assert!(matches!(result, Err(CoreError::BuildTimeout(0))));
    }
}
