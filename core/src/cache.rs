//! Two-tier chunk cache (spec §4.5): a small hot tier (T1) backed by a
//! larger warm tier (T2). A T1 miss falls through to T2 and, on a hit,
//! promotes the entry back into T1. Eviction from T1 demotes into T2 rather
//! than dropping the value outright; only T2 eviction is a true drop.
//!
//! Chunks inside a track's predictive window must not be evicted ahead of
//! playback reaching them (spec §4.4), so T1 capacity eviction walks from
//! the LRU end looking for the first resident outside every registered
//! track's predictive window and demotes that one instead of the true LRU
//! entry. Eviction only falls back to plain LRU order once every resident
//! is protected.

use crate::config::CoreConfig;
use crate::interface::EncodedChunkEnvelope;
use dashmap::DashMap;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub track_id: String,
    pub chunk_index: usize,
    pub preset_hash: u64,
}

impl CacheKey {
    pub fn new(track_id: impl Into<String>, chunk_index: usize, preset_hash: u64) -> Self {
        Self {
            track_id: track_id.into(),
            chunk_index,
            preset_hash,
        }
    }
}

/// Which tier satisfied a `get`, for telemetry/diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheTier {
    Hot,
    Warm,
    Miss,
}

pub struct TwoTierCache {
    t1: Mutex<LruCache<CacheKey, Arc<EncodedChunkEnvelope>>>,
    t2: Mutex<LruCache<CacheKey, Arc<EncodedChunkEnvelope>>>,
    predictive_window: usize,
    /// Each track's last-requested chunk index, used to tell whether a T1
    /// resident falls in that track's predictive window and so should be
    /// skipped by capacity eviction. Updated by [`Self::set_position`].
    positions: DashMap<String, usize>,
}

impl TwoTierCache {
    pub fn new(config: &CoreConfig) -> Self {
        Self {
            t1: Mutex::new(LruCache::new(
                NonZeroUsize::new(config.t1_max_chunks.max(1)).unwrap(),
            )),
            t2: Mutex::new(LruCache::new(
                NonZeroUsize::new(config.t2_max_chunks.max(1)).unwrap(),
            )),
            predictive_window: config.predictive_window,
            positions: DashMap::new(),
        }
    }

    /// Record `chunk_index` as the current playback position for `track_id`
    /// (spec §4.5 "Predictive window"). A caller updates this on every
    /// client chunk request so capacity eviction knows which T1 residents
    /// are still ahead of playback and must not be dropped.
    pub fn set_position(&self, track_id: &str, chunk_index: usize) {
        self.positions.insert(track_id.to_string(), chunk_index);
    }

    fn is_protected(&self, key: &CacheKey) -> bool {
        match self.positions.get(&key.track_id) {
            Some(current) => self.is_in_predictive_window(*current, key.chunk_index),
            None => false,
        }
    }

    /// Look up a chunk, promoting a T2 hit into T1.
    pub fn get(&self, key: &CacheKey) -> (Option<Arc<EncodedChunkEnvelope>>, CacheTier) {
        if let Some(value) = self.t1.lock().get(key) {
            return (Some(value.clone()), CacheTier::Hot);
        }

        let promoted = self.t2.lock().pop(key);
        if let Some(value) = promoted {
            self.t1.lock().put(key.clone(), value.clone());
            tracing::debug!(track_id = %key.track_id, chunk_index = key.chunk_index, "promoted chunk from T2 to T1");
            return (Some(value), CacheTier::Warm);
        }

        (None, CacheTier::Miss)
    }

    /// Insert a freshly built chunk into T1, demoting whatever T1 evicts
    /// (if anything, and if it isn't the same key being updated) into T2.
    /// A chunk inside a track's predictive window is never the eviction
    /// victim while any unprotected entry remains; only once every T1
    /// resident is protected does eviction fall back to plain LRU order, so
    /// capacity is never blocked indefinitely.
    pub fn insert(&self, key: CacheKey, value: Arc<EncodedChunkEnvelope>) {
        let mut t1 = self.t1.lock();
        if t1.contains(&key) {
            t1.put(key, value);
            return;
        }
        if t1.len() >= t1.cap().get() {
            if let Some((evicted_key, evicted_value)) = self.evict_unprotected(&mut t1) {
                drop(t1);
                self.t2.lock().put(evicted_key, evicted_value);
                t1 = self.t1.lock();
            }
        }
        t1.put(key, value);
    }

    /// Pop the least-recently-used T1 entry that isn't currently inside its
    /// track's predictive window. Falls back to true-LRU eviction if every
    /// resident entry is protected, so capacity pressure always has a way
    /// out.
    fn evict_unprotected(
        &self,
        t1: &mut LruCache<CacheKey, Arc<EncodedChunkEnvelope>>,
    ) -> Option<(CacheKey, Arc<EncodedChunkEnvelope>)> {
        // `iter()` walks MRU-to-LRU; collecting first lets us search from
        // the LRU end without depending on `lru::Iter`'s reverse support.
        let ordered_mru_first: Vec<CacheKey> = t1.iter().map(|(k, _)| k.clone()).collect();
        let victim = ordered_mru_first
            .into_iter()
            .rev()
            .find(|key| !self.is_protected(key));

        match victim {
            Some(key) => t1.pop(&key).map(|value| (key, value)),
            None => {
                tracing::debug!("all resident T1 chunks are predictive-window protected, evicting true LRU");
                t1.pop_lru()
            }
        }
    }

    /// True if `chunk_index` falls within `current_chunk_index`'s
    /// predictive window and so should be treated as high priority by a
    /// caller deciding what to prefetch or protect.
    pub fn is_in_predictive_window(&self, current_chunk_index: usize, chunk_index: usize) -> bool {
        chunk_index >= current_chunk_index && chunk_index <= current_chunk_index + self.predictive_window
    }

    /// Drop every cached chunk for a track (both tiers) — called on track
    /// change or explicit cache invalidation.
    pub fn invalidate_track(&self, track_id: &str) {
        let mut t1 = self.t1.lock();
        let stale: Vec<CacheKey> = t1
            .iter()
            .filter(|(k, _)| k.track_id == track_id)
            .map(|(k, _)| k.clone())
            .collect();
        for key in stale {
            t1.pop(&key);
        }
        drop(t1);

        let mut t2 = self.t2.lock();
        let stale: Vec<CacheKey> = t2
            .iter()
            .filter(|(k, _)| k.track_id == track_id)
            .map(|(k, _)| k.clone())
            .collect();
        for key in stale {
            t2.pop(&key);
        }
        drop(t2);

        self.positions.remove(track_id);
    }

    pub fn t1_len(&self) -> usize {
        self.t1.lock().len()
    }

    pub fn t2_len(&self) -> usize {
        self.t2.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(chunk_index: usize) -> Arc<EncodedChunkEnvelope> {
        Arc::new(EncodedChunkEnvelope {
            bytes: vec![0u8; 16],
            is_init_segment: chunk_index == 0,
            audible_samples: 1_323_000,
            crossfade_samples: 8_820,
            preset_hash: 42,
        })
    }

    fn test_config() -> CoreConfig {
        let mut config = CoreConfig::default();
        config.t1_max_chunks = 2;
        config.t2_max_chunks = 4;
        config.predictive_window = 1;
        config
    }

    #[test]
    fn miss_then_hit_after_insert() {
        let cache = TwoTierCache::new(&test_config());
        let key = CacheKey::new("track-1", 0, 42);
        assert_eq!(cache.get(&key).1, CacheTier::Miss);
        cache.insert(key.clone(), envelope(0));
        let (value, tier) = cache.get(&key);
        assert!(value.is_some());
        assert_eq!(tier, CacheTier::Hot);
    }

    #[test]
    fn eviction_from_hot_demotes_to_warm_not_drop() {
        let cache = TwoTierCache::new(&test_config());
        let k0 = CacheKey::new("track-1", 0, 42);
        let k1 = CacheKey::new("track-1", 1, 42);
        let k2 = CacheKey::new("track-1", 2, 42);
        cache.insert(k0.clone(), envelope(0));
        cache.insert(k1.clone(), envelope(1));
        // t1_max_chunks = 2: this should push k0 out of T1.
        cache.insert(k2.clone(), envelope(2));
        assert_eq!(cache.t1_len(), 2);

        let (value, tier) = cache.get(&k0);
        assert!(value.is_some(), "evicted chunk should still be retrievable from T2");
        assert_eq!(tier, CacheTier::Warm);
    }

    #[test]
    fn invalidate_track_clears_both_tiers() {
        let cache = TwoTierCache::new(&test_config());
        let key = CacheKey::new("track-1", 0, 42);
        cache.insert(key.clone(), envelope(0));
        cache.invalidate_track("track-1");
        assert_eq!(cache.get(&key).1, CacheTier::Miss);
        assert_eq!(cache.t1_len(), 0);
        assert_eq!(cache.t2_len(), 0);
    }

    #[test]
    fn predictive_window_membership() {
        let cache = TwoTierCache::new(&test_config());
        assert!(cache.is_in_predictive_window(5, 5));
        assert!(cache.is_in_predictive_window(5, 6));
        assert!(!cache.is_in_predictive_window(5, 7));
        assert!(!cache.is_in_predictive_window(5, 4));
    }

    #[test]
    fn protected_chunk_survives_capacity_eviction() {
        let cache = TwoTierCache::new(&test_config());
        let k0 = CacheKey::new("track-1", 0, 42);
        let k1 = CacheKey::new("track-1", 1, 42);
        let k2 = CacheKey::new("track-1", 2, 42);
        cache.insert(k0.clone(), envelope(0));
        cache.insert(k1.clone(), envelope(1));

        // Playback is at chunk 0, so chunk 1 (predictive_window = 1) is
        // protected; inserting k2 must evict k0, the unprotected LRU entry,
        // rather than the predictively-protected k1.
        cache.set_position("track-1", 0);
        cache.insert(k2.clone(), envelope(2));

        assert_eq!(cache.get(&k1).1, CacheTier::Hot, "protected chunk must stay in T1");
        let (value, tier) = cache.get(&k0);
        assert!(value.is_some(), "unprotected chunk is demoted to T2, not dropped");
        assert_eq!(tier, CacheTier::Warm);
    }

    #[test]
    fn eviction_falls_back_to_lru_when_everything_is_protected() {
        let cache = TwoTierCache::new(&test_config());
        let k0 = CacheKey::new("track-1", 0, 42);
        let k1 = CacheKey::new("track-1", 1, 42);
        let k2 = CacheKey::new("track-1", 2, 42);
        cache.insert(k0.clone(), envelope(0));
        cache.insert(k1.clone(), envelope(1));

        // Playback at chunk 0 makes both k0 and k1 fall inside the
        // predictive window (predictive_window = 1): every T1 resident is
        // protected, so eviction must still make room via true LRU order.
        cache.set_position("track-1", 0);
        cache.insert(k2.clone(), envelope(2));
        assert_eq!(cache.t1_len(), 2);
    }

    #[test]
    fn invalidate_track_clears_tracked_position() {
        let cache = TwoTierCache::new(&test_config());
        let k0 = CacheKey::new("track-1", 0, 42);
        let k1 = CacheKey::new("track-1", 1, 42);
        cache.insert(k0, envelope(0));
        cache.set_position("track-1", 0);
        cache.invalidate_track("track-1");

        // Re-insert k1 under a fresh registration of the same track id; with
        // the stale position cleared, nothing is protected and the usual
        // LRU rule applies again.
        let k2 = CacheKey::new("track-1", 2, 42);
        cache.insert(k1, envelope(1));
        cache.insert(k2, envelope(2));
        assert_eq!(cache.t1_len(), 2);
    }
}
