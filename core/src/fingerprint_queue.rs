//! Background fingerprint extraction queue (spec §4.2; concrete scheduling
//! and remote wire shape detailed in `SPEC_FULL.md` §4.6-§4.7).
//!
//! A bounded-concurrency worker pool drains a FIFO queue, attempting a
//! remote offload first and falling back to in-process extraction when no
//! remote is configured or it's unreachable. Job status transitions are
//! monotone: `pending -> processing -> {complete, error}`.

use crate::audio_loader;
use crate::config::CoreConfig;
use crate::fingerprint::{self, FingerprintVector, SCHEMA_VERSION};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Processing,
    Complete,
    Error,
}

#[derive(Debug, Clone)]
pub struct FingerprintJob {
    pub track_id: String,
    pub filepath: PathBuf,
    /// Numeric id to pass to the remote offload service, if one is
    /// configured; that service's wire contract is keyed by `u32`, while
    /// this queue's own job keys are the library's string track ids.
    pub remote_track_id: Option<u32>,
}

#[derive(Debug, Clone, Default)]
struct JobRecord {
    status: Option<JobStatus>,
    result: Option<FingerprintVector>,
    error: Option<String>,
}

/// Speaks the same JSON shape `fingerprint-server` exposes at
/// `POST /fingerprint` (`{track_id, filepath}` -> `{fingerprint, metadata,
/// processing_time_ms}`). Absence or unreachability of the remote falls
/// back to in-process computation — the documented default, not an error.
pub struct RemoteFingerprintClient {
    client: reqwest::Client,
    base_url: Option<String>,
}

#[derive(Serialize)]
struct RemoteRequest {
    track_id: u32,
    filepath: String,
}

#[derive(Deserialize)]
struct RemoteFingerprintPayload {
    sub_bass_pct: f64,
    bass_pct: f64,
    low_mid_pct: f64,
    mid_pct: f64,
    upper_mid_pct: f64,
    presence_pct: f64,
    air_pct: f64,
    lufs: f64,
    crest_db: f64,
    bass_mid_ratio: f64,
    tempo_bpm: f64,
    rhythm_stability: f64,
    transient_density: f64,
    silence_ratio: f64,
    spectral_centroid: f64,
    spectral_rolloff: f64,
    spectral_flatness: f64,
    harmonic_ratio: f64,
    pitch_stability: f64,
    chroma_energy: f64,
    dynamic_range_variation: f64,
    loudness_variation_std: f64,
    peak_consistency: f64,
    stereo_width: f64,
    phase_correlation: f64,
}

#[derive(Deserialize)]
struct RemoteResponse {
    fingerprint: RemoteFingerprintPayload,
}

impl RemoteFingerprintClient {
    pub fn new(base_url: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
        }
    }

    async fn try_extract(&self, track_id: u32, filepath: &str) -> Option<FingerprintVector> {
        let base_url = self.base_url.as_ref()?;
        let url = format!("{}/fingerprint", base_url.trim_end_matches('/'));

        let response = self
            .client
            .post(&url)
            .json(&RemoteRequest {
                track_id,
                filepath: filepath.to_string(),
            })
            .timeout(Duration::from_secs(30))
            .send()
            .await;

        let response = match response {
            Ok(r) if r.status().is_success() => r,
            Ok(r) => {
                tracing::warn!(status = %r.status(), "remote fingerprint offload returned non-success");
                return None;
            }
            Err(e) => {
                tracing::debug!(error = %e, "remote fingerprint offload unreachable, falling back to in-process");
                return None;
            }
        };

        match response.json::<RemoteResponse>().await {
            Ok(parsed) => Some(payload_to_vector(parsed.fingerprint)),
            Err(e) => {
                tracing::warn!(error = %e, "remote fingerprint offload response did not parse");
                None
            }
        }
    }
}

fn payload_to_vector(p: RemoteFingerprintPayload) -> FingerprintVector {
    FingerprintVector {
        sub_bass_pct: p.sub_bass_pct,
        bass_pct: p.bass_pct,
        low_mid_pct: p.low_mid_pct,
        mid_pct: p.mid_pct,
        upper_mid_pct: p.upper_mid_pct,
        presence_pct: p.presence_pct,
        air_pct: p.air_pct,
        lufs: p.lufs,
        crest_db: p.crest_db,
        bass_mid_ratio: p.bass_mid_ratio,
        tempo_bpm: p.tempo_bpm,
        rhythm_stability: p.rhythm_stability,
        transient_density: p.transient_density,
        silence_ratio: p.silence_ratio,
        spectral_centroid: p.spectral_centroid,
        spectral_rolloff: p.spectral_rolloff,
        spectral_flatness: p.spectral_flatness,
        harmonic_ratio: p.harmonic_ratio,
        pitch_stability: p.pitch_stability,
        chroma_energy: p.chroma_energy,
        dynamic_range_variation: p.dynamic_range_variation,
        loudness_variation_std: p.loudness_variation_std,
        peak_consistency: p.peak_consistency,
        stereo_width: p.stereo_width,
        phase_correlation: p.phase_correlation,
        schema_version: SCHEMA_VERSION,
        hash: String::new(),
    }
    .seal()
}

/// FIFO, bounded-concurrency fingerprint extraction queue. `track_id` is
/// the queue's dedup/lookup key; submitting the same track twice while a
/// job for it is in flight is a no-op.
pub struct FingerprintQueue {
    pending: Mutex<VecDeque<FingerprintJob>>,
    records: DashMap<String, JobRecord>,
    semaphore: Arc<Semaphore>,
    remote: Arc<RemoteFingerprintClient>,
}

impl FingerprintQueue {
    pub fn new(config: &CoreConfig, remote: RemoteFingerprintClient) -> Self {
        Self {
            pending: Mutex::new(VecDeque::new()),
            records: DashMap::new(),
            semaphore: Arc::new(Semaphore::new(config.fingerprint_workers.max(1))),
            remote: Arc::new(remote),
        }
    }

    /// Enqueue a job, returning `false` (no-op) if one is already
    /// pending/processing/complete for this `track_id`. Per spec §3's
    /// monotone status transitions (`pending -> processing -> {complete,
    /// error}`), a track already in `error` may be re-enqueued here; any
    /// other in-progress or settled status requires the explicit
    /// [`resubmit`](Self::resubmit) path instead of a plain `submit`.
    pub fn submit(&self, job: FingerprintJob) -> bool {
        if let Some(record) = self.records.get(&job.track_id) {
            if record.status != Some(JobStatus::Error) {
                return false;
            }
        }
        self.records.insert(job.track_id.clone(), JobRecord { status: Some(JobStatus::Pending), ..Default::default() });
        self.pending.lock().push_back(job);
        true
    }

    /// Force-enqueue a job regardless of its current status, for the
    /// explicit-user-request re-enqueue path spec §3 allows in addition to
    /// the automatic from-`error` case `submit` already covers.
    pub fn resubmit(&self, job: FingerprintJob) {
        self.records.insert(job.track_id.clone(), JobRecord { status: Some(JobStatus::Pending), ..Default::default() });
        self.pending.lock().push_back(job);
    }

    pub fn status(&self, track_id: &str) -> Option<JobStatus> {
        self.records.get(track_id).and_then(|r| r.status.clone())
    }

    pub fn result(&self, track_id: &str) -> Option<FingerprintVector> {
        self.records.get(track_id).and_then(|r| r.result.clone())
    }

    /// Pop the next job in FIFO order, if any, and acquire a worker permit.
    /// Returns `None` when the queue is empty; callers loop on this from a
    /// pool of worker tasks.
    async fn next_job(self: &Arc<Self>) -> Option<(FingerprintJob, tokio::sync::OwnedSemaphorePermit)> {
        let permit = self.semaphore.clone().acquire_owned().await.ok()?;
        let job = self.pending.lock().pop_front()?;
        Some((job, permit))
    }

    /// Run one worker loop to completion (queue drained). Spawn several of
    /// these (up to `fingerprint_workers`) to get bounded-concurrency
    /// draining; each permit acquired by `next_job` caps how many run at
    /// once regardless of how many worker loops are spawned.
    pub async fn run_worker(self: Arc<Self>) {
        while let Some((job, _permit)) = self.next_job().await {
            self.process_job(job).await;
        }
    }

    async fn process_job(&self, job: FingerprintJob) {
        self.set_status(&job.track_id, JobStatus::Processing);

        let remote_result = if let Some(remote_track_id) = job.remote_track_id {
            self.remote
                .try_extract(remote_track_id, &job.filepath.to_string_lossy())
                .await
        } else {
            None
        };

        let outcome = match remote_result {
            Some(fp) => Ok(fp),
            None => {
                let path = job.filepath.clone();
                tokio::task::spawn_blocking(move || {
                    audio_loader::load(&path).and_then(|pcm| fingerprint::extract(&pcm))
                })
                .await
                .map_err(|e| e.to_string())
                .and_then(|r| r.map_err(|e| e.to_string()))
            }
        };

        match outcome {
            Ok(fp) => self.complete(&job.track_id, fp),
            Err(cause) => {
                tracing::error!(track_id = %job.track_id, %cause, "fingerprint extraction failed");
                self.fail(&job.track_id, cause);
            }
        }
    }

    fn set_status(&self, track_id: &str, status: JobStatus) {
        if let Some(mut record) = self.records.get_mut(track_id) {
            record.status = Some(status);
        }
    }

    fn complete(&self, track_id: &str, result: FingerprintVector) {
        if let Some(mut record) = self.records.get_mut(track_id) {
            record.status = Some(JobStatus::Complete);
            record.result = Some(result);
        }
    }

    fn fail(&self, track_id: &str, error: String) {
        if let Some(mut record) = self.records.get_mut(track_id) {
            record.status = Some(JobStatus::Error);
            record.error = Some(error);
        }
    }

    pub fn pending_len(&self) -> usize {
        self.pending.lock().len()
    }

    #[cfg(test)]
    fn set_status_for_test(&self, track_id: &str, status: JobStatus) {
        self.set_status(track_id, status);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_submission_is_a_no_op() {
        let config = CoreConfig::default();
        let queue = FingerprintQueue::new(&config, RemoteFingerprintClient::new(None));
        let job = FingerprintJob {
            track_id: "track-1".to_string(),
            filepath: PathBuf::from("/tmp/does-not-matter.wav"),
            remote_track_id: None,
        };
        assert!(queue.submit(job.clone()));
        assert!(!queue.submit(job));
        assert_eq!(queue.pending_len(), 1);
    }

    #[test]
    fn fresh_submission_starts_pending() {
        let config = CoreConfig::default();
        let queue = FingerprintQueue::new(&config, RemoteFingerprintClient::new(None));
        let job = FingerprintJob {
            track_id: "track-2".to_string(),
            filepath: PathBuf::from("/tmp/does-not-matter.wav"),
            remote_track_id: None,
        };
        queue.submit(job);
        assert_eq!(queue.status("track-2"), Some(JobStatus::Pending));
        assert_eq!(queue.status("unknown-track"), None);
    }

    /// Spec §3: "a track may be re-enqueued only from `error`..." -
    /// `submit` is a no-op while a job is pending/processing/complete, but
    /// becomes available again once the status is `error`.
    #[test]
    fn track_in_error_status_can_be_resubmitted() {
        let config = CoreConfig::default();
        let queue = FingerprintQueue::new(&config, RemoteFingerprintClient::new(None));
        let job = FingerprintJob {
            track_id: "track-3".to_string(),
            filepath: PathBuf::from("/tmp/does-not-matter.wav"),
            remote_track_id: None,
        };
        queue.submit(job.clone());
        queue.pending.lock().pop_front(); // simulate a worker having taken it
        queue.set_status_for_test("track-3", JobStatus::Error);

        assert!(queue.submit(job));
        assert_eq!(queue.status("track-3"), Some(JobStatus::Pending));
        assert_eq!(queue.pending_len(), 1);
    }
}
