//! Pure types backing the external interfaces of §6: the persisted
//! fingerprint schema, the chunk-streaming request/response shape, and the
//! progress/control event stream. No HTTP framework is wired up here — an
//! external transport layer (out of scope per §1) serializes these over
//! whatever protocol it chooses.

use crate::classifier::{Preset, RecordingType};
use crate::fingerprint::FingerprintVector;
use serde::{Deserialize, Serialize};

/// What a persisted fingerprint record looks like at rest (§6.1). The
/// out-of-scope library database is the actual store; this is the shape a
/// caller reads from or writes to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedFingerprint {
    pub track_id: String,
    pub fingerprint: FingerprintVector,
    pub computed_at_unix_ms: u64,
}

/// One chunk-streaming request (§6.2): identifies the track, the chunk, and
/// the mastering intent to apply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkRequest {
    pub track_id: String,
    pub chunk_index: usize,
    pub preset: Preset,
    pub intensity: f64,
}

/// The byte-level unit a streaming controller hands back for one chunk
/// request — encoded bytes plus the header-equivalent metadata an HTTP
/// transport would put in `X-Chunk-*` / `X-Preset-Hash` response headers.
#[derive(Debug, Clone)]
pub struct EncodedChunkEnvelope {
    pub bytes: Vec<u8>,
    pub is_init_segment: bool,
    pub audible_samples: usize,
    pub crossfade_samples: usize,
    pub preset_hash: u64,
}

/// A chunk response pairs the envelope with the request it answers, so a
/// transport layer has everything needed to build headers + body.
#[derive(Debug, Clone)]
pub struct ChunkResponse {
    pub track_id: String,
    pub chunk_index: usize,
    pub envelope: EncodedChunkEnvelope,
    pub classification: RecordingType,
    pub classification_confidence: f64,
}

/// Background job / stream progress and control events (§6.3). A transport
/// layer fans these out over WebSocket or SSE; here they are just data.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    JobProgress {
        track_id: String,
        percent_complete: f64,
        status: JobStatus,
    },
    ChunkReady {
        track_id: String,
        chunk_index: usize,
        preset_hash: u64,
    },
    PlayerState {
        track_id: String,
        position_sec: f64,
        playing: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Complete,
    Error,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_event_round_trips_through_json() {
        let event = StreamEvent::ChunkReady {
            track_id: "track-1".to_string(),
            chunk_index: 3,
            preset_hash: 1234,
        };
        let json = serde_json::to_string(&event).unwrap();
        let back: StreamEvent = serde_json::from_str(&json).unwrap();
        match back {
            StreamEvent::ChunkReady { chunk_index, .. } => assert_eq!(chunk_index, 3),
            _ => panic!("wrong variant"),
        }
    }
}
