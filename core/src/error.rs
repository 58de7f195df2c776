use thiserror::Error;

/// Error taxonomy for the mastering/streaming core. Variants map directly
/// to HTTP status codes at the server boundary; `CacheMiss` is control flow,
/// not a failure.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("input too short: need at least one analysis frame")]
    InputTooShort,

    #[error("decode error: {0}")]
    DecodeError(String),

    #[error("fingerprint integrity check failed: stored hash does not match recomputed hash")]
    FingerprintIntegrity,

    #[error("classifier confidence below threshold, falling back to unknown")]
    ClassifierUnknown,

    #[error("dsp error in step '{step}' at chunk {chunk_index}: {cause}")]
    DspError {
        step: &'static str,
        chunk_index: usize,
        cause: String,
    },

    #[error("chunk build {0} exceeded soft deadline")]
    BuildTimeout(usize),

    #[error("cache miss")]
    CacheMiss,

    #[error("build cancelled")]
    Cancelled,

    #[error("encoder error: {0}")]
    EncoderError(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;

impl From<auralis_dsp::DspError> for CoreError {
    fn from(e: auralis_dsp::DspError) -> Self {
        CoreError::DspError {
            step: "dsp-primitive",
            chunk_index: 0,
            cause: e.to_string(),
        }
    }
}
