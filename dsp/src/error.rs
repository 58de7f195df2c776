use thiserror::Error;

/// Errors raised by individual DSP primitives.
///
/// These are deliberately primitive-scoped: callers that orchestrate several
/// primitives per processing step (the mastering pipeline) wrap one of these
/// with its own step name and position before surfacing it further.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DspError {
    #[error("input too short: need at least {required} samples, got {got}")]
    InputTooShort { required: usize, got: usize },

    #[error("non-finite sample encountered in {context}")]
    NonFinite { context: &'static str },
}

pub type Result<T> = std::result::Result<T, DspError>;
