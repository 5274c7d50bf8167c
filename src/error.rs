use std::time::Duration;

use thiserror::Error;

/// Why a detector call produced no usable result for a frame.
///
/// These are recoverable per frame. The scheduler maps them onto its
/// failure policy instead of treating the frame as "nothing detected".
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum DetectionFailure {
    #[error("detector backend failed: {0}")]
    Backend(String),
    #[error("detector did not answer within {0:?}")]
    Timeout(Duration),
    #[error("detector is still busy with an earlier frame")]
    Busy,
    #[error("detector worker is gone")]
    WorkerGone,
}

/// Stream-level error taxonomy.
///
/// Degenerate boxes and zero time deltas are intentionally absent: both are
/// skipped silently by the compositor and predictor.
#[derive(Debug, Error)]
pub enum RedactError {
    /// The capture source cannot be opened or read. Fatal to the stream.
    #[error("capture unavailable: {0}")]
    CaptureUnavailable(String),
    /// The capture source is already leased by another stream.
    #[error("capture source '{0}' is already leased")]
    CaptureBusy(String),
    /// The detector failed or timed out for one frame.
    #[error("detection unavailable: {0}")]
    DetectionUnavailable(#[from] DetectionFailure),
    /// The sink refused a frame (client gone, disk full, ...).
    #[error("emit failed: {0}")]
    Emit(String),
    #[error("invalid frame: {0}")]
    InvalidFrame(String),
}

pub type RedactResult<T> = std::result::Result<T, RedactError>;
