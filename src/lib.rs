//! Predictive Redaction Kernel
//!
//! This crate turns a live video stream into a redacted one: every frame that leaves the
//! pipeline has each flagged object blurred, including where the object is about to be.
//!
//! # Architecture
//!
//! The detector has latency, and objects keep moving while it runs. The kernel therefore
//! redacts both the last detected box and a linearly extrapolated future box per class:
//!
//! 1. **Detection Adapter** (`detect`): runs an opaque detector backend with bounded
//!    latency and filters by confidence.
//! 2. **Track Store** (`track`): per-class, time-windowed detection history.
//! 3. **Motion Predictor** (`predict`): constant-velocity extrapolation of box edges.
//! 4. **Redaction Compositor** (`compositor`): clamps boxes and blurs them irreversibly.
//! 5. **Stream Scheduler** (`scheduler`): per-frame loop, frame skip, failure policy,
//!    capture lease ownership.
//!
//! # Module Structure
//!
//! - `frame`: Raw frame isolation (Frame, RedactedFrame, Timestamp)
//! - `ingest`: Capture sources and the exclusive capture lease
//! - `sink`: Emission of redacted frames (MJPEG, JPEG files, memory)
//! - `config`: Operator configuration (file + environment)

pub mod compositor;
pub mod config;
pub mod detect;
pub mod error;
pub mod frame;
pub mod geometry;
pub mod ingest;
pub mod predict;
pub mod scheduler;
pub mod sink;
pub mod track;

pub use compositor::{BlurSettings, Compositor, RedactionMask};
pub use detect::{
    normalize_detections, BackendRegistry, Detection, DetectionAdapter, DetectorBackend,
    RawDetection, StubBackend,
};
pub use error::{DetectionFailure, RedactError, RedactResult};
pub use frame::{Frame, RedactedFrame, Timestamp};
pub use geometry::{BBox, PixelRect};
#[cfg(feature = "ingest-v4l2")]
pub use ingest::{v4l2::V4l2Config, V4l2Source};
pub use ingest::{
    synthetic::SyntheticConfig, CaptureHub, CaptureLease, CaptureSource, SyntheticSource,
};
pub use predict::MotionPredictor;
pub use scheduler::{
    CancelToken, FailurePolicy, StreamScheduler, StreamSettings, StreamState, StreamSummary,
    Termination,
};
pub use sink::{FrameSink, JpegDirectorySink, MemorySink, MjpegWriter};
pub use track::{Track, TrackStore};
