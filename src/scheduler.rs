//! Stream scheduler: the per-stream redaction loop.
//!
//! One scheduler drives one stream. It owns the capture lease for the lifetime of the
//! run, decides per frame whether to run detection or reuse the last mask, keeps the
//! track store current, and hands every frame to the compositor before emission.
//!
//! ```text
//! Idle -> Capturing -> (Detecting <-> Emitting) -> Releasing -> Closed
//! ```
//!
//! A frame is only ever emitted as a `RedactedFrame`. When detection is unavailable the
//! failure policy decides between a blanked frame, no frame, or the previous mask.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::compositor::{BlurSettings, Compositor, RedactionMask};
use crate::detect::{Detection, DetectionAdapter};
use crate::error::{RedactError, RedactResult};
use crate::frame::{Frame, RedactedFrame, Timestamp};
use crate::ingest::CaptureLease;
use crate::predict::{MotionPredictor, DEFAULT_LOOKAHEAD};
use crate::sink::FrameSink;
use crate::track::{TrackStore, DEFAULT_TRACK_WINDOW};

/// Cooperative cancellation flag, observed once per frame.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// What to emit for a frame whose detection failed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// Emit an all-black frame.
    #[default]
    Blank,
    /// Emit nothing for that frame.
    Drop,
    /// Re-apply the previous mask. Falls back to `Blank` before the first mask exists.
    ReuseMask,
}

impl FailurePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailurePolicy::Blank => "blank",
            FailurePolicy::Drop => "drop",
            FailurePolicy::ReuseMask => "reuse-mask",
        }
    }

    /// True when frames may leave the pipeline with a mask older than the frame.
    pub fn is_fail_open(&self) -> bool {
        matches!(self, FailurePolicy::ReuseMask)
    }
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FailurePolicy {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> anyhow::Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "blank" => Ok(FailurePolicy::Blank),
            "drop" => Ok(FailurePolicy::Drop),
            "reuse-mask" | "reuse_mask" => Ok(FailurePolicy::ReuseMask),
            other => Err(anyhow::anyhow!(
                "unknown failure policy '{}' (expected blank, drop or reuse-mask)",
                other
            )),
        }
    }
}

/// Per-stream tunables.
#[derive(Clone, Debug)]
pub struct StreamSettings {
    /// Track history window `W`.
    pub track_window: Duration,
    /// Prediction horizon `Δ`.
    pub lookahead: Duration,
    /// Run detection on every `frame_skip`-th frame.
    pub frame_skip: u32,
    pub failure_policy: FailurePolicy,
    pub blur: BlurSettings,
    /// Pace the loop to this rate. Zero runs as fast as the source delivers.
    pub target_fps: u32,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            track_window: DEFAULT_TRACK_WINDOW,
            lookahead: DEFAULT_LOOKAHEAD,
            frame_skip: 2,
            failure_policy: FailurePolicy::default(),
            blur: BlurSettings::default(),
            target_fps: 0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamState {
    Idle,
    Capturing,
    Detecting,
    Emitting,
    Releasing,
    Closed,
}

/// Why a stream ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    EndOfStream,
    Cancelled,
    CaptureFailed,
    SinkClosed,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct StreamSummary {
    pub frames_read: u64,
    pub frames_detected: u64,
    pub frames_skipped: u64,
    pub frames_emitted: u64,
    pub frames_blanked: u64,
    pub frames_dropped: u64,
    pub detector_failures: u64,
    pub detections_accepted: u64,
    pub boxes_applied: u64,
    pub termination: Option<Termination>,
}

pub struct StreamScheduler {
    settings: StreamSettings,
    tracks: TrackStore,
    predictor: MotionPredictor,
    compositor: Compositor,
    state: StreamState,
    summary: StreamSummary,
    last_mask: Option<RedactionMask>,
    frame_index: u64,
}

impl StreamScheduler {
    pub fn new(settings: StreamSettings) -> Self {
        Self {
            tracks: TrackStore::new(settings.track_window),
            predictor: MotionPredictor::new(settings.lookahead),
            compositor: Compositor::new(settings.blur),
            state: StreamState::Idle,
            summary: StreamSummary::default(),
            last_mask: None,
            frame_index: 0,
            settings,
        }
    }

    pub fn settings(&self) -> &StreamSettings {
        &self.settings
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    pub fn summary(&self) -> &StreamSummary {
        &self.summary
    }

    pub fn tracks(&self) -> &TrackStore {
        &self.tracks
    }

    /// Mask applied to the most recent non-failed frame.
    pub fn last_mask(&self) -> Option<&RedactionMask> {
        self.last_mask.as_ref()
    }

    /// Run the stream to completion.
    ///
    /// The lease is released before this returns, on every path. Sink failure and
    /// cancellation end the stream normally; a capture failure is returned as an error
    /// after release.
    pub fn run<K: FrameSink + ?Sized>(
        &mut self,
        mut lease: CaptureLease,
        adapter: &mut DetectionAdapter,
        sink: &mut K,
        cancel: &CancelToken,
    ) -> RedactResult<StreamSummary> {
        log::info!(
            "stream {} starting: skip={} window={:?} lookahead={:?} policy={}",
            lease.name(),
            self.settings.frame_skip,
            self.settings.track_window,
            self.settings.lookahead,
            self.settings.failure_policy
        );
        if self.settings.failure_policy.is_fail_open() {
            log::warn!("failure policy reuse-mask may emit frames with a stale mask");
        }
        self.transition(StreamState::Capturing);

        let outcome = self.drive(&mut lease, adapter, sink, cancel);

        self.transition(StreamState::Releasing);
        lease.release();
        self.transition(StreamState::Closed);

        let termination = match &outcome {
            Ok(termination) => *termination,
            Err(_) => Termination::CaptureFailed,
        };
        self.summary.termination = Some(termination);
        log::info!(
            "stream {} closed ({:?}): read={} emitted={} blanked={} dropped={} failures={}",
            lease.name(),
            termination,
            self.summary.frames_read,
            self.summary.frames_emitted,
            self.summary.frames_blanked,
            self.summary.frames_dropped,
            self.summary.detector_failures
        );
        outcome.map(|_| self.summary.clone())
    }

    fn drive<K: FrameSink + ?Sized>(
        &mut self,
        lease: &mut CaptureLease,
        adapter: &mut DetectionAdapter,
        sink: &mut K,
        cancel: &CancelToken,
    ) -> RedactResult<Termination> {
        let pace = (self.settings.target_fps > 0)
            .then(|| Duration::from_secs_f64(1.0 / f64::from(self.settings.target_fps)));

        loop {
            if cancel.is_cancelled() {
                return Ok(Termination::Cancelled);
            }
            let started = Instant::now();

            let frame = match lease.read() {
                Ok(Some(frame)) => frame,
                Ok(None) => return Ok(Termination::EndOfStream),
                Err(err) => {
                    log::error!("capture failed: {}", err);
                    return Err(err);
                }
            };
            self.summary.frames_read += 1;

            let output = self.process_frame(frame, adapter);
            if cancel.is_cancelled() {
                return Ok(Termination::Cancelled);
            }

            if let Some(redacted) = output {
                self.transition(StreamState::Emitting);
                if let Err(err) = sink.emit(&redacted) {
                    log::warn!("{}", RedactError::Emit(format!("{:#}", err)));
                    return Ok(Termination::SinkClosed);
                }
                self.summary.frames_emitted += 1;
            }
            self.transition(StreamState::Capturing);

            if let Some(pace) = pace {
                if let Some(rest) = pace.checked_sub(started.elapsed()) {
                    std::thread::sleep(rest);
                }
            }
        }
    }

    /// Redact one frame. Returns `None` only when the failure policy drops it.
    pub fn process_frame(
        &mut self,
        frame: Frame,
        adapter: &mut DetectionAdapter,
    ) -> Option<RedactedFrame> {
        let index = self.frame_index;
        self.frame_index += 1;
        let now = frame.captured_at();
        let skip = u64::from(self.settings.frame_skip.max(1));

        if index % skip != 0 {
            if let Some(mask) = self.last_mask.clone() {
                self.summary.frames_skipped += 1;
                log::trace!("frame {} reuses mask of {} boxes", index, mask.len());
                return Some(self.composite(frame, &mask));
            }
        }

        self.transition(StreamState::Detecting);
        self.summary.frames_detected += 1;
        match adapter.detect(&frame) {
            Ok(detections) => {
                self.summary.detections_accepted += detections.len() as u64;
                self.tracks.prune(now);
                let mask = self.build_mask(detections, now);
                log::debug!(
                    "frame {}: {} boxes ({} classes tracked)",
                    index,
                    mask.len(),
                    self.tracks.len()
                );
                let redacted = self.composite(frame, &mask);
                self.last_mask = Some(mask);
                Some(redacted)
            }
            Err(failure) => {
                self.summary.detector_failures += 1;
                self.tracks.prune(now);
                log::warn!(
                    "frame {}: {} (policy {})",
                    index,
                    RedactError::from(failure),
                    self.settings.failure_policy
                );
                self.apply_failure_policy(frame)
            }
        }
    }

    fn apply_failure_policy(&mut self, frame: Frame) -> Option<RedactedFrame> {
        match self.settings.failure_policy {
            FailurePolicy::ReuseMask => match self.last_mask.clone() {
                Some(mask) => Some(self.composite(frame, &mask)),
                None => {
                    log::warn!("no mask to reuse yet; blanking frame");
                    Some(self.blank(frame))
                }
            },
            FailurePolicy::Blank => {
                // Skipped frames may only reuse a mask from a successful detection.
                self.last_mask = None;
                Some(self.blank(frame))
            }
            FailurePolicy::Drop => {
                self.last_mask = None;
                self.summary.frames_dropped += 1;
                None
            }
        }
    }

    /// Record `detections` in the track store and collect current plus predicted boxes.
    fn build_mask(&mut self, detections: Vec<Detection>, now: Timestamp) -> RedactionMask {
        let mut mask = RedactionMask::with_capacity(detections.len() * 2);
        for detection in detections {
            mask.push(detection.bbox);
            self.tracks.update(detection.class_id, detection, now);
        }
        for (_, track) in self.tracks.tracks() {
            if let Some(predicted) = self.predictor.predict(track) {
                mask.push(predicted);
            }
        }
        mask
    }

    fn composite(&mut self, frame: Frame, mask: &RedactionMask) -> RedactedFrame {
        let redacted = self.compositor.redact(frame, mask);
        self.summary.boxes_applied += redacted.regions_redacted() as u64;
        redacted
    }

    fn blank(&mut self, frame: Frame) -> RedactedFrame {
        self.summary.frames_blanked += 1;
        RedactedFrame::blanked(frame)
    }

    fn transition(&mut self, next: StreamState) {
        if self.state != next {
            log::trace!("stream state {:?} -> {:?}", self.state, next);
            self.state = next;
        }
    }
}
