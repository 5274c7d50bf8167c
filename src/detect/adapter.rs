//! Detection adapter: bounded-latency wrapper around a detector backend.
//!
//! The backend runs on a dedicated worker thread per stream. The adapter hands it a
//! zeroizing copy of the frame pixels and waits at most `timeout` for the answer:
//! - a backend error becomes `DetectionFailure::Backend`
//! - no answer in time becomes `DetectionFailure::Timeout`
//! - a new frame while the previous call is still running becomes `DetectionFailure::Busy`
//!
//! Results that arrive for an abandoned request are discarded by request id, so a
//! slow detector never attaches stale boxes to a newer frame.

use anyhow::{anyhow, Context, Result};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use zeroize::Zeroizing;

use crate::error::DetectionFailure;
use crate::frame::{Frame, Timestamp};

use super::backend::DetectorBackend;
use super::result::{Detection, RawDetection};

struct DetectRequest {
    id: u64,
    pixels: Zeroizing<Vec<u8>>,
    width: u32,
    height: u32,
}

struct DetectResponse {
    id: u64,
    outcome: std::result::Result<Vec<RawDetection>, String>,
}

/// Per-stream detection adapter.
pub struct DetectionAdapter {
    requests: Option<Sender<DetectRequest>>,
    responses: Receiver<DetectResponse>,
    worker: Option<JoinHandle<()>>,
    backend_name: &'static str,
    confidence_threshold: f32,
    timeout: Duration,
    next_id: u64,
    in_flight: Option<u64>,
}

impl DetectionAdapter {
    /// Start a worker thread bound to `backend`.
    pub fn spawn(
        backend: Arc<Mutex<dyn DetectorBackend>>,
        confidence_threshold: f32,
        timeout: Duration,
    ) -> Result<Self> {
        let backend_name = backend
            .lock()
            .map_err(|_| anyhow!("detector backend lock poisoned"))?
            .name();
        let (request_tx, request_rx) = mpsc::channel::<DetectRequest>();
        let (response_tx, response_rx) = mpsc::channel::<DetectResponse>();
        let worker = std::thread::Builder::new()
            .name(format!("detect-{}", backend_name))
            .spawn(move || run_worker(backend, request_rx, response_tx))
            .context("spawn detector worker")?;

        log::debug!(
            "detection adapter started: backend={} threshold={:.2} timeout={:?}",
            backend_name,
            confidence_threshold,
            timeout
        );

        Ok(Self {
            requests: Some(request_tx),
            responses: response_rx,
            worker: Some(worker),
            backend_name,
            confidence_threshold,
            timeout,
            next_id: 0,
            in_flight: None,
        })
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend_name
    }

    pub fn confidence_threshold(&self) -> f32 {
        self.confidence_threshold
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Detect objects in `frame`.
    ///
    /// Returns only detections with `confidence >= threshold`, stamped with the
    /// frame's capture time. Never returns an empty list in place of a failure.
    pub fn detect(&mut self, frame: &Frame) -> std::result::Result<Vec<Detection>, DetectionFailure> {
        self.settle_in_flight()?;

        let id = self.next_id;
        self.next_id += 1;
        let request = DetectRequest {
            id,
            pixels: Zeroizing::new(frame.pixels().to_vec()),
            width: frame.width(),
            height: frame.height(),
        };
        self.requests
            .as_ref()
            .ok_or(DetectionFailure::WorkerGone)?
            .send(request)
            .map_err(|_| DetectionFailure::WorkerGone)?;
        self.in_flight = Some(id);

        let deadline = Instant::now() + self.timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.responses.recv_timeout(remaining) {
                Ok(response) if response.id == id => {
                    self.in_flight = None;
                    let raw = response.outcome.map_err(DetectionFailure::Backend)?;
                    return Ok(normalize_detections(
                        raw,
                        self.confidence_threshold,
                        frame.captured_at(),
                    ));
                }
                Ok(stale) => {
                    log::debug!("discarding stale detector result {}", stale.id);
                }
                Err(RecvTimeoutError::Timeout) => {
                    return Err(DetectionFailure::Timeout(self.timeout));
                }
                Err(RecvTimeoutError::Disconnected) => {
                    self.in_flight = None;
                    return Err(DetectionFailure::WorkerGone);
                }
            }
        }
    }

    /// Collect the answer to an abandoned request, if it has arrived.
    fn settle_in_flight(&mut self) -> std::result::Result<(), DetectionFailure> {
        let Some(pending) = self.in_flight else {
            return Ok(());
        };
        loop {
            match self.responses.try_recv() {
                Ok(response) if response.id == pending => {
                    log::debug!("discarding late detector result {}", pending);
                    self.in_flight = None;
                    return Ok(());
                }
                Ok(_) => continue,
                Err(TryRecvError::Empty) => return Err(DetectionFailure::Busy),
                Err(TryRecvError::Disconnected) => {
                    self.in_flight = None;
                    return Err(DetectionFailure::WorkerGone);
                }
            }
        }
    }
}

impl Drop for DetectionAdapter {
    fn drop(&mut self) {
        // Closing the request channel ends the worker loop after its current call.
        self.requests.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::warn!("detector worker for {} panicked", self.backend_name);
            }
        }
    }
}

fn run_worker(
    backend: Arc<Mutex<dyn DetectorBackend>>,
    requests: Receiver<DetectRequest>,
    responses: Sender<DetectResponse>,
) {
    while let Ok(request) = requests.recv() {
        let outcome = match backend.lock() {
            Ok(mut guard) => guard
                .detect(&request.pixels, request.width, request.height)
                .map_err(|err| format!("{:#}", err)),
            Err(_) => Err("detector backend lock poisoned".to_string()),
        };
        let id = request.id;
        // Zeroizes the pixel copy before the result is handed back.
        drop(request);
        if responses.send(DetectResponse { id, outcome }).is_err() {
            break;
        }
    }
}

/// Keep detections at or above `threshold` with finite coordinates, stamped with `timestamp`.
pub fn normalize_detections(
    raw: Vec<RawDetection>,
    threshold: f32,
    timestamp: Timestamp,
) -> Vec<Detection> {
    raw.into_iter()
        .filter(|det| det.confidence.is_finite() && det.confidence >= threshold)
        .filter(|det| det.bbox.is_finite())
        .map(|det| det.at(timestamp))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::BBox;
    use std::collections::VecDeque;

    enum Step {
        Found(Vec<RawDetection>),
        Fail,
        Stall(Duration),
    }

    struct ScriptedBackend {
        steps: VecDeque<Step>,
    }

    impl DetectorBackend for ScriptedBackend {
        fn name(&self) -> &'static str {
            "scripted"
        }

        fn detect(&mut self, _: &[u8], _: u32, _: u32) -> Result<Vec<RawDetection>> {
            match self.steps.pop_front() {
                Some(Step::Found(found)) => Ok(found),
                Some(Step::Fail) => Err(anyhow!("model exploded")),
                Some(Step::Stall(d)) => {
                    std::thread::sleep(d);
                    Ok(vec![RawDetection::new(1, BBox::new(0.0, 0.0, 4.0, 4.0), 0.9)])
                }
                None => Ok(Vec::new()),
            }
        }
    }

    fn adapter(steps: Vec<Step>, timeout: Duration) -> DetectionAdapter {
        let backend: Arc<Mutex<dyn DetectorBackend>> = Arc::new(Mutex::new(ScriptedBackend {
            steps: steps.into(),
        }));
        DetectionAdapter::spawn(backend, 0.5, timeout).unwrap()
    }

    fn frame(ms: u64) -> Frame {
        Frame::from_rgb(vec![0u8; 8 * 8 * 3], 8, 8, Timestamp::from_millis(ms)).unwrap()
    }

    #[test]
    fn adapter_filters_low_confidence() {
        let mut adapter = adapter(
            vec![Step::Found(vec![
                RawDetection::new(1, BBox::new(0.0, 0.0, 2.0, 2.0), 0.2),
                RawDetection::new(2, BBox::new(1.0, 1.0, 3.0, 3.0), 0.5),
                RawDetection::new(3, BBox::new(1.0, 1.0, 3.0, 3.0), 0.8),
            ])],
            Duration::from_secs(2),
        );

        let found = adapter.detect(&frame(100)).unwrap();

        assert_eq!(found.len(), 2);
        assert_eq!(found[0].class_id, 2);
        assert_eq!(found[1].class_id, 3);
        assert!(found.iter().all(|d| d.timestamp == Timestamp::from_millis(100)));
    }

    #[test]
    fn adapter_reports_backend_failure() {
        let mut adapter = adapter(vec![Step::Fail], Duration::from_secs(2));
        let err = adapter.detect(&frame(0)).unwrap_err();
        assert!(matches!(err, DetectionFailure::Backend(msg) if msg.contains("model exploded")));
    }

    #[test]
    fn adapter_times_out_then_reports_busy_then_recovers() {
        let mut adapter = adapter(
            vec![
                Step::Stall(Duration::from_millis(300)),
                Step::Found(vec![RawDetection::new(
                    4,
                    BBox::new(0.0, 0.0, 2.0, 2.0),
                    0.9,
                )]),
            ],
            Duration::from_millis(20),
        );

        assert!(matches!(
            adapter.detect(&frame(0)),
            Err(DetectionFailure::Timeout(_))
        ));
        assert_eq!(adapter.detect(&frame(50)), Err(DetectionFailure::Busy));

        std::thread::sleep(Duration::from_millis(500));
        let found = adapter.detect(&frame(600)).unwrap();
        // The stalled call's late result is discarded; this is the second step.
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].class_id, 4);
        assert_eq!(found[0].timestamp, Timestamp::from_millis(600));
    }

    #[test]
    fn normalize_drops_non_finite_boxes() {
        let raw = vec![
            RawDetection::new(1, BBox::new(f64::NAN, 0.0, 1.0, 1.0), 0.9),
            RawDetection::new(1, BBox::new(0.0, 0.0, 1.0, 1.0), f32::NAN),
            RawDetection::new(1, BBox::new(0.0, 0.0, 1.0, 1.0), 0.9),
        ];
        assert_eq!(normalize_detections(raw, 0.3, Timestamp::ZERO).len(), 1);
    }
}
