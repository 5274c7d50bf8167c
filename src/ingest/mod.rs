//! Frame capture sources and the exclusive capture lease.
//!
//! This module provides different sources for captured frames:
//! - Synthetic moving-object scenes (`stub://...`, testing and demos)
//! - USB/V4L2 devices (feature: ingest-v4l2)
//!
//! A capture device is a singleton resource. It lives in a `CaptureHub` slot and is
//! only reachable through a `CaptureLease`; the lease releases the device when it
//! is released or dropped, on every exit path of the stream.
//!
//! The ingestion layer MUST NOT:
//! - Store captured frames to disk
//! - Transmit captured frames over network
//! - Log frame content

use anyhow::{anyhow, Result};
use std::sync::{Arc, Mutex};

use crate::config::CaptureSettings;
use crate::error::{RedactError, RedactResult};
use crate::frame::Frame;

pub mod synthetic;
#[cfg(feature = "ingest-v4l2")]
pub mod v4l2;

pub use synthetic::SyntheticSource;
#[cfg(feature = "ingest-v4l2")]
pub use v4l2::V4l2Source;

/// A device or generator that yields frames in capture order.
pub trait CaptureSource: Send {
    fn name(&self) -> &str;

    /// Acquire the underlying device.
    fn open(&mut self) -> Result<()>;

    /// Next frame, or `None` at end of stream.
    fn read(&mut self) -> Result<Option<Frame>>;

    /// Release the underlying device. Must be safe to call more than once.
    fn release(&mut self);

    fn is_open(&self) -> bool;
}

type Slot = Arc<Mutex<Option<Box<dyn CaptureSource>>>>;

/// Exclusive owner of one capture source.
///
/// Cloning the hub shares the slot; at most one lease exists at a time.
#[derive(Clone)]
pub struct CaptureHub {
    name: String,
    slot: Slot,
}

impl CaptureHub {
    pub fn new(source: Box<dyn CaptureSource>) -> Self {
        Self {
            name: source.name().to_string(),
            slot: Arc::new(Mutex::new(Some(source))),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// True when no lease is outstanding.
    pub fn is_available(&self) -> bool {
        self.slot
            .lock()
            .map(|slot| slot.is_some())
            .unwrap_or(false)
    }

    /// Open the source and hand out the only lease.
    pub fn acquire(&self) -> RedactResult<CaptureLease> {
        let mut slot = self
            .slot
            .lock()
            .map_err(|_| RedactError::CaptureUnavailable("capture slot poisoned".to_string()))?;
        let mut source = slot
            .take()
            .ok_or_else(|| RedactError::CaptureBusy(self.name.clone()))?;

        if let Err(err) = source.open() {
            source.release();
            *slot = Some(source);
            return Err(RedactError::CaptureUnavailable(format!(
                "{}: {:#}",
                self.name, err
            )));
        }

        log::info!("capture {} acquired", self.name);
        Ok(CaptureLease {
            name: self.name.clone(),
            source: Some(source),
            slot: Arc::clone(&self.slot),
        })
    }
}

/// Scoped ownership of an open capture source.
pub struct CaptureLease {
    name: String,
    source: Option<Box<dyn CaptureSource>>,
    slot: Slot,
}

impl CaptureLease {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Next frame, `Ok(None)` at end of stream.
    pub fn read(&mut self) -> RedactResult<Option<Frame>> {
        let source = self
            .source
            .as_mut()
            .ok_or_else(|| RedactError::CaptureUnavailable(format!("{} released", self.name)))?;
        source
            .read()
            .map_err(|err| RedactError::CaptureUnavailable(format!("{}: {:#}", self.name, err)))
    }

    pub fn is_released(&self) -> bool {
        self.source.is_none()
    }

    /// Release the device and return it to the hub. Idempotent.
    pub fn release(&mut self) {
        let Some(mut source) = self.source.take() else {
            return;
        };
        source.release();
        match self.slot.lock() {
            Ok(mut slot) => *slot = Some(source),
            Err(_) => log::error!("capture slot poisoned; {} not returned", self.name),
        }
        log::info!("capture {} released", self.name);
    }
}

impl Drop for CaptureLease {
    fn drop(&mut self) {
        self.release();
    }
}

/// Build a capture source from operator settings.
///
/// `stub://` URLs produce a synthetic scene; `/dev/video*` paths need `ingest-v4l2`.
pub fn source_from_settings(settings: &CaptureSettings) -> Result<Box<dyn CaptureSource>> {
    if settings.source.starts_with("stub://") {
        let config = synthetic::SyntheticConfig {
            url: settings.source.clone(),
            width: settings.width,
            height: settings.height,
            fps: settings.fps,
            max_frames: settings.max_frames,
            ..synthetic::SyntheticConfig::default()
        };
        return Ok(Box::new(SyntheticSource::new(config)?));
    }

    #[cfg(feature = "ingest-v4l2")]
    {
        if settings.source.starts_with("/dev/video") {
            let config = v4l2::V4l2Config {
                device: settings.source.clone(),
                target_fps: settings.fps,
                width: settings.width,
                height: settings.height,
            };
            return Ok(Box::new(V4l2Source::new(config)));
        }
    }

    Err(anyhow!(
        "unsupported capture source '{}' (expected stub://... or /dev/videoN with ingest-v4l2)",
        settings.source
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hub(max_frames: u64) -> CaptureHub {
        let source = SyntheticSource::new(synthetic::SyntheticConfig {
            width: 16,
            height: 16,
            max_frames: Some(max_frames),
            ..synthetic::SyntheticConfig::default()
        })
        .unwrap();
        CaptureHub::new(Box::new(source))
    }

    #[test]
    fn second_acquire_is_busy() {
        let hub = hub(4);
        let lease = hub.acquire().unwrap();
        assert!(!hub.is_available());
        assert!(matches!(hub.acquire(), Err(RedactError::CaptureBusy(_))));
        drop(lease);
        assert!(hub.is_available());
        assert!(hub.acquire().is_ok());
    }

    #[test]
    fn explicit_release_is_idempotent() {
        let hub = hub(4);
        let mut lease = hub.acquire().unwrap();
        assert!(lease.read().unwrap().is_some());
        lease.release();
        lease.release();
        assert!(lease.is_released());
        assert!(hub.is_available());
        assert!(matches!(
            lease.read(),
            Err(RedactError::CaptureUnavailable(_))
        ));
    }

    #[test]
    fn settings_reject_unknown_scheme() {
        let settings = CaptureSettings {
            source: "rtsp://camera".to_string(),
            ..CaptureSettings::default()
        };
        assert!(source_from_settings(&settings).is_err());
    }

    #[test]
    fn settings_build_synthetic_source() {
        let settings = CaptureSettings {
            max_frames: Some(1),
            ..CaptureSettings::default()
        };
        let source = source_from_settings(&settings).unwrap();
        assert_eq!(source.name(), "stub://camera");
    }
}
