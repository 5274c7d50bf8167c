//! V4L2 capture source.
//!
//! Captures packed RGB3 frames from a local device node (e.g. `/dev/video0`) through
//! an mmap buffer stream. Timestamps are measured from the moment the device was
//! opened, so they are monotonic within one lease.
//!
//! The V4L2 source MUST NOT:
//! - Store captured frames to disk
//! - Forward captured frames over network
//! - Retain frames beyond handoff to the scheduler

use anyhow::{anyhow, Context, Result};
use ouroboros::self_referencing;
use std::time::Instant;

use super::CaptureSource;
use crate::frame::{Frame, Timestamp, CHANNELS};

/// Configuration for a V4L2 source.
#[derive(Clone, Debug)]
pub struct V4l2Config {
    /// Device path (e.g., "/dev/video0")
    pub device: String,
    /// Requested frame rate. Zero leaves the driver default.
    pub target_fps: u32,
    /// Preferred frame width.
    pub width: u32,
    /// Preferred frame height.
    pub height: u32,
}

impl Default for V4l2Config {
    fn default() -> Self {
        Self {
            device: "/dev/video0".to_string(),
            target_fps: 20,
            width: 640,
            height: 480,
        }
    }
}

#[self_referencing]
struct DeviceState {
    device: v4l::Device,
    #[borrows(mut device)]
    #[covariant]
    stream: v4l::prelude::MmapStream<'this, v4l::Device>,
}

pub struct V4l2Source {
    config: V4l2Config,
    state: Option<DeviceState>,
    opened_at: Option<Instant>,
    frame_count: u64,
    active_width: u32,
    active_height: u32,
}

impl V4l2Source {
    pub fn new(config: V4l2Config) -> Self {
        Self {
            active_width: config.width,
            active_height: config.height,
            config,
            state: None,
            opened_at: None,
            frame_count: 0,
        }
    }

    pub fn frames_captured(&self) -> u64 {
        self.frame_count
    }
}

impl CaptureSource for V4l2Source {
    fn name(&self) -> &str {
        &self.config.device
    }

    fn open(&mut self) -> Result<()> {
        use v4l::buffer::Type;
        use v4l::video::Capture;

        let mut device = v4l::Device::with_path(&self.config.device)
            .with_context(|| format!("open v4l2 device {}", self.config.device))?;
        let mut format = device.format().context("read v4l2 format")?;
        format.width = self.config.width;
        format.height = self.config.height;
        format.fourcc = v4l::FourCC::new(b"RGB3");

        let format = device
            .set_format(&format)
            .with_context(|| format!("set RGB3 format on {}", self.config.device))?;
        if format.fourcc != v4l::FourCC::new(b"RGB3") {
            return Err(anyhow!(
                "{} does not support packed RGB3 capture",
                self.config.device
            ));
        }

        if self.config.target_fps > 0 {
            let params = v4l::video::capture::Parameters::with_fps(self.config.target_fps);
            if let Err(err) = device.set_params(&params) {
                log::warn!(
                    "V4l2Source: failed to set fps on {}: {}",
                    self.config.device,
                    err
                );
            }
        }

        self.active_width = format.width;
        self.active_height = format.height;

        let state = DeviceStateBuilder {
            device,
            stream_builder: |device| {
                v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, 4)
                    .map_err(|err| anyhow::Error::new(err).context("create v4l2 buffer stream"))
            },
        }
        .try_build()?;
        self.state = Some(state);
        self.opened_at = Some(Instant::now());
        self.frame_count = 0;

        log::info!(
            "V4l2Source: opened {} ({}x{})",
            self.config.device,
            self.active_width,
            self.active_height
        );
        Ok(())
    }

    fn read(&mut self) -> Result<Option<Frame>> {
        use v4l::io::traits::CaptureStream;

        let opened_at = self.opened_at.context("v4l2 device not open")?;
        let state = self.state.as_mut().context("v4l2 device not open")?;
        let pixels = state
            .with_mut(|fields| fields.stream.next().map(|(buf, _meta)| buf.to_vec()))
            .context("capture v4l2 frame")?;
        let captured_at = Timestamp::from_duration(opened_at.elapsed());

        let expected = self.active_width as usize * self.active_height as usize * CHANNELS;
        if pixels.len() < expected {
            return Err(anyhow!(
                "short v4l2 buffer: {} bytes, expected {}",
                pixels.len(),
                expected
            ));
        }
        let mut pixels = pixels;
        pixels.truncate(expected);

        self.frame_count += 1;
        let frame = Frame::from_rgb(pixels, self.active_width, self.active_height, captured_at)?;
        Ok(Some(frame))
    }

    fn release(&mut self) {
        if self.state.take().is_some() {
            log::info!("V4l2Source: released {}", self.config.device);
        }
        self.opened_at = None;
    }

    fn is_open(&self) -> bool {
        self.state.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_device_fails_to_open() {
        let mut source = V4l2Source::new(V4l2Config {
            device: "/dev/video-does-not-exist".to_string(),
            ..V4l2Config::default()
        });
        assert!(source.open().is_err());
        assert!(!source.is_open());
        assert!(source.read().is_err());
    }
}
