//! Synthetic capture source (`stub://...`).
//!
//! Generates a noisy dark background with one bright square sliding left to right,
//! wrapping at the frame edge. Timestamps are derived from the frame index and the
//! configured fps, so runs are reproducible for a given seed.

use anyhow::{anyhow, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;

use super::CaptureSource;
use crate::frame::{Frame, Timestamp, CHANNELS};
use crate::geometry::BBox;

const BACKGROUND: u8 = 40;
const NOISE: u8 = 16;
const OBJECT: u8 = 240;

/// Configuration for a synthetic source.
#[derive(Clone, Debug)]
pub struct SyntheticConfig {
    /// Source name, e.g. "stub://camera".
    pub url: String,
    pub width: u32,
    pub height: u32,
    /// Nominal frame rate; determines capture timestamps.
    pub fps: u32,
    /// End of stream after this many frames. `None` runs until released.
    pub max_frames: Option<u64>,
    /// Side of the moving square in pixels.
    pub object_size: u32,
    /// Horizontal movement per frame in pixels.
    pub speed_px: u32,
    pub seed: u64,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            url: "stub://camera".to_string(),
            width: 640,
            height: 480,
            fps: 20,
            max_frames: None,
            object_size: 48,
            speed_px: 8,
            seed: 0x5eed,
        }
    }
}

pub struct SyntheticSource {
    config: SyntheticConfig,
    rng: StdRng,
    frame_count: u64,
    open: bool,
}

impl SyntheticSource {
    pub fn new(config: SyntheticConfig) -> Result<Self> {
        if config.width == 0 || config.height == 0 {
            return Err(anyhow!("synthetic source needs a non-zero frame size"));
        }
        if config.fps == 0 {
            return Err(anyhow!("synthetic source needs fps > 0"));
        }
        Ok(Self {
            rng: StdRng::seed_from_u64(config.seed),
            config,
            frame_count: 0,
            open: false,
        })
    }

    pub fn config(&self) -> &SyntheticConfig {
        &self.config
    }

    /// Capture time of frame `index`.
    pub fn timestamp_of(&self, index: u64) -> Timestamp {
        let nanos = u128::from(index) * 1_000_000_000 / u128::from(self.config.fps);
        Timestamp::from_duration(Duration::from_nanos(nanos.min(u128::from(u64::MAX)) as u64))
    }

    /// Where the square is drawn in frame `index`, clipped to the frame.
    pub fn object_box(&self, index: u64) -> BBox {
        let width = u64::from(self.config.width);
        let size = u64::from(self.config.object_size.min(self.config.width));
        let travel = (width - size).max(1);
        let x = (index * u64::from(self.config.speed_px)) % travel;
        let side = size.min(u64::from(self.config.height));
        let y = (u64::from(self.config.height) - side) / 2;
        BBox::new(x as f64, y as f64, (x + size) as f64, (y + side) as f64)
    }

    fn render(&mut self, index: u64) -> Vec<u8> {
        let (w, h) = (self.config.width as usize, self.config.height as usize);
        let mut pixels = vec![0u8; w * h * CHANNELS];
        for px in pixels.iter_mut() {
            *px = BACKGROUND + self.rng.gen_range(0..NOISE);
        }

        let object = self.object_box(index);
        for y in object.y1 as usize..(object.y2 as usize).min(h) {
            for x in object.x1 as usize..(object.x2 as usize).min(w) {
                let i = (y * w + x) * CHANNELS;
                pixels[i..i + CHANNELS].fill(OBJECT);
            }
        }
        pixels
    }
}

impl CaptureSource for SyntheticSource {
    fn name(&self) -> &str {
        &self.config.url
    }

    /// Opening restarts the scene from frame zero.
    fn open(&mut self) -> Result<()> {
        self.rng = StdRng::seed_from_u64(self.config.seed);
        self.frame_count = 0;
        self.open = true;
        log::info!(
            "SyntheticSource: opened {} ({}x{} @ {} fps)",
            self.config.url,
            self.config.width,
            self.config.height,
            self.config.fps
        );
        Ok(())
    }

    fn read(&mut self) -> Result<Option<Frame>> {
        if !self.open {
            return Err(anyhow!("{} is not open", self.config.url));
        }
        if let Some(limit) = self.config.max_frames {
            if self.frame_count >= limit {
                return Ok(None);
            }
        }
        let index = self.frame_count;
        let pixels = self.render(index);
        self.frame_count += 1;
        let frame = Frame::from_rgb(
            pixels,
            self.config.width,
            self.config.height,
            self.timestamp_of(index),
        )?;
        Ok(Some(frame))
    }

    fn release(&mut self) {
        self.open = false;
    }

    fn is_open(&self) -> bool {
        self.open
    }
}
