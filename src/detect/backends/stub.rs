use anyhow::{anyhow, Result};
use std::collections::VecDeque;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::RawDetection;
use crate::frame::CHANNELS;
use crate::geometry::BBox;

const DEFAULT_LUMA_THRESHOLD: u8 = 200;
const DEFAULT_CONFIDENCE: f32 = 0.9;
/// Blobs smaller than this many pixels are treated as noise.
const MIN_BLOB_PIXELS: usize = 16;

/// Stub backend for testing and the synthetic camera.
///
/// Reports every 4-connected region of saturated pixels as one object of a single
/// class with fixed confidence. Pairs with `SyntheticSource`, which draws a bright
/// square over a dim, noisy background.
pub struct StubBackend {
    class_id: u32,
    luma_threshold: u8,
    confidence: f32,
}

impl StubBackend {
    pub fn new() -> Self {
        Self {
            class_id: 0,
            luma_threshold: DEFAULT_LUMA_THRESHOLD,
            confidence: DEFAULT_CONFIDENCE,
        }
    }

    pub fn with_class(mut self, class_id: u32) -> Self {
        self.class_id = class_id;
        self
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn with_luma_threshold(mut self, threshold: u8) -> Self {
        self.luma_threshold = threshold;
        self
    }

    fn bright_mask(&self, pixels: &[u8]) -> Vec<bool> {
        pixels
            .chunks_exact(CHANNELS)
            .map(|px| {
                let luma = (299 * u32::from(px[0]) + 587 * u32::from(px[1]) + 114 * u32::from(px[2]))
                    / 1000;
                luma >= u32::from(self.luma_threshold)
            })
            .collect()
    }
}

impl Default for StubBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl DetectorBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn detect(&mut self, pixels: &[u8], width: u32, height: u32) -> Result<Vec<RawDetection>> {
        let (w, h) = (width as usize, height as usize);
        if pixels.len() != w * h * CHANNELS {
            return Err(anyhow!(
                "expected {} RGB bytes, received {}",
                w * h * CHANNELS,
                pixels.len()
            ));
        }

        let bright = self.bright_mask(pixels);
        let mut visited = vec![false; bright.len()];
        let mut detections = Vec::new();
        let mut queue = VecDeque::new();

        for start in 0..bright.len() {
            if !bright[start] || visited[start] {
                continue;
            }
            visited[start] = true;
            queue.push_back(start);
            let (mut min_x, mut min_y, mut max_x, mut max_y) = (w, h, 0usize, 0usize);
            let mut count = 0usize;

            while let Some(idx) = queue.pop_front() {
                let (x, y) = (idx % w, idx / w);
                count += 1;
                min_x = min_x.min(x);
                min_y = min_y.min(y);
                max_x = max_x.max(x);
                max_y = max_y.max(y);

                let mut visit = |n: usize| {
                    if bright[n] && !visited[n] {
                        visited[n] = true;
                        queue.push_back(n);
                    }
                };
                if x > 0 {
                    visit(idx - 1);
                }
                if x + 1 < w {
                    visit(idx + 1);
                }
                if y > 0 {
                    visit(idx - w);
                }
                if y + 1 < h {
                    visit(idx + w);
                }
            }

            if count >= MIN_BLOB_PIXELS {
                detections.push(RawDetection::new(
                    self.class_id,
                    BBox::new(
                        min_x as f64,
                        min_y as f64,
                        (max_x + 1) as f64,
                        (max_y + 1) as f64,
                    ),
                    self.confidence,
                ));
            }
        }

        Ok(detections)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_with_square(w: usize, h: usize, x: usize, y: usize, size: usize) -> Vec<u8> {
        let mut pixels = vec![30u8; w * h * CHANNELS];
        for row in y..y + size {
            for col in x..x + size {
                let idx = (row * w + col) * CHANNELS;
                pixels[idx..idx + CHANNELS].copy_from_slice(&[250, 250, 250]);
            }
        }
        pixels
    }

    #[test]
    fn stub_backend_finds_bright_square() {
        let mut backend = StubBackend::new().with_class(7);
        let pixels = frame_with_square(64, 48, 10, 12, 8);

        let found = backend.detect(&pixels, 64, 48).unwrap();

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].class_id, 7);
        assert_eq!(found[0].bbox, BBox::new(10.0, 12.0, 18.0, 20.0));
        assert_eq!(found[0].confidence, DEFAULT_CONFIDENCE);
    }

    #[test]
    fn stub_backend_reports_nothing_on_dark_frame() {
        let mut backend = StubBackend::default();
        let pixels = vec![10u8; 32 * 32 * CHANNELS];
        assert!(backend.detect(&pixels, 32, 32).unwrap().is_empty());
    }

    #[test]
    fn stub_backend_separates_disjoint_blobs() {
        let mut backend = StubBackend::default();
        let mut pixels = frame_with_square(64, 64, 2, 2, 6);
        let other = frame_with_square(64, 64, 40, 40, 6);
        for (dst, src) in pixels.iter_mut().zip(other) {
            *dst = (*dst).max(src);
        }

        let found = backend.detect(&pixels, 64, 64).unwrap();
        assert_eq!(found.len(), 2);
    }

    #[test]
    fn stub_backend_honours_tuning() {
        let pixels = frame_with_square(32, 32, 4, 4, 6);

        let mut dim = StubBackend::new().with_confidence(0.3);
        let found = dim.detect(&pixels, 32, 32).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].confidence, 0.3);

        let mut strict = StubBackend::new().with_luma_threshold(255);
        assert!(strict.detect(&pixels, 32, 32).unwrap().is_empty());
    }

    #[test]
    fn stub_backend_rejects_short_buffer() {
        let mut backend = StubBackend::default();
        assert!(backend.detect(&[0u8; 5], 4, 4).is_err());
    }
}
