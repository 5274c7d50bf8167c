//! Redaction compositor.
//!
//! Applies a redaction mask to a captured frame and seals the result as a
//! `RedactedFrame`. Each box is clamped to the frame, the region is pixelated in
//! `kernel`-sized blocks and then Gaussian-blurred with `sigma`. Block averaging
//! discards the detail inside each block, so no inverse filter can recover it.

use image::{imageops, Rgb, RgbImage};
use zeroize::Zeroize;

use crate::frame::{Frame, RedactedFrame, CHANNELS};
use crate::geometry::{BBox, PixelRect};

/// Boxes to redact in one frame: current detections plus predictions.
///
/// Built fresh for every frame and never persisted.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RedactionMask {
    boxes: Vec<BBox>,
}

impl RedactionMask {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            boxes: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, bbox: BBox) {
        self.boxes.push(bbox);
    }

    pub fn boxes(&self) -> &[BBox] {
        &self.boxes
    }

    pub fn len(&self) -> usize {
        self.boxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }
}

impl Extend<BBox> for RedactionMask {
    fn extend<I: IntoIterator<Item = BBox>>(&mut self, iter: I) {
        self.boxes.extend(iter);
    }
}

impl FromIterator<BBox> for RedactionMask {
    fn from_iter<I: IntoIterator<Item = BBox>>(iter: I) -> Self {
        Self {
            boxes: iter.into_iter().collect(),
        }
    }
}

/// Blur strength.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BlurSettings {
    /// Pixelation block side in pixels.
    pub kernel: u32,
    /// Gaussian sigma applied after pixelation.
    pub sigma: f32,
}

impl Default for BlurSettings {
    fn default() -> Self {
        Self {
            kernel: 25,
            sigma: 30.0,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct Compositor {
    blur: BlurSettings,
}

impl Compositor {
    pub fn new(blur: BlurSettings) -> Self {
        Self { blur }
    }

    pub fn blur(&self) -> BlurSettings {
        self.blur
    }

    /// Redact every box in `boxes` in place. Returns how many regions were touched.
    ///
    /// Boxes that clamp to an empty region are skipped. Overlapping boxes are each
    /// applied; the result is at least as obscured as a single application.
    pub fn apply(&self, frame: &mut Frame, boxes: &[BBox]) -> usize {
        let (width, height) = (frame.width(), frame.height());
        let mut applied = 0;
        for bbox in boxes {
            match bbox.clamp_to(width, height) {
                Some(rect) => {
                    redact_region(frame.pixels_mut(), width, rect, self.blur);
                    applied += 1;
                }
                None => log::trace!("skipping degenerate region {:?}", bbox),
            }
        }
        applied
    }

    /// Apply `mask` and seal the frame for emission.
    pub fn redact(&self, mut frame: Frame, mask: &RedactionMask) -> RedactedFrame {
        let regions = self.apply(&mut frame, mask.boxes());
        RedactedFrame::from_frame(frame, regions)
    }
}

fn pixel_index(width: u32, x: u32, y: u32) -> usize {
    (y as usize * width as usize + x as usize) * CHANNELS
}

fn redact_region(pixels: &mut [u8], frame_width: u32, rect: PixelRect, blur: BlurSettings) {
    let mut region = RgbImage::from_fn(rect.width(), rect.height(), |x, y| {
        let i = pixel_index(frame_width, rect.x1 + x, rect.y1 + y);
        Rgb([pixels[i], pixels[i + 1], pixels[i + 2]])
    });

    pixelate(&mut region, blur.kernel.max(1));
    let blurred = if blur.sigma > 0.0 {
        imageops::blur(&region, blur.sigma)
    } else {
        region.clone()
    };

    for (x, y, px) in blurred.enumerate_pixels() {
        let i = pixel_index(frame_width, rect.x1 + x, rect.y1 + y);
        pixels[i..i + CHANNELS].copy_from_slice(&px.0);
    }

    let mut scratch = region.into_raw();
    scratch.zeroize();
    let mut scratch = blurred.into_raw();
    scratch.zeroize();
}

/// Replace every `block × block` tile with its mean colour.
fn pixelate(region: &mut RgbImage, block: u32) {
    let (w, h) = region.dimensions();
    for by in (0..h).step_by(block as usize) {
        for bx in (0..w).step_by(block as usize) {
            let bw = block.min(w - bx);
            let bh = block.min(h - by);
            let mut sum = [0u64; CHANNELS];
            for y in by..by + bh {
                for x in bx..bx + bw {
                    let px = region.get_pixel(x, y);
                    for c in 0..CHANNELS {
                        sum[c] += u64::from(px.0[c]);
                    }
                }
            }
            let n = u64::from(bw) * u64::from(bh);
            let mean = Rgb([
                (sum[0] / n) as u8,
                (sum[1] / n) as u8,
                (sum[2] / n) as u8,
            ]);
            for y in by..by + bh {
                for x in bx..bx + bw {
                    region.put_pixel(x, y, mean);
                }
            }
        }
    }
}
