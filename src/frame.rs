//! Raw frame isolation layer.
//!
//! This module enforces "no unredacted frame leaves the pipeline" at the type level.
//!
//! - `Frame`: captured RGB8 pixels. Bytes are private to the crate and zeroized on drop.
//! - `RedactedFrame`: the only frame type that can be inspected, encoded or emitted.
//!
//! A `RedactedFrame` is produced either by the compositor (`Compositor::redact`) or by
//! the fail-closed path (`RedactedFrame::blanked`). There is no public constructor that
//! turns captured pixels into an emittable frame without going through one of those.
//!
//! Raw bytes cannot be read from outside the crate:
//!
//! ```compile_fail
//! use redaction_kernel::{Frame, Timestamp};
//!
//! let frame = Frame::from_rgb(vec![0u8; 3], 1, 1, Timestamp::ZERO).unwrap();
//! let _bytes = frame.data;
//! ```
//!
//! and a captured frame cannot be relabelled as redacted:
//!
//! ```compile_fail
//! use redaction_kernel::{Frame, RedactedFrame, Timestamp};
//!
//! let frame = Frame::from_rgb(vec![0u8; 3], 1, 1, Timestamp::ZERO).unwrap();
//! let _out = RedactedFrame::from_frame(frame, 0);
//! ```
//!
//! Dimensions are fixed by `from_rgb` and cannot drift from the buffer:
//!
//! ```compile_fail
//! use redaction_kernel::{Frame, Timestamp};
//!
//! let mut frame = Frame::from_rgb(vec![0u8; 4 * 4 * 3], 4, 4, Timestamp::ZERO).unwrap();
//! frame.width = 40;
//! ```

use anyhow::{Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;
use std::time::Duration;
use zeroize::Zeroize;

use crate::error::RedactError;

/// Bytes per pixel. Frames are always packed RGB8.
pub const CHANNELS: usize = 3;

// ----------------------------------------------------------------------------
// Timestamp: monotonic capture time
// ----------------------------------------------------------------------------

/// Monotonic capture time, measured from the moment the capture source was opened.
///
/// Backed by `Duration` so window comparisons are exact at nanosecond resolution.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(Duration);

impl Timestamp {
    pub const ZERO: Timestamp = Timestamp(Duration::ZERO);

    pub fn from_duration(offset: Duration) -> Self {
        Self(offset)
    }

    /// Rounded to the nearest nanosecond. Negative and NaN inputs collapse to zero.
    pub fn from_secs_f64(secs: f64) -> Self {
        if secs.is_nan() || secs <= 0.0 {
            return Self::ZERO;
        }
        let nanos = (secs * 1e9).round();
        if nanos >= u64::MAX as f64 {
            return Self(Duration::from_nanos(u64::MAX));
        }
        Self(Duration::from_nanos(nanos as u64))
    }

    pub fn from_millis(millis: u64) -> Self {
        Self(Duration::from_millis(millis))
    }

    pub fn as_duration(&self) -> Duration {
        self.0
    }

    pub fn as_secs_f64(&self) -> f64 {
        self.0.as_secs_f64()
    }

    /// `self - earlier`, or zero when `earlier` is in the future.
    pub fn saturating_sub(&self, earlier: Timestamp) -> Duration {
        self.0.saturating_sub(earlier.0)
    }
}

// ----------------------------------------------------------------------------
// Frame: captured pixels
// ----------------------------------------------------------------------------

/// Captured frame. Bytes are private; there is no `.as_bytes()`, no `Clone`, no `Serialize`.
///
/// Detector backends see the pixels through the detection adapter, and the compositor
/// mutates them in place. Everything else only sees dimensions and the capture time.
pub struct Frame {
    /// Packed RGB8 pixels, row-major. MUST NOT be exposed via any public API.
    data: Vec<u8>,

    width: u32,
    height: u32,

    /// Monotonic capture time.
    captured_at: Timestamp,
}

// Explicitly NOT implementing Clone, AsRef<[u8]>, or any byte-exposing trait.

impl Frame {
    /// Wrap a packed RGB8 buffer. The length must be exactly `width * height * 3`.
    pub fn from_rgb(
        data: Vec<u8>,
        width: u32,
        height: u32,
        captured_at: Timestamp,
    ) -> Result<Self, RedactError> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(CHANNELS))
            .ok_or_else(|| RedactError::InvalidFrame("frame dimensions overflow".to_string()))?;
        if width == 0 || height == 0 {
            return Err(RedactError::InvalidFrame(format!(
                "empty frame {}x{}",
                width, height
            )));
        }
        if data.len() != expected {
            return Err(RedactError::InvalidFrame(format!(
                "expected {} RGB bytes for {}x{}, received {}",
                expected,
                width,
                height,
                data.len()
            )));
        }
        Ok(Self {
            data,
            width,
            height,
            captured_at,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Monotonic capture time.
    pub fn captured_at(&self) -> Timestamp {
        self.captured_at
    }

    /// Byte length of the pixel buffer.
    pub fn byte_len(&self) -> usize {
        self.data.len()
    }

    /// Internal: read access for detector backends.
    pub(crate) fn pixels(&self) -> &[u8] {
        &self.data
    }

    /// Internal: write access for the compositor.
    pub(crate) fn pixels_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    fn take_pixels(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.data)
    }
}

impl Drop for Frame {
    fn drop(&mut self) {
        // Zeroize raw pixel data on drop to limit exposure window.
        self.data.zeroize();
    }
}

// ----------------------------------------------------------------------------
// RedactedFrame: the emission boundary
// ----------------------------------------------------------------------------

/// Frame that has passed through redaction and may leave the pipeline.
#[derive(Clone, Debug)]
pub struct RedactedFrame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    captured_at: Timestamp,
    regions: usize,
    blanked: bool,
}

impl RedactedFrame {
    /// Internal: seal a frame whose mask has been applied.
    pub(crate) fn from_frame(mut frame: Frame, regions: usize) -> Self {
        Self {
            data: frame.take_pixels(),
            width: frame.width,
            height: frame.height,
            captured_at: frame.captured_at,
            regions,
            blanked: false,
        }
    }

    /// Fail-closed output: every pixel is zeroed before the frame is sealed.
    pub fn blanked(mut frame: Frame) -> Self {
        let mut data = frame.take_pixels();
        data.zeroize();
        data.resize(frame.width as usize * frame.height as usize * CHANNELS, 0);
        Self {
            data,
            width: frame.width,
            height: frame.height,
            captured_at: frame.captured_at,
            regions: 0,
            blanked: true,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn captured_at(&self) -> Timestamp {
        self.captured_at
    }

    /// Number of boxes that survived clamping and were redacted.
    pub fn regions_redacted(&self) -> usize {
        self.regions
    }

    /// True when this frame was blanked by the fail-closed path.
    pub fn is_blanked(&self) -> bool {
        self.blanked
    }

    /// Packed RGB8 pixels of the redacted frame.
    pub fn as_rgb(&self) -> &[u8] {
        &self.data
    }

    /// Encode as baseline JPEG.
    pub fn encode_jpeg(&self, quality: u8) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(self.data.len() / 8);
        JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100))
            .encode(&self.data, self.width, self.height, ExtendedColorType::Rgb8)
            .context("encode redacted frame as jpeg")?;
        Ok(out)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn make_test_frame(width: u32, height: u32, value: u8) -> Frame {
        let data = vec![value; width as usize * height as usize * CHANNELS];
        Frame::from_rgb(data, width, height, Timestamp::from_millis(40)).unwrap()
    }

    #[test]
    fn frame_rejects_wrong_buffer_length() {
        assert!(matches!(
            Frame::from_rgb(vec![0u8; 10], 2, 2, Timestamp::ZERO),
            Err(RedactError::InvalidFrame(_))
        ));
    }

    #[test]
    fn frame_reports_geometry_from_constructor() {
        let frame = make_test_frame(6, 3, 0);
        assert_eq!((frame.width(), frame.height()), (6, 3));
        assert_eq!(frame.byte_len(), 6 * 3 * CHANNELS);
        assert_eq!(frame.captured_at(), Timestamp::from_millis(40));
    }

    #[test]
    fn frame_rejects_empty_dimensions() {
        assert!(Frame::from_rgb(Vec::new(), 0, 4, Timestamp::ZERO).is_err());
    }

    #[test]
    fn blanked_frame_has_no_original_pixels() {
        let frame = make_test_frame(8, 4, 200);
        let out = RedactedFrame::blanked(frame);
        assert!(out.is_blanked());
        assert_eq!(out.as_rgb().len(), 8 * 4 * CHANNELS);
        assert!(out.as_rgb().iter().all(|&b| b == 0));
        assert_eq!(out.captured_at(), Timestamp::from_millis(40));
    }

    #[test]
    fn sealing_keeps_dimensions_and_pixels() {
        let frame = make_test_frame(4, 2, 17);
        let out = RedactedFrame::from_frame(frame, 3);
        assert_eq!((out.width(), out.height()), (4, 2));
        assert_eq!(out.regions_redacted(), 3);
        assert!(out.as_rgb().iter().all(|&b| b == 17));
    }

    #[test]
    fn redacted_frame_encodes_to_jpeg() -> Result<()> {
        let out = RedactedFrame::blanked(make_test_frame(16, 16, 90));
        let jpeg = out.encode_jpeg(80)?;
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
        Ok(())
    }

    #[test]
    fn timestamp_handles_negative_and_ordering() {
        assert_eq!(Timestamp::from_secs_f64(-1.0), Timestamp::ZERO);
        assert_eq!(Timestamp::from_secs_f64(f64::NAN), Timestamp::ZERO);
        let a = Timestamp::from_secs_f64(0.1);
        let b = Timestamp::from_secs_f64(0.6);
        assert!(a < b);
        assert_eq!(b.saturating_sub(a), Duration::from_millis(500));
        assert_eq!(a.saturating_sub(b), Duration::ZERO);
    }
}
