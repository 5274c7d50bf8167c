//! Emission of redacted frames.
//!
//! Sinks only ever see `RedactedFrame`; there is no path from a captured `Frame` to a
//! sink that skips the compositor or the fail-closed blanking.

use anyhow::{Context, Result};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::frame::RedactedFrame;

/// Default JPEG quality for encoded output.
pub const DEFAULT_JPEG_QUALITY: u8 = 80;

/// Boundary for redacted output. An error ends the stream.
pub trait FrameSink {
    fn emit(&mut self, frame: &RedactedFrame) -> Result<()>;
}

/// Multipart MJPEG writer (`multipart/x-mixed-replace; boundary=frame`).
///
/// Transport-agnostic: wrap stdout, a file, or an HTTP response body.
pub struct MjpegWriter<W: Write> {
    out: W,
    quality: u8,
    frames: u64,
}

impl<W: Write> MjpegWriter<W> {
    pub const CONTENT_TYPE: &'static str = "multipart/x-mixed-replace; boundary=frame";

    pub fn new(out: W, quality: u8) -> Self {
        Self {
            out,
            quality,
            frames: 0,
        }
    }

    pub fn frames_written(&self) -> u64 {
        self.frames
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> FrameSink for MjpegWriter<W> {
    fn emit(&mut self, frame: &RedactedFrame) -> Result<()> {
        let jpeg = frame.encode_jpeg(self.quality)?;
        self.out
            .write_all(b"--frame\r\nContent-Type: image/jpeg\r\n\r\n")
            .and_then(|_| self.out.write_all(&jpeg))
            .and_then(|_| self.out.write_all(b"\r\n"))
            .and_then(|_| self.out.flush())
            .context("write mjpeg part")?;
        self.frames += 1;
        Ok(())
    }
}

/// Writes one numbered JPEG per frame (`frame_000000.jpg`, ...).
pub struct JpegDirectorySink {
    dir: PathBuf,
    quality: u8,
    next_index: u64,
}

impl JpegDirectorySink {
    /// Create `dir` if needed.
    pub fn create<P: AsRef<Path>>(dir: P, quality: u8) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)
            .with_context(|| format!("create output directory {}", dir.display()))?;
        Ok(Self {
            dir,
            quality,
            next_index: 0,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn frames_written(&self) -> u64 {
        self.next_index
    }
}

impl FrameSink for JpegDirectorySink {
    fn emit(&mut self, frame: &RedactedFrame) -> Result<()> {
        let path = self.dir.join(format!("frame_{:06}.jpg", self.next_index));
        let jpeg = frame.encode_jpeg(self.quality)?;
        fs::write(&path, jpeg).with_context(|| format!("write {}", path.display()))?;
        self.next_index += 1;
        Ok(())
    }
}

/// Collects frames in memory.
#[derive(Default)]
pub struct MemorySink {
    frames: Vec<RedactedFrame>,
    /// Fail every emit after this many frames.
    capacity: Option<usize>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink that refuses further frames once `capacity` are held.
    pub fn bounded(capacity: usize) -> Self {
        Self {
            frames: Vec::new(),
            capacity: Some(capacity),
        }
    }

    pub fn frames(&self) -> &[RedactedFrame] {
        &self.frames
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn into_frames(self) -> Vec<RedactedFrame> {
        self.frames
    }
}

impl FrameSink for MemorySink {
    fn emit(&mut self, frame: &RedactedFrame) -> Result<()> {
        if let Some(capacity) = self.capacity {
            if self.frames.len() >= capacity {
                anyhow::bail!("memory sink full ({} frames)", capacity);
            }
        }
        self.frames.push(frame.clone());
        Ok(())
    }
}

impl<S: FrameSink + ?Sized> FrameSink for &mut S {
    fn emit(&mut self, frame: &RedactedFrame) -> Result<()> {
        (**self).emit(frame)
    }
}

impl<S: FrameSink + ?Sized> FrameSink for Box<S> {
    fn emit(&mut self, frame: &RedactedFrame) -> Result<()> {
        (**self).emit(frame)
    }
}
