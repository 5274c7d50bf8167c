//! redact_demo - end-to-end synthetic run of the redaction pipeline
//!
//! Generates a moving bright square, detects it with the stub backend, redacts the
//! current and predicted boxes, and writes every emitted frame as a numbered JPEG.

use anyhow::{anyhow, Result};
use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use redaction_kernel::{
    BackendRegistry, BlurSettings, CancelToken, CaptureHub, DetectionAdapter, DetectorBackend,
    FailurePolicy, FrameSink, JpegDirectorySink, RawDetection, RedactedFrame, StreamScheduler,
    StreamSettings, StubBackend, SyntheticConfig, SyntheticSource,
};

#[path = "../ui.rs"]
mod ui;

#[derive(Parser, Debug)]
#[command(
    name = "redact_demo",
    author,
    version,
    about = "Run the redaction pipeline on a synthetic scene"
)]
struct Args {
    /// Number of frames to generate.
    #[arg(long, default_value_t = 60)]
    frames: u64,
    /// Frame rate of the synthetic source.
    #[arg(long, default_value_t = 20)]
    fps: u32,
    #[arg(long, default_value_t = 320)]
    width: u32,
    #[arg(long, default_value_t = 240)]
    height: u32,
    /// Run detection on every N-th frame.
    #[arg(long, default_value_t = 2)]
    skip: u32,
    /// Prediction horizon in milliseconds.
    #[arg(long, default_value_t = 200)]
    lookahead_ms: u64,
    /// Failure policy when detection is unavailable (blank|drop|reuse-mask).
    #[arg(long, default_value = "blank")]
    policy: String,
    /// Make every N-th detector call fail, to exercise the failure policy.
    #[arg(long)]
    fail_every: Option<u64>,
    /// Output directory for redacted JPEG frames.
    #[arg(long, default_value = "demo_out")]
    out: PathBuf,
    /// Seed for the synthetic background noise.
    #[arg(long, default_value_t = 0x5eed)]
    seed: u64,
    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,
}

/// Wraps a backend and fails every `every`-th call.
struct FlakyBackend<B> {
    inner: B,
    every: u64,
    calls: u64,
}

impl<B: DetectorBackend> DetectorBackend for FlakyBackend<B> {
    fn name(&self) -> &'static str {
        "flaky"
    }

    fn detect(&mut self, pixels: &[u8], width: u32, height: u32) -> Result<Vec<RawDetection>> {
        self.calls += 1;
        if self.calls % self.every == 0 {
            return Err(anyhow!("simulated detector fault (call {})", self.calls));
        }
        self.inner.detect(pixels, width, height)
    }
}

/// Ticks the frame progress bar as frames are written.
struct ProgressSink<'a, S> {
    inner: S,
    progress: &'a ui::FrameProgress,
}

impl<S: FrameSink> FrameSink for ProgressSink<'_, S> {
    fn emit(&mut self, frame: &RedactedFrame) -> Result<()> {
        self.inner.emit(frame)?;
        self.progress.tick(frame.is_blanked());
        Ok(())
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args = Args::parse();
    if args.fps == 0 {
        return Err(anyhow!("fps must be >= 1"));
    }
    if args.skip == 0 {
        return Err(anyhow!("skip must be >= 1"));
    }
    if args.fail_every == Some(0) {
        return Err(anyhow!("fail-every must be >= 1"));
    }
    let policy: FailurePolicy = args.policy.parse()?;
    let ui = ui::Ui::from_args(&args.ui, std::io::stderr().is_terminal());

    let (hub, mut adapter) = {
        let _stage = ui.stage("Prepare source + detector");
        let source = SyntheticSource::new(SyntheticConfig {
            url: "stub://demo".to_string(),
            width: args.width,
            height: args.height,
            fps: args.fps,
            max_frames: Some(args.frames),
            seed: args.seed,
            ..SyntheticConfig::default()
        })?;
        let hub = CaptureHub::new(Box::new(source));

        let mut registry = BackendRegistry::new();
        registry.register(StubBackend::new());
        if let Some(every) = args.fail_every {
            registry.register(FlakyBackend {
                inner: StubBackend::new(),
                every,
                calls: 0,
            });
            registry.set_default("flaky")?;
        }
        registry.warm_up_default()?;
        let backend: Arc<Mutex<dyn DetectorBackend>> = registry
            .default_backend()
            .ok_or_else(|| anyhow!("no detector backend registered"))?;
        let adapter = DetectionAdapter::spawn(backend, 0.5, Duration::from_millis(500))?;
        (hub, adapter)
    };

    let sink = JpegDirectorySink::create(&args.out, 85)?;
    let settings = StreamSettings {
        lookahead: Duration::from_millis(args.lookahead_ms),
        frame_skip: args.skip,
        failure_policy: policy,
        blur: BlurSettings::default(),
        ..StreamSettings::default()
    };

    let summary = {
        let _stage = ui.stage("Redact frames");
        let progress = ui.frames(Some(args.frames));
        let mut sink = ProgressSink {
            inner: sink,
            progress: &progress,
        };
        let mut scheduler = StreamScheduler::new(settings);
        let lease = hub.acquire()?;
        let summary = scheduler.run(lease, &mut adapter, &mut sink, &CancelToken::new())?;
        progress.finish();
        summary
    };

    println!("redact_demo summary:");
    println!("  frames read: {}", summary.frames_read);
    println!("  detection frames: {}", summary.frames_detected);
    println!("  skipped (mask reused): {}", summary.frames_skipped);
    println!("  emitted: {}", summary.frames_emitted);
    println!("  blanked: {}", summary.frames_blanked);
    println!("  dropped: {}", summary.frames_dropped);
    println!("  detector failures: {}", summary.detector_failures);
    println!("  boxes redacted: {}", summary.boxes_applied);
    println!("  output: {}", args.out.display());
    println!("  capture released: {}", hub.is_available());
    Ok(())
}
