//! redactd - predictive redaction daemon
//!
//! This daemon:
//! 1. Loads configuration (REDACT_CONFIG file + REDACT_* environment)
//! 2. Builds the detector backend registry and warms up the default backend
//! 3. Acquires the capture device through the capture hub
//! 4. Runs the stream scheduler until end of stream, Ctrl-C, or a sink/capture failure
//! 5. Writes redacted frames as multipart MJPEG to stdout or the configured file

use anyhow::{anyhow, Context, Result};
use std::fs::File;
use std::io::{self, BufWriter};

use redaction_kernel::config::RedactConfig;
use redaction_kernel::detect::registry_from_settings;
use redaction_kernel::ingest::source_from_settings;
use redaction_kernel::{
    CancelToken, CaptureHub, DetectionAdapter, FrameSink, MjpegWriter, StreamScheduler,
};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = RedactConfig::load()?;
    log::info!(
        "redactd {} starting: backend={} threshold={:.2} skip={} policy={}",
        env!("CARGO_PKG_VERSION"),
        config.detection.backend,
        config.detection.confidence_threshold,
        config.stream.frame_skip,
        config.stream.failure_policy
    );

    let registry = registry_from_settings(&config.detection)?;
    registry.warm_up_default()?;
    let backend = registry
        .default_backend()
        .ok_or_else(|| anyhow!("no detector backend registered"))?;
    let mut adapter = DetectionAdapter::spawn(
        backend,
        config.detection.confidence_threshold,
        config.detection.timeout,
    )?;

    let hub = CaptureHub::new(source_from_settings(&config.capture)?);
    let lease = hub.acquire()?;

    let mut sink: Box<dyn FrameSink> = if config.output.is_stdout() {
        Box::new(MjpegWriter::new(
            BufWriter::new(io::stdout().lock()),
            config.output.jpeg_quality,
        ))
    } else {
        let file = File::create(&config.output.path)
            .with_context(|| format!("create output {}", config.output.path))?;
        Box::new(MjpegWriter::new(
            BufWriter::new(file),
            config.output.jpeg_quality,
        ))
    };
    log::info!(
        "writing {} to {}",
        MjpegWriter::<io::Sink>::CONTENT_TYPE,
        config.output.path
    );

    let cancel = CancelToken::new();
    let handler_token = cancel.clone();
    ctrlc::set_handler(move || {
        handler_token.cancel();
    })
    .context("error setting Ctrl-C handler")?;

    let mut scheduler = StreamScheduler::new(config.stream.clone());
    let summary = scheduler.run(lease, &mut adapter, &mut *sink, &cancel)?;

    log::info!(
        "redactd finished: {}",
        serde_json::to_string(&summary).unwrap_or_else(|_| format!("{:?}", summary))
    );
    Ok(())
}
