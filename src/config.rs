use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::compositor::BlurSettings;
use crate::scheduler::{FailurePolicy, StreamSettings};
use crate::sink::DEFAULT_JPEG_QUALITY;

const DEFAULT_CONF_THRESHOLD: f32 = 0.5;
const DEFAULT_TRACK_WINDOW_MS: u64 = 500;
const DEFAULT_LOOKAHEAD_MS: u64 = 200;
const DEFAULT_FRAME_SKIP: u32 = 2;
const DEFAULT_BACKEND: &str = "stub";
const DEFAULT_DETECTOR_TIMEOUT_MS: u64 = 500;
const DEFAULT_MODEL_INPUT_SIZE: u32 = 640;
const DEFAULT_CAPTURE_SOURCE: &str = "stub://camera";
const DEFAULT_CAPTURE_WIDTH: u32 = 640;
const DEFAULT_CAPTURE_HEIGHT: u32 = 480;
const DEFAULT_CAPTURE_FPS: u32 = 20;
const DEFAULT_OUTPUT: &str = "-";

#[derive(Debug, Deserialize, Default)]
struct RedactConfigFile {
    detection: Option<DetectionConfigFile>,
    stream: Option<StreamConfigFile>,
    capture: Option<CaptureConfigFile>,
    output: Option<OutputConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectionConfigFile {
    backend: Option<String>,
    model_path: Option<PathBuf>,
    model_input_size: Option<u32>,
    confidence_threshold: Option<f32>,
    timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct StreamConfigFile {
    track_window_ms: Option<u64>,
    lookahead_ms: Option<u64>,
    frame_skip: Option<u32>,
    failure_policy: Option<FailurePolicy>,
    blur_kernel: Option<u32>,
    blur_sigma: Option<f32>,
    target_fps: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct CaptureConfigFile {
    source: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    fps: Option<u32>,
    max_frames: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct OutputConfigFile {
    path: Option<String>,
    jpeg_quality: Option<u8>,
}

/// Operator configuration for `redactd`.
#[derive(Debug, Clone, Default)]
pub struct RedactConfig {
    pub detection: DetectionSettings,
    pub stream: StreamSettings,
    pub capture: CaptureSettings,
    pub output: OutputSettings,
}

#[derive(Debug, Clone)]
pub struct DetectionSettings {
    /// Registered backend name ("stub", "tract").
    pub backend: String,
    pub model_path: Option<PathBuf>,
    pub model_input_size: u32,
    pub confidence_threshold: f32,
    pub timeout: Duration,
}

impl Default for DetectionSettings {
    fn default() -> Self {
        Self {
            backend: DEFAULT_BACKEND.to_string(),
            model_path: None,
            model_input_size: DEFAULT_MODEL_INPUT_SIZE,
            confidence_threshold: DEFAULT_CONF_THRESHOLD,
            timeout: Duration::from_millis(DEFAULT_DETECTOR_TIMEOUT_MS),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CaptureSettings {
    /// `stub://name` or a V4L2 device path.
    pub source: String,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub max_frames: Option<u64>,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            source: DEFAULT_CAPTURE_SOURCE.to_string(),
            width: DEFAULT_CAPTURE_WIDTH,
            height: DEFAULT_CAPTURE_HEIGHT,
            fps: DEFAULT_CAPTURE_FPS,
            max_frames: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct OutputSettings {
    /// MJPEG destination; "-" is stdout.
    pub path: String,
    pub jpeg_quality: u8,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            path: DEFAULT_OUTPUT.to_string(),
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

impl OutputSettings {
    pub fn is_stdout(&self) -> bool {
        self.path == "-"
    }
}

impl RedactConfig {
    /// Defaults, then the file named by `REDACT_CONFIG`, then `REDACT_*` overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("REDACT_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: RedactConfigFile) -> Self {
        let detection = file.detection.unwrap_or_default();
        let stream = file.stream.unwrap_or_default();
        let capture = file.capture.unwrap_or_default();
        let output = file.output.unwrap_or_default();

        let blur_defaults = BlurSettings::default();
        Self {
            detection: DetectionSettings {
                backend: detection
                    .backend
                    .unwrap_or_else(|| DEFAULT_BACKEND.to_string()),
                model_path: detection.model_path,
                model_input_size: detection
                    .model_input_size
                    .unwrap_or(DEFAULT_MODEL_INPUT_SIZE),
                confidence_threshold: detection
                    .confidence_threshold
                    .unwrap_or(DEFAULT_CONF_THRESHOLD),
                timeout: Duration::from_millis(
                    detection.timeout_ms.unwrap_or(DEFAULT_DETECTOR_TIMEOUT_MS),
                ),
            },
            stream: StreamSettings {
                track_window: Duration::from_millis(
                    stream.track_window_ms.unwrap_or(DEFAULT_TRACK_WINDOW_MS),
                ),
                lookahead: Duration::from_millis(
                    stream.lookahead_ms.unwrap_or(DEFAULT_LOOKAHEAD_MS),
                ),
                frame_skip: stream.frame_skip.unwrap_or(DEFAULT_FRAME_SKIP),
                failure_policy: stream.failure_policy.unwrap_or_default(),
                blur: BlurSettings {
                    kernel: stream.blur_kernel.unwrap_or(blur_defaults.kernel),
                    sigma: stream.blur_sigma.unwrap_or(blur_defaults.sigma),
                },
                target_fps: stream.target_fps.unwrap_or(0),
            },
            capture: CaptureSettings {
                source: capture
                    .source
                    .unwrap_or_else(|| DEFAULT_CAPTURE_SOURCE.to_string()),
                width: capture.width.unwrap_or(DEFAULT_CAPTURE_WIDTH),
                height: capture.height.unwrap_or(DEFAULT_CAPTURE_HEIGHT),
                fps: capture.fps.unwrap_or(DEFAULT_CAPTURE_FPS),
                max_frames: capture.max_frames,
            },
            output: OutputSettings {
                path: output.path.unwrap_or_else(|| DEFAULT_OUTPUT.to_string()),
                jpeg_quality: output.jpeg_quality.unwrap_or(DEFAULT_JPEG_QUALITY),
            },
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(threshold) = env_parse::<f32>("REDACT_CONF_THRESHOLD")? {
            self.detection.confidence_threshold = threshold;
        }
        if let Some(ms) = env_parse::<u64>("REDACT_TRACK_WINDOW_MS")? {
            self.stream.track_window = Duration::from_millis(ms);
        }
        if let Some(ms) = env_parse::<u64>("REDACT_LOOKAHEAD_MS")? {
            self.stream.lookahead = Duration::from_millis(ms);
        }
        if let Some(skip) = env_parse::<u32>("REDACT_FRAME_SKIP")? {
            self.stream.frame_skip = skip;
        }
        if let Some(policy) = env_parse::<FailurePolicy>("REDACT_FAILURE_POLICY")? {
            self.stream.failure_policy = policy;
        }
        if let Some(sigma) = env_parse::<f32>("REDACT_BLUR_SIGMA")? {
            self.stream.blur.sigma = sigma;
        }
        if let Some(backend) = env_string("REDACT_DETECTOR_BACKEND") {
            self.detection.backend = backend;
        }
        if let Some(ms) = env_parse::<u64>("REDACT_DETECTOR_TIMEOUT_MS")? {
            self.detection.timeout = Duration::from_millis(ms);
        }
        if let Some(path) = env_string("REDACT_MODEL_PATH") {
            self.detection.model_path = Some(PathBuf::from(path));
        }
        if let Some(source) = env_string("REDACT_CAPTURE_SOURCE") {
            self.capture.source = source;
        }
        if let Some(path) = env_string("REDACT_OUTPUT") {
            self.output.path = path;
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        let threshold = self.detection.confidence_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(anyhow!(
                "confidence threshold must be within [0, 1], got {}",
                threshold
            ));
        }
        if self.detection.timeout.is_zero() {
            return Err(anyhow!("detector timeout must be greater than zero"));
        }
        if self.stream.track_window.is_zero() {
            return Err(anyhow!("track window must be greater than zero"));
        }
        if self.stream.frame_skip == 0 {
            return Err(anyhow!("frame skip must be at least 1"));
        }
        if self.stream.blur.kernel == 0 {
            return Err(anyhow!("blur kernel must be greater than zero"));
        }
        if !(self.stream.blur.sigma > 0.0 && self.stream.blur.sigma.is_finite()) {
            return Err(anyhow!("blur sigma must be a positive number"));
        }
        if !(1..=100).contains(&self.output.jpeg_quality) {
            return Err(anyhow!("jpeg quality must be within 1..=100"));
        }
        if self.capture.width == 0 || self.capture.height == 0 {
            return Err(anyhow!("capture size must be non-zero"));
        }
        if self.capture.fps == 0 {
            return Err(anyhow!("capture fps must be greater than zero"));
        }
        self.detection.backend = self.detection.backend.trim().to_lowercase();
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<RedactConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("toml"))
        .unwrap_or(false);
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn env_parse<T: FromStr>(key: &str) -> Result<Option<T>> {
    match env_string(key) {
        Some(value) => value
            .parse()
            .map(Some)
            .map_err(|_| anyhow!("{} has an invalid value '{}'", key, value)),
        None => Ok(None),
    }
}
