use std::sync::Mutex;
use std::time::Duration;

use tempfile::Builder;

use redaction_kernel::config::RedactConfig;
use redaction_kernel::FailurePolicy;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "REDACT_CONFIG",
        "REDACT_CONF_THRESHOLD",
        "REDACT_TRACK_WINDOW_MS",
        "REDACT_LOOKAHEAD_MS",
        "REDACT_FRAME_SKIP",
        "REDACT_FAILURE_POLICY",
        "REDACT_DETECTOR_BACKEND",
        "REDACT_DETECTOR_TIMEOUT_MS",
        "REDACT_MODEL_PATH",
        "REDACT_CAPTURE_SOURCE",
        "REDACT_OUTPUT",
        "REDACT_BLUR_SIGMA",
    ] {
        std::env::remove_var(key);
    }
}

fn write_config(suffix: &str, body: &str) -> tempfile::NamedTempFile {
    let mut file = Builder::new()
        .suffix(suffix)
        .tempfile()
        .expect("temp config");
    std::io::Write::write_all(&mut file, body.as_bytes()).expect("write config");
    file
}

#[test]
fn defaults_without_file_or_env() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = RedactConfig::load().expect("load defaults");

    assert_eq!(cfg.detection.backend, "stub");
    assert_eq!(cfg.detection.confidence_threshold, 0.5);
    assert_eq!(cfg.detection.timeout, Duration::from_millis(500));
    assert_eq!(cfg.stream.track_window, Duration::from_millis(500));
    assert_eq!(cfg.stream.lookahead, Duration::from_millis(200));
    assert_eq!(cfg.stream.frame_skip, 2);
    assert_eq!(cfg.stream.failure_policy, FailurePolicy::Blank);
    assert_eq!(cfg.stream.blur.kernel, 25);
    assert_eq!(cfg.stream.blur.sigma, 30.0);
    assert_eq!(cfg.capture.source, "stub://camera");
    assert_eq!((cfg.capture.width, cfg.capture.height), (640, 480));
    assert_eq!(cfg.capture.fps, 20);
    assert!(cfg.output.is_stdout());
    assert_eq!(cfg.output.jpeg_quality, 80);
}

#[test]
fn loads_json_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = write_config(
        ".json",
        r#"{
            "detection": { "confidence_threshold": 0.3, "timeout_ms": 250 },
            "stream": {
                "track_window_ms": 800,
                "frame_skip": 3,
                "failure_policy": "reuse-mask",
                "blur_kernel": 11
            },
            "capture": { "source": "stub://lobby", "width": 320, "height": 240, "max_frames": 90 },
            "output": { "path": "/tmp/lobby.mjpeg", "jpeg_quality": 70 }
        }"#,
    );

    std::env::set_var("REDACT_CONFIG", file.path());
    std::env::set_var("REDACT_FRAME_SKIP", "1");
    std::env::set_var("REDACT_FAILURE_POLICY", "drop");
    std::env::set_var("REDACT_LOOKAHEAD_MS", "100");

    let cfg = RedactConfig::load().expect("load config");

    assert_eq!(cfg.detection.confidence_threshold, 0.3);
    assert_eq!(cfg.detection.timeout, Duration::from_millis(250));
    assert_eq!(cfg.stream.track_window, Duration::from_millis(800));
    assert_eq!(cfg.stream.lookahead, Duration::from_millis(100));
    assert_eq!(cfg.stream.frame_skip, 1);
    assert_eq!(cfg.stream.failure_policy, FailurePolicy::Drop);
    assert_eq!(cfg.stream.blur.kernel, 11);
    assert_eq!(cfg.capture.source, "stub://lobby");
    assert_eq!(cfg.capture.max_frames, Some(90));
    assert_eq!(cfg.output.path, "/tmp/lobby.mjpeg");
    assert_eq!(cfg.output.jpeg_quality, 70);

    clear_env();
}

#[test]
fn loads_toml_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = write_config(
        ".toml",
        r#"
[detection]
backend = "stub"
confidence_threshold = 0.65

[stream]
blur_sigma = 12.5
target_fps = 15

[capture]
fps = 30
"#,
    );
    std::env::set_var("REDACT_CONFIG", file.path());

    let cfg = RedactConfig::load().expect("load toml config");

    assert_eq!(cfg.detection.confidence_threshold, 0.65);
    assert_eq!(cfg.stream.blur.sigma, 12.5);
    assert_eq!(cfg.stream.target_fps, 15);
    assert_eq!(cfg.capture.fps, 30);

    clear_env();
}

#[test]
fn rejects_out_of_range_values() {
    let _guard = ENV_LOCK.lock().unwrap();

    for (key, value) in [
        ("REDACT_CONF_THRESHOLD", "1.5"),
        ("REDACT_FRAME_SKIP", "0"),
        ("REDACT_TRACK_WINDOW_MS", "0"),
        ("REDACT_BLUR_SIGMA", "-1"),
        ("REDACT_FAILURE_POLICY", "passthrough"),
        ("REDACT_DETECTOR_TIMEOUT_MS", "soon"),
    ] {
        clear_env();
        std::env::set_var(key, value);
        assert!(RedactConfig::load().is_err(), "{key}={value} should be rejected");
    }

    clear_env();
}

#[test]
fn rejects_unreadable_config_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = write_config(".json", "{ not json");
    std::env::set_var("REDACT_CONFIG", file.path());
    assert!(RedactConfig::load().is_err());

    std::env::set_var("REDACT_CONFIG", "/nonexistent/redact.json");
    assert!(RedactConfig::load().is_err());

    clear_env();
}
