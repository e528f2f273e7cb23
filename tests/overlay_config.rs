use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use tempfile::{Builder, NamedTempFile};

use holoaid_overlay::config::OverlayConfig;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "HOLO_CONFIG",
        "HOLO_CAMERA_URL",
        "HOLO_DETECTOR",
        "HOLO_MODEL_PATH",
        "HOLO_TICK_MS",
        "HOLO_MIN_SCORE",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn loads_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let json = r##"{
        "tick_ms": 33,
        "camera": {
            "url": "stub://front",
            "width": 800,
            "height": 600,
            "rotate_every": 90
        },
        "detector": {
            "backend": "stub",
            "min_score": 0.6,
            "max_detections": 5
        },
        "flat": {
            "stroke": "#ff0000",
            "line_width": 2
        },
        "spatial": {
            "scale_x": 3.0,
            "mount_delay_ms": 40
        },
        "cues": {
            "narrate": true,
            "sounds": { "cat": "/sounds/cat.mp3" }
        }
    }"##;
    file.write_all(json.as_bytes()).expect("write config");

    std::env::set_var("HOLO_CONFIG", file.path());
    std::env::set_var("HOLO_CAMERA_URL", "stub://rear");
    std::env::set_var("HOLO_MIN_SCORE", "0.75");

    let cfg = OverlayConfig::load().expect("load config");

    assert_eq!(cfg.camera.url, "stub://rear");
    assert_eq!(cfg.camera.width, 800);
    assert_eq!(cfg.camera.height, 600);
    assert_eq!(cfg.camera.rotate_every, 90);
    assert_eq!(cfg.tick, Duration::from_millis(33));
    assert_eq!(cfg.detector.backend, "stub");
    assert_eq!(cfg.detector.limits.min_score, 0.75);
    assert_eq!(cfg.detector.limits.max_detections, 5);
    assert_eq!(cfg.flat.stroke, "#ff0000");
    assert_eq!(cfg.flat.label_color, "#00ffcc");
    assert_eq!(cfg.flat.style().unwrap().line_width, 2);
    assert_eq!(cfg.spatial.scale_x, 3.0);
    assert_eq!(cfg.spatial.scale_y, 1.8);
    assert_eq!(cfg.spatial.depth, -2.5);
    assert_eq!(cfg.mount_delay, Duration::from_millis(40));
    assert!(cfg.cues.enabled);
    assert!(cfg.cues.narrate);
    assert_eq!(
        cfg.cues.sounds.get("cat"),
        Some(&PathBuf::from("/sounds/cat.mp3"))
    );
    assert!(cfg.cues.sounds.get("person").is_none());

    clear_env();
}

#[test]
fn toml_extension_selects_toml_parser() {
    let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    clear_env();

    let mut file = Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("temp config");
    let toml = r##"
tick_ms = 20

[camera]
url = "stub://environment"
width = 320
height = 240

[spatial]
depth = -4.0
"##;
    file.write_all(toml.as_bytes()).expect("write config");

    let cfg = OverlayConfig::load_from(Some(file.path())).expect("load config");
    assert_eq!(cfg.tick, Duration::from_millis(20));
    assert_eq!(cfg.camera.width, 320);
    assert_eq!(cfg.spatial.depth, -4.0);
    assert_eq!(cfg.detector.backend, "stub");

    clear_env();
}

#[test]
fn defaults_apply_without_config_file() {
    let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    clear_env();

    let cfg = OverlayConfig::load().expect("load defaults");
    assert_eq!(cfg.camera.url, "stub://environment");
    assert_eq!(cfg.camera.width, 640);
    assert_eq!(cfg.camera.height, 480);
    assert_eq!(cfg.tick, Duration::from_millis(16));
    assert_eq!(cfg.detector.limits.min_score, 0.5);
    assert_eq!(cfg.detector.limits.max_detections, 20);
    assert!((cfg.cues.volume - 0.4).abs() < f32::EPSILON);
    assert_eq!(cfg.cues.sounds.len(), 3);
}

#[test]
fn rejects_invalid_overrides() {
    let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    clear_env();

    std::env::set_var("HOLO_TICK_MS", "fast");
    let err = OverlayConfig::load().expect_err("tick must be numeric");
    assert!(err.to_string().contains("HOLO_TICK_MS"));
    clear_env();

    std::env::set_var("HOLO_TICK_MS", "0");
    assert!(OverlayConfig::load().is_err());
    clear_env();

    std::env::set_var("HOLO_MIN_SCORE", "1.5");
    let err = OverlayConfig::load().expect_err("score out of range");
    assert!(err.to_string().contains("min_score"));
    clear_env();

    std::env::set_var("HOLO_DETECTOR", "tract");
    let err = OverlayConfig::load().expect_err("tract needs a model");
    assert!(err.to_string().contains("model_path"));
    std::env::set_var("HOLO_MODEL_PATH", "/models/ssd.onnx");
    let cfg = OverlayConfig::load().expect("tract with model");
    assert_eq!(cfg.detector.backend, "tract");
    assert_eq!(
        cfg.detector.model_path,
        Some(PathBuf::from("/models/ssd.onnx"))
    );
    clear_env();
}

#[test]
fn malformed_file_names_the_path() {
    let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    file.write_all(b"{ not json").expect("write config");
    std::env::set_var("HOLO_CONFIG", file.path());

    let err = OverlayConfig::load().expect_err("invalid json");
    assert!(err
        .to_string()
        .contains(&file.path().display().to_string()));

    clear_env();
}

#[test]
fn huge_line_width_is_rejected() {
    let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    file.write_all(br#"{"flat":{"line_width":4294967295}}"#)
        .expect("write config");

    let err = OverlayConfig::load_from(Some(file.path())).expect_err("line width capped");
    assert!(err.to_string().contains("line_width"));

    clear_env();
}
