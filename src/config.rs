use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cue::default_cue_map;
use crate::detect::OracleLimits;
use crate::ingest::CameraConfig;
use crate::overlay::flat::{parse_hex_color, FlatStyle};
use crate::overlay::spatial::SpatialParams;

const DEFAULT_CAMERA_URL: &str = "stub://environment";
const DEFAULT_CAMERA_WIDTH: u32 = 640;
const DEFAULT_CAMERA_HEIGHT: u32 = 480;
const DEFAULT_WARMUP_FRAMES: u32 = 3;
const DEFAULT_DETECTOR: &str = "stub";
const DEFAULT_MIN_SCORE: f32 = 0.5;
const DEFAULT_MAX_DETECTIONS: usize = 20;
const DEFAULT_TICK_MS: u64 = 16;
const DEFAULT_STROKE: &str = "#00ff99";
const DEFAULT_LABEL_COLOR: &str = "#00ffcc";
const DEFAULT_LINE_WIDTH: u32 = 3;
const MAX_LINE_WIDTH: u32 = 64;
const DEFAULT_MOUNT_DELAY_MS: u64 = 250;
const DEFAULT_CUE_VOLUME: f32 = 0.4;

#[derive(Debug, Deserialize, Default)]
struct OverlayConfigFile {
    tick_ms: Option<u64>,
    camera: Option<CameraConfigFile>,
    detector: Option<DetectorConfigFile>,
    flat: Option<FlatConfigFile>,
    spatial: Option<SpatialConfigFile>,
    cues: Option<CueConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    url: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    warmup_frames: Option<u32>,
    rotate_every: Option<u64>,
    noise_seed: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectorConfigFile {
    backend: Option<String>,
    model_path: Option<PathBuf>,
    min_score: Option<f32>,
    max_detections: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct FlatConfigFile {
    stroke: Option<String>,
    label_color: Option<String>,
    line_width: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct SpatialConfigFile {
    scale_x: Option<f32>,
    scale_y: Option<f32>,
    depth: Option<f32>,
    mount_delay_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct CueConfigFile {
    enabled: Option<bool>,
    narrate: Option<bool>,
    volume: Option<f32>,
    sounds: Option<HashMap<String, PathBuf>>,
}

/// Resolved runtime configuration for the overlay pipeline.
#[derive(Debug, Clone)]
pub struct OverlayConfig {
    pub camera: CameraConfig,
    pub detector: DetectorSettings,
    pub tick: Duration,
    pub flat: FlatSettings,
    pub spatial: SpatialParams,
    pub mount_delay: Duration,
    pub cues: CueSettings,
}

#[derive(Debug, Clone)]
pub struct DetectorSettings {
    pub backend: String,
    pub model_path: Option<PathBuf>,
    pub limits: OracleLimits,
}

/// Flat overlay colors as written in configuration (`#rrggbb[aa]`).
#[derive(Debug, Clone)]
pub struct FlatSettings {
    pub stroke: String,
    pub label_color: String,
    pub line_width: u32,
}

impl FlatSettings {
    pub fn style(&self) -> Result<FlatStyle> {
        Ok(FlatStyle {
            stroke: parse_hex_color(&self.stroke)?,
            label_color: parse_hex_color(&self.label_color)?,
            line_width: self.line_width,
        })
    }
}

#[derive(Debug, Clone)]
pub struct CueSettings {
    pub enabled: bool,
    pub narrate: bool,
    pub volume: f32,
    pub sounds: HashMap<String, PathBuf>,
}

impl OverlayConfig {
    /// Defaults, then the file named by `HOLO_CONFIG`, then `HOLO_*` overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("HOLO_CONFIG").ok();
        Self::load_from(config_path.as_deref().map(Path::new))
    }

    /// Like [`OverlayConfig::load`] with an explicit file (e.g. from `--config`).
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => Some(read_config_file(path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: OverlayConfigFile) -> Self {
        let camera_file = file.camera.unwrap_or_default();
        let camera = CameraConfig {
            url: camera_file
                .url
                .unwrap_or_else(|| DEFAULT_CAMERA_URL.to_string()),
            width: camera_file.width.unwrap_or(DEFAULT_CAMERA_WIDTH),
            height: camera_file.height.unwrap_or(DEFAULT_CAMERA_HEIGHT),
            warmup_frames: camera_file.warmup_frames.unwrap_or(DEFAULT_WARMUP_FRAMES),
            rotate_every: camera_file.rotate_every.unwrap_or(0),
            noise_seed: camera_file.noise_seed,
        };

        let detector_file = file.detector.unwrap_or_default();
        let detector = DetectorSettings {
            backend: detector_file
                .backend
                .unwrap_or_else(|| DEFAULT_DETECTOR.to_string()),
            model_path: detector_file.model_path,
            limits: OracleLimits {
                min_score: detector_file.min_score.unwrap_or(DEFAULT_MIN_SCORE),
                max_detections: detector_file
                    .max_detections
                    .unwrap_or(DEFAULT_MAX_DETECTIONS),
            },
        };

        let flat_file = file.flat.unwrap_or_default();
        let flat = FlatSettings {
            stroke: flat_file
                .stroke
                .unwrap_or_else(|| DEFAULT_STROKE.to_string()),
            label_color: flat_file
                .label_color
                .unwrap_or_else(|| DEFAULT_LABEL_COLOR.to_string()),
            line_width: flat_file.line_width.unwrap_or(DEFAULT_LINE_WIDTH),
        };

        let spatial_file = file.spatial.unwrap_or_default();
        let defaults = SpatialParams::default();
        let spatial = SpatialParams {
            scale_x: spatial_file.scale_x.unwrap_or(defaults.scale_x),
            scale_y: spatial_file.scale_y.unwrap_or(defaults.scale_y),
            depth: spatial_file.depth.unwrap_or(defaults.depth),
        };
        let mount_delay = Duration::from_millis(
            spatial_file
                .mount_delay_ms
                .unwrap_or(DEFAULT_MOUNT_DELAY_MS),
        );

        let cue_file = file.cues.unwrap_or_default();
        let cues = CueSettings {
            enabled: cue_file.enabled.unwrap_or(true),
            narrate: cue_file.narrate.unwrap_or(false),
            volume: cue_file.volume.unwrap_or(DEFAULT_CUE_VOLUME),
            sounds: cue_file.sounds.unwrap_or_else(default_cue_map),
        };

        Self {
            camera,
            detector,
            tick: Duration::from_millis(file.tick_ms.unwrap_or(DEFAULT_TICK_MS)),
            flat,
            spatial,
            mount_delay,
            cues,
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(url) = std::env::var("HOLO_CAMERA_URL") {
            if !url.trim().is_empty() {
                self.camera.url = url;
            }
        }
        if let Ok(backend) = std::env::var("HOLO_DETECTOR") {
            if !backend.trim().is_empty() {
                self.detector.backend = backend.trim().to_string();
            }
        }
        if let Ok(path) = std::env::var("HOLO_MODEL_PATH") {
            if !path.trim().is_empty() {
                self.detector.model_path = Some(PathBuf::from(path));
            }
        }
        if let Ok(tick) = std::env::var("HOLO_TICK_MS") {
            let ms: u64 = tick
                .parse()
                .map_err(|_| anyhow!("HOLO_TICK_MS must be an integer number of milliseconds"))?;
            self.tick = Duration::from_millis(ms);
        }
        if let Ok(score) = std::env::var("HOLO_MIN_SCORE") {
            self.detector.limits.min_score = score
                .parse()
                .map_err(|_| anyhow!("HOLO_MIN_SCORE must be a number between 0 and 1"))?;
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(anyhow!("camera width and height must be greater than zero"));
        }
        if self.tick.is_zero() {
            return Err(anyhow!("tick must be greater than zero"));
        }
        let min_score = self.detector.limits.min_score;
        if !(0.0..=1.0).contains(&min_score) {
            return Err(anyhow!("min_score must be within [0, 1], got {}", min_score));
        }
        if self.detector.limits.max_detections == 0 {
            return Err(anyhow!("max_detections must be greater than zero"));
        }
        if self.detector.backend == "tract" && self.detector.model_path.is_none() {
            return Err(anyhow!("detector backend 'tract' requires model_path"));
        }
        if self.flat.line_width == 0 || self.flat.line_width > MAX_LINE_WIDTH {
            return Err(anyhow!(
                "flat.line_width must be within [1, {}], got {}",
                MAX_LINE_WIDTH,
                self.flat.line_width
            ));
        }
        self.flat.style()?;
        for (name, value) in [
            ("spatial.scale_x", self.spatial.scale_x),
            ("spatial.scale_y", self.spatial.scale_y),
            ("spatial.depth", self.spatial.depth),
        ] {
            if !value.is_finite() {
                return Err(anyhow!("{} must be finite", name));
            }
        }
        self.cues.volume = self.cues.volume.clamp(0.0, 1.0);
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<OverlayConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path.extension().and_then(|ext| ext.to_str()) == Some("toml");
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let cfg = OverlayConfig::from_file(OverlayConfigFile::default());
        assert_eq!(cfg.camera.url, DEFAULT_CAMERA_URL);
        assert_eq!(cfg.tick, Duration::from_millis(16));
        assert_eq!(cfg.detector.limits, OracleLimits::default());
        assert_eq!(cfg.spatial, SpatialParams::default());
        assert_eq!(cfg.flat.style().unwrap(), FlatStyle::default());
        assert_eq!(cfg.cues.sounds.len(), 3);
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut cfg = OverlayConfig::from_file(OverlayConfigFile::default());
        cfg.detector.limits.min_score = 1.5;
        assert!(cfg.validate().is_err());

        let mut cfg = OverlayConfig::from_file(OverlayConfigFile::default());
        cfg.flat.stroke = "green".to_string();
        assert!(cfg.validate().is_err());

        let mut cfg = OverlayConfig::from_file(OverlayConfigFile::default());
        cfg.tick = Duration::ZERO;
        assert!(cfg.validate().is_err());

        let mut cfg = OverlayConfig::from_file(OverlayConfigFile::default());
        cfg.flat.line_width = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = OverlayConfig::from_file(OverlayConfigFile::default());
        cfg.flat.line_width = MAX_LINE_WIDTH + 1;
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("line_width"));

        let mut cfg = OverlayConfig::from_file(OverlayConfigFile::default());
        cfg.flat.line_width = MAX_LINE_WIDTH;
        assert!(cfg.validate().is_ok());

        let mut cfg = OverlayConfig::from_file(OverlayConfigFile::default());
        cfg.cues.volume = 3.0;
        cfg.validate().unwrap();
        assert_eq!(cfg.cues.volume, 1.0);
    }
}
