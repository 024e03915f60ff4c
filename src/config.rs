use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::clip::DEFAULT_OUTPUT_DIR;
use crate::detect::DEFAULT_TARGET_LABEL;
use crate::ingest::CameraConfig;
use crate::state::{
    validate_recording_duration, validate_volume, Settings, DEFAULT_POLL_INTERVAL,
    DEFAULT_RECORDING_DURATION, DEFAULT_VOLUME,
};

const DEFAULT_CAMERA_URL: &str = "stub://front_camera";
const DEFAULT_CAMERA_FPS: u32 = 10;
const DEFAULT_CAMERA_WIDTH: u32 = 640;
const DEFAULT_CAMERA_HEIGHT: u32 = 480;

#[derive(Debug, Deserialize, Default)]
struct MonitorConfigFile {
    output_dir: Option<PathBuf>,
    camera: Option<CameraConfigFile>,
    detector: Option<DetectorConfigFile>,
    recording: Option<RecordingConfigFile>,
    display: Option<DisplayConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    url: Option<String>,
    target_fps: Option<u32>,
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectorConfigFile {
    backend: Option<String>,
    model_path: Option<PathBuf>,
    target_label: Option<String>,
    poll_interval_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct RecordingConfigFile {
    auto_record: Option<bool>,
    duration_secs: Option<u64>,
    volume: Option<f32>,
    beep_on_auto: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
struct DisplayConfigFile {
    mirrored: Option<bool>,
}

/// Daemon configuration: file (optional), then environment overrides.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub output_dir: PathBuf,
    pub camera: CameraConfig,
    pub detector: DetectorSettings,
    pub settings: Settings,
}

#[derive(Debug, Clone)]
pub struct DetectorSettings {
    /// Registered backend name; `None` selects the registry default.
    pub backend: Option<String>,
    pub model_path: Option<PathBuf>,
}

impl MonitorConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("WATCHPOST_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: MonitorConfigFile) -> Self {
        let camera = file.camera.unwrap_or_default();
        let detector = file.detector.unwrap_or_default();
        let recording = file.recording.unwrap_or_default();
        let display = file.display.unwrap_or_default();
        let defaults = Settings::default();

        Self {
            output_dir: file
                .output_dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR)),
            camera: CameraConfig {
                url: camera.url.unwrap_or_else(|| DEFAULT_CAMERA_URL.to_string()),
                target_fps: camera.target_fps.unwrap_or(DEFAULT_CAMERA_FPS),
                width: camera.width.unwrap_or(DEFAULT_CAMERA_WIDTH),
                height: camera.height.unwrap_or(DEFAULT_CAMERA_HEIGHT),
            },
            detector: DetectorSettings {
                backend: detector.backend,
                model_path: detector.model_path,
            },
            settings: Settings {
                mirrored: display.mirrored.unwrap_or(defaults.mirrored),
                auto_record: recording.auto_record.unwrap_or(defaults.auto_record),
                volume: recording.volume.unwrap_or(DEFAULT_VOLUME),
                recording_duration: recording
                    .duration_secs
                    .map(Duration::from_secs)
                    .unwrap_or(DEFAULT_RECORDING_DURATION),
                beep_on_auto: recording.beep_on_auto.unwrap_or(defaults.beep_on_auto),
                target_label: detector
                    .target_label
                    .unwrap_or_else(|| DEFAULT_TARGET_LABEL.to_string()),
                poll_interval: detector
                    .poll_interval_ms
                    .map(Duration::from_millis)
                    .unwrap_or(DEFAULT_POLL_INTERVAL),
            },
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(url) = std::env::var("WATCHPOST_CAMERA_URL") {
            if !url.trim().is_empty() {
                self.camera.url = url;
            }
        }
        if let Ok(dir) = std::env::var("WATCHPOST_OUTPUT_DIR") {
            if !dir.trim().is_empty() {
                self.output_dir = PathBuf::from(dir);
            }
        }
        if let Ok(backend) = std::env::var("WATCHPOST_DETECTOR") {
            if !backend.trim().is_empty() {
                self.detector.backend = Some(backend.trim().to_string());
            }
        }
        if let Ok(value) = std::env::var("WATCHPOST_AUTO_RECORD") {
            self.settings.auto_record = parse_bool(&value)
                .ok_or_else(|| anyhow!("WATCHPOST_AUTO_RECORD must be true or false"))?;
        }
        if let Ok(value) = std::env::var("WATCHPOST_RECORDING_SECS") {
            let seconds: u64 = value.trim().parse().map_err(|_| {
                anyhow!("WATCHPOST_RECORDING_SECS must be an integer number of seconds")
            })?;
            self.settings.recording_duration = Duration::from_secs(seconds);
        }
        if let Ok(value) = std::env::var("WATCHPOST_VOLUME") {
            self.settings.volume = value
                .trim()
                .parse()
                .map_err(|_| anyhow!("WATCHPOST_VOLUME must be a number in [0, 1]"))?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        validate_volume(self.settings.volume)?;
        validate_recording_duration(self.settings.recording_duration)?;
        self.settings.validate()?;
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(anyhow!("camera width and height must be greater than zero"));
        }
        if self.camera.target_fps == 0 {
            return Err(anyhow!("camera target_fps must be greater than zero"));
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<MonitorConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
