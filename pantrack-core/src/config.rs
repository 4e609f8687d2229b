// Configuration for the pantrack pipeline

use crate::types::{CameraId, ClassId};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

/// One physical camera slot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraConfig {
    pub camera_id: CameraId,
    /// Device identity handed to the frame source opener
    pub device: String,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
}

fn default_width() -> u32 {
    640
}

fn default_height() -> u32 {
    480
}

impl CameraConfig {
    pub fn new(camera_id: u32, device: impl Into<String>) -> Self {
        Self {
            camera_id: CameraId(camera_id),
            device: device.into(),
            width: default_width(),
            height: default_height(),
        }
    }

    /// Sentinel position reported when nothing qualifies
    pub fn center(&self) -> (i32, i32) {
        ((self.width / 2) as i32, (self.height / 2) as i32)
    }
}

/// Capture loop pacing and capability timeouts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub max_fps: u32,
    pub read_timeout_ms: u64,
    pub detect_timeout_ms: u64,
    pub retry_delay_ms: u64,
    /// Consecutive read failures before the device handle is reopened
    pub reopen_after_failures: u32,
    /// Root directory for the directory-backed frame source
    pub frames_root: String,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            max_fps: 15,
            read_timeout_ms: 2000,
            detect_timeout_ms: 2000,
            retry_delay_ms: 100,
            reopen_after_failures: 5,
            frames_root: "./frames".to_string(),
        }
    }
}

impl CaptureConfig {
    pub fn frame_period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.max_fps.max(1) as f64)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn detect_timeout(&self) -> Duration {
        Duration::from_millis(self.detect_timeout_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

/// Whether a class steers the actuator or is only drawn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassRole {
    Target,
    Other,
}

/// Per-class acceptance rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassRule {
    pub class_id: ClassId,
    pub name: String,
    pub min_confidence: f32,
    pub role: ClassRole,
    /// Lower value wins when several target classes are present
    #[serde(default)]
    pub priority: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    pub classes: Vec<ClassRule>,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            classes: vec![ClassRule {
                class_id: ClassId(0),
                name: "person".to_string(),
                min_confidence: 0.5,
                role: ClassRole::Target,
                priority: 0,
            }],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Minimum spacing between two dispatches of the same camera
    pub min_interval_ms: u64,
    /// Pixel distance under which a new target does not re-trigger a move
    pub deadband_px: u32,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            min_interval_ms: 1000,
            deadband_px: 10,
        }
    }
}

impl DispatchConfig {
    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub max_records: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { max_records: 1000 }
    }
}

/// How the second waypoint of a move is derived from the first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecondWaypoint {
    /// Same channel, negated angle
    Mirror,
    /// Repeat the first waypoint
    Hold,
    /// Fixed angle
    Home(i32),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandConfig {
    pub channel: u8,
    pub speed: u32,
    /// Pixel width that maps onto `min_angle..=max_angle`
    pub frame_width: u32,
    pub min_angle: i32,
    pub max_angle: i32,
    pub second_waypoint: SecondWaypoint,
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            channel: 7,
            speed: 100,
            frame_width: 640,
            min_angle: -90,
            max_angle: 90,
            second_waypoint: SecondWaypoint::Mirror,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActuationConfig {
    /// Hard capacity of the pending-request queue; the oldest entry is dropped past it
    pub queue_capacity: usize,
    pub command: CommandConfig,
}

impl Default for ActuationConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 64,
            command: CommandConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    pub port: String,
    pub baud_rate: u32,
    pub timeout_ms: u64,
    /// Wait after opening; boards that reset on DTR need ~2s
    pub settle_ms: u64,
    pub inter_command_delay_ms: u64,
    pub terminator: String,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB0".to_string(),
            baud_rate: 115_200,
            timeout_ms: 1000,
            settle_ms: 2000,
            inter_command_delay_ms: 0,
            terminator: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Complete pipeline configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub cameras: Vec<CameraConfig>,
    pub capture: CaptureConfig,
    pub detection: DetectionConfig,
    pub dispatch: DispatchConfig,
    pub storage: StorageConfig,
    pub actuation: ActuationConfig,
    pub serial: SerialConfig,
    pub logging: LoggingConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            cameras: vec![CameraConfig::new(1, "0"), CameraConfig::new(2, "0")],
            capture: CaptureConfig::default(),
            detection: DetectionConfig::default(),
            dispatch: DispatchConfig::default(),
            storage: StorageConfig::default(),
            actuation: ActuationConfig::default(),
            serial: SerialConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Load configuration from a JSON, TOML or YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(format!("{}: {}", path.display(), e)))?;
        Self::from_str(&content)
    }

    /// Load configuration from string
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        if let Ok(config) = serde_json::from_str::<PipelineConfig>(content) {
            return Ok(config);
        }

        let toml_err = match toml::from_str::<PipelineConfig>(content) {
            Ok(config) => return Ok(config),
            Err(e) => e,
        };

        if let Ok(config) = serde_yaml::from_str::<PipelineConfig>(content) {
            return Ok(config);
        }

        Err(ConfigError::ParseError(format!(
            "not valid JSON, TOML or YAML (toml: {})",
            toml_err.message()
        )))
    }

    /// Defaults overlaid with `PANTRACK_*` environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    /// Overlay values from an arbitrary key lookup; unparsable values are ignored
    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(level) = lookup("PANTRACK_LOG_LEVEL") {
            self.logging.level = level;
        }

        if let Some(port) = lookup("PANTRACK_SERIAL_PORT") {
            self.serial.port = port;
        }

        if let Some(fps) = lookup("PANTRACK_MAX_FPS").and_then(|v| v.parse::<u32>().ok()) {
            self.capture.max_fps = fps;
        }

        if let Some(ms) = lookup("PANTRACK_DISPATCH_INTERVAL_MS").and_then(|v| v.parse::<u64>().ok()) {
            self.dispatch.min_interval_ms = ms;
        }
    }

    pub fn camera(&self, camera_id: CameraId) -> Option<&CameraConfig> {
        self.cameras.iter().find(|c| c.camera_id == camera_id)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capture.max_fps == 0 || self.capture.max_fps > 120 {
            return Err(ConfigError::ValidationError(
                "capture.max_fps must be between 1 and 120".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for camera in &self.cameras {
            if !seen.insert(camera.camera_id) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate camera_id {}",
                    camera.camera_id
                )));
            }
            if camera.width == 0 || camera.height == 0 {
                return Err(ConfigError::ValidationError(format!(
                    "camera {} resolution must be non-zero",
                    camera.camera_id
                )));
            }
        }

        if self.detection.classes.is_empty() {
            return Err(ConfigError::ValidationError(
                "detection.classes must contain at least one rule".to_string(),
            ));
        }
        for rule in &self.detection.classes {
            if !(0.0..=1.0).contains(&rule.min_confidence) {
                return Err(ConfigError::ValidationError(format!(
                    "class '{}' min_confidence must be between 0.0 and 1.0",
                    rule.name
                )));
            }
        }

        if self.storage.max_records == 0 {
            return Err(ConfigError::ValidationError(
                "storage.max_records must be > 0".to_string(),
            ));
        }

        if self.actuation.queue_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "actuation.queue_capacity must be > 0".to_string(),
            ));
        }

        let command = &self.actuation.command;
        if command.min_angle >= command.max_angle {
            return Err(ConfigError::ValidationError(
                "actuation.command.min_angle must be below max_angle".to_string(),
            ));
        }
        if command.frame_width == 0 {
            return Err(ConfigError::ValidationError(
                "actuation.command.frame_width must be > 0".to_string(),
            ));
        }

        if self.serial.baud_rate == 0 {
            return Err(ConfigError::ValidationError(
                "serial.baud_rate must be > 0".to_string(),
            ));
        }

        Ok(())
    }
}

#[derive(Debug)]
pub enum ConfigError {
    IoError(String),
    ParseError(String),
    ValidationError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {}", e),
            ConfigError::ParseError(e) => write!(f, "Parse error: {}", e),
            ConfigError::ValidationError(e) => write!(f, "Validation error: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}
