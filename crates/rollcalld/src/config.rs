use chrono::Weekday;
use rollcall_core::gate::DEFAULT_ACTIVE_DAYS;
use rollcall_core::{ActiveWindow, GateError};
use rollcall_notify::ApiSettings;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid active window: {0}")]
    Window(#[from] GateError),
    #[error("{0}")]
    Invalid(String),
}

/// Daemon configuration: defaults, then the TOML file named by
/// `ROLLCALL_CONFIG` (if any), then `ROLLCALL_*` environment variables.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// V4L2 device path.
    pub camera_device: String,
    /// Requested capture size; frames are delivered at this size.
    pub frame_width: u32,
    pub frame_height: u32,
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// Directory of reference images, one identity per file.
    pub reference_dir: PathBuf,
    /// Maximum embedding distance for a match (exclusive).
    pub tolerance: f32,
    /// Run the full-frame locator once every this many frames.
    pub detect_every: u64,
    /// Active window bounds, `HH:MM`, both inclusive.
    pub active_start: String,
    pub active_end: String,
    pub active_days: Vec<Weekday>,
    pub api: ApiSettings,
    /// Bounded notification queue size.
    pub queue_capacity: usize,
    /// Do not resubmit a name this soon after its last outcome.
    pub resubmit_cooldown_secs: u64,
    /// Write the annotated frame here as PNG after every detection refresh.
    pub preview_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            camera_device: "/dev/video0".to_string(),
            frame_width: 640,
            frame_height: 480,
            model_dir: rollcall_core::default_model_dir(),
            reference_dir: PathBuf::from("Students"),
            tolerance: rollcall_core::types::DEFAULT_TOLERANCE,
            detect_every: rollcall_core::cadence::DEFAULT_DETECT_EVERY,
            active_start: "07:30".to_string(),
            active_end: "23:59".to_string(),
            active_days: DEFAULT_ACTIVE_DAYS.to_vec(),
            api: ApiSettings::default(),
            queue_capacity: 8,
            resubmit_cooldown_secs: 30,
            preview_path: None,
        }
    }
}

impl Config {
    /// Load configuration from the optional file and the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match std::env::var_os("ROLLCALL_CONFIG") {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Override fields from `ROLLCALL_*` variables as seen through `lookup`.
    /// Unparsable numeric values are ignored.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("ROLLCALL_CAMERA_DEVICE") {
            self.camera_device = v;
        }
        set_parsed(&mut self.frame_width, lookup("ROLLCALL_FRAME_WIDTH"));
        set_parsed(&mut self.frame_height, lookup("ROLLCALL_FRAME_HEIGHT"));
        if let Some(v) = lookup("ROLLCALL_MODEL_DIR") {
            self.model_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("ROLLCALL_REFERENCE_DIR") {
            self.reference_dir = PathBuf::from(v);
        }
        set_parsed(&mut self.tolerance, lookup("ROLLCALL_TOLERANCE"));
        set_parsed(&mut self.detect_every, lookup("ROLLCALL_DETECT_EVERY"));
        if let Some(v) = lookup("ROLLCALL_ACTIVE_START") {
            self.active_start = v;
        }
        if let Some(v) = lookup("ROLLCALL_ACTIVE_END") {
            self.active_end = v;
        }
        if let Some(v) = lookup("ROLLCALL_API_URL") {
            self.api.base_url = v;
        }
        set_parsed(&mut self.api.checkpoint_id, lookup("ROLLCALL_CHECKPOINT_ID"));
        set_parsed(&mut self.api.attendance_timetable_id, lookup("ROLLCALL_TIMETABLE_ID"));
        if let Some(v) = lookup("ROLLCALL_PLATFORM") {
            self.api.platform = v;
        }
        set_parsed(&mut self.queue_capacity, lookup("ROLLCALL_QUEUE_CAPACITY"));
        set_parsed(&mut self.resubmit_cooldown_secs, lookup("ROLLCALL_RESUBMIT_COOLDOWN_SECS"));
        if let Some(v) = lookup("ROLLCALL_PREVIEW_PATH") {
            self.preview_path = Some(PathBuf::from(v));
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.detect_every == 0 {
            return Err(ConfigError::Invalid("detect_every must be at least 1".into()));
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::Invalid("queue_capacity must be at least 1".into()));
        }
        if self.tolerance.is_nan() || self.tolerance <= 0.0 {
            return Err(ConfigError::Invalid(format!("tolerance must be positive, got {}", self.tolerance)));
        }
        if self.frame_width == 0 || self.frame_height == 0 {
            return Err(ConfigError::Invalid("frame size must be non-zero".into()));
        }
        self.active_window()?;
        Ok(())
    }

    pub fn active_window(&self) -> Result<ActiveWindow, ConfigError> {
        Ok(ActiveWindow::new(&self.active_start, &self.active_end, &self.active_days)?)
    }

    pub fn resubmit_cooldown(&self) -> Duration {
        Duration::from_secs(self.resubmit_cooldown_secs)
    }

    /// Path to the SCRFD detection model.
    pub fn scrfd_model_path(&self) -> String {
        self.model_dir
            .join(rollcall_core::detector::SCRFD_MODEL_FILE)
            .to_string_lossy()
            .into_owned()
    }

    /// Path to the ArcFace recognition model.
    pub fn arcface_model_path(&self) -> String {
        self.model_dir
            .join(rollcall_core::recognizer::ARCFACE_MODEL_FILE)
            .to_string_lossy()
            .into_owned()
    }
}

fn set_parsed<T: FromStr>(field: &mut T, value: Option<String>) {
    if let Some(v) = value.and_then(|v| v.trim().parse().ok()) {
        *field = v;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.detect_every, 5);
        assert_eq!(config.tolerance, 0.5);
        assert_eq!(config.api.platform, "FR");
        assert_eq!(config.active_days.len(), 5);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::from_toml_str(
            r#"
            reference_dir = "/srv/faces"
            active_days = ["Mon", "Sat"]

            [api]
            base_url = "http://attendance.local:9000"
            checkpoint_id = 5
            "#,
        )
        .unwrap();
        assert_eq!(config.reference_dir, PathBuf::from("/srv/faces"));
        assert_eq!(config.active_days, vec![Weekday::Mon, Weekday::Sat]);
        assert_eq!(config.api.base_url, "http://attendance.local:9000");
        assert_eq!(config.api.checkpoint_id, 5);
        assert_eq!(config.api.attendance_timetable_id, 1);
        assert_eq!(config.camera_device, "/dev/video0");
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("ROLLCALL_CAMERA_DEVICE", "/dev/video4"),
            ("ROLLCALL_TOLERANCE", "0.6"),
            ("ROLLCALL_DETECT_EVERY", "not-a-number"),
            ("ROLLCALL_API_URL", "http://10.0.0.2:8000"),
            ("ROLLCALL_PREVIEW_PATH", "/tmp/preview.png"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_env(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(config.camera_device, "/dev/video4");
        assert_eq!(config.tolerance, 0.6);
        assert_eq!(config.detect_every, 5);
        assert_eq!(config.api.base_url, "http://10.0.0.2:8000");
        assert_eq!(config.preview_path, Some(PathBuf::from("/tmp/preview.png")));
    }

    #[test]
    fn test_validation_errors() {
        let config = Config { detect_every: 0, ..Config::default() };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let config = Config { active_start: "seven".into(), ..Config::default() };
        assert!(matches!(config.validate(), Err(ConfigError::Window(_))));

        let config = Config { tolerance: f32::NAN, ..Config::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_model_paths() {
        let config = Config { model_dir: PathBuf::from("/opt/models"), ..Config::default() };
        assert_eq!(config.scrfd_model_path(), "/opt/models/det_10g.onnx");
        assert_eq!(config.arcface_model_path(), "/opt/models/w600k_r50.onnx");
    }
}
