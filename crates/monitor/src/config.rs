//! Application configuration
//!
//! Layered from an optional TOML file and `DROWSY__*` environment
//! variables, e.g. `DROWSY__DMS__THRESHOLD_FRAMES=10`.

use std::path::Path;
use std::time::Duration;

use alerting::ActuatorConfig;
use camera_capture::CameraConfig;
use dms::DmsConfig;
use inference_engine::ClassifierConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::Level;

use crate::session::SessionOptions;

/// Default config file, looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "drowsiness-monitor";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] ::config::ConfigError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub session: SessionConfig,
    pub camera: CameraConfig,
    pub dms: DmsConfig,
    pub classifier: ClassifierConfig,
    pub actuators: ActuatorConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub addr: String,
    /// Install the Prometheus recorder and serve `/metrics`
    pub metrics: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: "0.0.0.0:8080".to_string(),
            metrics: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
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

impl LoggingConfig {
    pub fn max_level(&self) -> Result<Level, ConfigError> {
        self.level
            .parse()
            .map_err(|_| ConfigError::Invalid(format!("unknown log level '{}'", self.level)))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Start monitoring as soon as the server is up
    pub autostart: bool,
    pub channel_capacity: usize,
    /// Hold time of each actuator self-test step
    pub self_test_step_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            autostart: false,
            channel_capacity: 32,
            self_test_step_ms: 1000,
        }
    }
}

impl AppConfig {
    /// Load from `path` (required) or the default file (optional), then the environment
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = match path {
            Some(path) => ::config::File::from(path).required(true),
            None => ::config::File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let config: AppConfig = ::config::Config::builder()
            .add_source(file)
            .add_source(
                ::config::Environment::with_prefix("DROWSY")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.logging.max_level()?;
        self.dms
            .threshold()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        if self.session.channel_capacity == 0 {
            return Err(ConfigError::Invalid(
                "session.channel_capacity must be positive".into(),
            ));
        }
        if self.classifier.input_size == 0 {
            return Err(ConfigError::Invalid(
                "classifier.input_size must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            frame_interval: self.camera.frame_interval(),
            channel_capacity: self.session.channel_capacity,
            self_test_step: Duration::from_millis(self.session.self_test_step_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alerting::SinkKind;
    use std::fs;

    fn write_config(name: &str, contents: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("monitor-{}-{}.toml", name, std::process::id()));
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.dms.threshold().unwrap(), 30);
        assert_eq!(config.server.addr, "0.0.0.0:8080");
        assert_eq!(config.actuators.kind, SinkKind::Log);
        assert!(config.classifier.model_path.is_none());
    }

    #[test]
    fn test_load_file() {
        let path = write_config(
            "embedded",
            r#"
[camera]
fps = 10
frames_dir = "/data/frames"

[dms]
drowsy_window_ms = 1000
expected_fps = 10

[actuators]
kind = "gpio"

[actuators.gpio]
buzzer = 5
"#,
        );

        let config = AppConfig::load(Some(path.as_path())).unwrap();
        assert_eq!(config.dms.threshold().unwrap(), 10);
        assert_eq!(config.actuators.kind, SinkKind::Gpio);
        assert_eq!(config.actuators.gpio.buzzer, 5);
        assert_eq!(config.actuators.gpio.green_led, 17);
        assert_eq!(config.camera.width, 640);
        assert_eq!(
            config.session_options().frame_interval,
            Some(Duration::from_millis(100))
        );
        assert_eq!(
            config.session_options().self_test_step,
            Duration::from_secs(1)
        );

        fs::remove_file(path).unwrap();
    }

    #[test]
    fn test_missing_explicit_file() {
        let path = Path::new("/nonexistent/drowsiness-monitor.toml");
        assert!(matches!(AppConfig::load(Some(path)), Err(ConfigError::Load(_))));
    }

    #[test]
    fn test_rejects_invalid_values() {
        let mut config = AppConfig::default();
        config.logging.level = "loud".into();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = AppConfig::default();
        config.dms.threshold_frames = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.session.channel_capacity = 0;
        assert!(config.validate().is_err());
    }
}
