//! TOML-based configuration for the receiver.
//!
//! Every field has a default, so the receiver runs with no file at all and
//! keeps working when an older file lacks newer fields.
//!
//! ```toml
//! [receiver]
//! log_level = "info"
//!
//! [link]
//! address = "127.0.0.1:5277"
//! retry_interval_ms = 500
//!
//! [display]
//! width = 800
//! height = 480
//! ```
//!
//! # Serde default values
//!
//! Fields annotated with `#[serde(default = "some_fn")]` take the return
//! value of `some_fn()` when absent; whole sections annotated with
//! `#[serde(default)]` fall back to the section's `Default` impl.

use std::path::{Path, PathBuf};
use std::time::Duration;

use carlink_core::domain::touch::TouchScaleError;
use carlink_core::{SessionParams, TouchScale};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::application::supervisor::{
    HandshakeProfile, SupervisorConfig, DEFAULT_BOX_NAME, DEFAULT_DPI,
};

/// File name looked up in the working directory when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "carlink.toml";

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid [touch] section: {0}")]
    InvalidTouchScale(#[from] TouchScaleError),

    /// A timer period that must be positive is zero.
    #[error("{field} must be greater than zero")]
    ZeroInterval { field: &'static str },
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level receiver configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ReceiverConfig {
    #[serde(default)]
    pub receiver: GeneralConfig,
    #[serde(default)]
    pub link: LinkConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub display: DisplayConfig,
    #[serde(default)]
    pub touch: TouchConfig,
    #[serde(default)]
    pub sinks: SinkConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeneralConfig {
    /// `tracing` filter used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Where and how the dongle is reached.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LinkConfig {
    /// `host:port` of the TCP bridge in front of the dongle.
    #[serde(default = "default_address")]
    pub address: String,
    /// Pause between failed acquisitions.
    #[serde(default = "default_retry_interval_ms")]
    pub retry_interval_ms: u64,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionConfig {
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
    /// Cadence of the startup batch while waiting for `Open`.
    #[serde(default = "default_startup_interval_ms")]
    pub startup_interval_ms: u64,
    /// Upper bound on the graceful shutdown.
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,
}

/// Projected display announced in the handshake.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DisplayConfig {
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default = "default_fps")]
    pub fps: u32,
    #[serde(default = "default_dpi")]
    pub dpi: u32,
    /// Name the dongle shows to the phone.
    #[serde(default = "default_box_name")]
    pub box_name: String,
}

/// Device-coordinate divisors for touch normalisation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TouchConfig {
    #[serde(default = "default_x_divisor")]
    pub x_divisor: f64,
    #[serde(default = "default_y_divisor")]
    pub y_divisor: f64,
}

/// Output paths for the raw streams.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SinkConfig {
    #[serde(default = "default_video_path")]
    pub video_path: PathBuf,
    #[serde(default = "default_audio_path")]
    pub audio_path: PathBuf,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_log_level() -> String {
    "info".to_string()
}
fn default_address() -> String {
    "127.0.0.1:5277".to_string()
}
fn default_retry_interval_ms() -> u64 {
    500
}
fn default_connect_timeout_ms() -> u64 {
    3_000
}
fn default_heartbeat_interval_ms() -> u64 {
    2_000
}
fn default_startup_interval_ms() -> u64 {
    1_000
}
fn default_shutdown_timeout_ms() -> u64 {
    5_000
}
fn default_width() -> u32 {
    800
}
fn default_height() -> u32 {
    480
}
fn default_fps() -> u32 {
    30
}
fn default_dpi() -> u32 {
    DEFAULT_DPI
}
fn default_box_name() -> String {
    DEFAULT_BOX_NAME.to_string()
}
fn default_x_divisor() -> f64 {
    carlink_core::domain::touch::DEFAULT_X_DIVISOR
}
fn default_y_divisor() -> f64 {
    carlink_core::domain::touch::DEFAULT_Y_DIVISOR
}
fn default_video_path() -> PathBuf {
    PathBuf::from("carlink-video.h264")
}
fn default_audio_path() -> PathBuf {
    PathBuf::from("carlink-audio.pcm")
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            retry_interval_ms: default_retry_interval_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            startup_interval_ms: default_startup_interval_ms(),
            shutdown_timeout_ms: default_shutdown_timeout_ms(),
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            fps: default_fps(),
            dpi: default_dpi(),
            box_name: default_box_name(),
        }
    }
}

impl Default for TouchConfig {
    fn default() -> Self {
        Self {
            x_divisor: default_x_divisor(),
            y_divisor: default_y_divisor(),
        }
    }
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            video_path: default_video_path(),
            audio_path: default_audio_path(),
        }
    }
}

// ── Conversions to application settings ───────────────────────────────────────

impl ReceiverConfig {
    /// Display parameters announced in the `Open` handshake frame.
    pub fn session_params(&self) -> SessionParams {
        SessionParams {
            width: self.display.width,
            height: self.display.height,
            video_frame_rate: self.display.fps,
            ..SessionParams::default()
        }
    }

    pub fn handshake_profile(&self) -> HandshakeProfile {
        HandshakeProfile::new(self.session_params(), self.display.dpi, &self.display.box_name)
    }

    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidTouchScale`] for a zero, negative or
    /// non-finite divisor.
    pub fn touch_scale(&self) -> Result<TouchScale, ConfigError> {
        Ok(TouchScale::new(self.touch.x_divisor, self.touch.y_divisor)?)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.link.connect_timeout_ms)
    }

    /// # Errors
    ///
    /// Fails when the touch section is invalid or when the retry, startup or
    /// heartbeat interval is zero.
    pub fn supervisor_config(&self) -> Result<SupervisorConfig, ConfigError> {
        for (field, ms) in [
            ("link.retry_interval_ms", self.link.retry_interval_ms),
            ("session.startup_interval_ms", self.session.startup_interval_ms),
            ("session.heartbeat_interval_ms", self.session.heartbeat_interval_ms),
        ] {
            if ms == 0 {
                return Err(ConfigError::ZeroInterval { field });
            }
        }
        Ok(SupervisorConfig {
            retry_interval: Duration::from_millis(self.link.retry_interval_ms),
            startup_interval: Duration::from_millis(self.session.startup_interval_ms),
            heartbeat_interval: Duration::from_millis(self.session.heartbeat_interval_ms),
            shutdown_timeout: Duration::from_millis(self.session.shutdown_timeout_ms),
            touch_scale: self.touch_scale()?,
        })
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Loads the config at `path`, returning `ReceiverConfig::default()` if the
/// file does not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config_from(path: &Path) -> Result<ReceiverConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ReceiverConfig::default()),
        Err(source) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Writes `config` to `path`, creating parent directories as needed.
pub fn save_config_to(path: &Path, config: &ReceiverConfig) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use carlink_core::protocol::messages::StartupMessage;
    use carlink_core::OutboundMessage;
    use uuid::Uuid;

    #[test]
    fn test_default_config_matches_documented_values() {
        // Arrange / Act
        let cfg = ReceiverConfig::default();

        // Assert
        assert_eq!(cfg.receiver.log_level, "info");
        assert_eq!(cfg.link.address, "127.0.0.1:5277");
        assert_eq!(cfg.link.retry_interval_ms, 500);
        assert_eq!(cfg.session.heartbeat_interval_ms, 2_000);
        assert_eq!(cfg.session.startup_interval_ms, 1_000);
        assert_eq!((cfg.display.width, cfg.display.height), (800, 480));
        assert_eq!(cfg.display.fps, 30);
        assert_eq!(cfg.display.dpi, 160);
        assert_eq!(cfg.touch.x_divisor, 8_000_000.0);
        assert_eq!(cfg.touch.y_divisor, 6_000_000.0);
    }

    #[test]
    fn test_empty_toml_yields_defaults() {
        let cfg: ReceiverConfig = toml::from_str("").expect("deserialize empty");
        assert_eq!(cfg, ReceiverConfig::default());
    }

    #[test]
    fn test_partial_section_overrides_only_named_fields() {
        // Arrange
        let toml_str = r#"
[link]
address = "10.0.0.2:9000"

[display]
width = 1280
"#;

        // Act
        let cfg: ReceiverConfig = toml::from_str(toml_str).expect("deserialize partial");

        // Assert
        assert_eq!(cfg.link.address, "10.0.0.2:9000");
        assert_eq!(cfg.link.retry_interval_ms, 500);
        assert_eq!(cfg.display.width, 1280);
        assert_eq!(cfg.display.height, 480);
    }

    #[test]
    fn test_supervisor_config_converts_milliseconds() {
        // Arrange
        let mut cfg = ReceiverConfig::default();
        cfg.link.retry_interval_ms = 250;
        cfg.session.heartbeat_interval_ms = 1_500;

        // Act
        let sup = cfg.supervisor_config().unwrap();

        // Assert
        assert_eq!(sup.retry_interval, Duration::from_millis(250));
        assert_eq!(sup.heartbeat_interval, Duration::from_millis(1_500));
        assert_eq!(sup.startup_interval, Duration::from_secs(1));
    }

    #[test]
    fn test_zero_divisor_is_rejected() {
        let mut cfg = ReceiverConfig::default();
        cfg.touch.y_divisor = 0.0;
        assert!(matches!(
            cfg.supervisor_config(),
            Err(ConfigError::InvalidTouchScale(_))
        ));
    }

    #[test]
    fn test_zero_interval_is_rejected() {
        for field in ["retry", "startup", "heartbeat"] {
            // Arrange
            let mut cfg = ReceiverConfig::default();
            match field {
                "retry" => cfg.link.retry_interval_ms = 0,
                "startup" => cfg.session.startup_interval_ms = 0,
                _ => cfg.session.heartbeat_interval_ms = 0,
            }

            // Act
            let result = cfg.supervisor_config();

            // Assert
            assert!(
                matches!(result, Err(ConfigError::ZeroInterval { field: f }) if f.contains(field)),
                "{field} interval of zero was accepted"
            );
        }
    }

    #[test]
    fn test_handshake_profile_uses_display_section() {
        // Arrange
        let mut cfg = ReceiverConfig::default();
        cfg.display.width = 1024;
        cfg.display.height = 600;

        // Act
        let profile = cfg.handshake_profile();

        // Assert
        let open = profile.startup.iter().find_map(|m| match m {
            OutboundMessage::Startup(StartupMessage::Open(p)) => Some(*p),
            _ => None,
        });
        let open = open.expect("startup batch carries Open");
        assert_eq!((open.width, open.height), (1024, 600));
    }

    #[test]
    fn test_load_config_returns_default_when_file_absent() {
        let path = std::env::temp_dir().join(format!("carlink-missing-{}.toml", Uuid::new_v4()));
        assert_eq!(load_config_from(&path).unwrap(), ReceiverConfig::default());
    }

    #[test]
    fn test_load_config_rejects_malformed_toml() {
        // Arrange
        let path = std::env::temp_dir().join(format!("carlink-bad-{}.toml", Uuid::new_v4()));
        std::fs::write(&path, "[[[ not valid toml").unwrap();

        // Act
        let result = load_config_from(&path);

        // Assert
        assert!(matches!(result, Err(ConfigError::Parse(_))));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_save_and_load_round_trip_via_temp_dir() {
        // Arrange
        let dir = std::env::temp_dir().join(format!("carlink_test_{}", Uuid::new_v4()));
        let path = dir.join("carlink.toml");
        let mut cfg = ReceiverConfig::default();
        cfg.link.address = "192.168.4.1:5277".to_string();
        cfg.receiver.log_level = "debug".to_string();

        // Act
        save_config_to(&path, &cfg).unwrap();
        let loaded = load_config_from(&path).unwrap();

        // Assert
        assert_eq!(loaded, cfg);
        std::fs::remove_dir_all(&dir).ok();
    }
}
