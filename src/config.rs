use anyhow::{Context, Result};
use serde::Deserialize;
use std::time::Duration;

use crate::session::SessionConfig;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    pub remote: RemoteConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
    pub devices: DevicesConfig,
}

#[derive(Debug, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct RemoteConfig {
    pub base_url: String,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub flush_interval_ms: u64,
    pub visualization_interval_ms: u64,
    pub visualization_frame_len: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        let session = SessionConfig::default();
        Self {
            flush_interval_ms: session.flush_interval.as_millis() as u64,
            visualization_interval_ms: session.visualization_interval.as_millis() as u64,
            visualization_frame_len: session.visualization_frame_len,
        }
    }
}

impl From<&CaptureConfig> for SessionConfig {
    fn from(capture: &CaptureConfig) -> Self {
        Self {
            flush_interval: Duration::from_millis(capture.flush_interval_ms),
            visualization_interval: Duration::from_millis(capture.visualization_interval_ms),
            visualization_frame_len: capture.visualization_frame_len,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct DevicesConfig {
    /// Directory whose WAV files are exposed as input devices
    pub input_dir: String,
}

impl Config {
    /// Load `path` (extension optional) overlaid with `MEETING_RECORDER__*` env vars
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("MEETING_RECORDER").separator("__"))
            .build()?;

        let cfg: Self = settings.try_deserialize()?;
        cfg.session()
            .validate()
            .with_context(|| format!("Invalid [capture] section in {}", path))?;

        Ok(cfg)
    }

    pub fn session(&self) -> SessionConfig {
        SessionConfig::from(&self.capture)
    }
}
