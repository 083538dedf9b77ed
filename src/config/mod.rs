//! Configuration management
//!
//! Values are layered: built-in defaults, then an optional TOML file, then
//! `PALAVER__`-prefixed environment variables (`PALAVER__SESSION__ALLOWED_CANDIDATES=2`).

use crate::domain::description::SecurePolicy;
use crate::domain::session::ChannelRouting;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid TOML: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub session: SessionConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// How long a transport may stay non-writable before the session errors
    pub call_setup_timeout_ms: u64,
    /// Local candidates collected before the ready notification
    pub allowed_candidates: usize,
    /// Applied to the description factory when channels are created
    pub secure_policy: SecurePolicy,
    pub audio_channel_names: Vec<String>,
    pub video_channel_names: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive, overridden by `RUST_LOG`
    pub filter: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            call_setup_timeout_ms: 30_000,
            allowed_candidates: 4,
            secure_policy: SecurePolicy::Required,
            audio_channel_names: vec!["rtp".to_string(), "rtcp".to_string()],
            video_channel_names: vec!["video_rtp".to_string(), "video_rtcp".to_string()],
        }
    }
}

impl SessionConfig {
    pub fn call_setup_timeout(&self) -> Duration {
        Duration::from_millis(self.call_setup_timeout_ms)
    }

    /// A zero candidate cap would never produce the ready notification
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.allowed_candidates == 0 {
            return Err(ConfigError::Invalid(
                "session.allowed_candidates must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn channel_routing(&self) -> ChannelRouting {
        ChannelRouting::new(
            self.audio_channel_names.clone(),
            self.video_channel_names.clone(),
        )
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

impl Config {
    /// Load defaults, the file at `path` (if given) and the environment
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder =
            config::Config::builder().add_source(config::Config::try_from(&Config::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let loaded: Config = builder
            .add_source(config::Environment::with_prefix("PALAVER").separator("__"))
            .build()?
            .try_deserialize()?;
        loaded.session.validate()?;
        Ok(loaded)
    }

    /// Parse a TOML document; missing keys keep their defaults
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let parsed: Config = toml::from_str(text)?;
        parsed.session.validate()?;
        Ok(parsed)
    }
}
