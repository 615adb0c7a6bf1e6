//! Plugin configuration
//!
//! Broker credentials, endpoint, and application identity. The
//! configuration is immutable after creation: the facade owns it and
//! injects it into the supervisor. The library never reads the process
//! environment itself; the demo binary maps environment variables onto
//! this struct explicitly.

use crate::transport::PublishIdentity;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Connection and identity settings for one plugin instance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PluginConfig {
    /// Broker username.
    #[serde(default = "default_username")]
    pub username: String,
    /// Broker password.
    #[serde(default = "default_password")]
    pub password: String,
    /// Broker hostname or address.
    #[serde(default = "default_host")]
    pub host: String,
    /// Broker port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Application identity stamped onto every published message.
    ///
    /// May be empty at creation; publishing then fails with the
    /// unrecoverable programmer-error class until one is provided.
    #[serde(default)]
    pub app_id: String,
}

fn default_username() -> String {
    "plugin".to_string()
}

fn default_password() -> String {
    "plugin".to_string()
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    1883
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            username: default_username(),
            password: default_password(),
            host: default_host(),
            port: default_port(),
            app_id: String::new(),
        }
    }
}

impl PluginConfig {
    pub fn new(
        username: impl Into<String>,
        password: impl Into<String>,
        host: impl Into<String>,
        port: u16,
        app_id: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            host: host.into(),
            port,
            app_id: app_id.into(),
        }
    }

    /// Load configuration from a TOML file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate required fields. Fatal at creation time.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.is_empty() {
            return Err(ConfigError::MissingField("host"));
        }
        if self.port == 0 {
            return Err(ConfigError::InvalidConfig(
                "port must be non-zero".to_string(),
            ));
        }
        if self.username.is_empty() {
            return Err(ConfigError::MissingField("username"));
        }
        Ok(())
    }

    /// The identity attached to every broker publish.
    pub fn identity(&self) -> PublishIdentity {
        PublishIdentity {
            app_id: self.app_id.clone(),
            user_id: self.username.clone(),
        }
    }
}

/// Configuration loading and validation errors. Fatal at creation.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("missing required field `{0}`")]
    MissingField(&'static str),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
