//! BliChat CLI Configuration Management
//!
//! Configuration is layered with figment, lowest priority first:
//! - built-in defaults
//! - `blichat.toml` in the working directory
//! - the file passed with `--config`
//! - environment variables prefixed with `BLICHAT_`, nested keys separated
//!   by `__` (`BLICHAT_RELAY__ROOM_ID=21452505`)

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use blichat_core::RelayConfig;

pub const DEFAULT_CONFIG_FILE: &str = "blichat.toml";
pub const ENV_PREFIX: &str = "BLICHAT_";

const REDACTED: &str = "***";

// ----------------------------------------------------------------------------
// Application Configuration
// ----------------------------------------------------------------------------

/// Complete configuration of the `blichat` binary
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Relay behaviour
    pub relay: RelayConfig,
    /// Live-platform session cookies, handed to the live-stream client
    pub bilibili: BilibiliCredentials,
    /// Bot credentials, handed to the messaging client
    pub telegram: TelegramCredentials,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BilibiliCredentials {
    pub sessdata: String,
    pub bili_jct: String,
    pub buvid3: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramCredentials {
    pub bot_token: String,
}

// ----------------------------------------------------------------------------
// Configuration Loading Logic
// ----------------------------------------------------------------------------

impl AppConfig {
    /// Layered figment for the given extra file
    pub fn figment(extra: Option<&Path>) -> Figment {
        let mut figment = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file(DEFAULT_CONFIG_FILE));
        if let Some(path) = extra {
            figment = figment.merge(Toml::file(path));
        }
        figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Load configuration; an explicitly named file must exist
    pub fn load(extra: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = extra {
            if !path.exists() {
                return Err(ConfigError::Loading(format!(
                    "Configuration file {} not found",
                    path.display()
                )));
            }
        }

        Self::figment(extra)
            .extract()
            .map_err(|e| ConfigError::Loading(format!("Failed to load configuration: {}", e)))
    }

    /// Validate the relay section
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.relay
            .validate()
            .map_err(|e| ConfigError::Validation(e.to_string()))
    }

    /// Validate the credentials handed to the platform clients
    pub fn validate_credentials(&self) -> Result<(), ConfigError> {
        let cookies = [
            ("bilibili.sessdata", &self.bilibili.sessdata),
            ("bilibili.bili_jct", &self.bilibili.bili_jct),
            ("bilibili.buvid3", &self.bilibili.buvid3),
        ];
        for (field, value) in cookies {
            check_secret(field, value)?;
        }

        check_secret("telegram.bot_token", &self.telegram.bot_token)?;
        if !self.telegram.bot_token.contains(':') {
            return Err(ConfigError::Validation(
                "telegram.bot_token should look like '123456:ABC-DEF...'".to_string(),
            ));
        }
        Ok(())
    }

    /// Copy with every secret masked, for display
    pub fn redacted(&self) -> Self {
        let mask = |value: &str| {
            if value.is_empty() {
                String::new()
            } else {
                REDACTED.to_string()
            }
        };
        Self {
            relay: self.relay.clone(),
            bilibili: BilibiliCredentials {
                sessdata: mask(&self.bilibili.sessdata),
                bili_jct: mask(&self.bilibili.bili_jct),
                buvid3: mask(&self.bilibili.buvid3),
            },
            telegram: TelegramCredentials {
                bot_token: mask(&self.telegram.bot_token),
            },
        }
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self)
            .map_err(|e| ConfigError::Serialization(format!("Failed to serialize config: {}", e)))
    }
}

fn check_secret(field: &str, value: &str) -> Result<(), ConfigError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ConfigError::Validation(format!("{field} must be set")));
    }
    if is_placeholder(value) {
        return Err(ConfigError::Validation(format!(
            "{field} still holds the placeholder '{value}'"
        )));
    }
    Ok(())
}

/// Values shipped in example configs
fn is_placeholder(value: &str) -> bool {
    let lower = value.to_ascii_lowercase();
    (lower.starts_with("your_") && lower.ends_with("_here"))
        || (lower.starts_with('<') && lower.ends_with('>'))
        || lower == "changeme"
}

// ----------------------------------------------------------------------------
// Error Types
// ----------------------------------------------------------------------------

/// Configuration-related errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration loading error: {0}")]
    Loading(String),

    #[error("Configuration validation error: {0}")]
    Validation(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
