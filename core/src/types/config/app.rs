use crate::types::config::SavedConfig;
use crate::types::lifecycle::{DAY, SweepScope};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// User-facing application configuration, persisted as config.toml.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub lifecycle: LifecycleConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

impl AppConfig {
    /// Returns the config file path within the given data directory.
    pub fn path(data_dir: &Path) -> std::path::PathBuf {
        data_dir.join("config.toml")
    }

    /// Loads config from a TOML file. Returns default config if file doesn't exist.
    pub fn load(path: &Path) -> Result<Self, AppConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Saves config to a TOML file.
    pub fn save(&self, path: &Path) -> Result<(), AppConfigError> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validates config values and returns list of validation errors.
    /// Returns empty vec if config is valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.general.password.is_empty() {
            errors.push("password must not be empty".to_string());
        }

        if self.storage.capacity_bytes == 0 {
            errors.push("capacity_bytes must be at least 1".to_string());
        }

        if self.storage.clips_limit == 0 {
            errors.push("clips_limit must be at least 1".to_string());
        }

        if self.lifecycle.grey_days == 0 {
            errors.push("grey_days must be at least 1".to_string());
        }

        if self.lifecycle.expire_days <= self.lifecycle.grey_days {
            errors.push("expire_days must be greater than grey_days".to_string());
        }

        if self.session.max_age_days == 0 {
            errors.push("max_age_days must be at least 1".to_string());
        }

        errors
    }

    /// Returns a validated config, replacing invalid values with defaults.
    pub fn with_defaults_for_invalid(&self) -> Self {
        let defaults = Self::default();
        let lifecycle = if self.lifecycle.grey_days == 0
            || self.lifecycle.expire_days <= self.lifecycle.grey_days
        {
            LifecycleConfig {
                sweep_scope: self.lifecycle.sweep_scope,
                ..defaults.lifecycle
            }
        } else {
            self.lifecycle.clone()
        };

        Self {
            general: GeneralConfig {
                password: if self.general.password.is_empty() {
                    defaults.general.password
                } else {
                    self.general.password.clone()
                },
                address: self.general.address.clone(),
            },
            storage: StorageConfig {
                capacity_bytes: if self.storage.capacity_bytes == 0 {
                    defaults.storage.capacity_bytes
                } else {
                    self.storage.capacity_bytes
                },
                clips_limit: if self.storage.clips_limit == 0 {
                    defaults.storage.clips_limit
                } else {
                    self.storage.clips_limit
                },
            },
            lifecycle,
            session: SessionConfig {
                max_age_days: if self.session.max_age_days == 0 {
                    defaults.session.max_age_days
                } else {
                    self.session.max_age_days
                },
            },
        }
    }
}

impl From<&AppConfig> for SavedConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            password: config.general.password.clone(),
            capacity_bytes: config.storage.capacity_bytes,
            clips_limit: config.storage.clips_limit,
            grey_after: config.lifecycle.grey_days * DAY,
            expire_after: config.lifecycle.expire_days * DAY,
            sweep_scope: config.lifecycle.sweep_scope,
            session_max_age: config.session.max_age_days * DAY,
        }
    }
}

/// General application settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "default_password")]
    pub password: String,
    #[serde(default = "default_address")]
    pub address: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            password: default_password(),
            address: default_address(),
        }
    }
}

fn default_password() -> String {
    "abc".to_string()
}

fn default_address() -> String {
    "127.0.0.1:80".to_string()
}

/// Capacity settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_capacity_bytes")]
    pub capacity_bytes: u64,
    #[serde(default = "default_clips_limit")]
    pub clips_limit: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            capacity_bytes: default_capacity_bytes(),
            clips_limit: default_clips_limit(),
        }
    }
}

fn default_capacity_bytes() -> u64 {
    1 << 30
}

fn default_clips_limit() -> usize {
    100
}

/// Grey/expire thresholds.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LifecycleConfig {
    #[serde(default = "default_grey_days")]
    pub grey_days: u32,
    #[serde(default = "default_expire_days")]
    pub expire_days: u32,
    #[serde(default)]
    pub sweep_scope: SweepScope,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            grey_days: default_grey_days(),
            expire_days: default_expire_days(),
            sweep_scope: SweepScope::default(),
        }
    }
}

fn default_grey_days() -> u32 {
    15
}

fn default_expire_days() -> u32 {
    30
}

/// Session cookie settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_max_age_days")]
    pub max_age_days: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_age_days: default_max_age_days(),
        }
    }
}

fn default_max_age_days() -> u32 {
    99
}

/// Errors that can occur when loading or saving config.
#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}
