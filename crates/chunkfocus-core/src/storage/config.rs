//! TOML-based application configuration.
//!
//! Stores user preferences including:
//! - Focus chunk length and the history category for finished tiles
//! - Recalibration lengths and the breathing cadence
//!
//! Configuration is stored at `~/.config/chunkfocus/config.toml`.

use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use super::data_dir;
use crate::error::ConfigError;
use crate::recalibration::{BreathingCadence, RecalibrationSettings, MINUTES_RANGE};
use crate::session::SessionSettings;

/// Allowed `session.chunk_minutes`.
pub const CHUNK_MINUTES_RANGE: RangeInclusive<u32> = 1..=24 * 60;
/// Allowed `session.chunk_seconds_override`.
pub const CHUNK_SECONDS_RANGE: RangeInclusive<u64> = 1..=24 * 60 * 60;

/// Focus session configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_chunk_minutes")]
    pub chunk_minutes: u32,
    /// Exact chunk length in seconds, overriding `chunk_minutes` (demos).
    #[serde(default)]
    pub chunk_seconds_override: Option<u64>,
    #[serde(default)]
    pub general_category_id: Uuid,
}

/// Recalibration configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecalibrationConfig {
    #[serde(default = "default_recal_minutes")]
    pub breathing_minutes: u32,
    #[serde(default = "default_recal_minutes")]
    pub balancing_minutes: u32,
    #[serde(default = "default_breath_secs")]
    pub inhale_secs: u64,
    #[serde(default = "default_breath_secs")]
    pub hold_in_secs: u64,
    #[serde(default = "default_breath_secs")]
    pub exhale_secs: u64,
    #[serde(default = "default_breath_secs")]
    pub hold_out_secs: u64,
}

/// Application configuration.
///
/// Serialized to/from TOML at `<data dir>/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub recalibration: RecalibrationConfig,
}

fn default_chunk_minutes() -> u32 {
    20
}
fn default_recal_minutes() -> u32 {
    2
}
fn default_breath_secs() -> u64 {
    4
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            chunk_minutes: default_chunk_minutes(),
            chunk_seconds_override: None,
            general_category_id: Uuid::nil(),
        }
    }
}

impl Default for RecalibrationConfig {
    fn default() -> Self {
        Self {
            breathing_minutes: default_recal_minutes(),
            balancing_minutes: default_recal_minutes(),
            inhale_secs: default_breath_secs(),
            hold_in_secs: default_breath_secs(),
            exhale_secs: default_breath_secs(),
            hold_out_secs: default_breath_secs(),
        }
    }
}

impl Config {
    fn get_json_value_by_path<'a>(
        root: &'a serde_json::Value,
        key: &str,
    ) -> Option<&'a serde_json::Value> {
        if key.is_empty() {
            return None;
        }

        let mut current = root;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    fn set_json_value_by_path(
        root: &mut serde_json::Value,
        key: &str,
        value: &str,
    ) -> Result<(), ConfigError> {
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };
        let unknown = || ConfigError::UnknownKey(key.to_string());

        let mut parts = key.split('.').peekable();
        if key.is_empty() {
            return Err(unknown());
        }

        let mut current = root;
        while let Some(part) = parts.next() {
            if parts.peek().is_none() {
                let obj = current.as_object_mut().ok_or_else(unknown)?;
                let existing = obj.get(part).ok_or_else(unknown)?;

                let new_value = match existing {
                    serde_json::Value::Bool(_) => serde_json::Value::Bool(
                        value.parse::<bool>().map_err(|e| invalid(e.to_string()))?,
                    ),
                    serde_json::Value::Number(_) => {
                        let n = value
                            .parse::<u64>()
                            .map_err(|_| invalid(format!("cannot parse '{value}' as number")))?;
                        serde_json::Value::Number(n.into())
                    }
                    // Optional fields serialize as null; accept a number or "none".
                    serde_json::Value::Null => {
                        if value.eq_ignore_ascii_case("none") {
                            serde_json::Value::Null
                        } else {
                            let n = value.parse::<u64>().map_err(|_| {
                                invalid(format!("cannot parse '{value}' as number"))
                            })?;
                            serde_json::Value::Number(n.into())
                        }
                    }
                    serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                        serde_json::from_str(value).map_err(|e| invalid(e.to_string()))?
                    }
                    serde_json::Value::String(_) => serde_json::Value::String(value.into()),
                };

                obj.insert(part.to_string(), new_value);
                return Ok(());
            }

            current = current.get_mut(part).ok_or_else(unknown)?;
        }

        Err(unknown())
    }

    fn path() -> Result<PathBuf, ConfigError> {
        let dir = data_dir().map_err(|e| ConfigError::LoadFailed {
            path: PathBuf::from("config.toml"),
            message: e.to_string(),
        })?;
        Ok(dir.join("config.toml"))
    }

    /// Load from disk or return default.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed,
    /// or if the default config cannot be written to disk.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::path()?)
    }

    /// Load from `path`, writing defaults there when the file is missing.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => {
                let cfg: Config = toml::from_str(&content).map_err(|e| ConfigError::LoadFailed {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                })?;
                cfg.validate()?;
                Ok(cfg)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let cfg = Self::default();
                cfg.save_to(path)?;
                Ok(cfg)
            }
            Err(e) => Err(ConfigError::LoadFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            }),
        }
    }

    /// Persist to disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be serialized or written to disk.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let save_failed = |message: String| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message,
        };
        let content = toml::to_string_pretty(self).map_err(|e| save_failed(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| save_failed(e.to_string()))
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Set a value by dot-separated key without saving.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown or the value cannot be parsed
    /// or falls outside its allowed range.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let mut json = serde_json::to_value(&*self).map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        let updated: Config =
            serde_json::from_value(json).map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            })?;
        updated.validate()?;
        *self = updated;
        Ok(())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !CHUNK_MINUTES_RANGE.contains(&self.session.chunk_minutes) {
            return Err(out_of_range(
                "session.chunk_minutes",
                self.session.chunk_minutes,
                &CHUNK_MINUTES_RANGE,
            ));
        }
        if let Some(secs) = self.session.chunk_seconds_override {
            if !CHUNK_SECONDS_RANGE.contains(&secs) {
                return Err(out_of_range(
                    "session.chunk_seconds_override",
                    secs,
                    &CHUNK_SECONDS_RANGE,
                ));
            }
        }
        for (key, minutes) in [
            (
                "recalibration.breathing_minutes",
                self.recalibration.breathing_minutes,
            ),
            (
                "recalibration.balancing_minutes",
                self.recalibration.balancing_minutes,
            ),
        ] {
            if !MINUTES_RANGE.contains(&minutes) {
                return Err(out_of_range(key, minutes, &MINUTES_RANGE));
            }
        }
        Ok(())
    }

    pub fn session_settings(&self) -> SessionSettings {
        let chunk_secs = self
            .session
            .chunk_seconds_override
            .unwrap_or(u64::from(self.session.chunk_minutes) * 60);
        SessionSettings {
            chunk_secs,
            general_category_id: self.session.general_category_id,
        }
    }

    pub fn recalibration_settings(&self) -> RecalibrationSettings {
        let r = &self.recalibration;
        RecalibrationSettings {
            breathing_minutes: r.breathing_minutes,
            balancing_minutes: r.balancing_minutes,
            cadence: BreathingCadence {
                inhale_secs: r.inhale_secs,
                hold_in_secs: r.hold_in_secs,
                exhale_secs: r.exhale_secs,
                hold_out_secs: r.hold_out_secs,
            },
        }
    }

    /// Load from disk, returning default on error.
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_default()
    }
}

fn out_of_range<T: Display>(key: &str, value: T, range: &RangeInclusive<T>) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("{value} is outside {}..={}", range.start(), range.end()),
    }
}
