use crate::error::InputError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    #[serde(default)]
    pub key_delay_ms: u64,
    #[serde(default = "default_modifier_delay_factor")]
    pub modifier_delay_factor: f64,
    #[serde(default = "default_ack_timeout_ms")]
    pub ack_timeout_ms: u64,
    #[serde(default = "default_first_ack_timeout_ms")]
    pub first_ack_timeout_ms: u64,
    #[serde(default = "default_ack_poll_interval_ms")]
    pub ack_poll_interval_ms: u64,
    #[serde(default = "default_pointer_step_px")]
    pub pointer_step_px: u32,
    #[serde(default = "default_hover_interval_ms")]
    pub hover_interval_ms: u64,
    #[serde(default = "default_require_ack")]
    pub require_ack: bool,
}

fn default_modifier_delay_factor() -> f64 {
    3.0
}

fn default_ack_timeout_ms() -> u64 {
    250
}

fn default_first_ack_timeout_ms() -> u64 {
    5000
}

fn default_ack_poll_interval_ms() -> u64 {
    5
}

pub(crate) fn default_pointer_step_px() -> u32 {
    10
}

fn default_hover_interval_ms() -> u64 {
    200
}

fn default_require_ack() -> bool {
    true
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            key_delay_ms: 0,
            modifier_delay_factor: default_modifier_delay_factor(),
            ack_timeout_ms: default_ack_timeout_ms(),
            first_ack_timeout_ms: default_first_ack_timeout_ms(),
            ack_poll_interval_ms: default_ack_poll_interval_ms(),
            pointer_step_px: default_pointer_step_px(),
            hover_interval_ms: default_hover_interval_ms(),
            require_ack: default_require_ack(),
        }
    }
}

impl EngineConfig {
    /// Reads a JSON file. Missing fields take their defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config = Self::from_json(&raw)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        debug!("Loaded engine config from {}", path.display());
        Ok(config)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let config: EngineConfig = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), InputError> {
        if self.ack_poll_interval_ms == 0 {
            return Err(InputError::Config("ack_poll_interval_ms must be > 0".into()));
        }
        if self.pointer_step_px == 0 {
            return Err(InputError::Config("pointer_step_px must be > 0".into()));
        }
        if !self.modifier_delay_factor.is_finite() || self.modifier_delay_factor < 0.0 {
            return Err(InputError::Config(format!(
                "modifier_delay_factor must be a non-negative number, got {}",
                self.modifier_delay_factor
            )));
        }
        if self.hover_interval_ms == 0 {
            return Err(InputError::Config("hover_interval_ms must be > 0".into()));
        }
        Ok(())
    }

    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }

    pub fn first_ack_timeout(&self) -> Duration {
        Duration::from_millis(self.first_ack_timeout_ms)
    }

    pub fn ack_poll_interval(&self) -> Duration {
        Duration::from_millis(self.ack_poll_interval_ms)
    }

    pub fn hover_interval(&self) -> Duration {
        Duration::from_millis(self.hover_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_takes_defaults() {
        let c = EngineConfig::from_json(r#"{ "ack_timeout_ms": 50 }"#).unwrap();
        assert_eq!(c.ack_timeout_ms, 50);
        assert_eq!(c.first_ack_timeout_ms, 5000);
        assert_eq!(c.modifier_delay_factor, 3.0);
        assert!(c.require_ack);
    }

    #[test]
    fn test_rejects_zero_poll_interval() {
        assert!(EngineConfig::from_json(r#"{ "ack_poll_interval_ms": 0 }"#).is_err());
        assert!(EngineConfig::from_json(r#"{ "modifier_delay_factor": -1.0 }"#).is_err());
        assert!(EngineConfig::from_json(r#"{ "pointer_step_px": 0 }"#).is_err());
    }

    #[test]
    fn test_load_missing_file() {
        let err = EngineConfig::load("/nonexistent/synput.json").unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }

    #[test]
    fn test_default_is_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }
}
