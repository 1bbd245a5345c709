//! Configuration loader and validator
//!
//! Loads scan, session and LED settings from TOML files in the configs/
//! directory.

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::scanner::MatchCriteria;
use crate::wand::codec::encode_led;
use crate::wand::constants::*;
use crate::wand::types::{NotificationHandles, WandOptions};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub scan: ScanSettings,

    #[serde(default)]
    pub session: SessionSettings,

    #[serde(default)]
    pub led: LedSettings,
}

/// Which wands to look for and how long to scan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanSettings {
    /// Exact advertised name
    #[serde(default, deserialize_with = "deserialize_optional_string")]
    pub name: Option<String>,

    /// Advertised name prefix (empty string disables it)
    #[serde(default = "default_prefix", deserialize_with = "deserialize_optional_string")]
    pub prefix: Option<String>,

    /// MAC address
    #[serde(default, deserialize_with = "deserialize_optional_string")]
    pub mac: Option<String>,

    #[serde(default = "default_scan_timeout_ms")]
    pub timeout_ms: u64,

    /// Connect every wand found
    #[serde(default = "default_true")]
    pub auto_connect: bool,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            name: None,
            prefix: default_prefix(),
            mac: None,
            timeout_ms: default_scan_timeout_ms(),
            auto_connect: true,
        }
    }
}

/// Per-session settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSettings {
    /// How long each notification loop cycle waits
    #[serde(default = "default_notification_timeout_ms")]
    pub notification_timeout_ms: u64,

    /// Firmware notification handles
    #[serde(default)]
    pub handles: NotificationHandles,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            notification_timeout_ms: default_notification_timeout_ms(),
            handles: NotificationHandles::default(),
        }
    }
}

/// Colours the LED cycles through
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedSettings {
    #[serde(default = "default_colors")]
    pub colors: Vec<String>,
}

impl Default for LedSettings {
    fn default() -> Self {
        Self {
            colors: default_colors(),
        }
    }
}

fn default_true() -> bool { true }
fn default_prefix() -> Option<String> { Some(WAND_NAME_PREFIX.to_string()) }
fn default_scan_timeout_ms() -> u64 { SCAN_TIMEOUT_MS }
fn default_notification_timeout_ms() -> u64 { NOTIFICATION_TIMEOUT_MS }
fn default_colors() -> Vec<String> {
    ["#a333c8", "2185d0", "0x21ba45", "#fbbd08", "#f2711c", "#db2828"]
        .iter()
        .map(|color| color.to_string())
        .collect()
}

/// Empty strings mean "not set"
fn deserialize_optional_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    if s.trim().is_empty() {
        Ok(None)
    } else {
        Ok(Some(s))
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();
        info!("Loading configuration from: {}", path_ref.display());

        let content = std::fs::read_to_string(path_ref)?;
        let config: Config = toml::from_str(&content)?;

        info!("✓ Config parsed successfully");
        debug!("  - Match: {:?}", config.match_criteria());
        debug!("  - Scan timeout: {}ms", config.scan.timeout_ms);
        debug!("  - LED colors: {:?}", config.led.colors);

        config.validate()?;
        info!("✓ Config validation passed");

        Ok(config)
    }

    /// Load default configuration from configs/default.toml
    pub fn load_default() -> Result<Self, ConfigError> {
        Self::load("configs/default.toml")
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.match_criteria().is_empty() {
            return Err(ConfigError::Invalid(
                "scan needs at least one of name, prefix or mac".into()
            ));
        }

        if self.scan.timeout_ms == 0 {
            return Err(ConfigError::Invalid("scan timeout_ms must be positive".into()));
        }

        if self.session.notification_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "session notification_timeout_ms must be positive".into()
            ));
        }

        let handles = &self.session.handles;
        let distinct: HashSet<u16> = [handles.position, handles.button, handles.temperature, handles.battery]
            .into_iter()
            .collect();
        if distinct.len() != 4 {
            return Err(ConfigError::Invalid(
                "session notification handles must be distinct".into()
            ));
        }

        if self.led.colors.is_empty() {
            warn!("No LED colors configured");
        }
        for color in &self.led.colors {
            if encode_led(color, true).is_err() {
                return Err(ConfigError::Invalid(format!("Invalid LED color '{}'", color)));
            }
        }

        Ok(())
    }

    pub fn match_criteria(&self) -> MatchCriteria {
        MatchCriteria {
            name: self.scan.name.clone(),
            prefix: self.scan.prefix.clone(),
            mac: self.scan.mac.clone(),
        }
    }

    pub fn scan_timeout(&self) -> Duration {
        Duration::from_millis(self.scan.timeout_ms)
    }

    pub fn wand_options(&self) -> WandOptions {
        WandOptions {
            notification_timeout: Duration::from_millis(self.session.notification_timeout_ms),
            handles: self.session.handles,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.scan.prefix.as_deref(), Some("Kano-Wand"));
        assert_eq!(config.scan_timeout(), Duration::from_millis(1000));
        assert!(config.scan.auto_connect);
        assert_eq!(config.wand_options(), WandOptions::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_partial_config() {
        let config: Config = toml::from_str(
            r#"
            [scan]
            mac = "e3:ae:cd:af:28:e2"
            prefix = ""
            timeout_ms = 2500

            [session.handles]
            button = 40
            "#,
        )
        .unwrap();

        assert_eq!(config.scan.prefix, None);
        assert_eq!(config.match_criteria(), MatchCriteria::new().mac("e3:ae:cd:af:28:e2"));
        assert_eq!(config.scan_timeout(), Duration::from_millis(2500));
        assert_eq!(config.session.handles.button, 40);
        assert_eq!(config.session.handles.position, POSITION_NOTIFICATION_HANDLE);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_no_criteria() {
        let config: Config = toml::from_str("[scan]\nprefix = \"\"\n").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_led_color() {
        let mut config = Config::default();
        config.led.colors.push("purple".to_string());

        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("purple"));
    }

    #[test]
    fn test_duplicate_handles() {
        let mut config = Config::default();
        config.session.handles.battery = config.session.handles.button;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_timeouts() {
        let mut config = Config::default();
        config.session.notification_timeout_ms = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.scan.timeout_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_default_file_parses() {
        let config: Config = toml::from_str(include_str!("../configs/default.toml")).unwrap();
        assert!(config.validate().is_ok());
    }
}
