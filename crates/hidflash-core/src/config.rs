//! Flash tool configuration, loadable from TOML.

use std::path::Path;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::protocol::constants::*;
use crate::timing::Timings;

/// Identity of the bootloader to flash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub vendor_id: u16,
    pub product_id: u16,
    /// Devices reporting an older release number are refused.
    pub min_release: u16,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            vendor_id: BOOTLOADER_VENDOR_ID,
            product_id: BOOTLOADER_PRODUCT_ID,
            min_release: MIN_BOOTLOADER_RELEASE,
        }
    }
}

/// Retry budgets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    pub max_write_retries: u32,
    pub max_discovery_attempts: u32,
    pub max_commit_polls: u32,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_write_retries: MAX_WRITE_RETRIES,
            max_discovery_attempts: MAX_DISCOVERY_ATTEMPTS,
            max_commit_polls: MAX_COMMIT_POLLS,
        }
    }
}

/// Configuration for a flash session.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlashConfig {
    pub device: DeviceConfig,
    pub timing: Timings,
    pub limits: Limits,
}

impl FlashConfig {
    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: FlashConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = FlashConfig::default();
        assert_eq!(config.device.vendor_id, 0x1209);
        assert_eq!(config.device.product_id, 0xBEBA);
        assert_eq!(config.device.min_release, 0x0300);
        assert_eq!(config.limits.max_write_retries, 20);
        assert_eq!(config.limits.max_discovery_attempts, 30);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: FlashConfig = toml::from_str(
            r#"
            [device]
            product_id = 0xBEEF

            [timing]
            erase_settle_ms = 5000
            "#,
        )
        .unwrap();

        assert_eq!(config.device.vendor_id, 0x1209);
        assert_eq!(config.device.product_id, 0xBEEF);
        assert_eq!(config.timing.erase_settle_ms, 5000);
        assert_eq!(config.timing.write_backoff_ms, 100);
        assert_eq!(config.limits, Limits::default());
    }

    #[test]
    fn test_file_roundtrip() {
        let path = std::env::temp_dir().join(format!("hidflash-config-{}.toml", std::process::id()));
        let mut config = FlashConfig::default();
        config.limits.max_commit_polls = 42;
        config.save_to_file(&path).unwrap();

        let loaded = FlashConfig::load_from_file(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(loaded, config);
    }
}
