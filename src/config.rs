//! TOML configuration for the target device, matching and report delivery.
//!
//! Every section and field is optional; TOML hex literals (`0x054C`) work for ids.

use crate::backends::ManagerOptions;
use crate::device::{MatchCriteria, DUALSHOCK4_PRODUCT_ID, SONY_VENDOR_ID};
use crate::error::Result;
use crate::report::{ReportSettings, DEFAULT_REPORT_SIZE};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub target: TargetConfig,
    pub manager: ManagerConfig,
    pub reports: ReportConfig,
}

/// Device to look for after enumeration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetConfig {
    #[serde(default = "default_vendor_id")]
    pub vendor_id: u16,
    #[serde(default = "default_product_id")]
    pub product_id: u16,
}

fn default_vendor_id() -> u16 {
    SONY_VENDOR_ID
}

fn default_product_id() -> u16 {
    DUALSHOCK4_PRODUCT_ID
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            vendor_id: default_vendor_id(),
            product_id: default_product_id(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManagerConfig {
    #[serde(default = "default_true")]
    pub enumerate_on_open: bool,
    /// Empty matches every device.
    #[serde(default)]
    pub matching: Vec<MatchCriteria>,
}

fn default_true() -> bool {
    true
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            enumerate_on_open: true,
            matching: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportConfig {
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_buffer_size() -> usize {
    DEFAULT_REPORT_SIZE
}

fn default_read_timeout_ms() -> u64 {
    50
}

fn default_channel_capacity() -> usize {
    256
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            buffer_size: default_buffer_size(),
            read_timeout_ms: default_read_timeout_ms(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

impl Config {
    /// Read and parse a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn manager_options(&self) -> ManagerOptions {
        ManagerOptions {
            enumerate_on_open: self.manager.enumerate_on_open,
        }
    }

    /// `None` when no criteria are configured.
    pub fn matching(&self) -> Option<&[MatchCriteria]> {
        (!self.manager.matching.is_empty()).then_some(self.manager.matching.as_slice())
    }

    pub fn report_settings(&self) -> ReportSettings {
        ReportSettings {
            read_timeout: Duration::from_millis(self.reports.read_timeout_ms),
            channel_capacity: self.reports.channel_capacity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn empty_file_gives_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.target.vendor_id, 0x054C);
        assert_eq!(config.target.product_id, 0x05C4);
        assert!(config.matching().is_none());
        assert_eq!(config.report_settings(), ReportSettings::default());
    }

    #[test]
    fn hex_ids_and_partial_sections() {
        let config = Config::from_toml_str(
            r#"
            [target]
            vendor_id = 0x046D
            product_id = 0xC52B

            [manager]
            enumerate_on_open = false
            matching = [{ usage_page = 1, usage = 5 }, { vendor_id = 0x054C }]

            [reports]
            read_timeout_ms = 10
            "#,
        )
        .unwrap();

        assert_eq!(config.target.vendor_id, 0x046D);
        assert_eq!(config.target.product_id, 0xC52B);
        assert!(!config.manager_options().enumerate_on_open);
        assert_eq!(
            config.matching(),
            Some(
                &[
                    MatchCriteria::usage(1, 5),
                    MatchCriteria {
                        vendor_id: Some(0x054C),
                        ..MatchCriteria::default()
                    },
                ][..]
            )
        );
        assert_eq!(config.reports.buffer_size, 64);
        assert_eq!(config.report_settings().read_timeout, Duration::from_millis(10));
        assert_eq!(config.report_settings().channel_capacity, 256);
    }

    #[test]
    fn out_of_range_id_is_a_config_error() {
        let err = Config::from_toml_str("[target]\nvendor_id = 0x10000\n").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = Config::load("/nonexistent/hidtap.toml").unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
