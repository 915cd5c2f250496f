//! Runtime configuration.
//!
//! Every field has a default taken from [`constants`](crate::constants), so
//! an empty TOML file (or no file at all) yields a working kiosk. Only the
//! keys that differ from the defaults need to be written:
//!
//! ```toml
//! [discovery]
//! prefixes = ["10.0.0"]
//! max_in_flight = 64
//!
//! [dispense]
//! dwell_ms = 3000
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::constants::*;
use crate::error::{Error, Result};

/// Complete kiosk configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KioskConfig {
    pub network: NetworkConfig,
    pub discovery: DiscoveryConfig,
    pub usb: UsbConfig,
    pub dispense: DispenseConfig,
    pub storage: StorageConfig,
}

/// HTTP relay controller settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Timeout of each health check and trigger request.
    pub request_timeout_ms: u64,
    pub health_path: String,
    pub trigger_path: String,

    /// Pulse length assumed when the controller does not report one.
    pub default_relay_ms: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: REQUEST_TIMEOUT_MS,
            health_path: HEALTH_PATH.to_string(),
            trigger_path: TRIGGER_PATH.to_string(),
            default_relay_ms: DEFAULT_RELAY_DURATION_MS,
        }
    }
}

impl NetworkConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Discovery sweep settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// `/24` prefixes written as three dotted octets, e.g. `"192.168.1"`.
    pub prefixes: Vec<String>,
    pub port: u16,
    pub probe_timeout_ms: u64,
    pub progress_every: usize,

    /// Cap on concurrent probes. `None` probes every candidate at once.
    pub max_in_flight: Option<usize>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            prefixes: DISCOVERY_PREFIXES.iter().map(|p| p.to_string()).collect(),
            port: DEFAULT_HTTP_PORT,
            probe_timeout_ms: PROBE_TIMEOUT_MS,
            progress_every: PROGRESS_EVERY,
            max_in_flight: None,
        }
    }
}

impl DiscoveryConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

/// USB relay board settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UsbConfig {
    pub vendor_id: u16,
    pub product_id: u16,
    pub interface: u8,
    pub configuration: u8,
    pub transfer_timeout_ms: u64,
}

impl Default for UsbConfig {
    fn default() -> Self {
        Self {
            vendor_id: USB_RELAY_VENDOR_ID,
            product_id: USB_RELAY_PRODUCT_ID,
            interface: USB_RELAY_INTERFACE,
            configuration: USB_RELAY_CONFIGURATION,
            transfer_timeout_ms: USB_TRANSFER_TIMEOUT_MS,
        }
    }
}

impl UsbConfig {
    pub fn transfer_timeout(&self) -> Duration {
        Duration::from_millis(self.transfer_timeout_ms)
    }
}

/// Pacing of the dispense cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispenseConfig {
    pub settle_ms: u64,
    pub relay_ms: u64,
    pub dwell_ms: u64,
    pub debounce_ms: u64,
}

impl Default for DispenseConfig {
    fn default() -> Self {
        Self {
            settle_ms: SETTLE_DELAY_MS,
            relay_ms: RELAY_PULSE_MS,
            dwell_ms: COMPLETE_DWELL_MS,
            debounce_ms: DEBOUNCE_WINDOW_MS,
        }
    }
}

impl DispenseConfig {
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn dwell(&self) -> Duration {
        Duration::from_millis(self.dwell_ms)
    }

    pub fn debounce_window(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

/// Persistence settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub database_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: DEFAULT_DATABASE_PATH.to_string(),
        }
    }
}

impl KioskConfig {
    /// Load and validate a configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the file cannot be read,
    /// [`Error::ConfigParse`] on malformed TOML and
    /// [`Error::InvalidConfig`] if a value fails validation.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&contents)
    }

    /// Load the file if given, otherwise fall back to defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    /// Parse and validate configuration from TOML text.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.network.request_timeout_ms == 0 {
            return Err(Error::invalid_config(
                "network.request_timeout_ms",
                "must be greater than zero",
            ));
        }
        for (key, path) in [
            ("network.health_path", &self.network.health_path),
            ("network.trigger_path", &self.network.trigger_path),
        ] {
            if !path.starts_with('/') {
                return Err(Error::invalid_config(key, "must start with '/'"));
            }
        }

        if self.discovery.prefixes.is_empty() {
            return Err(Error::invalid_config(
                "discovery.prefixes",
                "at least one prefix is required",
            ));
        }
        for prefix in &self.discovery.prefixes {
            if !is_dotted_prefix(prefix) {
                return Err(Error::invalid_config(
                    "discovery.prefixes",
                    format!("'{prefix}' is not three dotted octets"),
                ));
            }
        }
        if self.discovery.probe_timeout_ms == 0 {
            return Err(Error::invalid_config(
                "discovery.probe_timeout_ms",
                "must be greater than zero",
            ));
        }
        if self.discovery.progress_every == 0 {
            return Err(Error::invalid_config(
                "discovery.progress_every",
                "must be greater than zero",
            ));
        }
        if self.discovery.max_in_flight == Some(0) {
            return Err(Error::invalid_config(
                "discovery.max_in_flight",
                "must be greater than zero when set",
            ));
        }

        if self.usb.transfer_timeout_ms == 0 {
            return Err(Error::invalid_config(
                "usb.transfer_timeout_ms",
                "must be greater than zero",
            ));
        }

        if self.storage.database_path.trim().is_empty() {
            return Err(Error::invalid_config(
                "storage.database_path",
                "must not be empty",
            ));
        }

        Ok(())
    }
}

fn is_dotted_prefix(prefix: &str) -> bool {
    let octets: Vec<&str> = prefix.split('.').collect();
    octets.len() == 3
        && octets
            .iter()
            .all(|o| !o.is_empty() && o.len() <= 3 && o.parse::<u8>().is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::io::Write;

    #[test]
    fn test_defaults_match_constants() {
        let config = KioskConfig::default();
        assert_eq!(config.network.request_timeout(), Duration::from_millis(5000));
        assert_eq!(config.discovery.prefixes.len(), 3);
        assert_eq!(config.discovery.max_in_flight, None);
        assert_eq!(config.usb.vendor_id, 0x16c0);
        assert_eq!(config.usb.product_id, 0x05df);
        assert_eq!(config.dispense.settle(), Duration::from_millis(500));
        assert_eq!(config.dispense.dwell(), Duration::from_millis(2000));
        assert_eq!(config.dispense.debounce_window(), Duration::from_millis(3000));
        assert_eq!(config.storage.database_path, "kiosk.db");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_toml_yields_defaults() {
        let config = KioskConfig::from_toml_str("").unwrap();
        assert_eq!(config, KioskConfig::default());
    }

    #[test]
    fn test_partial_override() {
        let config = KioskConfig::from_toml_str(
            r#"
            [discovery]
            prefixes = ["10.0.0"]
            max_in_flight = 64

            [dispense]
            dwell_ms = 3000
            "#,
        )
        .unwrap();

        assert_eq!(config.discovery.prefixes, vec!["10.0.0".to_string()]);
        assert_eq!(config.discovery.max_in_flight, Some(64));
        assert_eq!(config.discovery.port, 80);
        assert_eq!(config.dispense.dwell_ms, 3000);
        assert_eq!(config.dispense.settle_ms, 500);
    }

    #[rstest]
    #[case("[network]\nrequest_timeout_ms = 0", "network.request_timeout_ms")]
    #[case("[network]\nhealth_path = \"health\"", "network.health_path")]
    #[case("[discovery]\nprefixes = []", "discovery.prefixes")]
    #[case("[discovery]\nprefixes = [\"192.168\"]", "discovery.prefixes")]
    #[case("[discovery]\nprefixes = [\"192.168.300\"]", "discovery.prefixes")]
    #[case("[discovery]\nprobe_timeout_ms = 0", "discovery.probe_timeout_ms")]
    #[case("[discovery]\nmax_in_flight = 0", "discovery.max_in_flight")]
    #[case("[usb]\ntransfer_timeout_ms = 0", "usb.transfer_timeout_ms")]
    #[case("[storage]\ndatabase_path = \" \"", "storage.database_path")]
    fn test_validation_rejects(#[case] toml: &str, #[case] expected_key: &str) {
        match KioskConfig::from_toml_str(toml) {
            Err(Error::InvalidConfig { key, .. }) => assert_eq!(key, expected_key),
            other => panic!("expected InvalidConfig for {expected_key}, got {other:?}"),
        }
    }

    #[test]
    fn test_malformed_toml() {
        let result = KioskConfig::from_toml_str("[discovery\nport = 80");
        assert!(matches!(result, Err(Error::ConfigParse(_))));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[usb]\ninterface = 1").unwrap();

        let config = KioskConfig::load(file.path()).unwrap();
        assert_eq!(config.usb.interface, 1);
    }

    #[test]
    fn test_load_missing_file() {
        let result = KioskConfig::load("/nonexistent/kiosk.toml");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_load_or_default_without_path() {
        let config = KioskConfig::load_or_default(None).unwrap();
        assert_eq!(config, KioskConfig::default());
    }

    #[test]
    fn test_example_file_matches_defaults() {
        let config = KioskConfig::from_toml_str(include_str!("../../../kiosk.example.toml")).unwrap();
        assert_eq!(config, KioskConfig::default());
    }
}
