//! Error types for trigger device operations.
//!
//! The variants follow the kiosk failure taxonomy: the controller could not
//! be reached, it answered badly, the device was not ready, or a bus
//! transfer failed. The `Display` text of each error is what the operator
//! ends up reading on the error screen.

use kiosk_core::TriggerOutcome;
use kiosk_network::ClientError;

/// Result type alias for hardware operations.
pub type Result<T> = std::result::Result<T, HardwareError>;

/// Errors that can occur during trigger device operations.
#[derive(Debug, thiserror::Error)]
pub enum HardwareError {
    /// Address unreachable, or refused during health check or connect.
    #[error("Connection failed to {address}: {message}")]
    Connection { address: String, message: String },

    /// Reachable, but replied with a non-success status or bad payload.
    #[error("Protocol error: {message}")]
    Protocol { message: String },

    /// Trigger requested while the device is not connected.
    #[error("Device not ready: {device}")]
    DeviceNotReady { device: String },

    /// A bus transfer was rejected or the device vanished mid-operation.
    #[error("Transfer failed: {message}")]
    HardwareTransfer { message: String },

    /// Operation timed out after specified duration.
    #[error("Operation timeout after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    /// Bus or client setup failed.
    #[error("Initialization failed: {message}")]
    Initialization { message: String },

    /// Rejected device configuration, such as a blank address.
    #[error("Configuration error: {message}")]
    Configuration { message: String },
}

impl HardwareError {
    /// Create a new connection error.
    pub fn connection(address: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Connection {
            address: address.into(),
            message: message.into(),
        }
    }

    /// Create a new protocol error.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Create a new device-not-ready error.
    pub fn device_not_ready(device: impl Into<String>) -> Self {
        Self::DeviceNotReady {
            device: device.into(),
        }
    }

    /// Create a new transfer error.
    pub fn transfer(message: impl Into<String>) -> Self {
        Self::HardwareTransfer {
            message: message.into(),
        }
    }

    /// Create a new timeout error.
    pub fn timeout(duration_ms: u64) -> Self {
        Self::Timeout { duration_ms }
    }

    /// Create a new initialization error.
    pub fn initialization(message: impl Into<String>) -> Self {
        Self::Initialization {
            message: message.into(),
        }
    }

    /// Create a new configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Map a relay client failure for the controller at `address`.
    pub fn from_client(address: &str, error: ClientError) -> Self {
        match error {
            ClientError::NoAddress => Self::device_not_ready("network relay (no address)"),
            ClientError::Timeout(ms) => Self::timeout(ms),
            ClientError::Connect(message) => Self::connection(address, message),
            ClientError::Status(status) => Self::protocol(format!("HTTP {status}")),
            ClientError::Decode(message) => Self::protocol(format!("malformed payload: {message}")),
            ClientError::Setup(message) => Self::initialization(message),
        }
    }

    /// Whether the failure means the device could not be reached or used at all.
    pub fn is_connectivity(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. } | Self::Timeout { .. } | Self::DeviceNotReady { .. }
        )
    }
}

impl From<HardwareError> for TriggerOutcome {
    fn from(error: HardwareError) -> Self {
        TriggerOutcome::failure(error.to_string())
    }
}

impl From<kiosk_core::Error> for HardwareError {
    fn from(error: kiosk_core::Error) -> Self {
        Self::configuration(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_error() {
        let error = HardwareError::connection("192.168.4.1", "refused");
        assert!(matches!(error, HardwareError::Connection { .. }));
        assert_eq!(error.to_string(), "Connection failed to 192.168.4.1: refused");
    }

    #[test]
    fn test_device_not_ready_error() {
        let error = HardwareError::device_not_ready("usb relay");
        assert_eq!(error.to_string(), "Device not ready: usb relay");
    }

    #[test]
    fn test_timeout_error() {
        let error = HardwareError::timeout(5000);
        assert_eq!(error.to_string(), "Operation timeout after 5000ms");
    }

    #[test]
    fn test_status_maps_to_protocol_with_http_code() {
        let error = HardwareError::from_client("10.0.0.2", ClientError::Status(500));
        assert!(matches!(error, HardwareError::Protocol { .. }));
        assert!(error.to_string().contains("HTTP 500"));
    }

    #[test]
    fn test_client_mapping() {
        assert!(matches!(
            HardwareError::from_client("a", ClientError::Timeout(1000)),
            HardwareError::Timeout { duration_ms: 1000 }
        ));
        assert!(matches!(
            HardwareError::from_client("a", ClientError::Connect("refused".into())),
            HardwareError::Connection { .. }
        ));
        assert!(matches!(
            HardwareError::from_client("a", ClientError::Decode("eof".into())),
            HardwareError::Protocol { .. }
        ));
        assert!(matches!(
            HardwareError::from_client("", ClientError::NoAddress),
            HardwareError::DeviceNotReady { .. }
        ));
    }

    #[test]
    fn test_into_trigger_outcome() {
        let outcome: TriggerOutcome = HardwareError::transfer("pipe error").into();
        assert!(!outcome.ok);
        assert_eq!(outcome.message.as_deref(), Some("Transfer failed: pipe error"));
    }

    #[test]
    fn test_connectivity_classification() {
        assert!(HardwareError::timeout(1).is_connectivity());
        assert!(HardwareError::device_not_ready("x").is_connectivity());
        assert!(!HardwareError::protocol("HTTP 500").is_connectivity());
        assert!(!HardwareError::transfer("stall").is_connectivity());
    }
}
