//! Enum wrapper for trigger device dispatch.
//!
//! Native `async fn` in traits is not object-safe, so the orchestrator
//! cannot hold a `Box<dyn TriggerDevice>`. [`AnyTriggerDevice`] provides the
//! same polymorphism through a closed enum: the caller picks a transport at
//! runtime and the dispense flow only ever sees the trait.
//!
//! # Examples
//!
//! ```
//! use kiosk_hardware::devices::AnyTriggerDevice;
//! use kiosk_hardware::mock::MockTrigger;
//! use kiosk_hardware::traits::TriggerDevice;
//!
//! #[tokio::main]
//! async fn main() -> kiosk_hardware::Result<()> {
//!     let (mock, _handle) = MockTrigger::new();
//!     let mut device = AnyTriggerDevice::from(mock);
//!
//!     device.connect().await?;
//!     assert!(device.trigger(250).await?.ok);
//!     Ok(())
//! }
//! ```

use kiosk_core::{DeviceKind, TriggerOutcome};

use crate::error::Result;
use crate::mock::MockTrigger;
use crate::network::NetworkDevice;
use crate::traits::TriggerDevice;
use crate::usb::LocalBusDevice;

/// Any supported trigger device.
#[derive(Debug)]
#[non_exhaustive]
pub enum AnyTriggerDevice {
    /// HTTP relay controller on the LAN.
    Network(NetworkDevice),

    /// USB relay board.
    LocalBus(LocalBusDevice),

    /// Scripted device for development and testing.
    Mock(MockTrigger),
}

impl From<NetworkDevice> for AnyTriggerDevice {
    fn from(device: NetworkDevice) -> Self {
        Self::Network(device)
    }
}

impl From<LocalBusDevice> for AnyTriggerDevice {
    fn from(device: LocalBusDevice) -> Self {
        Self::LocalBus(device)
    }
}

impl From<MockTrigger> for AnyTriggerDevice {
    fn from(device: MockTrigger) -> Self {
        Self::Mock(device)
    }
}

impl TriggerDevice for AnyTriggerDevice {
    fn kind(&self) -> DeviceKind {
        match self {
            Self::Network(device) => device.kind(),
            Self::LocalBus(device) => device.kind(),
            Self::Mock(device) => device.kind(),
        }
    }

    fn address(&self) -> Option<String> {
        match self {
            Self::Network(device) => device.address(),
            Self::LocalBus(device) => device.address(),
            Self::Mock(device) => device.address(),
        }
    }

    fn is_connected(&self) -> bool {
        match self {
            Self::Network(device) => device.is_connected(),
            Self::LocalBus(device) => device.is_connected(),
            Self::Mock(device) => device.is_connected(),
        }
    }

    async fn connect(&mut self) -> Result<()> {
        match self {
            Self::Network(device) => device.connect().await,
            Self::LocalBus(device) => device.connect().await,
            Self::Mock(device) => device.connect().await,
        }
    }

    async fn health_check(&mut self) -> Result<()> {
        match self {
            Self::Network(device) => device.health_check().await,
            Self::LocalBus(device) => device.health_check().await,
            Self::Mock(device) => device.health_check().await,
        }
    }

    async fn trigger(&mut self, duration_ms: u64) -> Result<TriggerOutcome> {
        match self {
            Self::Network(device) => device.trigger(duration_ms).await,
            Self::LocalBus(device) => device.trigger(duration_ms).await,
            Self::Mock(device) => device.trigger(duration_ms).await,
        }
    }

    async fn release(&mut self) {
        match self {
            Self::Network(device) => device.release().await,
            Self::LocalBus(device) => device.release().await,
            Self::Mock(device) => device.release().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockUsbBus;
    use kiosk_core::config::UsbConfig;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_dispatch_to_mock() {
        let (mock, handle) = MockTrigger::new();
        let mut device = AnyTriggerDevice::from(mock);

        assert_eq!(device.kind(), DeviceKind::Network);
        assert_eq!(device.address().as_deref(), Some("mock.local"));

        device.connect().await.unwrap();
        let outcome = device.trigger(300).await.unwrap();
        assert_eq!(outcome.duration_ms, Some(300));
        assert_eq!(handle.trigger_count(), 1);
    }

    #[tokio::test]
    async fn test_dispatch_to_local_bus() {
        let (bus, _handle) = MockUsbBus::new();
        let mut device =
            AnyTriggerDevice::from(LocalBusDevice::new(Arc::new(bus), UsbConfig::default()));

        assert_eq!(device.kind(), DeviceKind::LocalBus);
        assert!(device.address().is_none());
        device.connect().await.unwrap();
        assert!(device.is_connected());
        device.release().await;
        assert!(!device.is_connected());
    }
}
