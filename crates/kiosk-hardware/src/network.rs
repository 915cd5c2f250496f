//! Relay controller reached over the LAN.

use kiosk_core::{DeviceKind, TriggerOutcome, normalize_address};
use kiosk_network::RelayClient;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{HardwareError, Result};
use crate::traits::TriggerDevice;

/// HTTP relay controller.
///
/// The device is only a connected flag and an address on top of a
/// [`RelayClient`]. Changing the address drops the connected flag until the
/// next successful health check.
///
/// # Examples
///
/// ```no_run
/// use kiosk_hardware::network::NetworkDevice;
/// use kiosk_hardware::traits::TriggerDevice;
/// use kiosk_network::{RelayClient, RelayClientConfig};
///
/// # async fn example() -> kiosk_hardware::Result<()> {
/// let client = RelayClient::new(RelayClientConfig::default())
///     .map_err(|e| kiosk_hardware::HardwareError::initialization(e.to_string()))?;
/// let mut device = NetworkDevice::new(client);
/// device.set_address("192.168.4.1")?;
///
/// device.connect().await?;
/// let outcome = device.trigger(250).await?;
/// assert!(outcome.ok);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct NetworkDevice {
    client: RelayClient,
    address: Option<String>,
    connected: bool,
    last_latency: Option<Duration>,
}

impl NetworkDevice {
    /// Create a device with no address set.
    pub fn new(client: RelayClient) -> Self {
        Self {
            client,
            address: None,
            connected: false,
            last_latency: None,
        }
    }

    /// Create a device bound to `address`.
    ///
    /// # Errors
    ///
    /// Returns [`HardwareError::Configuration`] for a blank or malformed address.
    pub fn with_address(client: RelayClient, address: &str) -> Result<Self> {
        let mut device = Self::new(client);
        device.set_address(address)?;
        Ok(device)
    }

    /// Point the device at a new controller address (`host` or `host:port`).
    ///
    /// Always marks the device disconnected.
    ///
    /// # Errors
    ///
    /// Returns [`HardwareError::Configuration`] for a blank or malformed
    /// address; the previous address is kept in that case.
    pub fn set_address(&mut self, address: &str) -> Result<()> {
        let address = normalize_address(address)?;
        debug!(address = %address, "Network relay address set");
        self.address = Some(address);
        self.connected = false;
        self.last_latency = None;
        Ok(())
    }

    /// Round-trip time of the last successful health check.
    pub fn last_latency(&self) -> Option<Duration> {
        self.last_latency
    }

    fn require_address(&self) -> Result<String> {
        self.address
            .clone()
            .ok_or_else(|| HardwareError::device_not_ready("network relay (no address)"))
    }
}

impl TriggerDevice for NetworkDevice {
    fn kind(&self) -> DeviceKind {
        DeviceKind::Network
    }

    fn address(&self) -> Option<String> {
        self.address.clone()
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn connect(&mut self) -> Result<()> {
        self.health_check().await
    }

    async fn health_check(&mut self) -> Result<()> {
        let address = self.require_address()?;

        match self.client.health(&address).await {
            Ok(report) => {
                self.connected = true;
                self.last_latency = Some(report.latency);
                info!(
                    address = %address,
                    latency_ms = report.latency.as_millis() as u64,
                    "Relay controller healthy"
                );
                if let Some(body) = report.body {
                    debug!(address = %address, body = %body, "Health payload");
                }
                Ok(())
            }
            Err(e) => {
                self.connected = false;
                warn!(address = %address, error = %e, "Relay controller health check failed");
                Err(HardwareError::from_client(&address, e))
            }
        }
    }

    async fn trigger(&mut self, duration_ms: u64) -> Result<TriggerOutcome> {
        let address = self.require_address()?;

        // The controller owns the pulse length and reports it back.
        debug!(address = %address, requested_ms = duration_ms, "Triggering network relay");

        match self.client.trigger(&address).await {
            Ok(ack) => {
                info!(address = %address, duration_ms = ack.duration_ms, "Relay triggered");
                Ok(TriggerOutcome::success(ack.duration_ms))
            }
            Err(e) => {
                warn!(address = %address, error = %e, "Relay trigger failed");
                Err(HardwareError::from_client(&address, e))
            }
        }
    }

    async fn release(&mut self) {
        if self.connected {
            debug!(address = ?self.address, "Releasing network relay");
        }
        self.connected = false;
    }
}
