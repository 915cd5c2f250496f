//! Trigger device capability.
//!
//! A trigger device is anything that can pulse the dispenser relay for a
//! given time. Two transports implement it: a LAN-attached controller
//! driven over HTTP ([`NetworkDevice`](crate::network::NetworkDevice)) and
//! a USB relay board ([`LocalBusDevice`](crate::usb::LocalBusDevice)).
//!
//! The trait uses native `async fn` methods (Edition 2024), so it is not
//! object-safe. Hold devices either through a generic parameter or through
//! the [`AnyTriggerDevice`](crate::devices::AnyTriggerDevice) enum.

#![allow(async_fn_in_trait)]

use kiosk_core::{DeviceKind, TriggerOutcome};

use crate::error::Result;

/// Relay trigger capability shared by every transport.
///
/// # Examples
///
/// ```no_run
/// use kiosk_hardware::traits::TriggerDevice;
/// use kiosk_hardware::Result;
///
/// async fn pulse_once<D: TriggerDevice>(device: &mut D) -> Result<u64> {
///     if !device.is_connected() {
///         device.connect().await?;
///     }
///     let outcome = device.trigger(250).await?;
///     Ok(outcome.duration_ms.unwrap_or(250))
/// }
/// ```
pub trait TriggerDevice: Send + Sync {
    /// Transport of this device.
    fn kind(&self) -> DeviceKind;

    /// Address shown to the operator, if the transport has one.
    fn address(&self) -> Option<String>;

    /// Whether the last connect or health check succeeded and the device
    /// has not been released or unplugged since.
    fn is_connected(&self) -> bool;

    /// Establish the transport.
    ///
    /// # Errors
    ///
    /// Returns an error if any connection step fails. The device is left
    /// disconnected.
    async fn connect(&mut self) -> Result<()>;

    /// Check the device is still usable.
    ///
    /// Network devices issue a health request and update their connected
    /// flag from the result. Bus devices treat "connected" as "healthy".
    ///
    /// # Errors
    ///
    /// Returns an error if the device is unreachable or not connected.
    async fn health_check(&mut self) -> Result<()>;

    /// Pulse the relay for `duration_ms`.
    ///
    /// Each call is a single attempt; nothing is retried internally.
    ///
    /// # Errors
    ///
    /// - [`DeviceNotReady`](crate::HardwareError::DeviceNotReady) when the
    ///   device cannot be used, without touching the transport
    /// - any transport failure of the attempt
    async fn trigger(&mut self, duration_ms: u64) -> Result<TriggerOutcome>;

    /// Close the transport. Failures are ignored; the device always ends
    /// disconnected.
    async fn release(&mut self);

    /// Run [`trigger`](Self::trigger) and fold any error into a failed
    /// [`TriggerOutcome`].
    async fn attempt(&mut self, duration_ms: u64) -> TriggerOutcome {
        match self.trigger(duration_ms).await {
            Ok(outcome) => outcome,
            Err(e) => e.into(),
        }
    }
}
