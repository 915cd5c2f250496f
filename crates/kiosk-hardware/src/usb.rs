//! USB relay board driven by HID class control transfers.
//!
//! The board is a single-channel relay that enumerates with a fixed
//! vendor/product pair. Closing the relay is one 8-byte SET_REPORT frame to
//! interface 0, opening it is another; a trigger is ON, wait, OFF.
//!
//! ```text
//! connect:  open(vid, pid) ─> [select configuration if none] ─> claim interface 0
//! trigger:  control_out(ON) ─> sleep(duration) ─> control_out(OFF)
//! release:  release interface 0 ─> close
//! ```
//!
//! Bus access goes through the [`UsbBus`] and [`RelayHandle`] seams so the
//! device logic runs the same against libusb
//! ([`RusbBus`](crate::rusb_bus::RusbBus), feature `hardware-usb`) and the
//! in-memory bus used in tests ([`MockUsbBus`](crate::mock::MockUsbBus)).
//! Bus calls are blocking and run on tokio's blocking pool.

use kiosk_core::config::UsbConfig;
use kiosk_core::constants::{
    RELAY_OFF_FRAME, RELAY_ON_FRAME, USB_RELAY_INDEX, USB_RELAY_REQUEST, USB_RELAY_VALUE,
};
use kiosk_core::{DeviceKind, TriggerOutcome};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{HardwareError, Result};
use crate::traits::TriggerDevice;

/// An opened relay board.
///
/// Methods block; callers run them off the async executor.
pub trait RelayHandle: Send + Sync {
    /// Currently active configuration, `None` when unconfigured.
    fn active_configuration(&self) -> Result<Option<u8>>;

    fn select_configuration(&self, configuration: u8) -> Result<()>;

    fn claim_interface(&self, interface: u8) -> Result<()>;

    fn release_interface(&self, interface: u8) -> Result<()>;

    /// Host-to-device class control transfer with interface recipient.
    fn control_out(&self, request: u8, value: u16, index: u16, payload: &[u8]) -> Result<usize>;
}

/// Access to the USB bus.
pub trait UsbBus: Send + Sync {
    /// Open the first device matching the vendor/product pair.
    ///
    /// # Errors
    ///
    /// Returns [`HardwareError::Connection`] when no matching device is
    /// present or it cannot be opened.
    fn open(&self, vendor_id: u16, product_id: u16) -> Result<Arc<dyn RelayHandle>>;

    /// Deliver removal of the vendor/product pair to `notifier`.
    ///
    /// Buses without hotplug support leave this as a no-op.
    fn watch_removal(
        &self,
        _vendor_id: u16,
        _product_id: u16,
        _notifier: DisconnectNotifier,
    ) -> Result<()> {
        Ok(())
    }
}

type HandleSlot = Arc<Mutex<Option<Arc<dyn RelayHandle>>>>;

fn lock_slot(slot: &HandleSlot) -> MutexGuard<'_, Option<Arc<dyn RelayHandle>>> {
    slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Delivers the bus-level "device removed" signal to a [`LocalBusDevice`].
///
/// Cloneable and usable from any thread, including libusb's event thread.
#[derive(Clone)]
pub struct DisconnectNotifier {
    slot: HandleSlot,
}

impl DisconnectNotifier {
    /// Force the device disconnected and drop its handle.
    ///
    /// Does not touch the dispense state; the next trigger reports the
    /// device as not ready.
    pub fn notify(&self) {
        if lock_slot(&self.slot).take().is_some() {
            warn!("USB relay removed from bus");
        }
    }
}

impl fmt::Debug for DisconnectNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DisconnectNotifier").finish_non_exhaustive()
    }
}

/// USB relay board.
pub struct LocalBusDevice {
    bus: Arc<dyn UsbBus>,
    config: UsbConfig,
    slot: HandleSlot,
}

impl LocalBusDevice {
    pub fn new(bus: Arc<dyn UsbBus>, config: UsbConfig) -> Self {
        Self {
            bus,
            config,
            slot: Arc::new(Mutex::new(None)),
        }
    }

    /// Handle through which bus removal events reach this device.
    pub fn disconnect_notifier(&self) -> DisconnectNotifier {
        DisconnectNotifier {
            slot: self.slot.clone(),
        }
    }

    pub fn config(&self) -> &UsbConfig {
        &self.config
    }

    fn label(&self) -> String {
        format!(
            "usb relay {:04x}:{:04x}",
            self.config.vendor_id, self.config.product_id
        )
    }

    fn current_handle(&self) -> Option<Arc<dyn RelayHandle>> {
        lock_slot(&self.slot).clone()
    }

    async fn send_frame(
        &self,
        handle: Arc<dyn RelayHandle>,
        frame: [u8; 8],
        name: &'static str,
    ) -> Result<()> {
        let written = run_blocking(move || {
            handle.control_out(USB_RELAY_REQUEST, USB_RELAY_VALUE, USB_RELAY_INDEX, &frame)
        })
        .await
        .map_err(|e| match e {
            HardwareError::HardwareTransfer { .. } => e,
            other => HardwareError::transfer(format!("relay {name}: {other}")),
        })?;

        debug!(frame = name, written, "Relay frame sent");
        Ok(())
    }
}

impl fmt::Debug for LocalBusDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalBusDevice")
            .field("config", &self.config)
            .field("connected", &self.is_connected())
            .finish()
    }
}

impl TriggerDevice for LocalBusDevice {
    fn kind(&self) -> DeviceKind {
        DeviceKind::LocalBus
    }

    fn address(&self) -> Option<String> {
        None
    }

    fn is_connected(&self) -> bool {
        lock_slot(&self.slot).is_some()
    }

    async fn connect(&mut self) -> Result<()> {
        if self.is_connected() {
            debug!("USB relay already connected");
            return Ok(());
        }

        let bus = self.bus.clone();
        let UsbConfig {
            vendor_id,
            product_id,
            interface,
            configuration,
            ..
        } = self.config.clone();

        let handle = run_blocking(move || {
            let handle = bus.open(vendor_id, product_id)?;
            if handle.active_configuration()?.is_none() {
                debug!(configuration, "Selecting USB configuration");
                handle.select_configuration(configuration)?;
            }
            handle.claim_interface(interface)?;
            Ok(handle)
        })
        .await?;

        *lock_slot(&self.slot) = Some(handle);
        info!(device = %self.label(), "USB relay connected");

        if let Err(e) = self
            .bus
            .watch_removal(vendor_id, product_id, self.disconnect_notifier())
        {
            warn!(error = %e, "USB removal notifications unavailable");
        }

        Ok(())
    }

    async fn health_check(&mut self) -> Result<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(HardwareError::device_not_ready(self.label()))
        }
    }

    async fn trigger(&mut self, duration_ms: u64) -> Result<TriggerOutcome> {
        let handle = self
            .current_handle()
            .ok_or_else(|| HardwareError::device_not_ready(self.label()))?;

        debug!(duration_ms, "Pulsing USB relay");
        self.send_frame(handle.clone(), RELAY_ON_FRAME, "on").await?;
        tokio::time::sleep(Duration::from_millis(duration_ms)).await;
        self.send_frame(handle, RELAY_OFF_FRAME, "off").await?;

        info!(duration_ms, "USB relay pulsed");
        Ok(TriggerOutcome::success(duration_ms))
    }

    async fn release(&mut self) {
        let Some(handle) = lock_slot(&self.slot).take() else {
            return;
        };

        let interface = self.config.interface;
        let released = run_blocking(move || {
            handle.release_interface(interface)
            // handle dropped here, closing the device
        })
        .await;

        match released {
            Ok(()) => info!("USB relay released"),
            Err(e) => debug!(error = %e, "Ignoring USB release failure"),
        }
    }
}

async fn run_blocking<T, F>(f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| HardwareError::transfer(format!("USB worker failed: {e}")))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{BusCall, MockUsbBus};

    fn device() -> (LocalBusDevice, crate::mock::MockUsbBusHandle) {
        let (bus, handle) = MockUsbBus::new();
        (LocalBusDevice::new(Arc::new(bus), UsbConfig::default()), handle)
    }

    #[tokio::test]
    async fn test_connect_selects_configuration_when_unconfigured() {
        let (mut device, bus) = device();
        bus.set_active_configuration(None);

        device.connect().await.unwrap();

        assert!(device.is_connected());
        assert_eq!(
            bus.calls(),
            vec![
                BusCall::Open {
                    vendor_id: 0x16c0,
                    product_id: 0x05df
                },
                BusCall::ActiveConfiguration,
                BusCall::SelectConfiguration(1),
                BusCall::ClaimInterface(0),
            ]
        );
    }

    #[tokio::test]
    async fn test_connect_skips_selection_when_configured() {
        let (mut device, bus) = device();
        bus.set_active_configuration(Some(1));

        device.connect().await.unwrap();

        assert!(!bus.calls().contains(&BusCall::SelectConfiguration(1)));
        assert!(bus.calls().contains(&BusCall::ClaimInterface(0)));
    }

    #[tokio::test]
    async fn test_trigger_when_disconnected_sends_nothing() {
        let (mut device, bus) = device();

        let err = device.trigger(250).await.unwrap_err();

        assert!(matches!(err, HardwareError::DeviceNotReady { .. }));
        assert!(bus.calls().is_empty());
    }

    #[tokio::test]
    async fn test_health_check_mirrors_connection() {
        let (mut device, _bus) = device();
        assert!(device.health_check().await.is_err());
        device.connect().await.unwrap();
        assert!(device.health_check().await.is_ok());
    }
}
