//! libusb backend for the USB relay board.

use rusb::{
    Context, Device, DeviceHandle, Direction, Hotplug, HotplugBuilder, Recipient, RequestType,
    UsbContext,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{HardwareError, Result};
use crate::usb::{DisconnectNotifier, RelayHandle, UsbBus};

/// How often the hotplug thread wakes up to check for shutdown.
const EVENT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// USB bus backed by a libusb context.
pub struct RusbBus {
    context: Context,
    transfer_timeout: Duration,
    watcher: Mutex<Option<HotplugWatcher>>,
}

impl RusbBus {
    /// Initialise libusb.
    ///
    /// # Errors
    ///
    /// Returns [`HardwareError::Initialization`] if libusb is unavailable.
    pub fn new(transfer_timeout: Duration) -> Result<Self> {
        let context =
            Context::new().map_err(|e| HardwareError::initialization(format!("libusb: {e}")))?;
        Ok(Self {
            context,
            transfer_timeout,
            watcher: Mutex::new(None),
        })
    }
}

impl UsbBus for RusbBus {
    fn open(&self, vendor_id: u16, product_id: u16) -> Result<Arc<dyn RelayHandle>> {
        let label = format!("usb {vendor_id:04x}:{product_id:04x}");
        let mut handle = self
            .context
            .open_device_with_vid_pid(vendor_id, product_id)
            .ok_or_else(|| HardwareError::connection(&label, "device not found or not accessible"))?;

        // Best effort: the board binds to usbhid on Linux.
        if let Err(e) = handle.set_auto_detach_kernel_driver(true) {
            debug!(error = %e, "Kernel driver auto-detach unsupported");
        }

        Ok(Arc::new(RusbHandle {
            handle: Mutex::new(handle),
            timeout: self.transfer_timeout,
        }))
    }

    fn watch_removal(
        &self,
        vendor_id: u16,
        product_id: u16,
        notifier: DisconnectNotifier,
    ) -> Result<()> {
        if !rusb::has_hotplug() {
            return Err(HardwareError::initialization(
                "hotplug not supported on this platform",
            ));
        }

        let mut watcher = self.watcher.lock().unwrap_or_else(|p| p.into_inner());
        // Replacing the watcher stops the previous event thread.
        *watcher = Some(HotplugWatcher::start(
            self.context.clone(),
            vendor_id,
            product_id,
            notifier,
        )?);
        Ok(())
    }
}

struct RusbHandle {
    handle: Mutex<DeviceHandle<Context>>,
    timeout: Duration,
}

impl RusbHandle {
    fn lock(&self) -> MutexGuard<'_, DeviceHandle<Context>> {
        self.handle.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl RelayHandle for RusbHandle {
    fn active_configuration(&self) -> Result<Option<u8>> {
        match self.lock().active_configuration() {
            Ok(0) => Ok(None),
            Ok(value) => Ok(Some(value)),
            Err(e) => Err(HardwareError::transfer(format!("get configuration: {e}"))),
        }
    }

    fn select_configuration(&self, configuration: u8) -> Result<()> {
        self.lock()
            .set_active_configuration(configuration)
            .map_err(|e| HardwareError::transfer(format!("select configuration: {e}")))
    }

    fn claim_interface(&self, interface: u8) -> Result<()> {
        self.lock()
            .claim_interface(interface)
            .map_err(|e| HardwareError::transfer(format!("claim interface {interface}: {e}")))
    }

    fn release_interface(&self, interface: u8) -> Result<()> {
        self.lock()
            .release_interface(interface)
            .map_err(|e| HardwareError::transfer(format!("release interface {interface}: {e}")))
    }

    fn control_out(&self, request: u8, value: u16, index: u16, payload: &[u8]) -> Result<usize> {
        let request_type =
            rusb::request_type(Direction::Out, RequestType::Class, Recipient::Interface);
        self.lock()
            .write_control(request_type, request, value, index, payload, self.timeout)
            .map_err(|e| HardwareError::transfer(e.to_string()))
    }
}

struct RemovalCallback {
    vendor_id: u16,
    product_id: u16,
    notifier: DisconnectNotifier,
}

impl Hotplug<Context> for RemovalCallback {
    fn device_arrived(&mut self, _device: Device<Context>) {}

    fn device_left(&mut self, device: Device<Context>) {
        let matches = device
            .device_descriptor()
            .map(|d| d.vendor_id() == self.vendor_id && d.product_id() == self.product_id)
            .unwrap_or(true);
        if matches {
            self.notifier.notify();
        }
    }
}

/// Background thread pumping libusb events for the hotplug callback.
struct HotplugWatcher {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl HotplugWatcher {
    fn start(
        context: Context,
        vendor_id: u16,
        product_id: u16,
        notifier: DisconnectNotifier,
    ) -> Result<Self> {
        let callback: Box<dyn Hotplug<Context>> = Box::new(RemovalCallback {
            vendor_id,
            product_id,
            notifier,
        });
        let registration = HotplugBuilder::new()
            .vendor_id(vendor_id)
            .product_id(product_id)
            .enumerate(false)
            .register(&context, callback)
            .map_err(|e| HardwareError::initialization(format!("hotplug register: {e}")))?;

        let stop = Arc::new(AtomicBool::new(false));
        let flag = stop.clone();
        let thread = std::thread::Builder::new()
            .name("usb-hotplug".to_string())
            .spawn(move || {
                let _registration = registration;
                while !flag.load(Ordering::Relaxed) {
                    if let Err(e) = context.handle_events(Some(EVENT_POLL_INTERVAL)) {
                        warn!(error = %e, "libusb event loop failed");
                        break;
                    }
                }
                debug!("USB hotplug watcher stopped");
            })
            .map_err(|e| HardwareError::initialization(format!("hotplug thread: {e}")))?;

        info!(vendor_id, product_id, "Watching USB relay removal");
        Ok(Self {
            stop,
            thread: Some(thread),
        })
    }
}

impl Drop for HotplugWatcher {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}
