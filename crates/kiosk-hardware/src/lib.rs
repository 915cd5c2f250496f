//! Trigger device abstraction for the photo card kiosk.
//!
//! The dispenser releases a card when its relay is pulsed. This crate puts
//! the two ways of reaching that relay behind one capability,
//! [`TriggerDevice`]:
//!
//! - [`NetworkDevice`]: a microcontroller on the LAN, driven over HTTP
//!   through [`kiosk_network::RelayClient`]
//! - [`LocalBusDevice`]: a USB relay board driven by class control
//!   transfers, with libusb as the backend (`hardware-usb` feature)
//!
//! # Design
//!
//! - **Async-first**: every I/O operation is a native `async fn` in the trait
//!   (Edition 2024).
//! - **Enum dispatch**: [`AnyTriggerDevice`] gives runtime polymorphism
//!   without trait objects.
//! - **Typed failures**: every operation returns [`Result<T>`] with a
//!   [`HardwareError`] whose message is shown to the operator.
//! - **Single attempt**: nothing here retries. Recovery belongs to the
//!   operator.
//!
//! # Example
//!
//! ```no_run
//! use kiosk_hardware::{AnyTriggerDevice, NetworkDevice, TriggerDevice};
//! use kiosk_network::{RelayClient, RelayClientConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = RelayClient::new(RelayClientConfig::default())?;
//! let mut device = AnyTriggerDevice::from(NetworkDevice::with_address(client, "192.168.4.1")?);
//!
//! device.connect().await?;
//! let outcome = device.attempt(250).await;
//! println!("dispensed: {}", outcome.ok);
//! # Ok(())
//! # }
//! ```
//!
//! # Mock Implementations
//!
//! The [`mock`] module provides a scriptable trigger device and an
//! in-memory USB bus for development and tests.

pub mod devices;
pub mod error;
pub mod mock;
pub mod network;
#[cfg(feature = "hardware-usb")]
pub mod rusb_bus;
pub mod traits;
pub mod usb;

// Re-export commonly used types for convenience
pub use devices::AnyTriggerDevice;
pub use error::{HardwareError, Result};
pub use network::NetworkDevice;
#[cfg(feature = "hardware-usb")]
pub use rusb_bus::RusbBus;
pub use traits::TriggerDevice;
pub use usb::{DisconnectNotifier, LocalBusDevice, RelayHandle, UsbBus};
