//! Mock device implementations for testing and development.
//!
//! This module provides simulated devices that can be controlled
//! programmatically without physical hardware.

pub mod trigger;
pub mod usb_bus;

// Re-export commonly used types
pub use trigger::{MockTrigger, MockTriggerHandle};
pub use usb_bus::{BusCall, BusFailure, MockUsbBus, MockUsbBusHandle};
