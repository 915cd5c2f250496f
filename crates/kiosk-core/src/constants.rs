//! Core constants for the dispense kiosk.
//!
//! This module centralises every fixed value the kiosk relies on: relay
//! controller endpoints, timing of the dispense cycle, the USB relay
//! identity and its command frames, and the discovery sweep policy.
//! Runtime configuration ([`KioskConfig`](crate::KioskConfig)) defaults to
//! these values.
//!
//! # Usage
//!
//! ```
//! use kiosk_core::constants::*;
//! use std::time::Duration;
//!
//! let settle = Duration::from_millis(SETTLE_DELAY_MS);
//! assert_eq!(settle.as_millis(), 500);
//!
//! assert_eq!(RELAY_ON_FRAME[0], 0xFF);
//! assert_eq!(RELAY_OFF_FRAME[0], 0xFC);
//! ```

// ============================================================================
// Network relay controller
// ============================================================================

/// Path of the health probe endpoint on the relay controller.
pub const HEALTH_PATH: &str = "/health";

/// Path of the trigger endpoint on the relay controller.
pub const TRIGGER_PATH: &str = "/trigger";

/// Timeout applied to every health check and trigger request (5 seconds).
pub const REQUEST_TIMEOUT_MS: u64 = 5000;

/// Relay pulse reported when the controller omits `duration` in its reply.
pub const DEFAULT_RELAY_DURATION_MS: u64 = 250;

/// Port the relay controller listens on unless configured otherwise.
pub const DEFAULT_HTTP_PORT: u16 = 80;

// ============================================================================
// Discovery sweep
// ============================================================================

/// /24 prefixes swept when looking for the relay controller.
///
/// These are the address ranges handed out by the consumer routers and the
/// controller's own soft-AP; they are policy, not derived from the host's
/// interfaces.
pub const DISCOVERY_PREFIXES: [&str; 3] = ["192.168.0", "192.168.1", "192.168.4"];

/// First host suffix probed in each prefix.
pub const FIRST_HOST: u8 = 1;

/// Last host suffix probed in each prefix.
pub const LAST_HOST: u8 = 254;

/// Timeout of a single discovery probe (1 second).
pub const PROBE_TIMEOUT_MS: u64 = 1000;

/// Number of settled probes between two progress reports.
pub const PROGRESS_EVERY: usize = 100;

// ============================================================================
// Dispense cycle timing
// ============================================================================

/// Pause between scan confirmation and relay activation.
pub const SETTLE_DELAY_MS: u64 = 500;

/// How long the relay is held closed for one dispense.
pub const RELAY_PULSE_MS: u64 = 250;

/// How long the completion screen stays up before the kiosk resets.
pub const COMPLETE_DWELL_MS: u64 = 2000;

/// Window in which a repeated read of the same code is ignored.
pub const DEBOUNCE_WINDOW_MS: u64 = 3000;

// ============================================================================
// USB relay (HID class, single channel)
// ============================================================================

/// Vendor identifier of the supported USB relay board.
pub const USB_RELAY_VENDOR_ID: u16 = 0x16c0;

/// Product identifier of the supported USB relay board.
pub const USB_RELAY_PRODUCT_ID: u16 = 0x05df;

/// Interface claimed on the relay board.
pub const USB_RELAY_INTERFACE: u8 = 0;

/// Configuration selected when the board has none active.
pub const USB_RELAY_CONFIGURATION: u8 = 1;

/// Class request code used for the relay command (HID SET_REPORT).
pub const USB_RELAY_REQUEST: u8 = 0x09;

/// `wValue` of the relay command (feature report, id 0).
pub const USB_RELAY_VALUE: u16 = 0x0300;

/// `wIndex` of the relay command.
pub const USB_RELAY_INDEX: u16 = 0x00;

/// Timeout handed to libusb for each control transfer.
pub const USB_TRANSFER_TIMEOUT_MS: u64 = 1000;

/// Command frame closing relay channel 1.
pub const RELAY_ON_FRAME: [u8; 8] = [0xFF, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00];

/// Command frame opening relay channel 1.
pub const RELAY_OFF_FRAME: [u8; 8] = [0xFC, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00];

// ============================================================================
// Diagnostics and persistence
// ============================================================================

/// Maximum number of events retained by the in-memory event sink.
pub const MAX_RETAINED_EVENTS: usize = 200;

/// Maximum number of state transitions kept for diagnostics.
pub const MAX_TRANSITION_HISTORY: usize = 100;

/// Settings key under which the last connected network address is stored.
pub const LAST_ADDRESS_KEY: &str = "last_network_address";

/// Default SQLite database file.
pub const DEFAULT_DATABASE_PATH: &str = "kiosk.db";
