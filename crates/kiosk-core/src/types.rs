//! Data model shared by the dispense flow, the devices and the UI boundary.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};
use std::time::{Duration, Instant};

/// Phase of the dispense lifecycle.
///
/// Exactly one state is active at a time. The kiosk starts in
/// `Initializing`, waits in `Connecting` until a trigger device is bound and
/// then cycles `ScanReady → ScanSuccess → Dispensing → Complete → ScanReady`.
/// `Error` is left only through an explicit reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DispenseState {
    /// Process started, nothing bound yet.
    Initializing,

    /// Waiting for the operator to bind a trigger device.
    Connecting,

    /// Device bound, accepting scanned codes.
    ScanReady,

    /// A code was accepted and is shown to the customer.
    ScanSuccess,

    /// The relay is being pulsed.
    Dispensing,

    /// The card was released.
    Complete,

    /// The last cycle failed; waiting for operator retry.
    Error,
}

impl DispenseState {
    /// Whether new codes may start a dispense cycle in this state.
    pub fn accepts_scans(&self) -> bool {
        matches!(self, Self::ScanReady)
    }
}

impl fmt::Display for DispenseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Initializing => "Initializing",
            Self::Connecting => "Connecting",
            Self::ScanReady => "ScanReady",
            Self::ScanSuccess => "ScanSuccess",
            Self::Dispensing => "Dispensing",
            Self::Complete => "Complete",
            Self::Error => "Error",
        };
        write!(f, "{}", name)
    }
}

/// Transport used to reach the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    /// LAN-attached microcontroller driven over HTTP.
    Network,

    /// USB relay board wired directly to the kiosk.
    LocalBus,
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network => write!(f, "Network"),
            Self::LocalBus => write!(f, "LocalBus"),
        }
    }
}

/// Observable context of the dispense state machine.
///
/// Observers only ever receive copies of this struct. The machine keeps
/// these invariants:
///
/// - `barcode` is set from `ScanSuccess` onward until the next reset.
/// - `error_message` is `Some` exactly when `state == Error`.
/// - `device_kind` / `device_address` are set on connection and cleared only
///   on disconnect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateContext {
    pub state: DispenseState,
    pub barcode: Option<String>,
    pub error_message: Option<String>,
    pub device_kind: Option<DeviceKind>,
    pub device_address: Option<String>,
}

impl StateContext {
    /// Context at process start.
    pub fn initial() -> Self {
        Self {
            state: DispenseState::Initializing,
            barcode: None,
            error_message: None,
            device_kind: None,
            device_address: None,
        }
    }
}

impl Default for StateContext {
    fn default() -> Self {
        Self::initial()
    }
}

/// Result of a single trigger attempt.
///
/// Produced once per attempt and never retried internally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerOutcome {
    /// Whether the relay was pulsed.
    pub ok: bool,

    /// Pulse length reported by the device, on success.
    pub duration_ms: Option<u64>,

    /// Human-readable failure cause, on failure.
    pub message: Option<String>,
}

impl TriggerOutcome {
    /// Successful pulse of the given length.
    pub fn success(duration_ms: u64) -> Self {
        Self {
            ok: true,
            duration_ms: Some(duration_ms),
            message: None,
        }
    }

    /// Failed attempt with a cause.
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            duration_ms: None,
            message: Some(message.into()),
        }
    }

    /// Pulse length as a [`Duration`], if the attempt succeeded.
    pub fn duration(&self) -> Option<Duration> {
        self.duration_ms.map(Duration::from_millis)
    }
}

/// A decoded code as delivered by the barcode decoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectionEvent {
    pub code: String,
    pub observed_at: Instant,
}

impl DetectionEvent {
    pub fn new(code: impl Into<String>, observed_at: Instant) -> Self {
        Self {
            code: code.into(),
            observed_at,
        }
    }

    /// Time elapsed between this event and a later instant.
    ///
    /// Saturates to zero if `later` is before this event.
    pub fn age_at(&self, later: Instant) -> Duration {
        later.saturating_duration_since(self.observed_at)
    }
}

/// Normalise an operator-entered relay controller address.
///
/// Accepts `host` or `host:port`, optionally written with an `http://`
/// scheme or a trailing slash, and returns the bare `host[:port]` form.
///
/// # Errors
///
/// Returns [`Error::InvalidAddress`] for blank input or input containing
/// whitespace or a path.
pub fn normalize_address(input: &str) -> Result<String> {
    let trimmed = input.trim();
    let bare = trimmed
        .strip_prefix("http://")
        .unwrap_or(trimmed)
        .trim_end_matches('/');

    if bare.is_empty() || bare.contains(char::is_whitespace) || bare.contains('/') {
        return Err(Error::InvalidAddress(input.to_string()));
    }
    Ok(bare.to_string())
}
