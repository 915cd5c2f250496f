//! Mock trigger device for testing and development.

use kiosk_core::{DeviceKind, TriggerOutcome};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::{HardwareError, Result};
use crate::traits::TriggerDevice;

#[derive(Debug)]
struct MockTriggerState {
    connected: bool,
    connect_failure: Option<HardwareError>,
    health_failure: Option<HardwareError>,
    scripted: VecDeque<HardwareError>,
    triggers: Vec<u64>,
    connects: usize,
    releases: usize,
}

/// Trigger device whose behaviour is scripted through a [`MockTriggerHandle`].
///
/// Triggers succeed with the requested duration unless a failure was queued.
///
/// # Examples
///
/// ```
/// use kiosk_hardware::HardwareError;
/// use kiosk_hardware::mock::MockTrigger;
/// use kiosk_hardware::traits::TriggerDevice;
///
/// #[tokio::main]
/// async fn main() -> kiosk_hardware::Result<()> {
///     let (mut device, handle) = MockTrigger::new();
///     device.connect().await?;
///
///     let outcome = device.trigger(250).await?;
///     assert_eq!(outcome.duration_ms, Some(250));
///
///     handle.fail_next_trigger(HardwareError::protocol("HTTP 500"));
///     assert!(device.trigger(250).await.is_err());
///     assert_eq!(handle.trigger_count(), 2);
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct MockTrigger {
    kind: DeviceKind,
    address: Option<String>,
    state: Arc<Mutex<MockTriggerState>>,
}

impl MockTrigger {
    /// Create a mock that reports itself as a network device at `mock.local`.
    pub fn new() -> (Self, MockTriggerHandle) {
        Self::with_identity(DeviceKind::Network, Some("mock.local".to_string()))
    }

    /// Create a mock reporting the given kind and address.
    pub fn with_identity(kind: DeviceKind, address: Option<String>) -> (Self, MockTriggerHandle) {
        let state = Arc::new(Mutex::new(MockTriggerState {
            connected: false,
            connect_failure: None,
            health_failure: None,
            scripted: VecDeque::new(),
            triggers: Vec::new(),
            connects: 0,
            releases: 0,
        }));

        let device = Self {
            kind,
            address,
            state: state.clone(),
        };
        (device, MockTriggerHandle { state })
    }

    fn lock(&self) -> MutexGuard<'_, MockTriggerState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl TriggerDevice for MockTrigger {
    fn kind(&self) -> DeviceKind {
        self.kind
    }

    fn address(&self) -> Option<String> {
        self.address.clone()
    }

    fn is_connected(&self) -> bool {
        self.lock().connected
    }

    async fn connect(&mut self) -> Result<()> {
        let mut state = self.lock();
        state.connects += 1;
        if let Some(error) = state.connect_failure.take() {
            state.connected = false;
            return Err(error);
        }
        state.connected = true;
        Ok(())
    }

    async fn health_check(&mut self) -> Result<()> {
        let mut state = self.lock();
        if let Some(error) = state.health_failure.take() {
            return Err(error);
        }
        if state.connected {
            Ok(())
        } else {
            Err(HardwareError::device_not_ready("mock trigger"))
        }
    }

    async fn trigger(&mut self, duration_ms: u64) -> Result<TriggerOutcome> {
        let mut state = self.lock();
        if !state.connected {
            return Err(HardwareError::device_not_ready("mock trigger"));
        }
        state.triggers.push(duration_ms);
        match state.scripted.pop_front() {
            Some(error) => Err(error),
            None => Ok(TriggerOutcome::success(duration_ms)),
        }
    }

    async fn release(&mut self) {
        let mut state = self.lock();
        state.connected = false;
        state.releases += 1;
    }
}

/// Control handle for a [`MockTrigger`]. Cloneable.
#[derive(Debug, Clone)]
pub struct MockTriggerHandle {
    state: Arc<Mutex<MockTriggerState>>,
}

impl MockTriggerHandle {
    fn lock(&self) -> MutexGuard<'_, MockTriggerState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Make the next `connect` fail with `error`.
    pub fn fail_next_connect(&self, error: HardwareError) {
        self.lock().connect_failure = Some(error);
    }

    /// Make the next `health_check` fail with `error`.
    pub fn fail_next_health_check(&self, error: HardwareError) {
        self.lock().health_failure = Some(error);
    }

    /// Queue a failure for a future trigger (FIFO).
    pub fn fail_next_trigger(&self, error: HardwareError) {
        self.lock().scripted.push_back(error);
    }

    /// Simulate the device vanishing or reappearing.
    pub fn set_connected(&self, connected: bool) {
        self.lock().connected = connected;
    }

    /// Number of trigger attempts that reached the device.
    pub fn trigger_count(&self) -> usize {
        self.lock().triggers.len()
    }

    /// Durations requested by each trigger attempt, in order.
    pub fn trigger_durations(&self) -> Vec<u64> {
        self.lock().triggers.clone()
    }

    pub fn connect_count(&self) -> usize {
        self.lock().connects
    }

    pub fn release_count(&self) -> usize {
        self.lock().releases
    }
}
