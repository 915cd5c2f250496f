//! End-to-end dispense flow.
//!
//! The [`Orchestrator`] owns the state machine, the debouncer and the single
//! bound trigger device. A decoded code goes through:
//!
//! 1. intake check and debounce
//! 2. `ScanSuccess`, then the fixed settle delay
//! 3. `Dispensing` and one trigger attempt
//! 4. on success `Complete`, the dwell, then `ScanReady` with intake resumed
//! 5. on failure `Error`, with intake held until [`Orchestrator::retry`]
//!
//! The settle and dwell waits are plain sleeps and are not cancellable. Only
//! one cycle runs at a time because every operation takes `&mut self`.

use kiosk_core::config::DispenseConfig;
use kiosk_core::{DeviceKind, EventSink, KioskEvent, StateContext, TriggerOutcome};
use kiosk_hardware::{HardwareError, Result, TriggerDevice};
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use crate::debounce::Debouncer;
use crate::state_machine::{DispenseMachine, SubscriptionId};

/// What happened to a decoded code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanDisposition {
    /// Intake was disabled (no device bound, cycle running, or error state).
    Ignored,

    /// Same code as the last accepted one, inside the debounce window.
    Suppressed,

    /// A cycle ran; the outcome of its trigger attempt.
    Dispensed(TriggerOutcome),
}

impl ScanDisposition {
    /// Whether a card was released.
    pub fn dispensed_ok(&self) -> bool {
        matches!(self, Self::Dispensed(outcome) if outcome.ok)
    }
}

/// Drives the dispense lifecycle against one bound device.
///
/// # Examples
///
/// ```
/// use kiosk_core::config::DispenseConfig;
/// use kiosk_core::{DispenseState, MemorySink};
/// use kiosk_dispense::{Orchestrator, ScanDisposition};
/// use kiosk_hardware::mock::MockTrigger;
/// use std::sync::Arc;
/// use std::time::Instant;
///
/// #[tokio::main]
/// async fn main() -> kiosk_hardware::Result<()> {
///     let config = DispenseConfig { settle_ms: 0, dwell_ms: 0, ..Default::default() };
///     let mut orchestrator = Orchestrator::new(config, Arc::new(MemorySink::default()));
///
///     let (device, _handle) = MockTrigger::new();
///     orchestrator.bind(device).await?;
///
///     let disposition = orchestrator.handle_detection("ABC123", Instant::now()).await;
///     assert!(disposition.dispensed_ok());
///     assert_eq!(orchestrator.snapshot().state, DispenseState::ScanReady);
///     Ok(())
/// }
/// ```
pub struct Orchestrator<D: TriggerDevice> {
    machine: DispenseMachine,
    debouncer: Debouncer,
    device: Option<D>,
    sink: Arc<dyn EventSink>,
    config: DispenseConfig,
    intake_enabled: bool,
}

impl<D: TriggerDevice> Orchestrator<D> {
    /// Create an orchestrator with no device bound.
    ///
    /// Every state transition is reported to `sink` under the `state`
    /// category.
    pub fn new(config: DispenseConfig, sink: Arc<dyn EventSink>) -> Self {
        let mut machine = DispenseMachine::new();
        let state_sink = Arc::clone(&sink);
        machine.subscribe(move |ctx: &StateContext| {
            let mut event = KioskEvent::info("state", format!("State: {}", ctx.state));
            if let Ok(data) = serde_json::to_value(ctx) {
                event = event.with_data(data);
            }
            state_sink.emit(event);
        });

        Self {
            machine,
            debouncer: Debouncer::new(config.debounce_window()),
            device: None,
            sink,
            config,
            intake_enabled: false,
        }
    }

    pub fn config(&self) -> &DispenseConfig {
        &self.config
    }

    /// Copy of the current state context.
    pub fn snapshot(&self) -> StateContext {
        self.machine.snapshot()
    }

    pub fn machine(&self) -> &DispenseMachine {
        &self.machine
    }

    pub fn debouncer(&self) -> &Debouncer {
        &self.debouncer
    }

    /// Register a state listener. See [`DispenseMachine::subscribe`].
    pub fn subscribe<F>(&mut self, listener: F) -> SubscriptionId
    where
        F: FnMut(&StateContext) + Send + 'static,
    {
        self.machine.subscribe(listener)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.machine.unsubscribe(id)
    }

    /// Whether decoded codes currently start a cycle.
    pub fn intake_enabled(&self) -> bool {
        self.intake_enabled
    }

    pub fn device(&self) -> Option<&D> {
        self.device.as_ref()
    }

    pub fn device_mut(&mut self) -> Option<&mut D> {
        self.device.as_mut()
    }

    pub fn is_bound(&self) -> bool {
        self.device.is_some()
    }

    /// Connect `device` and make it the bound device.
    ///
    /// Binding over an existing device replaces it without releasing it;
    /// callers release first.
    ///
    /// # Errors
    ///
    /// Returns the connection error. The state stays `Connecting` and the
    /// device is dropped.
    pub async fn bind(&mut self, mut device: D) -> Result<()> {
        if self.device.is_some() {
            warn!("Binding a new device while another is still bound");
        }

        let kind = device.kind();
        let address = device.address();
        self.intake_enabled = false;
        self.machine.connecting();
        self.emit(
            KioskEvent::info(category(kind), format!("Connecting to {}", describe(kind, &address)))
                .with_data(json!({ "kind": kind, "address": address })),
        );

        if let Err(e) = device.connect().await {
            self.emit(KioskEvent::error(
                category(kind),
                format!("Connection failed: {}", e),
            ));
            return Err(e);
        }

        self.emit(KioskEvent::success(
            category(kind),
            format!("Connected to {}", describe(kind, &address)),
        ));
        info!(%kind, address = ?address, "Trigger device bound");

        self.device = Some(device);
        self.machine.device_connected(kind, address);
        self.intake_enabled = true;
        Ok(())
    }

    /// Release the bound device, if any, and go back to `Connecting`.
    pub async fn release(&mut self) {
        self.intake_enabled = false;

        if let Some(mut device) = self.device.take() {
            let kind = device.kind();
            device.release().await;
            self.emit(KioskEvent::info(category(kind), "Device released"));
        }

        self.machine.disconnected();
    }

    /// Check the bound device is still usable.
    ///
    /// # Errors
    ///
    /// Returns [`HardwareError::DeviceNotReady`] when nothing is bound, or
    /// the device's health failure.
    pub async fn health_check(&mut self) -> Result<()> {
        let Some(device) = self.device.as_mut() else {
            return Err(HardwareError::device_not_ready("no device bound"));
        };

        let kind = device.kind();
        let result = device.health_check().await;
        match &result {
            Ok(()) => self.emit(KioskEvent::debug(category(kind), "Health check passed")),
            Err(e) if e.is_connectivity() => self.emit(KioskEvent::error(
                category(kind),
                format!("Device unreachable: {}", e),
            )),
            Err(e) => self.emit(KioskEvent::warn(
                category(kind),
                format!("Health check failed: {}", e),
            )),
        }
        result
    }

    /// Operator recovery: back to `ScanReady` with intake resumed.
    ///
    /// Without a bound device there is nothing to recover; the state is left
    /// as is and intake stays closed until the next [`bind`](Self::bind).
    pub fn retry(&mut self) {
        if self.device.is_none() {
            self.emit(KioskEvent::warn("dispense", "Retry ignored: no device bound"));
            return;
        }

        self.emit(KioskEvent::info("dispense", "Operator retry"));
        self.machine.reset();
        self.intake_enabled = true;
    }

    /// Feed one decoded code into the flow.
    ///
    /// Runs a full dispense cycle when the code is accepted. The returned
    /// future completes after the dwell on success, or as soon as the
    /// failure is recorded.
    pub async fn handle_detection(&mut self, code: &str, now: Instant) -> ScanDisposition {
        if !self.intake_enabled || !self.machine.state().accepts_scans() {
            self.emit(KioskEvent::debug("scan", format!("Ignored {}: intake paused", code)));
            return ScanDisposition::Ignored;
        }

        if !self.debouncer.accept(code, now) {
            self.emit(KioskEvent::debug("scan", format!("Suppressed repeat of {}", code)));
            return ScanDisposition::Suppressed;
        }

        ScanDisposition::Dispensed(self.dispense(code).await)
    }

    async fn dispense(&mut self, code: &str) -> TriggerOutcome {
        self.intake_enabled = false;
        self.emit(
            KioskEvent::info("scan", format!("Accepted {}", code)).with_data(json!({ "code": code })),
        );
        self.machine.scan_success(code);

        tokio::time::sleep(self.config.settle()).await;

        self.machine.dispensing();
        let outcome = self.fire(self.config.relay_ms).await;

        if outcome.ok {
            self.machine.complete();
            tokio::time::sleep(self.config.dwell()).await;
            self.machine.reset();
            self.intake_enabled = true;
        } else {
            let cause = outcome.message.as_deref().unwrap_or("unknown error");
            self.machine.error(format!("Dispense failed: {}", cause));
        }

        outcome
    }

    /// Pulse the bound device once without touching the dispense state.
    pub async fn test_trigger(&mut self, duration_ms: u64) -> TriggerOutcome {
        self.emit(KioskEvent::info("dispense", "Manual trigger test"));
        self.fire(duration_ms).await
    }

    async fn fire(&mut self, duration_ms: u64) -> TriggerOutcome {
        let Some(device) = self.device.as_mut() else {
            let outcome: TriggerOutcome = HardwareError::device_not_ready("no device bound").into();
            self.emit(KioskEvent::error(
                "dispense",
                outcome.message.clone().unwrap_or_default(),
            ));
            return outcome;
        };

        let kind = device.kind();
        self.sink.emit(KioskEvent::info(
            category(kind),
            format!("Triggering relay for {} ms", duration_ms),
        ));

        let outcome = device.attempt(duration_ms).await;
        let data = serde_json::to_value(&outcome).ok();

        let event = if outcome.ok {
            KioskEvent::success(category(kind), "Relay triggered")
        } else {
            KioskEvent::error(
                category(kind),
                format!(
                    "Trigger failed: {}",
                    outcome.message.as_deref().unwrap_or("unknown error")
                ),
            )
        };
        self.emit(match data {
            Some(data) => event.with_data(data),
            None => event,
        });

        outcome
    }

    fn emit(&self, event: KioskEvent) {
        self.sink.emit(event);
    }
}

fn category(kind: DeviceKind) -> &'static str {
    match kind {
        DeviceKind::Network => "network",
        DeviceKind::LocalBus => "usb",
    }
}

fn describe(kind: DeviceKind, address: &Option<String>) -> String {
    match address {
        Some(address) => address.clone(),
        None => format!("{} relay", kind),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiosk_core::{DispenseState, EventLevel, MemorySink};
    use kiosk_hardware::mock::{MockTrigger, MockTriggerHandle};

    fn instant_config() -> DispenseConfig {
        DispenseConfig {
            settle_ms: 0,
            dwell_ms: 0,
            ..DispenseConfig::default()
        }
    }

    fn orchestrator() -> (Orchestrator<MockTrigger>, MemorySink) {
        let sink = MemorySink::default();
        (Orchestrator::new(instant_config(), Arc::new(sink.clone())), sink)
    }

    async fn bound() -> (Orchestrator<MockTrigger>, MockTriggerHandle, MemorySink) {
        let (mut orchestrator, sink) = orchestrator();
        let (device, handle) = MockTrigger::new();
        orchestrator.bind(device).await.unwrap();
        (orchestrator, handle, sink)
    }

    #[tokio::test]
    async fn test_new_orchestrator_ignores_codes() {
        let (mut orchestrator, _) = orchestrator();

        let disposition = orchestrator.handle_detection("A", Instant::now()).await;

        assert_eq!(disposition, ScanDisposition::Ignored);
        assert_eq!(orchestrator.snapshot().state, DispenseState::Initializing);
        assert!(orchestrator.debouncer().last_accepted().is_none());
    }

    #[tokio::test]
    async fn test_bind_moves_to_scan_ready() {
        let (orchestrator, handle, sink) = bound().await;

        let ctx = orchestrator.snapshot();
        assert_eq!(ctx.state, DispenseState::ScanReady);
        assert_eq!(ctx.device_kind, Some(DeviceKind::Network));
        assert_eq!(ctx.device_address.as_deref(), Some("mock.local"));
        assert!(orchestrator.intake_enabled());
        assert_eq!(handle.connect_count(), 1);
        assert!(!sink.with_level(EventLevel::Success).is_empty());
    }

    #[tokio::test]
    async fn test_bind_failure_stays_connecting() {
        let (mut orchestrator, sink) = orchestrator();
        let (device, handle) = MockTrigger::new();
        handle.fail_next_connect(HardwareError::connection("mock.local", "refused"));

        let err = orchestrator.bind(device).await.unwrap_err();

        assert!(matches!(err, HardwareError::Connection { .. }));
        assert_eq!(orchestrator.snapshot().state, DispenseState::Connecting);
        assert!(!orchestrator.is_bound());
        assert!(!orchestrator.intake_enabled());
        assert_eq!(sink.with_level(EventLevel::Error).len(), 1);
    }

    #[tokio::test]
    async fn test_successful_cycle_returns_to_scan_ready() {
        let (mut orchestrator, handle, _) = bound().await;

        let disposition = orchestrator.handle_detection("ABC123", Instant::now()).await;

        assert!(disposition.dispensed_ok());
        assert_eq!(handle.trigger_durations(), vec![250]);
        let ctx = orchestrator.snapshot();
        assert_eq!(ctx.state, DispenseState::ScanReady);
        assert!(ctx.barcode.is_none());
        assert!(orchestrator.intake_enabled());
    }

    #[tokio::test]
    async fn test_repeat_code_suppressed_after_reset() {
        let (mut orchestrator, handle, _) = bound().await;
        let t0 = Instant::now();

        orchestrator.handle_detection("ABC123", t0).await;
        let repeat = orchestrator.handle_detection("ABC123", t0).await;

        assert_eq!(repeat, ScanDisposition::Suppressed);
        assert_eq!(handle.trigger_count(), 1);
    }

    #[tokio::test]
    async fn test_failure_enters_error_and_pauses_intake() {
        let (mut orchestrator, handle, _) = bound().await;
        handle.fail_next_trigger(HardwareError::protocol("HTTP 500"));

        let disposition = orchestrator.handle_detection("A", Instant::now()).await;
        assert!(!disposition.dispensed_ok());

        let ctx = orchestrator.snapshot();
        assert_eq!(ctx.state, DispenseState::Error);
        assert!(ctx.error_message.unwrap().starts_with("Dispense failed: "));
        assert!(!orchestrator.intake_enabled());

        let next = orchestrator.handle_detection("B", Instant::now()).await;
        assert_eq!(next, ScanDisposition::Ignored);
        assert_eq!(handle.trigger_count(), 1);
    }

    #[tokio::test]
    async fn test_retry_resumes_intake() {
        let (mut orchestrator, handle, _) = bound().await;
        handle.fail_next_trigger(HardwareError::protocol("HTTP 500"));
        orchestrator.handle_detection("A", Instant::now()).await;

        orchestrator.retry();

        assert_eq!(orchestrator.snapshot().state, DispenseState::ScanReady);
        let disposition = orchestrator.handle_detection("B", Instant::now()).await;
        assert!(disposition.dispensed_ok());
    }

    #[tokio::test]
    async fn test_retry_without_device_keeps_intake_closed() {
        let (mut orchestrator, sink) = orchestrator();

        orchestrator.retry();

        assert_eq!(orchestrator.snapshot().state, DispenseState::Initializing);
        assert!(!orchestrator.intake_enabled());
        assert_eq!(sink.with_level(EventLevel::Warn).len(), 1);

        let disposition = orchestrator.handle_detection("ABC", Instant::now()).await;
        assert_eq!(disposition, ScanDisposition::Ignored);
        assert!(orchestrator.debouncer().last_accepted().is_none());
    }

    #[tokio::test]
    async fn test_retry_after_release_does_not_reopen_intake() {
        let (mut orchestrator, handle, _) = bound().await;
        orchestrator.release().await;

        orchestrator.retry();

        assert_eq!(orchestrator.snapshot().state, DispenseState::Connecting);
        let disposition = orchestrator.handle_detection("ABC", Instant::now()).await;
        assert_eq!(disposition, ScanDisposition::Ignored);
        assert_eq!(handle.trigger_count(), 0);
    }

    #[tokio::test]
    async fn test_release_disconnects_and_clears_device() {
        let (mut orchestrator, handle, _) = bound().await;

        orchestrator.release().await;

        let ctx = orchestrator.snapshot();
        assert_eq!(ctx.state, DispenseState::Connecting);
        assert!(ctx.device_kind.is_none());
        assert!(!orchestrator.is_bound());
        assert_eq!(handle.release_count(), 1);
    }

    #[tokio::test]
    async fn test_test_trigger_leaves_state_alone() {
        let (mut orchestrator, handle, _) = bound().await;

        let outcome = orchestrator.test_trigger(400).await;

        assert!(outcome.ok);
        assert_eq!(handle.trigger_durations(), vec![400]);
        assert_eq!(orchestrator.snapshot().state, DispenseState::ScanReady);
    }

    #[tokio::test]
    async fn test_test_trigger_without_device_is_not_ready() {
        let (mut orchestrator, _) = orchestrator();

        let outcome = orchestrator.test_trigger(250).await;

        assert!(!outcome.ok);
        assert!(outcome.message.unwrap().contains("Device not ready"));
    }

    #[tokio::test]
    async fn test_health_check_without_device() {
        let (mut orchestrator, _) = orchestrator();
        let err = orchestrator.health_check().await.unwrap_err();
        assert!(matches!(err, HardwareError::DeviceNotReady { .. }));
    }

    #[tokio::test]
    async fn test_health_check_reports_unreachable_device_as_error() {
        let (mut orchestrator, handle, sink) = bound().await;
        sink.clear();
        handle.fail_next_health_check(HardwareError::timeout(5000));

        assert!(orchestrator.health_check().await.is_err());

        let errors = sink.with_level(EventLevel::Error);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.starts_with("Device unreachable"));
    }

    #[tokio::test]
    async fn test_health_check_reports_bad_reply_as_warning() {
        let (mut orchestrator, handle, sink) = bound().await;
        sink.clear();
        handle.fail_next_health_check(HardwareError::protocol("HTTP 503"));

        assert!(orchestrator.health_check().await.is_err());

        assert!(sink.with_level(EventLevel::Error).is_empty());
        assert_eq!(sink.with_level(EventLevel::Warn).len(), 1);
    }

    #[tokio::test]
    async fn test_every_transition_reaches_sink() {
        let (mut orchestrator, _, sink) = bound().await;
        sink.clear();

        orchestrator.handle_detection("A", Instant::now()).await;

        let states: Vec<_> = sink
            .snapshot()
            .into_iter()
            .filter(|e| e.category == "state")
            .map(|e| e.message)
            .collect();
        assert_eq!(
            states,
            vec![
                "State: ScanSuccess",
                "State: Dispensing",
                "State: Complete",
                "State: ScanReady",
            ]
        );
    }
}
