//! Dispense state machine.
//!
//! The machine owns the single [`StateContext`] of the kiosk. Every
//! transition is permissive: any state may move to the target state and
//! callers are trusted to request transitions in a sensible order. After
//! each transition the new context is delivered synchronously to every
//! subscriber, in subscription order, before the call returns.
//!
//! # Transitions
//!
//! | Operation | Target | Side effects |
//! |---|---|---|
//! | [`connecting`](DispenseMachine::connecting) | `Connecting` | clears the error |
//! | [`device_connected`](DispenseMachine::device_connected) | `ScanReady` | records the device, clears the error |
//! | [`scan_success`](DispenseMachine::scan_success) | `ScanSuccess` | records the barcode |
//! | [`dispensing`](DispenseMachine::dispensing) | `Dispensing` | none |
//! | [`complete`](DispenseMachine::complete) | `Complete` | none |
//! | [`error`](DispenseMachine::error) | `Error` | records the error |
//! | [`reset`](DispenseMachine::reset) | `ScanReady` | clears barcode and error |
//! | [`disconnected`](DispenseMachine::disconnected) | `Connecting` | clears device and error |
//!
//! There is no terminal state. `Error` is only left through an explicit
//! [`reset`](DispenseMachine::reset).
//!
//! # Examples
//!
//! ```
//! use kiosk_core::{DeviceKind, DispenseState};
//! use kiosk_dispense::DispenseMachine;
//!
//! let mut machine = DispenseMachine::new();
//! machine.device_connected(DeviceKind::LocalBus, None);
//! machine.scan_success("ABC123");
//! machine.error("Dispense failed: HTTP 500");
//! assert_eq!(machine.state(), DispenseState::Error);
//!
//! machine.reset();
//! let context = machine.snapshot();
//! assert_eq!(context.state, DispenseState::ScanReady);
//! assert!(context.barcode.is_none());
//! assert!(context.error_message.is_none());
//! ```

use kiosk_core::constants::MAX_TRANSITION_HISTORY;
use kiosk_core::{DeviceKind, DispenseState, StateContext};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::time::{Duration, Instant};

/// Handle returned by [`DispenseMachine::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Listener invoked with the context after every transition.
pub type Listener = Box<dyn FnMut(&StateContext) + Send>;

/// A single recorded state transition.
///
/// The `at` field is not serialized as `Instant` is process-specific; on
/// deserialization it is set to the current time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub from: DispenseState,
    pub to: DispenseState,

    #[serde(skip, default = "Instant::now")]
    pub at: Instant,
}

impl StateTransition {
    pub fn new(from: DispenseState, to: DispenseState) -> Self {
        Self {
            from,
            to,
            at: Instant::now(),
        }
    }

    /// Time since this transition happened.
    pub fn elapsed(&self) -> Duration {
        self.at.elapsed()
    }
}

/// Owner of the kiosk's [`StateContext`].
///
/// Not thread-safe by itself. The orchestrator owns it and drives it from a
/// single task.
pub struct DispenseMachine {
    context: StateContext,
    listeners: Vec<(SubscriptionId, Listener)>,
    next_subscription: u64,
    history: VecDeque<StateTransition>,
}

impl DispenseMachine {
    /// Create a machine in `Initializing` with no subscribers.
    pub fn new() -> Self {
        Self {
            context: StateContext::initial(),
            listeners: Vec::new(),
            next_subscription: 0,
            history: VecDeque::with_capacity(MAX_TRANSITION_HISTORY),
        }
    }

    /// Current state.
    pub fn state(&self) -> DispenseState {
        self.context.state
    }

    /// Copy of the current context.
    pub fn snapshot(&self) -> StateContext {
        self.context.clone()
    }

    /// Waiting for a device to be bound.
    pub fn connecting(&mut self) {
        self.apply(DispenseState::Connecting, |_| {});
    }

    /// A device was bound and is ready to dispense.
    pub fn device_connected(&mut self, kind: DeviceKind, address: Option<String>) {
        self.apply(DispenseState::ScanReady, |ctx| {
            ctx.device_kind = Some(kind);
            ctx.device_address = address;
        });
    }

    /// A code was accepted.
    pub fn scan_success(&mut self, code: impl Into<String>) {
        let code = code.into();
        self.apply(DispenseState::ScanSuccess, |ctx| {
            ctx.barcode = Some(code);
        });
    }

    pub fn dispensing(&mut self) {
        self.apply(DispenseState::Dispensing, |_| {});
    }

    pub fn complete(&mut self) {
        self.apply(DispenseState::Complete, |_| {});
    }

    /// Enter `Error` with an operator-facing message.
    pub fn error(&mut self, message: impl Into<String>) {
        let message = message.into();
        self.apply(DispenseState::Error, |ctx| {
            ctx.error_message = Some(message);
        });
    }

    /// Back to `ScanReady` for the next customer.
    ///
    /// This is the only way out of `Error`.
    pub fn reset(&mut self) {
        self.apply(DispenseState::ScanReady, |ctx| {
            ctx.barcode = None;
        });
    }

    /// The bound device went away.
    pub fn disconnected(&mut self) {
        self.apply(DispenseState::Connecting, |ctx| {
            ctx.device_kind = None;
            ctx.device_address = None;
        });
    }

    /// Register a listener.
    ///
    /// The listener is called once immediately with the current context,
    /// then after every transition.
    pub fn subscribe<F>(&mut self, listener: F) -> SubscriptionId
    where
        F: FnMut(&StateContext) + Send + 'static,
    {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;

        let mut listener: Listener = Box::new(listener);
        listener(&self.context);
        self.listeners.push((id, listener));
        id
    }

    /// Remove a listener. Returns whether one was registered under `id`.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(existing, _)| *existing != id);
        self.listeners.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.listeners.len()
    }

    /// Recorded transitions, oldest first.
    pub fn history(&self) -> &VecDeque<StateTransition> {
        &self.history
    }

    /// The `n` most recent transitions, oldest first.
    pub fn last_transitions(&self, n: usize) -> Vec<StateTransition> {
        let skip = self.history.len().saturating_sub(n);
        self.history.iter().skip(skip).cloned().collect()
    }

    fn apply(&mut self, to: DispenseState, mutate: impl FnOnce(&mut StateContext)) {
        let from = self.context.state;
        mutate(&mut self.context);
        // The message only lives while in Error.
        if to != DispenseState::Error {
            self.context.error_message = None;
        }
        self.context.state = to;

        self.add_to_history(StateTransition::new(from, to));
        tracing::debug!(%from, %to, "State transition");

        for (_, listener) in self.listeners.iter_mut() {
            listener(&self.context);
        }
    }

    fn add_to_history(&mut self, transition: StateTransition) {
        self.history.push_back(transition);
        if self.history.len() > MAX_TRANSITION_HISTORY {
            self.history.pop_front();
        }
    }
}

impl Default for DispenseMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for DispenseMachine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispenseMachine")
            .field("context", &self.context)
            .field("subscribers", &self.listeners.len())
            .field("history_len", &self.history.len())
            .finish()
    }
}
