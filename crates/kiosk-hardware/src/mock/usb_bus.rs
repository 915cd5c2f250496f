//! In-memory USB bus with a scriptable relay board.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::{HardwareError, Result};
use crate::usb::{DisconnectNotifier, RelayHandle, UsbBus};

/// One operation observed on the mock bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusCall {
    Open { vendor_id: u16, product_id: u16 },
    ActiveConfiguration,
    SelectConfiguration(u8),
    ClaimInterface(u8),
    ReleaseInterface(u8),
    ControlOut {
        request: u8,
        value: u16,
        index: u16,
        payload: Vec<u8>,
    },
}

/// Step at which the mock board rejects the call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusFailure {
    Open,
    SelectConfiguration,
    ClaimInterface,
    ReleaseInterface,
    /// Fails the n-th control transfer (0-based) from now.
    ControlOut(usize),
}

#[derive(Debug)]
struct BusState {
    present: bool,
    active_configuration: Option<u8>,
    calls: Vec<BusCall>,
    failure: Option<BusFailure>,
    notifiers: Vec<DisconnectNotifier>,
}

type SharedState = Arc<Mutex<BusState>>;

fn lock(state: &SharedState) -> MutexGuard<'_, BusState> {
    state.lock().unwrap_or_else(|p| p.into_inner())
}

/// USB bus holding a single simulated relay board.
#[derive(Debug)]
pub struct MockUsbBus {
    state: SharedState,
}

impl MockUsbBus {
    /// Create a bus with one unconfigured board plugged in.
    pub fn new() -> (Self, MockUsbBusHandle) {
        let state = Arc::new(Mutex::new(BusState {
            present: true,
            active_configuration: None,
            calls: Vec::new(),
            failure: None,
            notifiers: Vec::new(),
        }));
        (
            Self {
                state: state.clone(),
            },
            MockUsbBusHandle { state },
        )
    }
}

impl UsbBus for MockUsbBus {
    fn open(&self, vendor_id: u16, product_id: u16) -> Result<Arc<dyn RelayHandle>> {
        let mut state = lock(&self.state);
        state.calls.push(BusCall::Open {
            vendor_id,
            product_id,
        });
        if !state.present || state.failure == Some(BusFailure::Open) {
            return Err(HardwareError::connection(
                format!("usb {vendor_id:04x}:{product_id:04x}"),
                "device not found",
            ));
        }
        Ok(Arc::new(MockRelayHandle {
            state: self.state.clone(),
        }))
    }

    fn watch_removal(
        &self,
        _vendor_id: u16,
        _product_id: u16,
        notifier: DisconnectNotifier,
    ) -> Result<()> {
        lock(&self.state).notifiers.push(notifier);
        Ok(())
    }
}

struct MockRelayHandle {
    state: SharedState,
}

impl MockRelayHandle {
    fn record(&self, call: BusCall, failing: BusFailure) -> Result<()> {
        let mut state = lock(&self.state);
        state.calls.push(call);
        if !state.present {
            return Err(HardwareError::transfer("no such device"));
        }
        if state.failure == Some(failing) {
            return Err(HardwareError::transfer(format!("{failing:?} rejected")));
        }
        Ok(())
    }
}

impl RelayHandle for MockRelayHandle {
    fn active_configuration(&self) -> Result<Option<u8>> {
        let mut state = lock(&self.state);
        state.calls.push(BusCall::ActiveConfiguration);
        Ok(state.active_configuration)
    }

    fn select_configuration(&self, configuration: u8) -> Result<()> {
        self.record(
            BusCall::SelectConfiguration(configuration),
            BusFailure::SelectConfiguration,
        )?;
        lock(&self.state).active_configuration = Some(configuration);
        Ok(())
    }

    fn claim_interface(&self, interface: u8) -> Result<()> {
        self.record(BusCall::ClaimInterface(interface), BusFailure::ClaimInterface)
    }

    fn release_interface(&self, interface: u8) -> Result<()> {
        self.record(
            BusCall::ReleaseInterface(interface),
            BusFailure::ReleaseInterface,
        )
    }

    fn control_out(&self, request: u8, value: u16, index: u16, payload: &[u8]) -> Result<usize> {
        let mut state = lock(&self.state);
        state.calls.push(BusCall::ControlOut {
            request,
            value,
            index,
            payload: payload.to_vec(),
        });
        if !state.present {
            return Err(HardwareError::transfer("no such device"));
        }
        match state.failure {
            Some(BusFailure::ControlOut(0)) => {
                state.failure = None;
                Err(HardwareError::transfer("control transfer stalled"))
            }
            Some(BusFailure::ControlOut(n)) => {
                state.failure = Some(BusFailure::ControlOut(n - 1));
                Ok(payload.len())
            }
            _ => Ok(payload.len()),
        }
    }
}

/// Control handle for a [`MockUsbBus`]. Cloneable.
#[derive(Debug, Clone)]
pub struct MockUsbBusHandle {
    state: SharedState,
}

impl MockUsbBusHandle {
    /// Every call made on the bus so far.
    pub fn calls(&self) -> Vec<BusCall> {
        lock(&self.state).calls.clone()
    }

    /// Payloads of the control transfers made so far.
    pub fn control_payloads(&self) -> Vec<Vec<u8>> {
        lock(&self.state)
            .calls
            .iter()
            .filter_map(|c| match c {
                BusCall::ControlOut { payload, .. } => Some(payload.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn clear_calls(&self) {
        lock(&self.state).calls.clear();
    }

    pub fn set_active_configuration(&self, configuration: Option<u8>) {
        lock(&self.state).active_configuration = configuration;
    }

    /// Make the given step fail.
    pub fn fail_at(&self, failure: BusFailure) {
        lock(&self.state).failure = Some(failure);
    }

    /// Unplug the board and fire every registered removal notifier.
    pub fn unplug(&self) {
        let notifiers = {
            let mut state = lock(&self.state);
            state.present = false;
            state.notifiers.clone()
        };
        for notifier in notifiers {
            notifier.notify();
        }
    }

    /// Plug the board back in. Devices must reconnect.
    pub fn plug_in(&self) {
        lock(&self.state).present = true;
    }
}
