//! Dispense flow for the photo card kiosk.
//!
//! - [`DispenseMachine`]: the observable lifecycle state and its subscribers
//! - [`Debouncer`]: drops repeated reads of the same card
//! - [`Orchestrator`]: ties both to the bound
//!   [`TriggerDevice`](kiosk_hardware::TriggerDevice) and runs one cycle per
//!   accepted code
//!
//! Everything is constructed explicitly and owned by the caller; there is no
//! global state.

pub mod debounce;
pub mod orchestrator;
pub mod state_machine;

pub use debounce::Debouncer;
pub use orchestrator::{Orchestrator, ScanDisposition};
pub use state_machine::{DispenseMachine, StateTransition, SubscriptionId};
