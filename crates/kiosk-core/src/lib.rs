//! Shared vocabulary for the photo card kiosk.
//!
//! Every other crate in the workspace speaks in terms of the types defined
//! here: the dispense lifecycle states and their observable context, the
//! result of a trigger attempt, the runtime configuration, and the
//! structured event sink that UI and log collaborators consume.

pub mod config;
pub mod constants;
pub mod error;
pub mod events;
pub mod types;

pub use config::KioskConfig;
pub use error::{Error, Result};
pub use events::{EventLevel, EventSink, FanoutSink, KioskEvent, MemorySink, TracingSink};
pub use types::*;

/// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
