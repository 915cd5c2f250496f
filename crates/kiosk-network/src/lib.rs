//! Network transport for the photo card kiosk.
//!
//! This crate talks HTTP to the LAN-attached relay controller and finds that
//! controller on the local network when its address is unknown.
//!
//! # Components
//!
//! - **RelayClient**: health check, trigger and reachability probe with
//!   per-call timeouts
//! - **NetworkDiscovery**: concurrent sweep of candidate `/24` prefixes
//!
//! # Example
//!
//! ```no_run
//! use kiosk_core::config::DiscoveryConfig;
//! use kiosk_network::{NetworkDiscovery, RelayClient, RelayClientConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = RelayClient::new(RelayClientConfig::default())?;
//! let discovery = NetworkDiscovery::new(DiscoveryConfig::default());
//!
//! for address in discovery.run(&client).await {
//!     println!("relay controller at {address}");
//! }
//! # Ok(())
//! # }
//! ```

mod client;
mod discovery;

pub use client::{
    ClientError, HealthReport, RelayClient, RelayClientConfig, TriggerAck, base_url,
};
pub use discovery::{
    DiscoveryProgress, HealthProbe, NetworkDiscovery, candidate_addresses,
};
