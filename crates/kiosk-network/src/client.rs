//! HTTP client for the relay controller.
//!
//! The controller is a small microcontroller on the kiosk LAN exposing two
//! endpoints:
//!
//! ```text
//! GET  /health   -> 2xx, optional JSON body
//! POST /trigger  -> 2xx, {"duration": <ms>} (duration optional)
//! ```
//!
//! [`RelayClient`] is a thin transport: it performs one request per call,
//! enforces a timeout on each call independently and reports failures as
//! [`ClientError`]. It keeps no connection state of its own; whether the
//! controller is "connected" is tracked by the device built on top of it.
//!
//! # Example
//!
//! ```no_run
//! use kiosk_network::{RelayClient, RelayClientConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = RelayClient::new(RelayClientConfig::default())?;
//!
//! let report = client.health("192.168.4.1").await?;
//! println!("controller answered in {:?}", report.latency);
//!
//! let ack = client.trigger("192.168.4.1").await?;
//! println!("relay held for {} ms", ack.duration_ms);
//! # Ok(())
//! # }
//! ```

use kiosk_core::config::NetworkConfig;
use kiosk_core::constants::{DEFAULT_RELAY_DURATION_MS, HEALTH_PATH, REQUEST_TIMEOUT_MS, TRIGGER_PATH};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

/// Configuration for [`RelayClient`].
#[derive(Debug, Clone)]
pub struct RelayClientConfig {
    /// Timeout applied to each request, covering connect, send and body read.
    pub timeout: Duration,

    pub health_path: String,
    pub trigger_path: String,

    /// Pulse length assumed when the trigger reply omits `duration`.
    pub default_relay_ms: u64,
}

impl Default for RelayClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(REQUEST_TIMEOUT_MS),
            health_path: HEALTH_PATH.to_string(),
            trigger_path: TRIGGER_PATH.to_string(),
            default_relay_ms: DEFAULT_RELAY_DURATION_MS,
        }
    }
}

impl From<&NetworkConfig> for RelayClientConfig {
    fn from(config: &NetworkConfig) -> Self {
        Self {
            timeout: config.request_timeout(),
            health_path: config.health_path.clone(),
            trigger_path: config.trigger_path.clone(),
            default_relay_ms: config.default_relay_ms,
        }
    }
}

/// Errors returned by [`RelayClient`].
#[derive(Debug, Error)]
pub enum ClientError {
    /// No controller address was supplied.
    #[error("No controller address configured")]
    NoAddress,

    /// The request did not complete within its timeout.
    #[error("Request timed out after {0}ms")]
    Timeout(u64),

    /// The controller could not be reached.
    #[error("Connection failed: {0}")]
    Connect(String),

    /// The controller answered with a non-success status.
    #[error("HTTP {0}")]
    Status(u16),

    /// The controller answered 2xx with a body that is not a valid reply.
    #[error("Malformed payload: {0}")]
    Decode(String),

    /// The HTTP client itself could not be built.
    #[error("HTTP client setup failed: {0}")]
    Setup(String),
}

impl ClientError {
    /// Whether the failure means the controller was not reached at all.
    pub fn is_unreachable(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Connect(_) | Self::NoAddress)
    }
}

/// Result of a successful health check.
#[derive(Debug, Clone, PartialEq)]
pub struct HealthReport {
    /// Round-trip time of the request.
    pub latency: Duration,

    /// Body of the reply if it was valid JSON.
    pub body: Option<serde_json::Value>,
}

/// Acknowledgement of a trigger request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerAck {
    pub duration_ms: u64,
}

#[derive(Debug, Deserialize)]
struct TriggerReply {
    duration: Option<u64>,
}

/// Build the base URL for a bare `host[:port]` address.
pub fn base_url(address: &str) -> String {
    format!("http://{}", address)
}

/// Stateless HTTP transport to the relay controller.
///
/// Cloning is cheap; clones share the underlying connection pool.
#[derive(Debug, Clone)]
pub struct RelayClient {
    http: reqwest::Client,
    config: RelayClientConfig,
}

impl RelayClient {
    /// Create a client.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Setup`] if the HTTP client cannot be built.
    pub fn new(config: RelayClientConfig) -> Result<Self, ClientError> {
        // The controller is always on the local segment.
        let http = reqwest::Client::builder()
            .no_proxy()
            .build()
            .map_err(|e| ClientError::Setup(e.to_string()))?;

        debug!(timeout_ms = config.timeout.as_millis() as u64, "Creating relay client");
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &RelayClientConfig {
        &self.config
    }

    /// Check that the controller at `address` answers its health endpoint.
    ///
    /// Succeeds only on a 2xx status. The body is parsed leniently: a
    /// missing or non-JSON body is accepted and reported as `None`.
    ///
    /// # Errors
    ///
    /// - [`ClientError::Timeout`] if no reply arrives in time
    /// - [`ClientError::Connect`] if the controller cannot be reached
    /// - [`ClientError::Status`] on a non-2xx reply
    pub async fn health(&self, address: &str) -> Result<HealthReport, ClientError> {
        self.health_with_timeout(address, self.config.timeout).await
    }

    /// Same as [`health`](Self::health) with an explicit timeout.
    pub async fn health_with_timeout(
        &self,
        address: &str,
        timeout: Duration,
    ) -> Result<HealthReport, ClientError> {
        if address.is_empty() {
            return Err(ClientError::NoAddress);
        }

        let url = format!("{}{}", base_url(address), self.config.health_path);
        trace!(url = %url, "Sending health check");

        let started = Instant::now();
        let exchange = async {
            let response = self.http.get(&url).send().await?;
            let status = response.status();
            let bytes = response.bytes().await?;
            Ok::<_, reqwest::Error>((status, bytes))
        };

        let (status, bytes) = match tokio::time::timeout(timeout, exchange).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(e)) => return Err(classify(e, timeout)),
            Err(_) => return Err(ClientError::Timeout(timeout.as_millis() as u64)),
        };
        let latency = started.elapsed();

        if !status.is_success() {
            debug!(address = %address, status = status.as_u16(), "Health check rejected");
            return Err(ClientError::Status(status.as_u16()));
        }

        let body = match serde_json::from_slice::<serde_json::Value>(&bytes) {
            Ok(value) => Some(value),
            Err(e) => {
                debug!(address = %address, error = %e, "Health reply is not JSON, ignoring body");
                None
            }
        };

        Ok(HealthReport { latency, body })
    }

    /// Ask the controller at `address` to pulse its relay.
    ///
    /// The request carries no body. A 2xx reply must be a JSON object; its
    /// optional `duration` field is the pulse length in milliseconds.
    ///
    /// # Errors
    ///
    /// Same as [`health`](Self::health), plus [`ClientError::Decode`] when
    /// a 2xx reply is not a JSON object.
    pub async fn trigger(&self, address: &str) -> Result<TriggerAck, ClientError> {
        if address.is_empty() {
            return Err(ClientError::NoAddress);
        }

        let url = format!("{}{}", base_url(address), self.config.trigger_path);
        let timeout = self.config.timeout;
        trace!(url = %url, "Sending trigger");

        let exchange = async {
            let response = self.http.post(&url).send().await?;
            let status = response.status();
            let bytes = response.bytes().await?;
            Ok::<_, reqwest::Error>((status, bytes))
        };

        let (status, bytes) = match tokio::time::timeout(timeout, exchange).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(e)) => return Err(classify(e, timeout)),
            Err(_) => {
                warn!(address = %address, "Trigger timed out after {}ms", timeout.as_millis());
                return Err(ClientError::Timeout(timeout.as_millis() as u64));
            }
        };

        if !status.is_success() {
            warn!(address = %address, status = status.as_u16(), "Trigger rejected");
            return Err(ClientError::Status(status.as_u16()));
        }

        let value: serde_json::Value =
            serde_json::from_slice(&bytes).map_err(|e| ClientError::Decode(e.to_string()))?;
        if !value.is_object() {
            return Err(ClientError::Decode(format!("expected a JSON object, got {}", value)));
        }
        let reply: TriggerReply =
            serde_json::from_value(value).map_err(|e| ClientError::Decode(e.to_string()))?;

        Ok(TriggerAck {
            duration_ms: reply.duration.unwrap_or(self.config.default_relay_ms),
        })
    }

    /// Reachability probe used by discovery.
    ///
    /// Every failure, including timeouts, maps to `false`.
    pub async fn is_reachable(&self, address: &str, timeout: Duration) -> bool {
        match self.health_with_timeout(address, timeout).await {
            Ok(_) => true,
            Err(e) if e.is_unreachable() => {
                trace!(address = %address, error = %e, "Probe failed");
                false
            }
            Err(e) => {
                debug!(address = %address, error = %e, "Host answered but is not a healthy relay controller");
                false
            }
        }
    }
}

fn classify(error: reqwest::Error, timeout: Duration) -> ClientError {
    if error.is_timeout() {
        ClientError::Timeout(timeout.as_millis() as u64)
    } else if error.is_connect() {
        ClientError::Connect(error.to_string())
    } else if error.is_decode() || error.is_body() {
        ClientError::Decode(error.to_string())
    } else {
        ClientError::Connect(error.to_string())
    }
}
