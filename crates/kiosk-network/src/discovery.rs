//! Zero-configuration discovery of the relay controller.
//!
//! The sweep enumerates every host `1..=254` of a fixed list of `/24`
//! prefixes and probes each candidate's health endpoint with a short
//! timeout. All probes run concurrently (optionally capped by
//! `max_in_flight`) and the sweep returns only after every probe has
//! settled. Individual failures are swallowed: absence from the result is
//! the only signal.
//!
//! ```text
//! prefixes ──> candidate_addresses ──> probe × N (concurrent) ──> reachable
//!                                            │
//!                                            └─> progress every Nth settlement
//! ```

use futures::stream::{self, FuturesUnordered, Stream, StreamExt};
use kiosk_core::config::DiscoveryConfig;
use kiosk_core::constants::{DEFAULT_HTTP_PORT, FIRST_HOST, LAST_HOST};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info};

use crate::client::RelayClient;

/// Reachability check performed against each candidate.
///
/// The only observable outcome of a probe is reachable or not.
pub trait HealthProbe: Send + Sync {
    fn probe(&self, address: &str, timeout: Duration) -> impl Future<Output = bool> + Send;
}

impl HealthProbe for RelayClient {
    async fn probe(&self, address: &str, timeout: Duration) -> bool {
        self.is_reachable(address, timeout).await
    }
}

/// Snapshot passed to the progress observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscoveryProgress {
    /// Probes settled so far.
    pub settled: usize,

    /// Total number of candidates in the sweep.
    pub total: usize,

    /// Reachable addresses found so far.
    pub found: usize,
}

/// Every candidate address for the given prefixes, in sweep order.
///
/// `:port` is appended only when the port differs from 80.
///
/// ```
/// use kiosk_network::candidate_addresses;
///
/// let candidates = candidate_addresses(&["10.0.0".to_string()], 80);
/// assert_eq!(candidates.len(), 254);
/// assert_eq!(candidates[0], "10.0.0.1");
/// assert_eq!(candidates[253], "10.0.0.254");
/// ```
pub fn candidate_addresses(prefixes: &[String], port: u16) -> Vec<String> {
    let mut candidates =
        Vec::with_capacity(prefixes.len() * usize::from(LAST_HOST - FIRST_HOST + 1));
    for prefix in prefixes {
        for host in FIRST_HOST..=LAST_HOST {
            if port == DEFAULT_HTTP_PORT {
                candidates.push(format!("{prefix}.{host}"));
            } else {
                candidates.push(format!("{prefix}.{host}:{port}"));
            }
        }
    }
    candidates
}

/// Discovery sweep over the configured prefixes.
#[derive(Debug, Clone)]
pub struct NetworkDiscovery {
    config: DiscoveryConfig,
}

impl NetworkDiscovery {
    pub fn new(config: DiscoveryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    /// Candidates this sweep will probe.
    pub fn candidates(&self) -> Vec<String> {
        candidate_addresses(&self.config.prefixes, self.config.port)
    }

    /// Run one sweep without a progress observer.
    pub async fn run<P: HealthProbe>(&self, probe: &P) -> Vec<String> {
        self.run_with_progress(probe, |_| {}).await
    }

    /// Run one sweep, reporting progress every `progress_every` settlements
    /// and once more on the final settlement.
    ///
    /// Returns the reachable addresses in sweep order. An empty list means
    /// nothing answered; it is not an error.
    pub async fn run_with_progress<P, F>(&self, probe: &P, on_progress: F) -> Vec<String>
    where
        P: HealthProbe,
        F: FnMut(DiscoveryProgress),
    {
        let candidates = self.candidates();
        let total = candidates.len();
        let timeout = self.config.probe_timeout();

        info!(
            candidates = total,
            prefixes = ?self.config.prefixes,
            max_in_flight = ?self.config.max_in_flight,
            "Starting discovery sweep"
        );

        let probes = candidates.iter().enumerate().map(|(index, address)| async move {
            (index, probe.probe(address, timeout).await)
        });

        let mut hits = match self.config.max_in_flight {
            None => {
                let pending: FuturesUnordered<_> = probes.collect();
                self.settle(pending, total, on_progress).await
            }
            Some(limit) => {
                let pending = stream::iter(probes).buffer_unordered(limit.max(1));
                self.settle(pending, total, on_progress).await
            }
        };

        hits.sort_unstable();
        let found: Vec<String> = hits.into_iter().map(|i| candidates[i].clone()).collect();

        info!(found = found.len(), "Discovery sweep finished");
        found
    }

    async fn settle<S, F>(&self, pending: S, total: usize, mut on_progress: F) -> Vec<usize>
    where
        S: Stream<Item = (usize, bool)>,
        F: FnMut(DiscoveryProgress),
    {
        let every = self.config.progress_every.max(1);
        let mut hits = Vec::new();
        let mut settled = 0;

        futures::pin_mut!(pending);
        while let Some((index, reachable)) = pending.next().await {
            settled += 1;
            if reachable {
                debug!(index, "Candidate answered");
                hits.push(index);
            }
            if settled % every == 0 || settled == total {
                on_progress(DiscoveryProgress {
                    settled,
                    total,
                    found: hits.len(),
                });
            }
        }

        hits
    }
}
