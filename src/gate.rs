//! Per-caller sliding-window request gate.
//!
//! Purely in-memory and per-process; there is no persistence and no
//! coordination between instances.

use std::collections::{HashMap, VecDeque};
use std::sync::RwLock;
use std::time::{Duration, Instant};

use crate::config::GateConfig;

/// Sliding-window admission check keyed by caller identity.
#[derive(Debug)]
pub struct RequestGate {
    limit: usize,
    window: Duration,
    requests: RwLock<HashMap<String, VecDeque<Instant>>>,
}

impl Default for RequestGate {
    fn default() -> Self {
        Self::from_config(&GateConfig::default())
    }
}

impl RequestGate {
    /// Create a gate admitting `limit` requests per `window`.
    #[must_use]
    pub fn new(limit: usize, window: Duration) -> Self {
        Self {
            limit,
            window,
            requests: RwLock::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn from_config(config: &GateConfig) -> Self {
        Self::new(config.limit, Duration::from_secs(config.window_secs))
    }

    #[must_use]
    pub fn limit(&self) -> usize {
        self.limit
    }

    #[must_use]
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Admit or reject a request from `identity` now.
    ///
    /// # Panics
    ///
    /// Panics if the internal `RwLock` is poisoned.
    pub fn check(&self, identity: &str) -> bool {
        self.check_at(identity, Instant::now())
    }

    /// Admit or reject a request from `identity` at `now`.
    ///
    /// Timestamps older than the window are discarded first; an admitted
    /// request records `now`. Identities left with no timestamp inside the
    /// window are forgotten.
    ///
    /// # Panics
    ///
    /// Panics if the internal `RwLock` is poisoned.
    pub fn check_at(&self, identity: &str, now: Instant) -> bool {
        let mut requests = self.requests.write().expect("RwLock poisoned");
        requests.retain(|_, timestamps| {
            while let Some(&oldest) = timestamps.front() {
                if now.saturating_duration_since(oldest) > self.window {
                    timestamps.pop_front();
                } else {
                    break;
                }
            }
            !timestamps.is_empty()
        });
        let timestamps = requests.entry(identity.to_string()).or_default();

        if timestamps.len() < self.limit {
            timestamps.push_back(now);
            true
        } else {
            if timestamps.is_empty() {
                requests.remove(identity);
            }
            tracing::warn!(identity, limit = self.limit, "Request rejected by rate limit");
            false
        }
    }

    /// Requests `identity` may still make in the current window.
    ///
    /// # Panics
    ///
    /// Panics if the internal `RwLock` is poisoned.
    #[must_use]
    pub fn remaining(&self, identity: &str) -> usize {
        self.remaining_at(identity, Instant::now())
    }

    /// # Panics
    ///
    /// Panics if the internal `RwLock` is poisoned.
    #[must_use]
    pub fn remaining_at(&self, identity: &str, now: Instant) -> usize {
        let requests = self.requests.read().expect("RwLock poisoned");
        let used = requests.get(identity).map_or(0, |timestamps| {
            timestamps
                .iter()
                .filter(|&&t| now.saturating_duration_since(t) <= self.window)
                .count()
        });
        self.limit.saturating_sub(used)
    }

    /// Number of identities with requests still inside the window.
    ///
    /// # Panics
    ///
    /// Panics if the internal `RwLock` is poisoned.
    #[must_use]
    pub fn tracked(&self) -> usize {
        self.requests.read().expect("RwLock poisoned").len()
    }

    /// Forget all history for `identity`.
    ///
    /// # Panics
    ///
    /// Panics if the internal `RwLock` is poisoned.
    pub fn reset(&self, identity: &str) {
        self.requests
            .write()
            .expect("RwLock poisoned")
            .remove(identity);
    }
}
