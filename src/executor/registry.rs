//! Active-invocation table.

use std::collections::HashMap;
use std::fmt;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Opaque identifier of one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InvocationId(Uuid);

impl InvocationId {
    /// Generate a fresh identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for InvocationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for InvocationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Lifecycle state of an invocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvocationState {
    #[default]
    Spawning,
    Running,
    Completed,
    TimedOut,
    Failed,
}

impl InvocationState {
    /// Returns true once the invocation can no longer change.
    #[must_use]
    pub fn is_final(self) -> bool {
        matches!(self, Self::Completed | Self::TimedOut | Self::Failed)
    }
}

/// One in-flight child process.
#[derive(Debug, Clone)]
pub struct ProcessHandle {
    pub id: InvocationId,
    /// OS process id, if the child was still alive when registered.
    pub pid: Option<u32>,
    pub created_at: DateTime<Utc>,
    pub state: InvocationState,
    cancel: CancellationToken,
}

impl ProcessHandle {
    #[must_use]
    pub fn new(id: InvocationId, pid: Option<u32>) -> Self {
        Self {
            id,
            pid,
            created_at: Utc::now(),
            state: InvocationState::Spawning,
            cancel: CancellationToken::new(),
        }
    }

    /// Token that fires when the invocation is cancelled.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

/// Table of running invocations, shared by concurrent `execute` calls.
#[derive(Debug, Default)]
pub struct InvocationRegistry {
    active: RwLock<HashMap<InvocationId, ProcessHandle>>,
}

impl InvocationRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handle, replacing any entry with the same id.
    ///
    /// # Panics
    ///
    /// Panics if the internal `RwLock` is poisoned.
    pub fn insert(&self, handle: ProcessHandle) {
        self.active
            .write()
            .expect("RwLock poisoned")
            .insert(handle.id, handle);
    }

    /// Remove an entry, returning it if present.
    ///
    /// # Panics
    ///
    /// Panics if the internal `RwLock` is poisoned.
    pub fn remove(&self, id: InvocationId) -> Option<ProcessHandle> {
        self.active.write().expect("RwLock poisoned").remove(&id)
    }

    /// Update the recorded state of an entry.
    ///
    /// # Panics
    ///
    /// Panics if the internal `RwLock` is poisoned.
    pub fn set_state(&self, id: InvocationId, state: InvocationState) {
        if let Some(handle) = self.active.write().expect("RwLock poisoned").get_mut(&id) {
            tracing::debug!(invocation_id = %id, from = ?handle.state, to = ?state, "State transition");
            handle.state = state;
        }
    }

    /// # Panics
    ///
    /// Panics if the internal `RwLock` is poisoned.
    #[must_use]
    pub fn get(&self, id: InvocationId) -> Option<ProcessHandle> {
        self.active.read().expect("RwLock poisoned").get(&id).cloned()
    }

    /// # Panics
    ///
    /// Panics if the internal `RwLock` is poisoned.
    #[must_use]
    pub fn contains(&self, id: InvocationId) -> bool {
        self.active.read().expect("RwLock poisoned").contains_key(&id)
    }

    /// # Panics
    ///
    /// Panics if the internal `RwLock` is poisoned.
    #[must_use]
    pub fn len(&self) -> usize {
        self.active.read().expect("RwLock poisoned").len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ids of all registered invocations.
    ///
    /// # Panics
    ///
    /// Panics if the internal `RwLock` is poisoned.
    #[must_use]
    pub fn ids(&self) -> Vec<InvocationId> {
        self.active
            .read()
            .expect("RwLock poisoned")
            .keys()
            .copied()
            .collect()
    }

    /// Request cancellation of a running invocation.
    ///
    /// Returns false if no such invocation is registered.
    ///
    /// # Panics
    ///
    /// Panics if the internal `RwLock` is poisoned.
    pub fn cancel(&self, id: InvocationId) -> bool {
        match self.active.read().expect("RwLock poisoned").get(&id) {
            Some(handle) => {
                handle.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Register a handle and return a guard that removes it on drop.
    pub fn register(&self, handle: ProcessHandle) -> Registration<'_> {
        let id = handle.id;
        self.insert(handle);
        Registration { registry: self, id }
    }
}

/// Removes its invocation from the registry when dropped.
///
/// Dropping covers normal returns, early `?` returns, panics, and the
/// caller abandoning the `execute` future.
#[derive(Debug)]
pub struct Registration<'a> {
    registry: &'a InvocationRegistry,
    id: InvocationId,
}

impl Registration<'_> {
    #[must_use]
    pub fn id(&self) -> InvocationId {
        self.id
    }

    pub fn set_state(&self, state: InvocationState) {
        self.registry.set_state(self.id, state);
    }
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        // A poisoned lock must not turn into a double panic during unwinding.
        if let Ok(mut active) = self.registry.active.write() {
            active.remove(&self.id);
        }
        tracing::debug!(invocation_id = %self.id, "Invocation unregistered");
    }
}
