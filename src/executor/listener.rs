//! Progress listeners.
//!
//! A listener receives every forwarded [`StreamUpdate`] while the child runs.
//! Listener failures never abort the read loop: errors and panics are logged
//! and the stream continues.

use std::panic::AssertUnwindSafe;

use async_trait::async_trait;
use futures_util::FutureExt;
use tokio::sync::mpsc;

use crate::executor::StreamUpdate;

/// Default capacity for [`ChannelListener`].
pub const DEFAULT_LISTENER_BUFFER: usize = 64;

/// Error returned by a listener.
#[derive(thiserror::Error, Debug)]
pub enum ListenerError {
    /// The receiving side has gone away.
    #[error("Listener channel closed")]
    Closed,
    /// Delivery failed for another reason.
    #[error("Listener failed: {0}")]
    Failed(String),
}

/// Receives live updates for one invocation.
#[async_trait]
pub trait UpdateListener: Send + Sync {
    /// Handle one update.
    ///
    /// # Errors
    ///
    /// Any error is logged by the executor and otherwise ignored.
    async fn on_update(&self, update: &StreamUpdate) -> Result<(), ListenerError>;
}

/// Forwards updates into a bounded channel the caller drains.
///
/// A full channel applies backpressure to the read loop; a dropped receiver
/// turns every delivery into [`ListenerError::Closed`].
#[derive(Debug, Clone)]
pub struct ChannelListener {
    tx: mpsc::Sender<StreamUpdate>,
}

impl ChannelListener {
    /// Create a listener and the receiver for its updates.
    #[must_use]
    pub fn new(buffer: usize) -> (Self, mpsc::Receiver<StreamUpdate>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (Self { tx }, rx)
    }
}

#[async_trait]
impl UpdateListener for ChannelListener {
    async fn on_update(&self, update: &StreamUpdate) -> Result<(), ListenerError> {
        self.tx
            .send(update.clone())
            .await
            .map_err(|_| ListenerError::Closed)
    }
}

/// Deliver an update, containing any failure.
///
/// Returns `false` if the listener errored or panicked.
pub async fn deliver(listener: &dyn UpdateListener, update: &StreamUpdate) -> bool {
    match AssertUnwindSafe(listener.on_update(update))
        .catch_unwind()
        .await
    {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            tracing::warn!(kind = update.kind().as_str(), error = %e, "Stream listener failed");
            false
        }
        Err(_) => {
            tracing::warn!(kind = update.kind().as_str(), "Stream listener panicked");
            false
        }
    }
}
