//! Per-subscriber delivery channel
//!
//! Each subscriber owns the receiving half of a single-slot channel. The
//! broadcaster only ever attempts a non-blocking send into that slot, so a
//! subscriber that has not picked up its previous frame simply misses the
//! new one.

use std::sync::Weak;

use bytes::Bytes;
use tokio::sync::mpsc;

use super::store::Shared;

/// Unique identifier of a subscriber within one broadcaster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(pub(super) u64);

impl SubscriberId {
    /// Raw numeric value of the id
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Reason [`Subscription::try_recv`] returned no frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TryRecvError {
    /// Nothing is waiting in the delivery slot
    Empty,
    /// The subscriber was unsubscribed or the broadcaster is gone
    Unsubscribed,
}

impl std::fmt::Display for TryRecvError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TryRecvError::Empty => write!(f, "no frame pending"),
            TryRecvError::Unsubscribed => write!(f, "subscriber is no longer registered"),
        }
    }
}

impl std::error::Error for TryRecvError {}

/// A registered consumer of a [`Broadcaster`](super::Broadcaster)
///
/// Dropping the subscription unregisters it.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriberId,
    rx: mpsc::Receiver<Bytes>,
    shared: Weak<Shared>,
}

impl Subscription {
    pub(super) fn new(id: SubscriberId, rx: mpsc::Receiver<Bytes>, shared: Weak<Shared>) -> Self {
        Self { id, rx, shared }
    }

    /// Id of this subscriber, usable with `Broadcaster::unsubscribe`
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Wait for the next frame.
    ///
    /// Returns `None` once the subscriber has been unsubscribed or the
    /// broadcaster has been dropped.
    pub async fn recv(&mut self) -> Option<Bytes> {
        self.rx.recv().await
    }

    /// Blocking variant of [`recv`](Self::recv) for consumers running on
    /// plain threads.
    ///
    /// # Panics
    ///
    /// Panics if called from within an asynchronous execution context.
    pub fn blocking_recv(&mut self) -> Option<Bytes> {
        self.rx.blocking_recv()
    }

    /// Take the pending frame without waiting.
    ///
    /// A frame still in the slot is handed out even after the subscriber
    /// was removed; `Unsubscribed` is only reported once the slot is empty.
    pub fn try_recv(&mut self) -> Result<Bytes, TryRecvError> {
        self.rx.try_recv().map_err(|e| match e {
            mpsc::error::TryRecvError::Empty => TryRecvError::Empty,
            mpsc::error::TryRecvError::Disconnected => TryRecvError::Unsubscribed,
        })
    }

    /// Whether a frame is waiting in the delivery slot
    pub fn has_pending(&self) -> bool {
        !self.rx.is_empty()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(shared) = self.shared.upgrade() {
            shared.remove(self.id);
        }
    }
}
