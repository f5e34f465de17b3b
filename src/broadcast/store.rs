//! Frame broadcaster implementation
//!
//! Holds the subscriber registry and the frame buffer behind one lock, and
//! fans every published frame out to the subscribers without ever waiting on
//! them.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use tokio::sync::mpsc::{self, error::TrySendError};

use super::header::encode_frame;
use super::stats::BroadcastStats;
use super::subscription::{SubscriberId, Subscription};

/// Registry, buffer and counters guarded by the broadcaster lock
struct Inner {
    subscribers: HashMap<SubscriberId, mpsc::Sender<Bytes>>,
    /// Reusable storage for the next frame
    buffer: BytesMut,
    /// Origin of the `X-Timestamp` clock, set by the first subscribe
    started_at: Option<Instant>,
    next_id: u64,
    frames_published: u64,
    frames_delivered: u64,
    frames_dropped: u64,
    last_frame_size: usize,
}

pub(super) struct Shared {
    inner: Mutex<Inner>,
}

impl Shared {
    pub(super) fn remove(&self, id: SubscriberId) {
        let mut inner = self.inner.lock();
        if inner.subscribers.remove(&id).is_some() {
            tracing::debug!(
                subscriber = %id,
                subscribers = inner.subscribers.len(),
                "Subscriber removed"
            );
        }
    }
}

/// Fan-out point for a single MJPEG stream
///
/// Cloning a `Broadcaster` yields another handle to the same stream; create
/// separate instances for independent streams.
///
/// ```
/// use mjpeg_rs::Broadcaster;
///
/// let broadcaster = Broadcaster::new();
/// let mut viewer = broadcaster.subscribe();
///
/// broadcaster.publish(b"\xFF\xD8...\xFF\xD9");
/// let frame = viewer.try_recv().unwrap();
/// assert!(frame.starts_with(b"\r\n--MJPEGBOUNDARY\r\n"));
/// ```
#[derive(Clone)]
pub struct Broadcaster {
    shared: Arc<Shared>,
}

impl Broadcaster {
    /// Create a broadcaster with no subscribers
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner {
                    subscribers: HashMap::new(),
                    buffer: BytesMut::new(),
                    started_at: None,
                    next_id: 1,
                    frames_published: 0,
                    frames_delivered: 0,
                    frames_dropped: 0,
                    last_frame_size: 0,
                }),
            }),
        }
    }

    /// Publish a JPEG frame to every subscriber.
    ///
    /// Empty input is ignored. A subscriber that still holds an undelivered
    /// frame does not get this one; the call never waits on subscribers.
    pub fn publish(&self, jpeg: &[u8]) {
        if jpeg.is_empty() {
            return;
        }

        let mut guard = self.shared.inner.lock();
        let inner = &mut *guard;

        let elapsed = inner
            .started_at
            .map(|start| start.elapsed())
            .unwrap_or(Duration::ZERO);

        encode_frame(&mut inner.buffer, jpeg, elapsed);
        let frame = inner.buffer.split().freeze();

        let mut delivered = 0;
        let mut dropped = 0;
        inner
            .subscribers
            .retain(|_, tx| match tx.try_send(frame.clone()) {
                Ok(()) => {
                    delivered += 1;
                    true
                }
                Err(TrySendError::Full(_)) => {
                    dropped += 1;
                    true
                }
                Err(TrySendError::Closed(_)) => false,
            });

        inner.frames_published += 1;
        inner.frames_delivered += delivered;
        inner.frames_dropped += dropped;
        inner.last_frame_size = frame.len();

        tracing::trace!(
            size = frame.len(),
            delivered = delivered,
            dropped = dropped,
            "Frame published"
        );
    }

    /// Register a new subscriber.
    ///
    /// The first subscriber ever attached starts the stream clock used for
    /// frame timestamps.
    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::channel(1);

        let mut inner = self.shared.inner.lock();
        let id = SubscriberId(inner.next_id);
        inner.next_id += 1;
        inner.subscribers.insert(id, tx);

        if inner.started_at.is_none() {
            inner.started_at = Some(Instant::now());
        }

        tracing::debug!(
            subscriber = %id,
            subscribers = inner.subscribers.len(),
            "Subscriber added"
        );

        Subscription::new(id, rx, Arc::downgrade(&self.shared))
    }

    /// Remove a subscriber. Unknown or already removed ids are ignored.
    ///
    /// The subscriber's pending `recv` resolves to `None` afterwards.
    pub fn unsubscribe(&self, id: SubscriberId) {
        self.shared.remove(id);
    }

    /// Number of registered subscribers
    pub fn subscriber_count(&self) -> usize {
        self.shared.inner.lock().subscribers.len()
    }

    /// When the stream clock started, if any subscriber has attached yet
    pub fn started_at(&self) -> Option<Instant> {
        self.shared.inner.lock().started_at
    }

    /// Snapshot of the broadcaster counters
    pub fn stats(&self) -> BroadcastStats {
        let inner = self.shared.inner.lock();
        BroadcastStats {
            subscribers: inner.subscribers.len(),
            frames_published: inner.frames_published,
            frames_delivered: inner.frames_delivered,
            frames_dropped: inner.frames_dropped,
            last_frame_size: inner.last_frame_size,
        }
    }
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Broadcaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Broadcaster")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
