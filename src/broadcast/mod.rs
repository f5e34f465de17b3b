//! Frame broadcaster for MJPEG streams
//!
//! The broadcaster owns the subscriber registry and the current frame buffer.
//! A producer calls `publish()` with raw JPEG bytes; each call encodes one
//! multipart part and offers it to every subscriber's single-slot channel.
//!
//! # Architecture
//!
//! ```text
//!                        Broadcaster (Arc<Shared>)
//!                   ┌──────────────────────────────┐
//!                   │ Mutex<Inner> {               │
//!                   │   subscribers: HashMap<Id,   │
//!                   │     mpsc::Sender (cap 1)>,   │
//!                   │   buffer: BytesMut,          │
//!                   │   started_at,                │
//!                   │ }                            │
//!                   └──────────────┬───────────────┘
//!                                  │ try_send (never blocks)
//!         ┌────────────────────────┼────────────────────────┐
//!         ▼                        ▼                        ▼
//!   [Subscription]           [Subscription]           [Subscription]
//!   recv().await             recv().await             (slot full: frame
//!         │                        │                   dropped)
//!         └──► Connection ──► TCP  └──► Connection ──► TCP
//! ```
//!
//! # Frame sharing
//!
//! Every publish splits the encoded frame off the reusable `BytesMut` and
//! freezes it, so all subscribers reached by one publish hold the same
//! reference-counted `Bytes` allocation.

pub mod header;
pub mod stats;
pub mod store;
pub mod subscription;

pub use header::{frame_header, BOUNDARY, STREAM_CONTENT_TYPE};
pub use stats::BroadcastStats;
pub use store::Broadcaster;
pub use subscription::{SubscriberId, Subscription, TryRecvError};
