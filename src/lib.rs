//! Motion JPEG streaming
//!
//! `mjpeg-rs` pushes a live sequence of JPEG images to any number of viewers
//! as a single `multipart/x-mixed-replace` HTTP response, the format browsers
//! and players such as VLC display as video.
//!
//! One producer calls [`Broadcaster::publish`] with encoded JPEG bytes. Each
//! viewer holds a [`Subscription`] with room for exactly one pending frame:
//! a viewer that falls behind skips frames instead of queueing them, and the
//! producer never waits on any viewer.
//!
//! ```no_run
//! use mjpeg_rs::{Broadcaster, MjpegServer, ServerConfig};
//!
//! # async fn example(jpegs: Vec<Vec<u8>>) -> mjpeg_rs::Result<()> {
//! let broadcaster = Broadcaster::new();
//! let server = MjpegServer::new(ServerConfig::default(), broadcaster.clone());
//!
//! tokio::spawn(async move {
//!     for jpeg in jpegs.iter().cycle() {
//!         broadcaster.publish(jpeg);
//!         tokio::time::sleep(std::time::Duration::from_millis(33)).await;
//!     }
//! });
//!
//! server.run().await
//! # }
//! ```

pub mod broadcast;
pub mod error;
pub mod server;

pub use broadcast::{BroadcastStats, Broadcaster, SubscriberId, Subscription, TryRecvError};
pub use error::{Error, Result};
pub use server::{router, MjpegServer, ServerConfig};
