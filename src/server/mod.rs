//! HTTP server for MJPEG viewers
//!
//! An axum router answering `GET` on the stream route with a never-ending
//! `multipart/x-mixed-replace` body, plus a listener that serves it.

pub mod config;
pub mod handler;
pub mod listener;

pub use config::ServerConfig;
pub use handler::router;
pub use listener::MjpegServer;
