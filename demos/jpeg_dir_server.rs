//! Serve a directory of JPEG files as a looping MJPEG stream
//!
//! Run with: cargo run --example jpeg_dir_server DIR [BIND_ADDR] [FPS]
//!
//! Examples:
//!   cargo run --example jpeg_dir_server ./frames                   # 0.0.0.0:8080, 10 fps
//!   cargo run --example jpeg_dir_server ./frames 127.0.0.1:8081    # custom address
//!   cargo run --example jpeg_dir_server ./frames 0.0.0.0:8080 25   # 25 fps
//!
//! ## Viewing
//!
//! In a browser:
//!   http://localhost:8080/
//!
//! With VLC:
//!   vlc http://localhost:8080/
//!
//! With ffplay:
//!   ffplay -f mjpeg http://localhost:8080/
//!
//! Set RUST_LOG=mjpeg_rs=debug to see viewers come and go.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use mjpeg_rs::{Broadcaster, MjpegServer, ServerConfig};
use tracing_subscriber::EnvFilter;

const DEFAULT_FPS: u32 = 10;

async fn load_frames(dir: &Path) -> std::io::Result<Vec<Vec<u8>>> {
    let mut paths: Vec<PathBuf> = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let is_jpeg = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("jpg") || ext.eq_ignore_ascii_case("jpeg"))
            .unwrap_or(false);
        if is_jpeg {
            paths.push(path);
        }
    }

    paths.sort();

    let mut frames = Vec::with_capacity(paths.len());
    for path in paths {
        frames.push(tokio::fs::read(&path).await?);
    }
    Ok(frames)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("mjpeg_rs=info")),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let dir = match args.next() {
        Some(dir) => PathBuf::from(dir),
        None => {
            eprintln!("usage: jpeg_dir_server DIR [BIND_ADDR] [FPS]");
            std::process::exit(2);
        }
    };
    let addr: SocketAddr = match args.next() {
        Some(addr) => addr.parse()?,
        None => "0.0.0.0:8080".parse()?,
    };
    let fps: u32 = match args.next() {
        Some(fps) => fps.parse()?,
        None => DEFAULT_FPS,
    };

    let frames = load_frames(&dir).await?;
    if frames.is_empty() {
        eprintln!("no .jpg/.jpeg files found in {}", dir.display());
        std::process::exit(1);
    }
    println!("Loaded {} frames from {}", frames.len(), dir.display());

    let broadcaster = Broadcaster::new();
    let config = ServerConfig::with_addr(addr);
    let server = MjpegServer::new(config, broadcaster.clone());

    let producer = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(1) / fps.max(1));
        let mut published = 0u64;

        for frame in frames.iter().cycle() {
            ticker.tick().await;
            broadcaster.publish(frame);
            published += 1;

            if published % (u64::from(fps.max(1)) * 10) == 0 {
                let stats = broadcaster.stats();
                println!(
                    "Stats: viewers={} published={} delivered={} dropped={} ({:.1}%)",
                    stats.subscribers,
                    stats.frames_published,
                    stats.frames_delivered,
                    stats.frames_dropped,
                    stats.drop_ratio() * 100.0,
                );
            }
        }
    });

    println!("Streaming on http://{}/", server.bind_addr());

    server
        .run_until(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    producer.abort();
    Ok(())
}
