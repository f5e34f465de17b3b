//! HTTP handler for MJPEG viewers
//!
//! Each `GET` on the stream route subscribes to the broadcaster and answers
//! with a never-ending `multipart/x-mixed-replace` body. The body pulls one
//! frame per `frame_interval` from the subscription. When hyper stops polling
//! the body (peer gone, write failed, server shutting down) the body is
//! dropped, and the subscription with it.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use bytes::Bytes;
use futures::stream::{self, Stream};
use tokio::sync::{watch, OwnedSemaphorePermit, Semaphore};

use crate::broadcast::{Broadcaster, Subscription, STREAM_CONTENT_TYPE};
use crate::server::config::ServerConfig;

/// Shared state passed to the stream handler
#[derive(Clone)]
struct AppState {
    broadcaster: Broadcaster,
    frame_interval: Duration,
    connection_semaphore: Option<Arc<Semaphore>>,
    next_session_id: Arc<AtomicU64>,
    /// Flips to `true` when the server is shutting down
    shutdown: watch::Receiver<bool>,
}

impl AppState {
    fn acquire_permit(&self) -> Result<Option<OwnedSemaphorePermit>, ()> {
        match self.connection_semaphore {
            Some(ref sem) => sem.clone().try_acquire_owned().map(Some).map_err(|_| ()),
            None => Ok(None),
        }
    }
}

/// Build a router serving the stream of `broadcaster` as configured.
///
/// Mount it into a larger axum application or hand it to `axum::serve`.
/// The stream handler needs `ConnectInfo<SocketAddr>`, so serve it with
/// `into_make_service_with_connect_info::<SocketAddr>()`.
pub fn router(config: &ServerConfig, broadcaster: Broadcaster) -> Router {
    // Sender dropped right away: streams never see a shutdown signal
    let (_, shutdown) = watch::channel(false);
    router_with_shutdown(config, broadcaster, shutdown)
}

pub(crate) fn router_with_shutdown(
    config: &ServerConfig,
    broadcaster: Broadcaster,
    shutdown: watch::Receiver<bool>,
) -> Router {
    let connection_semaphore = if config.max_connections > 0 {
        Some(Arc::new(Semaphore::new(config.max_connections)))
    } else {
        None
    };

    let state = AppState {
        broadcaster,
        frame_interval: config.frame_interval,
        connection_semaphore,
        next_session_id: Arc::new(AtomicU64::new(1)),
        shutdown,
    };

    let routes = match config.route_path() {
        Some(path) => Router::new().route(&path, get(stream_viewer)),
        None => Router::new()
            .route("/", get(stream_viewer))
            .route("/{*path}", get(stream_viewer)),
    };

    routes.with_state(state)
}

/// Handles `GET` requests on the stream route.
async fn stream_viewer(
    State(state): State<AppState>,
    ConnectInfo(peer_addr): ConnectInfo<SocketAddr>,
) -> Response {
    let permit = match state.acquire_permit() {
        Ok(permit) => permit,
        Err(()) => {
            tracing::warn!(peer = %peer_addr, "Viewer rejected: limit reached");
            return StatusCode::SERVICE_UNAVAILABLE.into_response();
        }
    };

    let session_id = state.next_session_id.fetch_add(1, Ordering::Relaxed);
    let subscription = state.broadcaster.subscribe();

    tracing::info!(
        session_id = session_id,
        peer = %peer_addr,
        subscriber = %subscription.id(),
        "Viewer connected"
    );

    let viewer = Viewer {
        session_id,
        peer_addr,
        subscription,
        frame_interval: state.frame_interval,
        shutdown: state.shutdown.clone(),
        _permit: permit,
    };

    (
        [
            (header::CONTENT_TYPE, STREAM_CONTENT_TYPE),
            (header::CACHE_CONTROL, "no-cache, no-store, must-revalidate"),
            (header::PRAGMA, "no-cache"),
            (header::CONNECTION, "close"),
        ],
        Body::from_stream(viewer.into_stream()),
    )
        .into_response()
}

/// One connected viewer, owned by its response body
struct Viewer {
    session_id: u64,
    peer_addr: SocketAddr,
    subscription: Subscription,
    frame_interval: Duration,
    shutdown: watch::Receiver<bool>,
    _permit: Option<OwnedSemaphorePermit>,
}

impl Viewer {
    /// Wait out the pacing interval, then take the next frame.
    ///
    /// `None` ends the body: the subscriber was removed or the server is
    /// shutting down.
    async fn next_frame(&mut self) -> Option<Bytes> {
        let Viewer {
            subscription,
            shutdown,
            frame_interval,
            ..
        } = self;
        let interval = *frame_interval;

        tokio::select! {
            _ = shutdown_signal(shutdown) => None,
            frame = async {
                tokio::time::sleep(interval).await;
                subscription.recv().await
            } => frame,
        }
    }

    fn into_stream(self) -> impl Stream<Item = Result<Bytes, Infallible>> + Send + 'static {
        stream::unfold(self, |mut viewer| async move {
            let frame = viewer.next_frame().await?;
            Some((Ok::<_, Infallible>(frame), viewer))
        })
    }
}

/// Resolves once the server starts shutting down. Never resolves if the
/// sending side is gone.
async fn shutdown_signal(shutdown: &mut watch::Receiver<bool>) {
    loop {
        let stopping = *shutdown.borrow_and_update();
        if stopping {
            return;
        }
        if shutdown.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

impl Drop for Viewer {
    fn drop(&mut self) {
        tracing::info!(
            session_id = self.session_id,
            peer = %self.peer_addr,
            "Viewer disconnected"
        );
    }
}

#[cfg(test)]
mod tests {
    use axum::body::BodyDataStream;
    use axum::http::Request;
    use futures::StreamExt;
    use tower::ServiceExt;

    use super::*;

    fn peer() -> SocketAddr {
        "127.0.0.1:50000".parse().unwrap()
    }

    fn fast_config() -> ServerConfig {
        ServerConfig::default().frame_interval(Duration::from_millis(1))
    }

    async fn request(app: &Router, method: &str, uri: &str) -> Response {
        let req = Request::builder()
            .method(method)
            .uri(uri)
            .extension(ConnectInfo(peer()))
            .body(Body::empty())
            .unwrap();
        app.clone().oneshot(req).await.unwrap()
    }

    fn frames(response: Response) -> BodyDataStream {
        response.into_body().into_data_stream()
    }

    async fn next_frame(body: &mut BodyDataStream) -> Bytes {
        tokio::time::timeout(Duration::from_secs(2), body.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("body ended early")
            .unwrap()
    }

    #[tokio::test]
    async fn test_streams_frames_verbatim() {
        let broadcaster = Broadcaster::new();
        let app = router(&fast_config(), broadcaster.clone());

        let response = request(&app, "GET", "/").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "multipart/x-mixed-replace;boundary=MJPEGBOUNDARY"
        );
        assert_eq!(response.headers()[header::CACHE_CONTROL], "no-cache, no-store, must-revalidate");
        assert_eq!(broadcaster.subscriber_count(), 1);

        let mut reference = broadcaster.subscribe();
        let mut body = frames(response);

        broadcaster.publish(b"jpeg-one");
        let frame = next_frame(&mut body).await;
        assert_eq!(frame, reference.try_recv().unwrap());
        assert!(frame.starts_with(b"\r\n--MJPEGBOUNDARY\r\nContent-Type: image/jpeg\r\n"));
        assert!(frame.ends_with(b"\r\n\r\njpeg-one"));

        broadcaster.publish(b"jpeg-two");
        let frame = next_frame(&mut body).await;
        assert!(frame.ends_with(b"jpeg-two"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_frames_paced_by_interval() {
        let broadcaster = Broadcaster::new();
        let config = ServerConfig::default().frame_interval(Duration::from_millis(100));
        let app = router(&config, broadcaster.clone());

        let mut body = frames(request(&app, "GET", "/").await);
        let start = tokio::time::Instant::now();

        broadcaster.publish(b"paced");

        // Frame is already waiting in the slot, but the interval holds it back
        let early = tokio::time::timeout(Duration::from_millis(99), body.next()).await;
        assert!(early.is_err());

        let frame = body.next().await.unwrap().unwrap();
        assert!(frame.ends_with(b"paced"));
        assert!(start.elapsed() >= Duration::from_millis(100));

        // The wait applies again before every following frame
        broadcaster.publish(b"paced-again");
        let second_start = tokio::time::Instant::now();
        let early = tokio::time::timeout(Duration::from_millis(99), body.next()).await;
        assert!(early.is_err());
        let frame = body.next().await.unwrap().unwrap();
        assert!(frame.ends_with(b"paced-again"));
        assert!(second_start.elapsed() >= Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_dropping_body_unsubscribes() {
        let broadcaster = Broadcaster::new();
        let app = router(&fast_config(), broadcaster.clone());

        let mut body = frames(request(&app, "GET", "/").await);
        broadcaster.publish(b"one");
        next_frame(&mut body).await;
        assert_eq!(broadcaster.subscriber_count(), 1);

        drop(body);
        assert_eq!(broadcaster.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_broadcaster_drop_ends_body() {
        let broadcaster = Broadcaster::new();
        let app = router(&fast_config(), broadcaster.clone());

        let mut body = frames(request(&app, "GET", "/").await);
        drop(app);
        drop(broadcaster);

        let end = tokio::time::timeout(Duration::from_secs(2), body.next())
            .await
            .unwrap();
        assert!(end.is_none());
    }

    #[tokio::test]
    async fn test_method_not_allowed() {
        let broadcaster = Broadcaster::new();
        let app = router(&fast_config(), broadcaster.clone());

        let response = request(&app, "POST", "/").await;
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(broadcaster.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_path() {
        let broadcaster = Broadcaster::new();
        let app = router(&fast_config().path("/camera"), broadcaster.clone());

        let response = request(&app, "GET", "/other").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(broadcaster.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_configured_path_with_query() {
        let broadcaster = Broadcaster::new();
        let app = router(&fast_config().path("camera"), broadcaster.clone());

        let response = request(&app, "GET", "/camera?t=123").await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_any_path_when_unconfigured() {
        let broadcaster = Broadcaster::new();
        let app = router(&fast_config(), broadcaster.clone());

        let response = request(&app, "GET", "/cams/front").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(broadcaster.subscriber_count(), 1);
    }

    #[tokio::test]
    async fn test_connection_limit() {
        let broadcaster = Broadcaster::new();
        let app = router(&fast_config().max_connections(1), broadcaster.clone());

        let first = request(&app, "GET", "/").await;
        assert_eq!(first.status(), StatusCode::OK);

        let second = request(&app, "GET", "/").await;
        assert_eq!(second.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(broadcaster.subscriber_count(), 1);

        // Permit is released together with the first body
        drop(first);
        let third = request(&app, "GET", "/").await;
        assert_eq!(third.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_shutdown_ends_stream() {
        let broadcaster = Broadcaster::new();
        let (tx, rx) = watch::channel(false);
        let app = router_with_shutdown(&fast_config(), broadcaster.clone(), rx);

        let mut body = frames(request(&app, "GET", "/").await);
        tx.send(true).unwrap();

        let end = tokio::time::timeout(Duration::from_secs(2), body.next())
            .await
            .unwrap();
        assert!(end.is_none());
        drop(body);
        assert_eq!(broadcaster.subscriber_count(), 0);
    }
}
