//! HTTP and WebSocket routes
//!
//! ```text
//! GET  /{app}/{name}[.flv]   play; WebSocket when the request asks to upgrade
//! POST /{app}/{name}[.flv]   publish; the request body is the FLV stream
//! ```
//!
//! Other methods on a stream path get `405`, anything else `400`.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::rejection::ExtensionRejection;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, DefaultBodyLimit, Path, RawQuery, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use futures::{SinkExt, StreamExt, TryStreamExt};
use tokio_util::io::StreamReader;

use crate::error::{Error, ErrorCategory, ProtocolError, Result};
use crate::registry::StreamPath;
use crate::session::{IngestStream, Session, SessionContext, SessionRequest};
use crate::transport::{MessageTransport, StreamTransport, Transport, TransportError};

/// Time a closing WebSocket gets to flush queued chunks
const WS_CLOSE_GRACE: Duration = Duration::from_secs(5);

/// Peer address, present when served with connect info
type Peer = std::result::Result<ConnectInfo<SocketAddr>, ExtensionRejection>;

/// Build the relay router over a shared session context
///
/// Serve it with `into_make_service_with_connect_info::<SocketAddr>()` to
/// get peer addresses in session logs.
pub fn router(ctx: SessionContext) -> Router {
    Router::new()
        .route("/{app}/{name}", get(play).post(publish))
        .fallback(bad_path)
        .layer(DefaultBodyLimit::disable())
        .with_state(ctx)
}

async fn play(
    State(ctx): State<SessionContext>,
    Path((app, name)): Path<(String, String)>,
    RawQuery(query): RawQuery,
    peer: Peer,
    upgrade: std::result::Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let Some(path) = StreamPath::from_segments(&app, &name) else {
        return bad_path().await;
    };
    let request = SessionRequest::play(path, query.as_deref().unwrap_or(""));
    let peer = peer.ok().map(|ConnectInfo(addr)| addr);

    match upgrade {
        Ok(ws) => ws.on_upgrade(move |socket| play_ws(ctx, request, peer, socket)),
        Err(_) => play_http(ctx, request, peer),
    }
}

fn play_http(ctx: SessionContext, request: SessionRequest, peer: Option<SocketAddr>) -> Response {
    let (transport, body) = StreamTransport::channel(ctx.config.player_queue_capacity);
    let session = Session::new(ctx, request, Arc::new(transport), None, peer);

    // Dropping the body (client gone) stops the session through its transport
    tokio::spawn(async move {
        let _ = session.start(None).await;
    });

    (
        [
            (header::CONTENT_TYPE, "video/x-flv"),
            (header::CACHE_CONTROL, "no-cache"),
            (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
        ],
        Body::from_stream(body),
    )
        .into_response()
}

async fn play_ws(
    ctx: SessionContext,
    request: SessionRequest,
    peer: Option<SocketAddr>,
    socket: WebSocket,
) {
    let (transport, mut messages) = MessageTransport::channel(ctx.config.player_queue_capacity);
    let transport = Arc::new(transport);
    let session = Session::new(
        ctx,
        request,
        Arc::clone(&transport) as Arc<dyn Transport>,
        None,
        peer,
    );
    let (mut sink, mut stream) = socket.split();

    let mut forward = tokio::spawn(async move {
        while let Some(chunk) = messages.recv().await {
            if sink.send(Message::Binary(chunk)).await.is_err() {
                return;
            }
        }
        let _ = sink.send(Message::Close(None)).await;
    });

    let remote_closed = async {
        while let Some(message) = stream.next().await {
            match message {
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    transport.notify_closed(Some(TransportError::Io(e.to_string())));
                    return;
                }
            }
        }
        transport.notify_closed(None);
    };

    // Biased so the session is always started before it can be dropped
    tokio::select! {
        biased;
        _ = Arc::clone(&session).start(None) => {}
        _ = remote_closed => {}
    }

    if tokio::time::timeout(WS_CLOSE_GRACE, &mut forward).await.is_err() {
        forward.abort();
    }
}

async fn publish(
    State(ctx): State<SessionContext>,
    Path((app, name)): Path<(String, String)>,
    peer: Peer,
    body: Body,
) -> Response {
    let Some(path) = StreamPath::from_segments(&app, &name) else {
        return bad_path().await;
    };
    let peer = peer.ok().map(|ConnectInfo(addr)| addr);

    // Publishers are answered once the upload ends; this body is never sent
    let (transport, _reply) = StreamTransport::channel(1);
    let session = Session::new(
        ctx,
        SessionRequest::publish(path),
        Arc::new(transport),
        Some(ingest_reader(body)),
        peer,
    );

    let result = session.start(None).await;
    publish_status(&result).into_response()
}

async fn bad_path() -> Response {
    (StatusCode::BAD_REQUEST, "Bad Request").into_response()
}

/// Adapt a request body into the publisher's byte stream
fn ingest_reader(body: Body) -> IngestStream {
    let stream = body.into_data_stream().map_err(body_error);
    Box::new(StreamReader::new(stream))
}

/// Map a body read failure, keeping framing errors distinguishable
///
/// A malformed chunked body surfaces from the HTTP layer as an
/// `InvalidInput`/`InvalidData` I/O error somewhere in the source chain.
fn body_error(err: axum::Error) -> io::Error {
    let mut source: Option<&(dyn std::error::Error + 'static)> = Some(&err);
    while let Some(e) = source {
        if let Some(io_err) = e.downcast_ref::<io::Error>() {
            if matches!(
                io_err.kind(),
                io::ErrorKind::InvalidInput | io::ErrorKind::InvalidData
            ) {
                return io::Error::new(io::ErrorKind::InvalidData, ProtocolError::InvalidChunk);
            }
        }
        source = e.source();
    }
    io::Error::other(err)
}

/// Status a publisher is answered with once its session ends
fn publish_status(result: &Result<()>) -> StatusCode {
    match result {
        Ok(()) => StatusCode::OK,
        Err(Error::Registry(_)) => StatusCode::CONFLICT,
        Err(e) => match e.category() {
            ErrorCategory::Protocol | ErrorCategory::Policy => StatusCode::BAD_REQUEST,
            ErrorCategory::Transport | ErrorCategory::Intentional => StatusCode::OK,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::RegistryError;
    use axum::http::Request;
    use tower::ServiceExt;

    async fn status_of(ctx: &SessionContext, method: &str, uri: &str) -> StatusCode {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        router(ctx.clone())
            .oneshot(request)
            .await
            .unwrap()
            .status()
    }

    #[tokio::test]
    async fn test_rejected_requests() {
        let ctx = SessionContext::standalone();

        assert_eq!(
            status_of(&ctx, "PUT", "/live/cam").await,
            StatusCode::METHOD_NOT_ALLOWED
        );
        assert_eq!(status_of(&ctx, "GET", "/cam").await, StatusCode::BAD_REQUEST);
        assert_eq!(
            status_of(&ctx, "GET", "/live/a/b").await,
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(&ctx, "GET", "/live/.flv").await,
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ctx.registry.session_count(), 0);
    }

    #[tokio::test]
    async fn test_player_response_head() {
        let ctx = SessionContext::standalone();
        let request = Request::builder()
            .uri("/live/cam.flv?receivevideo=0")
            .body(Body::empty())
            .unwrap();

        let response = router(ctx.clone()).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "video/x-flv");
        assert_eq!(response.headers()[header::CACHE_CONTROL], "no-cache");
        assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");

        let registry = Arc::clone(&ctx.registry);
        tokio::time::timeout(Duration::from_secs(2), async {
            while registry.idle_count() != 1 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        // Client went away before any publisher showed up
        drop(response);
        tokio::time::timeout(Duration::from_secs(2), async {
            while registry.session_count() != 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(registry.idle_count(), 0);
    }

    #[test]
    fn test_chunk_framing_error_is_protocol_error() {
        let err = axum::Error::new(io::Error::new(
            io::ErrorKind::InvalidInput,
            "Invalid chunk size line",
        ));
        let mapped = Error::from(body_error(err));
        assert!(matches!(
            mapped,
            Error::Protocol(ProtocolError::InvalidChunk)
        ));

        let err = axum::Error::new(io::Error::new(io::ErrorKind::ConnectionReset, "reset"));
        assert_eq!(Error::from(body_error(err)).category(), ErrorCategory::Transport);
    }

    #[test]
    fn test_publish_status() {
        assert_eq!(publish_status(&Ok(())), StatusCode::OK);
        assert_eq!(
            publish_status(&Err(RegistryError::StreamAlreadyPublishing(
                StreamPath::new("live", "cam")
            )
            .into())),
            StatusCode::CONFLICT
        );
        assert_eq!(
            publish_status(&Err(ProtocolError::InvalidSignature(*b"FLX").into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            publish_status(&Err(ProtocolError::InvalidChunk.into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(publish_status(&Err(Error::Stopped)), StatusCode::OK);
    }
}
