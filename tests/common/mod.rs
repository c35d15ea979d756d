//! Shared utilities for integration testing: in-process WebSocket backends
//! with observable behavior, a proxy spawner, and a dial helper.

use std::net::SocketAddr;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::Response;
use axum::routing::any;
use axum::Router;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::{tungstenite, MaybeTlsStream, WebSocketStream};

use websocket_proxy::config::ProxyConfig;
use websocket_proxy::http::HttpServer;
use websocket_proxy::proxy::WebsocketProxy;

/// Generous upper bound for every await in the suite; nothing should ever
/// come close to it.
pub const TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// What the backend harness observed on its side of the proxy.
#[derive(Debug)]
pub enum BackendEvent {
    /// A client (the proxy) completed the handshake; captured headers.
    Connected(HeaderMap),
    /// A ping frame arrived with this payload.
    Ping(Vec<u8>),
    /// A pong frame arrived with this payload.
    Pong(Vec<u8>),
    /// A close frame arrived (code, reason), or a no-status close.
    Close(Option<(u16, String)>),
}

/// How the backend harness behaves once a session is up.
#[derive(Debug, Clone, Copy)]
pub enum BackendMode {
    /// Echo every data frame back unchanged.
    Echo,
    /// Echo, and send a ping with payload `whocares` right after the first
    /// text frame.
    PingAfterFirstMessage,
    /// Accept the upgrade, then drop the connection without a close frame.
    DropAfterUpgrade,
}

/// Spawn a WebSocket backend on an ephemeral port. Every connection's
/// observations are reported through the returned channel.
pub async fn spawn_backend(mode: BackendMode) -> (SocketAddr, UnboundedReceiver<BackendEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let app = Router::new()
        .route("/", any(backend_handler))
        .route("/{*path}", any(backend_handler))
        .with_state((mode, tx));

    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    (addr, rx)
}

async fn backend_handler(
    State((mode, tx)): State<(BackendMode, UnboundedSender<BackendEvent>)>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let _ = tx.send(BackendEvent::Connected(headers));
    ws.protocols(["test-protocol"])
        .on_upgrade(move |socket| run_backend(socket, mode, tx))
}

async fn run_backend(mut socket: WebSocket, mode: BackendMode, tx: UnboundedSender<BackendEvent>) {
    if matches!(mode, BackendMode::DropAfterUpgrade) {
        // Dropping the socket tears the TCP connection down with no close
        // handshake, which is exactly what this mode is for.
        return;
    }

    let mut seen_first_text = false;
    while let Some(Ok(message)) = socket.recv().await {
        match message {
            Message::Text(text) => {
                if !seen_first_text && matches!(mode, BackendMode::PingAfterFirstMessage) {
                    seen_first_text = true;
                    if socket
                        .send(Message::Ping(Bytes::from_static(b"whocares")))
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
                if socket.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
            Message::Binary(data) => {
                if socket.send(Message::Binary(data)).await.is_err() {
                    break;
                }
            }
            Message::Ping(payload) => {
                let _ = tx.send(BackendEvent::Ping(payload.to_vec()));
            }
            Message::Pong(payload) => {
                let _ = tx.send(BackendEvent::Pong(payload.to_vec()));
            }
            Message::Close(frame) => {
                let _ = tx.send(BackendEvent::Close(
                    frame.map(|f| (f.code, f.reason.as_str().to_owned())),
                ));
                break;
            }
        }
    }
}

/// Spawn the proxy under test on an ephemeral port.
pub async fn spawn_proxy(proxy: WebsocketProxy) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = HttpServer::with_proxy(ProxyConfig::default(), proxy);

    tokio::spawn(async move {
        let _ = server.run(listener).await;
    });

    addr
}

pub type ClientStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Dial the proxy as a WebSocket client, optionally offering subprotocols
/// and an Origin header.
pub async fn dial(
    addr: SocketAddr,
    path: &str,
    subprotocols: Option<&str>,
    origin: Option<&str>,
) -> Result<(ClientStream, tungstenite::handshake::client::Response), tungstenite::Error> {
    let mut request = format!("ws://{addr}{path}").into_client_request()?;
    if let Some(offer) = subprotocols {
        request.headers_mut().insert(
            "sec-websocket-protocol",
            HeaderValue::from_str(offer).unwrap(),
        );
    }
    if let Some(origin) = origin {
        request
            .headers_mut()
            .insert("origin", HeaderValue::from_str(origin).unwrap());
    }
    tokio_tungstenite::connect_async(request).await
}

/// Receive the next backend event, failing the test on a hang.
pub async fn recv_event(rx: &mut UnboundedReceiver<BackendEvent>) -> BackendEvent {
    tokio::time::timeout(TEST_TIMEOUT, rx.recv())
        .await
        .expect("timed out waiting for a backend event")
        .expect("backend event channel closed")
}
