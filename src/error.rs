//! Error taxonomy for the proxy.
//!
//! Pre-upgrade errors map to an HTTP status and are answered on the normal
//! request/response path. Relay errors happen after the 101 response has been
//! written and can only terminate the session they belong to.

use std::time::Duration;

use axum::http::StatusCode;
use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// Error raised while accepting a session, before any frames are relayed.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// The inbound request is not a WebSocket upgrade attempt.
    #[error("request is not a websocket upgrade: {0}")]
    NotAnUpgrade(String),

    /// The Origin header was rejected by the configured policy.
    #[error("origin {0:?} rejected by policy")]
    OriginDenied(String),

    /// No backend URL could be derived for this request.
    #[error("no backend target resolved for {0}")]
    Unresolvable(String),

    /// The outbound handshake request could not be constructed.
    #[error("failed to build backend handshake request: {0}")]
    BackendRequest(#[source] tungstenite::Error),

    /// The backend refused the connection or failed its handshake.
    #[error("backend dial failed: {0}")]
    Dial(#[source] tungstenite::Error),

    /// The backend did not complete its handshake within the connect timeout.
    #[error("backend dial timed out after {0:?}")]
    DialTimeout(Duration),

    /// The client-side upgrade failed after the backend was already connected.
    #[error("client upgrade failed: {0}")]
    ClientUpgrade(#[source] axum::Error),

    /// A failure inside an established session, reported through the error
    /// hook only; never surfaced as an HTTP response.
    #[error("relay failed: {0}")]
    Relay(#[from] RelayError),
}

impl ProxyError {
    /// HTTP status used when the error is answered on the request path.
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::NotAnUpgrade(_) => StatusCode::BAD_REQUEST,
            ProxyError::OriginDenied(_) => StatusCode::FORBIDDEN,
            ProxyError::Unresolvable(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ProxyError::BackendRequest(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ProxyError::Dial(_) => StatusCode::BAD_GATEWAY,
            ProxyError::DialTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            // Post-upgrade errors never reach the HTTP layer; the mapping
            // exists so the hook can treat every variant uniformly.
            ProxyError::ClientUpgrade(_) | ProxyError::Relay(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

/// Error observed by one relay direction mid-session.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Read or write failure on the client-facing connection.
    #[error("client connection: {0}")]
    Client(#[from] axum::Error),

    /// Read or write failure on the backend connection.
    #[error("backend connection: {0}")]
    Backend(#[from] tungstenite::Error),

    /// A control-frame write did not complete within the configured bound.
    #[error("control frame write timed out after {0:?}")]
    ControlWriteTimeout(Duration),
}
