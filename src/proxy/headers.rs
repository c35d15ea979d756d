//! Outbound handshake construction.
//!
//! # Responsibilities
//! - Copy inbound request headers onto the backend handshake request
//! - Strip connection-hop headers (the upgrade triplet, handshake keys,
//!   consumed forwarding markers)
//! - Forward the original Host header verbatim
//! - Carry the client's subprotocol offer through unchanged
//! - Append standard forwarding markers for the hop the proxy adds

use std::net::SocketAddr;

use axum::http::header::{self, HeaderValue};
use axum::http::request::Parts;
use tokio_tungstenite::tungstenite::{self, client::IntoClientRequest};
use url::Url;

/// The outbound backend handshake request, ready for the dialer. Axum and
/// tungstenite share the same underlying `http` types, so headers copy over
/// without translation.
pub type HandshakeRequest = tungstenite::handshake::client::Request;

/// Headers that belong to the client↔proxy hop and must not be replayed to
/// the backend. The dialer generates fresh values for the upgrade triplet
/// and handshake key; forwarding markers are consumed here and re-appended
/// with this hop included. `Sec-WebSocket-Protocol` is deliberately absent:
/// the offer list is forwarded so the backend can choose.
const HOP_HEADERS: &[header::HeaderName] = &[
    header::CONNECTION,
    header::UPGRADE,
    header::SEC_WEBSOCKET_KEY,
    header::SEC_WEBSOCKET_VERSION,
    header::SEC_WEBSOCKET_ACCEPT,
    header::SEC_WEBSOCKET_EXTENSIONS,
    header::HOST,
    header::FORWARDED,
];

const X_FORWARDED_FOR: &str = "x-forwarded-for";
const X_FORWARDED_PROTO: &str = "x-forwarded-proto";

/// Build the proxy→backend handshake request from the inbound request.
///
/// The backend URL decides where the dial goes; everything the client sent
/// (minus the hop headers) rides along, and the client's original Host is
/// what the backend will observe.
pub fn build_backend_request(
    backend: &Url,
    inbound: &Parts,
    client_addr: SocketAddr,
) -> Result<HandshakeRequest, tungstenite::Error> {
    let mut request = backend.as_str().into_client_request()?;

    for (name, value) in inbound.headers.iter() {
        if HOP_HEADERS.contains(name)
            || name.as_str() == X_FORWARDED_FOR
            || name.as_str() == X_FORWARDED_PROTO
        {
            continue;
        }
        request.headers_mut().append(name.clone(), value.clone());
    }

    restore_forwarded_host(&mut request, inbound);

    // This proxy becomes one more hop in the forwarding chain.
    let forwarded_for = match inbound
        .headers
        .get(X_FORWARDED_FOR)
        .and_then(|v| v.to_str().ok())
    {
        Some(prior) => format!("{prior}, {}", client_addr.ip()),
        None => client_addr.ip().to_string(),
    };
    if let Ok(value) = HeaderValue::from_str(&forwarded_for) {
        request.headers_mut().insert(X_FORWARDED_FOR, value);
    }
    // The listener speaks plain HTTP; TLS termination happens in front of us.
    request
        .headers_mut()
        .insert(X_FORWARDED_PROTO, HeaderValue::from_static("http"));

    Ok(request)
}

/// Re-assert the inbound Host header on the outbound request.
///
/// Called once during construction and again after the director hook runs,
/// so a director cannot suppress Host forwarding.
pub fn restore_forwarded_host(request: &mut HandshakeRequest, inbound: &Parts) {
    if let Some(host) = inbound.headers.get(header::HOST) {
        request.headers_mut().insert(header::HOST, host.clone());
    }
}
