//! Session establishment: upgrade detection, backend dial, handshake
//! negotiation.
//!
//! # Responsibilities
//! - Reject non-upgrade requests with a plain HTTP error (routing
//!   precondition, not a protocol error)
//! - Enforce the configured origin policy
//! - Resolve the backend target (static URL or per-request function)
//! - Dial the backend *before* completing the client upgrade, so a dead
//!   backend surfaces as a gateway error and never as an upgraded-then-
//!   dropped connection
//! - Complete the client upgrade with exactly what the backend negotiated
//! - Hand both connections to a [`Session`]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::{header, HeaderValue, Request};
use axum::response::{IntoResponse, Response};
use tokio_tungstenite::connect_async_with_config;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use url::Url;
use uuid::Uuid;

use crate::config::{ProxyConfig, TimeoutConfig, UpgradeConfig};
use crate::error::ProxyError;
use crate::observability::metrics;
use crate::proxy::headers::{self, HandshakeRequest};
use crate::proxy::origin::OriginPolicy;
use crate::proxy::session::Session;
use crate::proxy::ErrorHook;

/// Hook invoked with the outbound backend handshake request before the dial.
/// May add or remove headers; it cannot suppress the forwarded Host header.
pub type Director = Arc<dyn Fn(&mut HandshakeRequest) + Send + Sync>;

/// Computes the backend URL for one inbound request.
pub type BackendResolver = Arc<dyn Fn(&Parts) -> Option<Url> + Send + Sync>;

/// Where sessions are proxied to.
#[derive(Clone)]
pub enum BackendTarget {
    /// Fixed scheme/host/port; path and query follow the inbound request.
    Static(Url),
    /// Per-request resolution; `None` means the target is unresolvable.
    Dynamic(BackendResolver),
}

/// The WebSocket reverse proxy: one instance serves any number of
/// concurrent sessions against its configured backend.
pub struct WebsocketProxy {
    target: BackendTarget,
    origin: OriginPolicy,
    director: Option<Director>,
    upgrade: UpgradeConfig,
    timeouts: TimeoutConfig,
    on_error: Option<ErrorHook>,
}

impl WebsocketProxy {
    /// Proxy every session to a fixed backend.
    pub fn new(backend: Url) -> Self {
        Self {
            target: BackendTarget::Static(backend),
            origin: OriginPolicy::default(),
            director: None,
            upgrade: UpgradeConfig::default(),
            timeouts: TimeoutConfig::default(),
            on_error: None,
        }
    }

    /// Proxy each session to a backend computed from its request.
    pub fn with_resolver(resolver: BackendResolver) -> Self {
        Self {
            target: BackendTarget::Dynamic(resolver),
            origin: OriginPolicy::default(),
            director: None,
            upgrade: UpgradeConfig::default(),
            timeouts: TimeoutConfig::default(),
            on_error: None,
        }
    }

    /// Build a proxy from file configuration.
    pub fn from_config(config: &ProxyConfig) -> Result<Self, url::ParseError> {
        let backend = Url::parse(&config.backend.url)?;
        Ok(Self {
            target: BackendTarget::Static(backend),
            origin: OriginPolicy::from_config(&config.upgrade.origin),
            director: None,
            upgrade: config.upgrade.clone(),
            timeouts: config.timeouts.clone(),
            on_error: None,
        })
    }

    pub fn with_origin_policy(mut self, origin: OriginPolicy) -> Self {
        self.origin = origin;
        self
    }

    pub fn with_director(mut self, director: Director) -> Self {
        self.director = Some(director);
        self
    }

    pub fn with_error_hook(mut self, hook: ErrorHook) -> Self {
        self.on_error = Some(hook);
        self
    }

    pub fn with_upgrade_config(mut self, upgrade: UpgradeConfig) -> Self {
        self.upgrade = upgrade;
        self
    }

    pub fn with_timeouts(mut self, timeouts: TimeoutConfig) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Serve one inbound request. Pre-upgrade failures become plain HTTP
    /// error responses; an accepted request returns the 101 upgrade and the
    /// session runs on its own task afterwards.
    pub async fn serve(&self, client_addr: SocketAddr, request: Request<Body>) -> Response {
        match self.try_serve(client_addr, request).await {
            Ok(response) => response,
            Err(error) => {
                metrics::upgrade_rejected();
                tracing::warn!(
                    client_addr = %client_addr,
                    status = error.status().as_u16(),
                    error = %error,
                    "Refusing websocket session"
                );
                if let Some(hook) = &self.on_error {
                    hook(&error);
                }
                (error.status(), error.to_string()).into_response()
            }
        }
    }

    async fn try_serve(
        &self,
        client_addr: SocketAddr,
        request: Request<Body>,
    ) -> Result<Response, ProxyError> {
        let (mut parts, _body) = request.into_parts();

        // 1. Routing precondition: this must be a websocket upgrade attempt.
        let upgrade = WebSocketUpgrade::from_request_parts(&mut parts, &())
            .await
            .map_err(|rejection| ProxyError::NotAnUpgrade(rejection.to_string()))?;

        // 2. Origin gate.
        let origin = parts
            .headers
            .get(header::ORIGIN)
            .and_then(|value| value.to_str().ok());
        if !self.origin.allows(origin) {
            return Err(ProxyError::OriginDenied(
                origin.unwrap_or_default().to_string(),
            ));
        }

        // 3. Resolve the target and dial the backend first. The director
        //    sees the outbound request before it is sent; Host forwarding is
        //    re-asserted afterwards so it cannot be suppressed.
        let backend_url = self.resolve(&parts)?;
        let mut backend_request = headers::build_backend_request(&backend_url, &parts, client_addr)
            .map_err(ProxyError::BackendRequest)?;
        // When the client offered no subprotocols, the locally configured
        // list becomes the offer for the backend leg.
        if !self.upgrade.subprotocols.is_empty()
            && !backend_request
                .headers()
                .contains_key(header::SEC_WEBSOCKET_PROTOCOL)
        {
            if let Ok(offer) = HeaderValue::from_str(&self.upgrade.subprotocols.join(", ")) {
                backend_request
                    .headers_mut()
                    .insert(header::SEC_WEBSOCKET_PROTOCOL, offer);
            }
        }
        if let Some(director) = &self.director {
            director(&mut backend_request);
            headers::restore_forwarded_host(&mut backend_request, &parts);
        }

        let connect_timeout = Duration::from_secs(self.timeouts.connect_secs);
        let dial = connect_async_with_config(backend_request, Some(self.websocket_config()), true);
        let (backend, backend_response) = tokio::time::timeout(connect_timeout, dial)
            .await
            .map_err(|_| ProxyError::DialTimeout(connect_timeout))?
            .map_err(ProxyError::Dial)?;

        // 4. The client must see exactly the subprotocol the backend agreed
        //    to: never the full offer, and nothing when the backend picked
        //    nothing.
        let negotiated = backend_response
            .headers()
            .get(header::SEC_WEBSOCKET_PROTOCOL)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);

        let session_id = Uuid::new_v4();
        tracing::debug!(
            session_id = %session_id,
            client_addr = %client_addr,
            backend = %backend_url,
            subprotocol = negotiated.as_deref(),
            "Backend connected, upgrading client"
        );

        let mut upgrade = upgrade
            .read_buffer_size(self.upgrade.read_buffer_size)
            .write_buffer_size(self.upgrade.write_buffer_size)
            .max_message_size(self.upgrade.max_message_size)
            .max_frame_size(self.upgrade.max_frame_size);
        if let Some(protocol) = negotiated {
            upgrade = upgrade.protocols([protocol]);
        }

        let session = Session::new(session_id, &self.timeouts, self.on_error.clone());
        let on_error = self.on_error.clone();
        let response = upgrade
            .on_failed_upgrade(move |error| {
                // The dialed backend connection is dropped with the upgrade
                // callback, so nothing is left dangling.
                metrics::upgrade_rejected();
                tracing::warn!(
                    session_id = %session_id,
                    error = %error,
                    "Client upgrade failed after backend connect"
                );
                if let Some(hook) = &on_error {
                    hook(&ProxyError::ClientUpgrade(error));
                }
            })
            .on_upgrade(move |client| session.run(client, backend));

        Ok(response)
    }

    fn resolve(&self, parts: &Parts) -> Result<Url, ProxyError> {
        match &self.target {
            BackendTarget::Static(base) => {
                // Scheme, host and port come from configuration; the path
                // and query of the inbound request carry through, so the
                // proxy behaves the same on whatever route it is mounted.
                let mut url = base.clone();
                url.set_path(parts.uri.path());
                url.set_query(parts.uri.query());
                Ok(url)
            }
            BackendTarget::Dynamic(resolver) => resolver(parts)
                .ok_or_else(|| ProxyError::Unresolvable(parts.uri.to_string())),
        }
    }

    fn websocket_config(&self) -> WebSocketConfig {
        WebSocketConfig::default()
            .read_buffer_size(self.upgrade.read_buffer_size)
            .write_buffer_size(self.upgrade.write_buffer_size)
            .max_message_size(Some(self.upgrade.max_message_size))
            .max_frame_size(Some(self.upgrade.max_frame_size))
    }
}
