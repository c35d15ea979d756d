//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the proxy handler on every route
//! - Wire up middleware (tracing)
//! - Bind server to listener
//! - Graceful shutdown on Ctrl+C
//!
//! Non-upgrade requests receive a plain HTTP error from the proxy handler;
//! nothing is forwarded on the ordinary request/response path. There is no
//! request timeout layer on purpose: proxied sessions are long-lived and
//! end only when one of their sides closes.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::Request;
use axum::response::Response;
use axum::routing::any;
use axum::Router;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::config::ProxyConfig;
use crate::proxy::WebsocketProxy;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub proxy: Arc<WebsocketProxy>,
}

/// HTTP server hosting the WebSocket proxy.
pub struct HttpServer {
    router: Router,
    config: ProxyConfig,
}

impl HttpServer {
    /// Create a server whose proxy is built from the configuration alone.
    pub fn new(config: ProxyConfig) -> Result<Self, url::ParseError> {
        let proxy = WebsocketProxy::from_config(&config)?;
        Ok(Self::with_proxy(config, proxy))
    }

    /// Create a server around a caller-constructed proxy (director hooks,
    /// custom origin predicates, dynamic backend resolution).
    pub fn with_proxy(config: ProxyConfig, proxy: WebsocketProxy) -> Self {
        let state = AppState {
            proxy: Arc::new(proxy),
        };
        let router = Self::build_router(state);
        Self { router, config }
    }

    /// Build the Axum router with all middleware layers. The proxy is
    /// mounted on every path so it works regardless of routing in front.
    fn build_router(state: AppState) -> Router {
        Router::new()
            .route("/{*path}", any(proxy_handler))
            .route("/", any(proxy_handler))
            .with_state(state)
            .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(self, listener: TcpListener) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            backend = %self.config.backend.url,
            "WebSocket proxy starting"
        );

        let app = self
            .router
            .into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("WebSocket proxy stopped");
        Ok(())
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }
}

/// Main proxy handler: every request, on every route, goes to the proxy.
async fn proxy_handler(
    State(state): State<AppState>,
    ConnectInfo(client_addr): ConnectInfo<SocketAddr>,
    request: Request<Body>,
) -> Response {
    state.proxy.serve(client_addr, request).await
}

/// Wait for shutdown signal (Ctrl+C).
async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(%error, "Failed to install Ctrl+C handler");
        return;
    }
    tracing::info!("Shutdown signal received");
}
