//! Transparent WebSocket Reverse Proxy Library

pub mod config;
pub mod error;
pub mod http;
pub mod observability;
pub mod proxy;

pub use config::ProxyConfig;
pub use error::ProxyError;
pub use http::HttpServer;
pub use proxy::{OriginPolicy, WebsocketProxy};
