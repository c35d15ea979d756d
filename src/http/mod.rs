//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, route-to-proxy dispatch)
//!     → proxy::handler (upgrade or error response)
//!     → [session relays frames until either side closes]
//! ```

pub mod server;

pub use server::HttpServer;
