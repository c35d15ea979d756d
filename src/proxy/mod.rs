//! WebSocket proxying subsystem.
//!
//! # Data Flow
//! ```text
//! upgrade request
//!     → handler.rs (detect upgrade, origin gate, resolve target)
//!     → headers.rs (build backend handshake, forward Host verbatim)
//!     → [backend dialed, subprotocol echoed to client]
//!     → session.rs (two relay pumps, frame.rs translation)
//!     → [first close/error terminates both sides exactly once]
//! ```
//!
//! # Design Decisions
//! - Backend dialed before the client upgrade completes, so dial failures
//!   are ordinary HTTP errors and never half-open sessions
//! - One reader and one writer task per connection; no shared relay state
//! - Control frames are relayed, not answered locally

pub mod frame;
pub mod handler;
pub mod headers;
pub mod origin;
pub mod session;

use std::sync::Arc;

use crate::error::ProxyError;

/// Observer for session errors, pre-upgrade and mid-relay alike.
pub type ErrorHook = Arc<dyn Fn(&ProxyError) + Send + Sync>;

pub use handler::{BackendResolver, BackendTarget, Director, WebsocketProxy};
pub use headers::HandshakeRequest;
pub use origin::OriginPolicy;
pub use session::{Session, Termination};
