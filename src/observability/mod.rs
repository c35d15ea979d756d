//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! handler + session produce:
//!     → logging.rs (structured log events, session-scoped fields)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → Log aggregation (stdout)
//!     → Metrics endpoint (Prometheus scrape, config-gated)
//! ```

pub mod logging;
pub mod metrics;
