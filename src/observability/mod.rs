//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Listener factory, acceptor, teardown, event loop produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (listener gauges, accept counters)
//!
//! Consumers:
//!     → stdout (plain or JSON lines)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Structured fields (`listener`, `address`, `error`) on every event
//! - Metrics are cheap and no-ops until an exporter is installed
//! - `RUST_LOG` overrides the configured level

pub mod logging;
pub mod metrics;
