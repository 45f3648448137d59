//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (main.rs):
//!     Load config → Validate → Logging/metrics → Start loop → Create listeners
//!
//! Shutdown (signals.rs):
//!     SIGTERM/SIGINT → Stop loop → Listeners retired → Exit
//! ```
//!
//! # Design Decisions
//! - Fail fast: any startup error, including a listener that cannot bind, is fatal
//! - Listeners are created last, once logging and the loop are up

pub mod signals;

pub use signals::wait_for_shutdown_signal;
