//! Event-loop subsystem.
//!
//! # Data Flow
//! ```text
//! Foreign thread
//!     → LoopHandle::spawn / run_sync (job pushed onto the loop's queue)
//!     → event_loop.rs (loop thread pops the job, lends it a LoopToken)
//!     → job touches listeners through the token
//!     → registry.rs (ListenerRegistry keyed by ListenerId)
//! ```
//!
//! # Design Decisions
//! - One OS thread, one current-thread Tokio runtime, one LocalSet
//! - `LoopToken` is `!Send`: holding one proves the caller runs on the loop thread
//! - Listener lifetime belongs to the registry, never to the listener itself

pub mod event_loop;
pub mod registry;
pub mod token;

pub use event_loop::{EventLoop, LoopError, LoopHandle};
pub use registry::ListenerRegistry;
pub use token::LoopToken;
