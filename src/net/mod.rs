//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Foreign thread ──(rendezvous.rs, optional)──┐
//!                                             ▼
//!     → factory.rs (socket → resolve → bind → listen(128))
//!     → listener.rs (ListenerHandle registered with the loop)
//!     → acceptor.rs (readiness → handler → accept → handle_request)
//!     → connection.rs (ConnectionHandler owns the accepted stream)
//!
//! Teardown (loop thread only):
//!     free_listener → registry retire → socket closed, application dropped,
//!     accepted connections signalled to close
//! ```
//!
//! # Design Decisions
//! - Every listener operation takes a `LoopToken`
//! - Creation failures unwind synchronously; no partial listener is observable
//! - Accept failures are logged and swallowed; the listener keeps accepting
//! - The process umask is only touched inside a `UmaskGuard` scope

pub mod acceptor;
pub mod connection;
pub mod factory;
pub mod listener;
pub mod rendezvous;
pub mod umask;

pub use acceptor::on_connection;
pub use connection::{Connection, ConnectionHandler, ConnectionId, Stream};
pub use factory::{create_pipe_listener, create_tcp_listener, BACKLOG};
pub use listener::{free_listener, ListenError, ListenerHandle, ListenerId, ListenerInfo, LocalAddr};
pub use umask::UmaskGuard;
