//! Listener lifecycle on a single-threaded event loop.
//!
//! TCP and pipe listeners live on one loop thread. Foreign threads create
//! and free them through a [`LoopHandle`], either fire-and-forget or with a
//! blocking rendezvous, and every accepted connection is handed to a
//! [`ConnectionHandler`].

pub mod config;
pub mod echo;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod runtime;

pub use config::ServerConfig;
pub use net::{
    create_pipe_listener, create_tcp_listener, free_listener, on_connection, Connection,
    ConnectionHandler, ListenError, ListenerId, ListenerInfo, LocalAddr,
};
pub use runtime::{EventLoop, LoopError, LoopHandle, LoopToken};
