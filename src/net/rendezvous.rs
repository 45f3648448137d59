//! Blocking listener operations for foreign threads.
//!
//! Each call queues exactly one job on the loop and parks the calling thread
//! on a oneshot channel until the loop has run it. The loop thread itself
//! never waits. If the loop is stopped, or stops before reaching the job,
//! the call returns [`ListenError::LoopClosed`] and the application that
//! travelled with the job has been dropped.

use std::path::PathBuf;

use crate::net::{
    create_pipe_listener, create_tcp_listener, free_listener, ConnectionHandler, ListenError,
    ListenerId, ListenerInfo,
};
use crate::runtime::LoopHandle;

impl LoopHandle {
    /// Create a TCP listener on the loop and wait for the outcome.
    ///
    /// Must not be called from the loop thread or from inside an async
    /// context; use `tokio::task::spawn_blocking` there.
    pub fn create_tcp_listener_sync<H>(
        &self,
        host: impl Into<String>,
        port: u16,
        application: H::Application,
    ) -> Result<ListenerInfo, ListenError>
    where
        H: ConnectionHandler,
        H::Application: Send,
    {
        let host = host.into();
        self.run_sync(move |token| create_tcp_listener::<H>(token, &host, port, application))?
    }

    /// Create a pipe listener on the loop and wait for the outcome.
    pub fn create_pipe_listener_sync<H>(
        &self,
        path: impl Into<PathBuf>,
        mask: Option<u32>,
        application: H::Application,
    ) -> Result<ListenerInfo, ListenError>
    where
        H: ConnectionHandler,
        H::Application: Send,
    {
        let path = path.into();
        self.run_sync(move |token| create_pipe_listener::<H>(token, &path, mask, application))?
    }

    /// Tear down a listener and wait until it is gone.
    pub fn free_listener_sync(&self, listener: ListenerId) -> Result<(), ListenError> {
        self.run_sync(move |token| free_listener(token, listener))?
    }

    /// Schedule a listener teardown without waiting for it.
    pub fn free_listener_later(&self, listener: ListenerId) -> Result<(), ListenError> {
        self.spawn(move |token| {
            if let Err(error) = free_listener(token, listener) {
                tracing::warn!(%listener, %error, "Deferred teardown failed");
            }
        })?;
        Ok(())
    }
}
