//! Listener handles and teardown.
//!
//! # Responsibilities
//! - Bind an OS listening socket (TCP or pipe) to the application it serves
//! - Hand out stable `ListenerId`s for back-references
//! - Close the socket, drop the application and unlink pipe paths on retire

use std::any::Any;
use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::os::unix::net::UnixListener;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use thiserror::Error;
use tokio::io::unix::AsyncFd;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::observability::metrics;
use crate::runtime::{LoopError, LoopToken};

/// Global atomic counter for listener IDs.
/// Relaxed ordering is enough: ids only need to be unique.
static LISTENER_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
    pub(crate) fn next() -> Self {
        Self(LISTENER_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

/// Where a listener is bound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalAddr {
    /// The actual TCP address; port 0 requests resolve to the real port.
    Tcp(SocketAddr),
    /// Filesystem path of a pipe listener.
    Pipe(PathBuf),
}

impl LocalAddr {
    /// The bound TCP address, if this is a TCP listener.
    pub fn tcp(&self) -> Option<SocketAddr> {
        match self {
            LocalAddr::Tcp(addr) => Some(*addr),
            LocalAddr::Pipe(_) => None,
        }
    }

    /// The bound path, if this is a pipe listener.
    pub fn pipe(&self) -> Option<&Path> {
        match self {
            LocalAddr::Tcp(_) => None,
            LocalAddr::Pipe(path) => Some(path),
        }
    }
}

impl fmt::Display for LocalAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LocalAddr::Tcp(addr) => write!(f, "tcp://{addr}"),
            LocalAddr::Pipe(path) => write!(f, "unix://{}", path.display()),
        }
    }
}

/// What a successful creation reports back. Safe to send to other threads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerInfo {
    pub id: ListenerId,
    pub local_addr: LocalAddr,
}

/// Error type for listener operations.
#[derive(Debug, Error)]
pub enum ListenError {
    /// Allocating or configuring the socket failed.
    #[error("failed to allocate socket: {0}")]
    Socket(#[source] io::Error),

    /// The bind target could not be parsed.
    #[error("invalid bind address {target}: {reason}")]
    Resolve { target: String, reason: String },

    /// Binding to the address or path failed.
    #[error("failed to bind {target}: {source}")]
    Bind {
        target: String,
        #[source]
        source: io::Error,
    },

    /// Activating the listen queue failed.
    #[error("failed to listen on {target}: {source}")]
    Listen {
        target: String,
        #[source]
        source: io::Error,
    },

    /// The socket could not be registered with the loop's reactor.
    #[error("failed to register {target} with the event loop: {source}")]
    Register {
        target: String,
        #[source]
        source: io::Error,
    },

    /// No live listener has this id.
    #[error("unknown listener {0}")]
    UnknownListener(ListenerId),

    /// The loop stopped before the request could run.
    #[error("event loop is not running")]
    LoopClosed,
}

impl From<LoopError> for ListenError {
    fn from(_: LoopError) -> Self {
        ListenError::LoopClosed
    }
}

/// The OS listening socket, one variant per transport.
pub(crate) enum Transport {
    Tcp {
        socket: AsyncFd<std::net::TcpListener>,
        local_addr: SocketAddr,
    },
    Pipe {
        socket: AsyncFd<UnixListener>,
        path: PathBuf,
    },
}

impl Transport {
    pub(crate) fn local_addr(&self) -> LocalAddr {
        match self {
            Transport::Tcp { local_addr, .. } => LocalAddr::Tcp(*local_addr),
            Transport::Pipe { path, .. } => LocalAddr::Pipe(path.clone()),
        }
    }

    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Transport::Tcp { .. } => "tcp",
            Transport::Pipe { .. } => "pipe",
        }
    }
}

/// A live listener: the socket, the application it serves and its accept task.
///
/// Owned by the loop's registry. Dropping it closes the socket, drops the
/// application exactly once and, for pipes, removes the socket path before
/// the drop returns. Connections it accepted are told to close and drop
/// their stream the next time their task polls them.
pub struct ListenerHandle {
    id: ListenerId,
    /// The only strong reference; the accept task holds a `Weak`.
    transport: Rc<Transport>,
    /// Never sent on. Accepted connections close once it is dropped.
    closing: watch::Sender<()>,
    application: Box<dyn Any>,
    accept_task: JoinHandle<()>,
    created_at: Instant,
}

impl ListenerHandle {
    pub(crate) fn new(
        id: ListenerId,
        transport: Rc<Transport>,
        closing: watch::Sender<()>,
        application: Box<dyn Any>,
        accept_task: JoinHandle<()>,
    ) -> Self {
        metrics::listener_opened(transport.kind());
        Self {
            id,
            transport,
            closing,
            application,
            accept_task,
            created_at: Instant::now(),
        }
    }

    pub fn id(&self) -> ListenerId {
        self.id
    }

    pub fn local_addr(&self) -> LocalAddr {
        self.transport.local_addr()
    }

    pub(crate) fn application<A: 'static>(&self) -> Option<&A> {
        self.application.downcast_ref::<A>()
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        self.accept_task.abort();

        if let Transport::Pipe { path, .. } = &*self.transport {
            unlink_socket_path(path);
        }

        metrics::listener_closed(self.transport.kind());
        tracing::info!(
            listener = %self.id,
            address = %self.transport.local_addr(),
            uptime = ?self.created_at.elapsed(),
            "Listener closed"
        );
        // Fields drop next: the socket closes here, and dropping `closing`
        // wakes every accepted connection.
    }
}

/// Remove a bound pipe path from the filesystem.
pub(crate) fn unlink_socket_path(path: &Path) {
    if let Err(error) = std::fs::remove_file(path) {
        if error.kind() != io::ErrorKind::NotFound {
            tracing::warn!(path = %path.display(), %error, "Failed to remove socket path");
        }
    }
}

/// Tear down a listener.
///
/// Closes its socket, drops its application and, for pipes, unlinks the
/// socket path before returning. Its accepted connections are closed on
/// their next poll. The id is dead afterwards: a second call reports
/// [`ListenError::UnknownListener`].
pub fn free_listener(token: &LoopToken, listener: ListenerId) -> Result<(), ListenError> {
    let handle = token
        .registry()
        .borrow_mut()
        .retire(listener)
        .ok_or(ListenError::UnknownListener(listener))?;
    drop(handle);
    Ok(())
}
