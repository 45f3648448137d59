//! Listener creation.
//!
//! # Responsibilities
//! - Allocate the socket, resolve the bind target, bind, listen
//! - Register the socket with the loop and start its accept task
//! - Unwind completely on any failure: no partial listener survives
//!
//! # Design Decisions
//! - Fixed backlog of 128 pending connections
//! - The application is moved in up front; on failure it is dropped here
//! - No stage is retried
//! - Pipe paths are never removed before binding, so a live path fails with a bind error

use std::io;
use std::net::{IpAddr, SocketAddr};
use std::os::fd::{AsRawFd, OwnedFd};
use std::os::unix::net::UnixListener;
use std::path::Path;
use std::rc::Rc;

use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use tokio::io::unix::AsyncFd;
use tokio::io::Interest;
use tokio::sync::watch;

use crate::net::acceptor::accept_loop;
use crate::net::listener::{unlink_socket_path, ListenerHandle, Transport};
use crate::net::umask::UmaskGuard;
use crate::net::{ConnectionHandler, ListenError, ListenerId, ListenerInfo};
use crate::observability::metrics;
use crate::runtime::LoopToken;

/// Pending connections the kernel queues before refusing new ones.
pub const BACKLOG: i32 = 128;

/// Create a TCP listener on `host:port`.
///
/// `host` must be an IP literal; no name resolution happens. Port 0 binds
/// an ephemeral port, reported in the returned [`ListenerInfo`].
///
/// On error `application` has already been dropped.
pub fn create_tcp_listener<H>(
    token: &LoopToken,
    host: &str,
    port: u16,
    application: H::Application,
) -> Result<ListenerInfo, ListenError>
where
    H: ConnectionHandler,
{
    let transport = open_tcp(host, port).inspect_err(|error| creation_failed("tcp", error))?;
    Ok(install::<H>(token, transport, application))
}

/// Create a pipe (Unix domain socket) listener at `path`.
///
/// With `mask` set, the process umask is replaced by it for the duration of
/// the bind call only, which controls the permissions of the socket file.
///
/// On error `application` has already been dropped.
pub fn create_pipe_listener<H>(
    token: &LoopToken,
    path: &Path,
    mask: Option<u32>,
    application: H::Application,
) -> Result<ListenerInfo, ListenError>
where
    H: ConnectionHandler,
{
    let transport = open_pipe(path, mask).inspect_err(|error| creation_failed("pipe", error))?;
    Ok(install::<H>(token, transport, application))
}

fn open_tcp(host: &str, port: u16) -> Result<Transport, ListenError> {
    let target = format!("{host}:{port}");
    let ip: IpAddr = host.parse().map_err(|e: std::net::AddrParseError| ListenError::Resolve {
        target: target.clone(),
        reason: e.to_string(),
    })?;
    let address = SocketAddr::new(ip, port);

    let socket = Socket::new(Domain::for_address(address), Type::STREAM, Some(Protocol::TCP))
        .map_err(ListenError::Socket)?;
    socket.set_reuse_address(true).map_err(ListenError::Socket)?;

    socket
        .bind(&address.into())
        .map_err(|source| ListenError::Bind {
            target: target.clone(),
            source,
        })?;
    socket.listen(BACKLOG).map_err(|source| ListenError::Listen {
        target: target.clone(),
        source,
    })?;
    socket.set_nonblocking(true).map_err(ListenError::Socket)?;

    let listener = std::net::TcpListener::from(socket);
    let local_addr = listener.local_addr().map_err(ListenError::Socket)?;
    let socket = register(listener).map_err(|source| ListenError::Register { target, source })?;

    Ok(Transport::Tcp { socket, local_addr })
}

fn open_pipe(path: &Path, mask: Option<u32>) -> Result<Transport, ListenError> {
    let target = path.display().to_string();
    let address = SockAddr::unix(path).map_err(|e| ListenError::Resolve {
        target: target.clone(),
        reason: e.to_string(),
    })?;

    let socket = Socket::new(Domain::UNIX, Type::STREAM, None).map_err(ListenError::Socket)?;

    let bound = {
        let _mask = mask.map(UmaskGuard::set);
        socket.bind(&address)
    };
    bound.map_err(|source| ListenError::Bind {
        target: target.clone(),
        source,
    })?;

    // The path now exists and belongs to us; remove it if anything below fails.
    let registered = socket
        .listen(BACKLOG)
        .map_err(|source| ListenError::Listen {
            target: target.clone(),
            source,
        })
        .and_then(|()| socket.set_nonblocking(true).map_err(ListenError::Socket))
        .and_then(|()| {
            register(UnixListener::from(OwnedFd::from(socket)))
                .map_err(|source| ListenError::Register { target, source })
        });

    match registered {
        Ok(socket) => Ok(Transport::Pipe {
            socket,
            path: path.to_path_buf(),
        }),
        Err(error) => {
            unlink_socket_path(path);
            Err(error)
        }
    }
}

fn install<H>(token: &LoopToken, transport: Transport, application: H::Application) -> ListenerInfo
where
    H: ConnectionHandler,
{
    let id = ListenerId::next();
    let transport = Rc::new(transport);
    let local_addr = transport.local_addr();

    // The task first runs after this job returns, by which time the handle is registered.
    let (closing, listener_open) = watch::channel(());
    let accept_task = tokio::task::spawn_local(accept_loop::<H>(
        token.clone(),
        id,
        Rc::downgrade(&transport),
        listener_open,
    ));
    let handle = ListenerHandle::new(id, transport, closing, Box::new(application), accept_task);
    token.registry().borrow_mut().register(handle);

    tracing::info!(
        listener = %id,
        address = %local_addr,
        backlog = BACKLOG,
        "Listener started"
    );

    ListenerInfo { id, local_addr }
}

/// Register a listening socket with the loop's reactor for readability.
fn register<L>(listener: L) -> io::Result<AsyncFd<L>>
where
    L: AsRawFd,
{
    // SAFETY: `listener` owns its descriptor and the `AsyncFd` owns the
    // listener; nothing swaps or closes the fd while it is registered.
    let registered = unsafe { AsyncFd::register_with_interest(listener, Interest::READABLE) };
    registered.map_err(io::Error::from)
}

fn creation_failed(transport: &'static str, error: &ListenError) {
    metrics::listener_create_failed(transport);
    tracing::warn!(transport, %error, "Listener creation failed");
}
