//! Connection acceptor.
//!
//! # Responsibilities
//! - Wait for readiness on each listener's socket
//! - Build a handler per pending connection, then accept into it
//! - Drop the handler immediately when accept fails
//! - Keep the listener accepting after any per-connection error, backing
//!   off briefly when the failure is not transient

use std::future::poll_fn;
use std::io;
use std::os::fd::AsRawFd;
use std::rc::Weak;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::io::unix::AsyncFd;
use tokio::sync::watch;

use crate::net::listener::Transport;
use crate::net::{Connection, ConnectionHandler, ListenerId};
use crate::observability::metrics;
use crate::runtime::LoopToken;

/// Callback fired once per readiness notification on `listener`.
///
/// `pending` is the loop's status: an error means no connection is ready and
/// nothing is consumed. Otherwise it carries the accept step for the pending
/// connection. The handler is constructed before the accept; if the accept
/// fails it is dropped before this returns and never starts processing.
pub fn on_connection<H, F>(token: &LoopToken, listener: ListenerId, pending: io::Result<F>)
where
    H: ConnectionHandler,
    F: FnOnce() -> io::Result<Connection>,
{
    let accept = match pending {
        Ok(accept) => accept,
        Err(error) => {
            metrics::accept_error();
            tracing::error!(%listener, %error, "Connection error");
            return;
        }
    };

    let Some(handler) = token.with_application(listener, |application: &H::Application| {
        H::new(token, application, listener)
    }) else {
        tracing::debug!(%listener, "Connection pending on a retired listener");
        return;
    };

    match accept() {
        Ok(connection) => {
            metrics::connection_accepted();
            tracing::trace!(%listener, peer = %connection.peer(), "Connection accepted");
            handler.handle_request(token, connection);
        }
        Err(error) if error.kind() == io::ErrorKind::WouldBlock => {
            drop(handler);
            tracing::trace!(%listener, "Spurious wakeup, nothing to accept");
        }
        Err(error) => {
            drop(handler);
            metrics::accept_error();
            tracing::warn!(%listener, %error, "Accept failed");
        }
    }
}

/// Pause after a hard accept failure (e.g. `EMFILE`), which leaves the
/// socket readable.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Outcome of one readiness event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Turn {
    Served,
    Failed,
    Closed,
}

/// Per-listener task: fires [`on_connection`] for every readiness event
/// until the listener is retired.
///
/// The socket is only borrowed while a poll runs, never across an await, so
/// dropping the [`ListenerHandle`](crate::net::ListenerHandle) closes it
/// immediately.
pub(crate) async fn accept_loop<H>(
    token: LoopToken,
    listener: ListenerId,
    transport: Weak<Transport>,
    listener_open: watch::Receiver<()>,
) where
    H: ConnectionHandler,
{
    loop {
        let turn = poll_fn(|cx| {
            let Some(transport) = transport.upgrade() else {
                return Poll::Ready(Turn::Closed);
            };
            match &*transport {
                Transport::Tcp { socket, .. } => {
                    poll_connection::<H, _>(cx, &token, listener, socket, &listener_open, accept_tcp)
                }
                Transport::Pipe { socket, .. } => {
                    poll_connection::<H, _>(cx, &token, listener, socket, &listener_open, accept_pipe)
                }
            }
        })
        .await;

        match turn {
            Turn::Closed => break,
            Turn::Failed => tokio::time::sleep(ACCEPT_BACKOFF).await,
            // One connection per turn keeps jobs and other listeners moving.
            Turn::Served => tokio::task::yield_now().await,
        }
    }
}

fn poll_connection<H, L>(
    cx: &mut Context<'_>,
    token: &LoopToken,
    listener: ListenerId,
    socket: &AsyncFd<L>,
    listener_open: &watch::Receiver<()>,
    accept: fn(&L) -> io::Result<Connection>,
) -> Poll<Turn>
where
    H: ConnectionHandler,
    L: AsRawFd,
{
    let mut guard = match socket.poll_read_ready(cx) {
        Poll::Pending => return Poll::Pending,
        Poll::Ready(Ok(guard)) => guard,
        Poll::Ready(Err(error)) => {
            on_connection::<H, fn() -> io::Result<Connection>>(token, listener, Err(error));
            return Poll::Ready(Turn::Failed);
        }
    };

    let mut turn = Turn::Served;
    on_connection::<H, _>(token, listener, Ok(|| {
        let accepted = match guard.try_io(|inner| accept(inner.get_ref())) {
            Ok(result) => result,
            Err(_would_block) => Err(io::ErrorKind::WouldBlock.into()),
        };
        match accepted {
            Ok(connection) => Ok(connection.close_with(listener_open.clone())),
            Err(error) => {
                if error.kind() != io::ErrorKind::WouldBlock {
                    turn = Turn::Failed;
                }
                Err(error)
            }
        }
    }));
    Poll::Ready(turn)
}

fn accept_tcp(listener: &std::net::TcpListener) -> io::Result<Connection> {
    let (stream, _) = listener.accept()?;
    stream.set_nonblocking(true)?;
    Ok(Connection::tcp(tokio::net::TcpStream::from_std(stream)?))
}

fn accept_pipe(listener: &std::os::unix::net::UnixListener) -> io::Result<Connection> {
    let (stream, _) = listener.accept()?;
    stream.set_nonblocking(true)?;
    Ok(Connection::pipe(tokio::net::UnixStream::from_std(stream)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use crate::config::EventLoopConfig;
    use crate::net::create_tcp_listener;
    use crate::runtime::EventLoop;

    #[derive(Default)]
    struct Counters {
        built: AtomicUsize,
        dropped: AtomicUsize,
        started: AtomicUsize,
    }

    struct App(Arc<Counters>);

    struct Counting(Arc<Counters>);

    impl ConnectionHandler for Counting {
        type Application = App;

        fn new(_: &LoopToken, application: &App, _: ListenerId) -> Self {
            application.0.built.fetch_add(1, Ordering::SeqCst);
            Counting(Arc::clone(&application.0))
        }

        fn handle_request(self, _: &LoopToken, _: Connection) {
            self.0.started.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl Drop for Counting {
        fn drop(&mut self) {
            self.0.dropped.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn failed_accept_drops_handler_before_returning() {
        let event_loop = EventLoop::start(&EventLoopConfig::default()).unwrap();
        let counters = Arc::new(Counters::default());
        let app = App(Arc::clone(&counters));

        let observed = Arc::clone(&counters);
        let balanced = event_loop
            .handle()
            .run_sync(move |token| {
                let info = create_tcp_listener::<Counting>(token, "127.0.0.1", 0, app).unwrap();
                let mut balanced = Vec::new();
                for kind in [io::ErrorKind::ConnectionAborted, io::ErrorKind::WouldBlock] {
                    on_connection::<Counting, _>(token, info.id, Ok(|| Err(kind.into())));
                    balanced.push(
                        observed.built.load(Ordering::SeqCst) == observed.dropped.load(Ordering::SeqCst),
                    );
                }
                balanced
            })
            .unwrap();

        assert_eq!(balanced, vec![true, true]);
        assert_eq!(counters.built.load(Ordering::SeqCst), 2);
        assert_eq!(counters.started.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn loop_error_consumes_nothing() {
        let event_loop = EventLoop::start(&EventLoopConfig::default()).unwrap();
        let counters = Arc::new(Counters::default());
        let app = App(Arc::clone(&counters));

        let still_listening = event_loop
            .handle()
            .run_sync(move |token| {
                let info = create_tcp_listener::<Counting>(token, "127.0.0.1", 0, app).unwrap();
                on_connection::<Counting, fn() -> io::Result<Connection>>(
                    token,
                    info.id,
                    Err(io::Error::other("reactor failure")),
                );
                token.local_addr(info.id).is_some()
            })
            .unwrap();

        assert!(still_listening);
        assert_eq!(counters.built.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn retired_listener_builds_no_handler() {
        let event_loop = EventLoop::start(&EventLoopConfig::default()).unwrap();
        let counters = Arc::new(Counters::default());
        let app = App(Arc::clone(&counters));

        event_loop
            .handle()
            .run_sync(move |token| {
                let info = create_tcp_listener::<Counting>(token, "127.0.0.1", 0, app).unwrap();
                crate::net::free_listener(token, info.id).unwrap();
                on_connection::<Counting, _>(token, info.id, Ok(|| Err(io::ErrorKind::Other.into())));
            })
            .unwrap();

        assert_eq!(counters.built.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn hard_accept_failure_asks_for_backoff() {
        let event_loop = EventLoop::start(&EventLoopConfig::default()).unwrap();
        let counters = Arc::new(Counters::default());
        let app = App(Arc::clone(&counters));

        // A pending connection on a socket the loop does not serve keeps it readable.
        let socket = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        socket.set_nonblocking(true).unwrap();
        let _client = std::net::TcpStream::connect(socket.local_addr().unwrap()).unwrap();

        let (tx, rx) = std::sync::mpsc::channel();
        event_loop
            .handle()
            .run_sync(move |token| {
                let info = create_tcp_listener::<Counting>(token, "127.0.0.1", 0, app).unwrap();
                let token = token.clone();
                tokio::task::spawn_local(async move {
                    // SAFETY: the AsyncFd owns the listener until it is dropped.
                    let socket = unsafe {
                        AsyncFd::register_with_interest(socket, tokio::io::Interest::READABLE)
                    }
                    .map_err(io::Error::from)
                    .unwrap();
                    let (_listener_open, receiver) = watch::channel(());
                    let turn = poll_fn(|cx| {
                        poll_connection::<Counting, _>(cx, &token, info.id, &socket, &receiver, |_| {
                            Err(io::Error::from_raw_os_error(24))
                        })
                    })
                    .await;
                    let _ = tx.send(turn);
                });
            })
            .unwrap();

        let turn = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(turn, Turn::Failed);
        assert_eq!(counters.built.load(Ordering::SeqCst), 1);
        assert_eq!(counters.dropped.load(Ordering::SeqCst), 1);
        assert_eq!(counters.started.load(Ordering::SeqCst), 0);
    }
}
