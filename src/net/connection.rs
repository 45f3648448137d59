//! Accepted connections and the per-connection handler contract.
//!
//! # Responsibilities
//! - Define what the acceptor needs from a request handler
//! - Wrap accepted TCP and pipe streams in one async stream type
//! - Generate unique connection IDs for tracing

use std::fmt;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::{TcpStream, UnixStream};
use tokio::sync::watch;

use crate::net::ListenerId;
use crate::runtime::LoopToken;

/// Global atomic counter for connection IDs.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// A per-connection request handler.
///
/// The acceptor builds one handler per pending connection, before the
/// connection is accepted. If the accept fails the handler is dropped
/// without ever seeing a stream. Otherwise `handle_request` receives the
/// stream and the handler owns the connection from then on; it typically
/// moves itself into a task spawned with `tokio::task::spawn_local` and is
/// destroyed when that task ends.
pub trait ConnectionHandler: Sized + 'static {
    /// The application a listener serving this handler owns.
    type Application: 'static;

    /// Build a handler for a connection pending on `listener`.
    ///
    /// The loop's registry is borrowed for the duration of this call:
    /// creating or freeing listeners here panics.
    fn new(token: &LoopToken, application: &Self::Application, listener: ListenerId) -> Self;

    /// Start processing requests on an accepted connection.
    fn handle_request(self, token: &LoopToken, connection: Connection);
}

/// An accepted stream, by transport.
#[derive(Debug)]
pub enum Stream {
    Tcp(TcpStream),
    Pipe(UnixStream),
}

type Closing = Pin<Box<dyn Future<Output = ()> + Send>>;

/// An accepted connection.
///
/// Once the listener that accepted it is torn down, the next poll drops the
/// underlying stream: reads report end of stream and writes fail with
/// `NotConnected`.
pub struct Connection {
    stream: Option<Stream>,
    closing: Option<Closing>,
}

impl Connection {
    pub fn tcp(stream: TcpStream) -> Self {
        Self {
            stream: Some(Stream::Tcp(stream)),
            closing: None,
        }
    }

    pub fn pipe(stream: UnixStream) -> Self {
        Self {
            stream: Some(Stream::Pipe(stream)),
            closing: None,
        }
    }

    /// Tie this connection to a listener's lifetime.
    ///
    /// Nothing is ever sent on `listener_open`; the connection closes once
    /// its sender is dropped.
    pub(crate) fn close_with(mut self, mut listener_open: watch::Receiver<()>) -> Self {
        self.closing = Some(Box::pin(async move {
            while listener_open.changed().await.is_ok() {}
        }));
        self
    }

    /// Peer description for logging.
    pub fn peer(&self) -> String {
        match &self.stream {
            Some(Stream::Tcp(stream)) => stream
                .peer_addr()
                .map(|addr| addr.to_string())
                .unwrap_or_else(|_| "unknown".to_string()),
            Some(Stream::Pipe(_)) => "unix".to_string(),
            None => "closed".to_string(),
        }
    }

    pub fn is_tcp(&self) -> bool {
        matches!(self.stream, Some(Stream::Tcp(_)))
    }

    /// Whether the stream has been dropped because its listener went away.
    pub fn is_closed(&self) -> bool {
        self.stream.is_none()
    }

    pub fn stream(&self) -> Option<&Stream> {
        self.stream.as_ref()
    }

    /// Registers for the close signal and drops the stream once it fires.
    fn poll_listener(&mut self, cx: &mut Context<'_>) -> Option<&mut Stream> {
        if let Some(closing) = self.closing.as_mut() {
            if closing.as_mut().poll(cx).is_ready() {
                self.closing = None;
                self.stream = None;
            }
        }
        self.stream.as_mut()
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("stream", &self.stream)
            .field("tied_to_listener", &self.closing.is_some())
            .finish()
    }
}

fn not_connected() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "listener closed")
}

impl AsyncRead for Connection {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut().poll_listener(cx) {
            Some(Stream::Tcp(stream)) => Pin::new(stream).poll_read(cx, buf),
            Some(Stream::Pipe(stream)) => Pin::new(stream).poll_read(cx, buf),
            None => Poll::Ready(Ok(())),
        }
    }
}

impl AsyncWrite for Connection {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut().poll_listener(cx) {
            Some(Stream::Tcp(stream)) => Pin::new(stream).poll_write(cx, buf),
            Some(Stream::Pipe(stream)) => Pin::new(stream).poll_write(cx, buf),
            None => Poll::Ready(Err(not_connected())),
        }
    }

    fn poll_write_vectored(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut().poll_listener(cx) {
            Some(Stream::Tcp(stream)) => Pin::new(stream).poll_write_vectored(cx, bufs),
            Some(Stream::Pipe(stream)) => Pin::new(stream).poll_write_vectored(cx, bufs),
            None => Poll::Ready(Err(not_connected())),
        }
    }

    fn is_write_vectored(&self) -> bool {
        match &self.stream {
            Some(Stream::Tcp(stream)) => stream.is_write_vectored(),
            Some(Stream::Pipe(stream)) => stream.is_write_vectored(),
            None => false,
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut().poll_listener(cx) {
            Some(Stream::Tcp(stream)) => Pin::new(stream).poll_flush(cx),
            Some(Stream::Pipe(stream)) => Pin::new(stream).poll_flush(cx),
            None => Poll::Ready(Ok(())),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut().poll_listener(cx) {
            Some(Stream::Tcp(stream)) => Pin::new(stream).poll_shutdown(cx),
            Some(Stream::Pipe(stream)) => Pin::new(stream).poll_shutdown(cx),
            None => Poll::Ready(Ok(())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[test]
    fn connection_id_unique() {
        let id1 = ConnectionId::new();
        let id2 = ConnectionId::new();
        assert_ne!(id1, id2);
        assert!(id1.to_string().starts_with("conn-"));
    }

    #[tokio::test]
    async fn pipe_connection_reads_and_writes() {
        let (a, b) = UnixStream::pair().unwrap();
        let mut a = Connection::pipe(a);
        let mut b = Connection::pipe(b);
        assert!(!a.is_tcp());
        assert_eq!(a.peer(), "unix");

        a.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        b.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");
    }

    #[tokio::test]
    async fn dropping_the_listener_signal_closes_the_stream() {
        let (a, mut peer) = UnixStream::pair().unwrap();
        let (listener_open, receiver) = watch::channel(());
        let mut connection = Connection::pipe(a).close_with(receiver);
        assert!(!connection.is_closed());

        drop(listener_open);

        let mut buf = [0u8; 8];
        assert_eq!(connection.read(&mut buf).await.unwrap(), 0);
        assert!(connection.is_closed());
        assert_eq!(connection.peer(), "closed");
        let error = connection.write_all(b"late").await.unwrap_err();
        assert_eq!(error.kind(), io::ErrorKind::NotConnected);

        // The stream itself was dropped, so the peer sees end of stream.
        let mut rest = Vec::new();
        assert_eq!(peer.read_to_end(&mut rest).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn untied_connection_ignores_listener_state() {
        let (a, mut peer) = UnixStream::pair().unwrap();
        let mut connection = Connection::pipe(a);
        peer.write_all(b"hi").await.unwrap();

        let mut buf = [0u8; 2];
        connection.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hi");
        assert!(!connection.is_closed());
    }
}
