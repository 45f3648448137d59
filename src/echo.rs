//! Echo application served by the `listenloop` binary.
//!
//! Every accepted connection gets its bytes written straight back until the
//! peer closes its side.

use crate::net::{Connection, ConnectionHandler, ConnectionId, ListenerId};
use crate::runtime::LoopToken;

/// Application state owned by an echo listener.
#[derive(Debug, Clone)]
pub struct Echo {
    name: String,
}

impl Echo {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// One echo connection.
#[derive(Debug)]
pub struct EchoHandler {
    id: ConnectionId,
    listener: ListenerId,
    name: String,
}

impl ConnectionHandler for EchoHandler {
    type Application = Echo;

    fn new(_token: &LoopToken, application: &Echo, listener: ListenerId) -> Self {
        Self {
            id: ConnectionId::new(),
            listener,
            name: application.name.clone(),
        }
    }

    fn handle_request(self, _token: &LoopToken, connection: Connection) {
        tokio::task::spawn_local(async move {
            let peer = connection.peer();
            let (mut reader, mut writer) = tokio::io::split(connection);
            match tokio::io::copy(&mut reader, &mut writer).await {
                Ok(bytes) => tracing::debug!(
                    connection = %self.id,
                    listener = %self.listener,
                    name = %self.name,
                    %peer,
                    bytes,
                    "Echo connection closed"
                ),
                Err(error) => tracing::debug!(
                    connection = %self.id,
                    listener = %self.listener,
                    name = %self.name,
                    %peer,
                    %error,
                    "Echo connection failed"
                ),
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpStream;
    use std::time::Duration;

    use crate::config::EventLoopConfig;
    use crate::runtime::EventLoop;

    #[test]
    fn echoes_bytes_back() {
        let event_loop = EventLoop::start(&EventLoopConfig::default()).unwrap();
        let info = event_loop
            .handle()
            .create_tcp_listener_sync::<EchoHandler>("127.0.0.1", 0, Echo::new("test"))
            .unwrap();

        let mut stream = TcpStream::connect(info.local_addr.tcp().unwrap()).unwrap();
        stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        stream.write_all(b"hello").unwrap();
        let mut buf = [0u8; 5];
        stream.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"hello");

        event_loop.shutdown();
    }
}
