//! Shared application and handler types for integration tests.

#![allow(dead_code)]

use std::io::{Read, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use listenloop::config::EventLoopConfig;
use listenloop::{Connection, ConnectionHandler, EventLoop, ListenerId, LoopToken};

/// Lifetime counters shared between a test and the loop thread.
#[derive(Debug, Default)]
pub struct Counters {
    pub apps_dropped: AtomicUsize,
    pub handlers_built: AtomicUsize,
    pub handlers_dropped: AtomicUsize,
    pub requests_started: AtomicUsize,
}

impl Counters {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn apps_dropped(&self) -> usize {
        self.apps_dropped.load(Ordering::SeqCst)
    }

    pub fn handlers_built(&self) -> usize {
        self.handlers_built.load(Ordering::SeqCst)
    }

    pub fn handlers_dropped(&self) -> usize {
        self.handlers_dropped.load(Ordering::SeqCst)
    }

    pub fn requests_started(&self) -> usize {
        self.requests_started.load(Ordering::SeqCst)
    }
}

/// Application that records its own destruction.
#[derive(Debug)]
pub struct TestApp {
    pub tag: u64,
    pub counters: Arc<Counters>,
}

impl TestApp {
    pub fn new(tag: u64, counters: &Arc<Counters>) -> Self {
        Self {
            tag,
            counters: Arc::clone(counters),
        }
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self.counters.apps_dropped.fetch_add(1, Ordering::SeqCst);
    }
}

/// Handler that echoes one buffer back, prefixed with the application tag.
pub struct TagEcho {
    tag: u64,
    counters: Arc<Counters>,
}

impl ConnectionHandler for TagEcho {
    type Application = TestApp;

    fn new(_token: &LoopToken, application: &TestApp, _listener: ListenerId) -> Self {
        application.counters.handlers_built.fetch_add(1, Ordering::SeqCst);
        Self {
            tag: application.tag,
            counters: Arc::clone(&application.counters),
        }
    }

    fn handle_request(self, _token: &LoopToken, mut connection: Connection) {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        self.counters.requests_started.fetch_add(1, Ordering::SeqCst);
        tokio::task::spawn_local(async move {
            let mut buf = [0u8; 64];
            if let Ok(n) = connection.read(&mut buf).await {
                let reply = format!("{}:{}", self.tag, String::from_utf8_lossy(&buf[..n]));
                let _ = connection.write_all(reply.as_bytes()).await;
            }
            let _ = connection.shutdown().await;
            drop(self);
        });
    }
}

impl Drop for TagEcho {
    fn drop(&mut self) {
        self.counters.handlers_dropped.fetch_add(1, Ordering::SeqCst);
    }
}

/// Handler that holds its connection open, discarding input, until the
/// stream ends.
pub struct Hold {
    counters: Arc<Counters>,
}

impl ConnectionHandler for Hold {
    type Application = TestApp;

    fn new(_token: &LoopToken, application: &TestApp, _listener: ListenerId) -> Self {
        application.counters.handlers_built.fetch_add(1, Ordering::SeqCst);
        Self {
            counters: Arc::clone(&application.counters),
        }
    }

    fn handle_request(self, _token: &LoopToken, mut connection: Connection) {
        use tokio::io::AsyncReadExt;

        self.counters.requests_started.fetch_add(1, Ordering::SeqCst);
        tokio::task::spawn_local(async move {
            let mut buf = [0u8; 64];
            while let Ok(n) = connection.read(&mut buf).await {
                if n == 0 {
                    break;
                }
            }
            drop(self);
        });
    }
}

impl Drop for Hold {
    fn drop(&mut self) {
        self.counters.handlers_dropped.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn start_loop() -> EventLoop {
    EventLoop::start(&EventLoopConfig::default()).expect("event loop starts")
}

/// Send `message` and read the full reply until the server closes.
pub fn round_trip<S: Read + Write>(mut stream: S, message: &str) -> String {
    stream.write_all(message.as_bytes()).unwrap();
    let mut reply = String::new();
    stream.read_to_string(&mut reply).unwrap();
    reply
}

pub const IO_TIMEOUT: Duration = Duration::from_secs(5);

/// Poll `condition` until it holds or `IO_TIMEOUT` passes.
pub fn wait_until(condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + IO_TIMEOUT;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}
