//! The single-threaded event loop and its cross-thread handle.
//!
//! # Responsibilities
//! - Own the loop thread, its Tokio runtime and `LocalSet`
//! - Run jobs submitted from foreign threads, one at a time, in order
//! - Offer a blocking rendezvous (`run_sync`) to foreign threads
//! - Retire every remaining listener when the loop stops

use std::cell::RefCell;
use std::rc::Rc;
use std::thread::{self, JoinHandle, ThreadId};

use thiserror::Error;
use tokio::runtime::Runtime;
use tokio::sync::{mpsc, oneshot};
use tokio::task::LocalSet;

use crate::config::EventLoopConfig;
use crate::runtime::registry::ListenerRegistry;
use crate::runtime::token::LoopToken;

type Job = Box<dyn FnOnce(&LoopToken) + Send + 'static>;

enum Message {
    Run(Job),
    Stop,
}

/// Error type for event-loop operations.
#[derive(Debug, Error)]
pub enum LoopError {
    /// The loop has stopped, or stopped before running the job.
    #[error("event loop is not running")]
    Closed,
    /// The loop thread or its runtime could not be created.
    #[error("failed to start event loop: {0}")]
    Start(#[source] std::io::Error),
}

/// Owner of a running event loop.
///
/// Stopping (explicitly or on drop) discards queued jobs, retires every
/// listener still registered and joins the loop thread.
pub struct EventLoop {
    handle: LoopHandle,
    thread: Option<JoinHandle<()>>,
}

impl EventLoop {
    /// Spawn the loop thread.
    pub fn start(config: &EventLoopConfig) -> Result<Self, LoopError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(LoopError::Start)?;

        let (tx, rx) = mpsc::unbounded_channel();
        let thread = thread::Builder::new()
            .name(config.thread_name.clone())
            .spawn(move || run(runtime, rx))
            .map_err(LoopError::Start)?;

        let handle = LoopHandle {
            tx,
            loop_thread: thread.thread().id(),
        };

        tracing::info!(thread = %config.thread_name, "Event loop started");

        Ok(Self {
            handle,
            thread: Some(thread),
        })
    }

    /// A cloneable handle for submitting work from other threads.
    pub fn handle(&self) -> LoopHandle {
        self.handle.clone()
    }

    /// Stop the loop and wait for its thread to exit.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };
        let _ = self.handle.tx.send(Message::Stop);
        if thread.join().is_err() {
            tracing::error!("Event loop thread panicked");
        }
    }
}

impl Drop for EventLoop {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Sendable handle to an event loop.
///
/// Foreign threads use it to schedule work; the work itself receives a
/// [`LoopToken`] and runs on the loop thread.
#[derive(Clone)]
pub struct LoopHandle {
    tx: mpsc::UnboundedSender<Message>,
    loop_thread: ThreadId,
}

impl LoopHandle {
    /// Queue `job` on the loop without waiting for it.
    pub fn spawn<F>(&self, job: F) -> Result<(), LoopError>
    where
        F: FnOnce(&LoopToken) + Send + 'static,
    {
        self.tx
            .send(Message::Run(Box::new(job)))
            .map_err(|_| LoopError::Closed)
    }

    /// Run `job` on the loop and block the calling thread until it returns.
    ///
    /// The job's result is sent back over a oneshot channel, so everything
    /// the job wrote is visible to the caller once this returns. Fails with
    /// [`LoopError::Closed`] instead of hanging if the loop is not running
    /// or stops before reaching the job.
    ///
    /// # Panics
    ///
    /// Panics when called from the loop thread, where it would deadlock, or
    /// from inside an async runtime context.
    pub fn run_sync<F, T>(&self, job: F) -> Result<T, LoopError>
    where
        F: FnOnce(&LoopToken) -> T + Send + 'static,
        T: Send + 'static,
    {
        assert_ne!(
            thread::current().id(),
            self.loop_thread,
            "run_sync called from the event-loop thread"
        );

        let (tx, rx) = oneshot::channel();
        self.spawn(move |token| {
            let _ = tx.send(job(token));
        })?;
        rx.blocking_recv().map_err(|_| LoopError::Closed)
    }

    /// Whether the loop has stopped accepting work.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Whether the calling thread is this loop's thread.
    pub fn is_loop_thread(&self) -> bool {
        thread::current().id() == self.loop_thread
    }
}

impl std::fmt::Debug for LoopHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopHandle")
            .field("loop_thread", &self.loop_thread)
            .field("closed", &self.is_closed())
            .finish()
    }
}

fn run(runtime: Runtime, mut rx: mpsc::UnboundedReceiver<Message>) {
    let local = LocalSet::new();
    let registry = Rc::new(RefCell::new(ListenerRegistry::new()));
    let token = LoopToken::new(Rc::clone(&registry));

    local.block_on(&runtime, async {
        while let Some(message) = rx.recv().await {
            match message {
                Message::Run(job) => job(&token),
                Message::Stop => break,
            }
        }
    });

    // Dropping queued jobs drops their rendezvous senders, which wakes any
    // blocked caller with `LoopError::Closed`.
    rx.close();
    let mut discarded = 0usize;
    while rx.try_recv().is_ok() {
        discarded += 1;
    }

    let retired = registry.borrow_mut().retire_all();
    tracing::info!(
        listeners = retired.len(),
        discarded_jobs = discarded,
        "Event loop stopping"
    );

    // Handles first, then the accept and connection tasks, then the runtime.
    drop(retired);
    drop(local);
    drop(token);
    drop(runtime);

    tracing::info!("Event loop stopped");
}
