//! OS signal handling.

use tokio::signal::unix::{signal, SignalKind};

/// Block the calling thread until SIGINT or SIGTERM arrives.
///
/// Runs its own small runtime so the event loop thread is never involved.
pub fn wait_for_shutdown_signal() -> std::io::Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_io()
        .build()?;

    runtime.block_on(async {
        let mut interrupt = signal(SignalKind::interrupt())?;
        let mut terminate = signal(SignalKind::terminate())?;

        tokio::select! {
            _ = interrupt.recv() => tracing::info!("SIGINT received"),
            _ = terminate.recv() => tracing::info!("SIGTERM received"),
        }
        Ok(())
    })
}
