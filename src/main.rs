//! listenloop: echo server on a single event-loop thread.
//!
//! The main thread acts as the foreign control thread: it starts the loop,
//! creates every configured listener through the blocking rendezvous, then
//! parks until SIGINT/SIGTERM and stops the loop.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

use listenloop::config::{load_config, override_log_level, ServerConfig, TransportConfig};
use listenloop::echo::{Echo, EchoHandler};
use listenloop::lifecycle::wait_for_shutdown_signal;
use listenloop::observability::{logging, metrics};
use listenloop::EventLoop;

#[derive(Parser)]
#[command(name = "listenloop", version)]
#[command(about = "Echo server with TCP and pipe listeners on one event loop", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the configured log level.
    #[arg(short, long)]
    log_level: Option<String>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ServerConfig::default(),
    };
    if let Some(level) = cli.log_level {
        config = override_log_level(config, level)?;
    }

    logging::init(&config.observability);
    tracing::info!("listenloop v{} starting", env!("CARGO_PKG_VERSION"));

    if config.observability.metrics_enabled {
        let address: SocketAddr = config.observability.metrics_address.parse()?;
        metrics::init(address)?;
    }

    let event_loop = EventLoop::start(&config.event_loop)?;
    let handle = event_loop.handle();

    for listener in &config.listeners {
        let application = Echo::new(&listener.name);
        let created = match &listener.transport {
            TransportConfig::Tcp { host, port } => {
                handle.create_tcp_listener_sync::<EchoHandler>(host.as_str(), *port, application)
            }
            TransportConfig::Pipe { path, umask } => {
                handle.create_pipe_listener_sync::<EchoHandler>(path.as_path(), *umask, application)
            }
        };

        match created {
            Ok(info) => tracing::info!(
                name = %listener.name,
                listener = %info.id,
                address = %info.local_addr,
                "Serving"
            ),
            Err(error) => {
                tracing::error!(name = %listener.name, %error, "Failed to start listener");
                event_loop.shutdown();
                return Err(error.into());
            }
        }
    }

    wait_for_shutdown_signal()?;

    event_loop.shutdown();
    tracing::info!("Shutdown complete");
    Ok(())
}
