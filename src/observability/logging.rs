//! Structured logging.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::{LogFormat, ObservabilityConfig};

/// Install the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over `config.log_level`.
pub fn init(config: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("listenloop={}", config.log_level)));

    let fmt_layer = match config.log_format {
        LogFormat::Plain => tracing_subscriber::fmt::layer().with_thread_names(true).boxed(),
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_thread_names(true)
            .boxed(),
    };

    tracing_subscriber::registry().with(filter).with(fmt_layer).init();
}
