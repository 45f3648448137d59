//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ServerConfig (validated, immutable)
//!     → event loop thread name, listeners to create, observability setup
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, override_log_level, parse_config, ConfigError};
pub use schema::{
    EventLoopConfig, ListenerConfig, LogFormat, ObservabilityConfig, ServerConfig, TransportConfig,
};
pub use validation::{validate_config, ValidationError};
