//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → Config (immutable)
//!     → ServerConfig handed to the lifecycle manager
//!     → ObservabilityConfig handed to logging/metrics setup
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded
//! - All fields have defaults to allow minimal configs
//! - No semantic validation: bind is the only judge of the address

pub mod loader;
pub mod schema;

pub use loader::{load_config, ConfigError};
pub use schema::{Config, LogFormat, ObservabilityConfig, ServerConfig};
