//! # tally-core
//!
//! Shared foundation for the tally accounting backend: the per-request
//! tenant context produced by upstream auth, the configuration trait every
//! crate implements, and structured logging setup.

pub mod app_config;
pub mod context;
pub mod logging;

pub use app_config::{env_or_default, parse_env, AppConfigTrait, ConfigError, ConfigSource};
pub use context::TenantContext;
pub use logging::{init_logging, LoggingConfig};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
