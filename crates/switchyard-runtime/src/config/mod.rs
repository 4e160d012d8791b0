//! Configuration module for the Switchyard runtime.
//!
//! Settings come from `switchyard.toml` (or `switchyard.yaml`), profile
//! overlays and `SWITCHYARD_*` environment variables, layered by figment.

pub mod error;
pub mod loader;
pub mod schema;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile, load_config, load_config_from_file};
pub use schema::{
    LogFormat, LogLevel, LogOutput, LoggingConfig, PluginsConfig, SpanEventConfig,
    SwitchyardConfig,
};
