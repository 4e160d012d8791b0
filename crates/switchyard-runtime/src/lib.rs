//! Switchyard Runtime - bootstrap layer for the Switchyard bot framework.
//!
//! This crate provides:
//! - Layered configuration (`switchyard.toml`, profiles, `SWITCHYARD_*` env)
//! - Logging setup from configuration ([`logging`])
//! - A tokio job scheduler ([`TokioScheduler`])
//! - The [`Runtime`] that installs every registered plugin and tears them
//!   down again
//!
//! ```rust,ignore
//! use switchyard_runtime::Runtime;
//! use switchyard_framework::MemoryDispatchTable;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let table = Arc::new(MemoryDispatchTable::new());
//!     let runtime = Runtime::builder().build(table.clone())?;
//!     runtime.run().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod runtime;
pub mod scheduler;

pub use config::{
    ConfigError, ConfigLoader, ConfigResult, LoggingConfig, PluginsConfig, Profile,
    SwitchyardConfig,
};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::{LoggingBuilder, SpanEvents};
pub use runtime::{Runtime, RuntimeBuilder};
pub use scheduler::TokioScheduler;

// Re-export tracing for use by plugin crates
pub use tracing;
pub use tracing_subscriber;

/// Logging macros for plugin code.
pub mod prelude {
    pub use tracing::{Level, debug, error, info, instrument, span, trace, warn};
}
