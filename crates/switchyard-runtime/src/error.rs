//! Runtime error types.

use switchyard_framework::LifecycleError;
use thiserror::Error;

use crate::config::ConfigError;

/// Errors that can occur during runtime operations.
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A plugin failed to install, uninstall or reload.
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    /// No running plugin has this name.
    #[error("Plugin not found: {0}")]
    UnknownPlugin(String),
}

/// Result type for runtime operations.
pub type RuntimeResult<T = ()> = Result<T, RuntimeError>;
