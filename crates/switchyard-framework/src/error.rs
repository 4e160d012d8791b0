//! Error types for the Switchyard framework.

use switchyard_core::{BoxError, DiscoveryError};
use thiserror::Error;

/// Errors raised while installing or uninstalling a plugin.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// Turning the plugin's markers into entries failed.
    #[error("plugin `{plugin}`: discovery failed: {source}")]
    Discovery {
        plugin: &'static str,
        #[source]
        source: DiscoveryError,
    },

    /// The plugin's `initialize` hook failed. Nothing stays attached.
    #[error("plugin `{plugin}`: initialize failed: {source}")]
    Initialize {
        plugin: &'static str,
        #[source]
        source: BoxError,
    },

    /// The plugin's `release` hook failed. The plugin is still uninstalled.
    #[error("plugin `{plugin}`: release failed: {source}")]
    Release {
        plugin: &'static str,
        #[source]
        source: BoxError,
    },
}

impl LifecycleError {
    /// Name of the plugin the error belongs to.
    pub fn plugin(&self) -> &'static str {
        match self {
            Self::Discovery { plugin, .. }
            | Self::Initialize { plugin, .. }
            | Self::Release { plugin, .. } => plugin,
        }
    }
}

/// Result type for lifecycle operations.
pub type LifecycleResult<T = ()> = Result<T, LifecycleError>;
