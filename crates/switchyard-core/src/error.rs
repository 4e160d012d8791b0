//! Error types for the Switchyard core.

use thiserror::Error;

pub use tower::BoxError;

/// Returned by a filter layer when an entry declines an update it matched.
///
/// Dispatch recognises this error and moves on to the next entry without
/// logging anything. All other errors are treated as genuine failures.
#[derive(Debug, Clone, Error)]
#[error("update skipped by filter")]
pub struct Skipped;

/// Errors raised while turning marker descriptors into dispatch entries.
///
/// A discovery error aborts the discovery pass of the plugin that produced
/// it; the plugin's entry cache stays empty so a later call can retry.
#[derive(Debug, Clone, Error)]
pub enum DiscoveryError {
    /// A text, callback or inline-query pattern failed to compile.
    #[error("method `{method}`: invalid pattern `{pattern}`: {source}")]
    InvalidPattern {
        /// Method the descriptor was marked on.
        method: &'static str,
        /// The offending pattern.
        pattern: String,
        /// Compilation error reported by `regex`.
        #[source]
        source: regex::Error,
    },

    /// A command name was empty or contained whitespace or `@`.
    #[error("method `{method}`: invalid command name `{name}`")]
    InvalidCommand {
        /// Method the descriptor was marked on.
        method: &'static str,
        /// The offending command name.
        name: String,
    },

    /// A job schedule carried parameters that can never fire.
    #[error("job `{method}`: invalid schedule: {reason}")]
    InvalidSchedule {
        /// Method the job was marked on.
        method: &'static str,
        /// Why the schedule was rejected.
        reason: String,
    },
}

impl DiscoveryError {
    pub(crate) fn invalid_schedule(method: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidSchedule {
            method,
            reason: reason.into(),
        }
    }
}

/// Result type for discovery operations.
pub type DiscoveryResult<T> = Result<T, DiscoveryError>;
