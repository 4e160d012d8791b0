//! # Switchyard
//!
//! Plugin lifecycle and handler discovery for chat bots.
//!
//! ## Architecture
//!
//! ```text
//! #[triggers] impl Plugin          register_plugin!(Plugin)
//!         │                                 │
//!         ▼                                 ▼
//!   Markers (per type)             PLUGIN_CATALOG ──▶ Runtime
//!         │                                              │
//!         ▼                                              ▼
//!   discovery ──▶ DispatchEntry / ErrorEntry / Job ──▶ PluginHost ──▶ DispatchTable
//!                                                        │               Scheduler
//!                                                        └── initialize / release
//! ```
//!
//! - **Markers**: what a plugin type declares, built once per type
//! - **Discovery**: binds markers to one live instance, memoised per instance
//! - **PluginHost**: install / uninstall / reload against the shared table
//! - **Runtime**: instantiates the catalog from configuration and drives hosts
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use switchyard::prelude::*;
//!
//! #[derive(Default)]
//! struct Ping;
//!
//! #[triggers]
//! impl Ping {
//!     #[command("ping")]
//!     async fn ping(self: Arc<Self>, _update: Arc<Update>) -> HandlerResult {
//!         Ok(Flow::Continue)
//!     }
//! }
//!
//! impl Plugin for Ping {
//!     const NAME: &'static str = "ping";
//! }
//!
//! register_plugin!(Ping);
//! ```
//!
//! ## Features
//!
//! - `toml-config` *(default)*: `switchyard.toml` configuration files
//! - `yaml-config`: `switchyard.yaml` configuration files
//! - `json-log`: JSON log output

pub use switchyard_core as core;
pub use switchyard_framework as framework;
pub use switchyard_runtime as runtime;

pub use switchyard_macros::triggers;

/// Everything a plugin crate usually needs.
///
/// ```rust,ignore
/// use switchyard::prelude::*;
/// ```
pub mod prelude {
    pub use std::sync::Arc;

    pub use async_trait::async_trait;

    // Declaring triggers
    pub use crate::triggers;
    pub use switchyard_core::prelude::*;
    pub use switchyard_core::{BoxError, Skipped};

    // Plugins and their lifecycle
    pub use switchyard_framework::{
        LoadContext, MemoryDispatchTable, Plugin, PluginHost, register_plugin,
    };

    // Bootstrap
    pub use switchyard_runtime::{Runtime, TokioScheduler};
}
