//! # Switchyard Framework
//!
//! Everything between a plugin's markers and the bot's dispatch table.
//!
//! This layer provides:
//! - The [`Plugin`] trait and its [`LoadContext`]
//! - Handler, error and job discovery, memoised per instance ([`discovery`])
//! - Conversation assembly for stateful plugins ([`conversation`])
//! - The install / uninstall / reload lifecycle ([`PluginHost`], [`Lifecycle`])
//! - The process-wide plugin catalog ([`catalog`], [`register_plugin!`])
//! - An in-memory dispatch table for tests and local runs ([`MemoryDispatchTable`])

pub mod catalog;
pub mod conversation;
pub mod discovery;
pub mod error;
pub mod host;
pub mod plugin;
pub mod table;

#[cfg(test)]
mod testing;

pub use catalog::{PluginFactory, all as catalog_all, find as catalog_find};
pub use conversation::{ConversationAssembly, assemble};
pub use error::{LifecycleError, LifecycleResult};
pub use host::{HostSetup, Lifecycle, PluginHost};
pub use plugin::{LoadContext, Plugin};
pub use table::MemoryDispatchTable;

// ─── Macro-internal re-exports (needed by register_plugin! at call sites) ────
#[doc(hidden)]
pub use linkme as __linkme;
