//! The [`Plugin`] trait and the context its hooks receive.
//!
//! A plugin is a plain struct carrying markers ([`Declare`]) plus a name
//! and two optional async hooks:
//!
//! ```rust,ignore
//! #[derive(Default)]
//! struct Ping;
//!
//! #[triggers]
//! impl Ping {
//!     #[command("ping")]
//!     async fn ping(self: Arc<Self>, update: Arc<Update>) -> HandlerResult {
//!         Ok(Flow::Continue)
//!     }
//! }
//!
//! #[async_trait]
//! impl Plugin for Ping {
//!     const NAME: &'static str = "ping";
//! }
//!
//! register_plugin!(Ping);
//! ```
//!
//! Returning `Some` from [`Plugin::conversation`] makes the plugin
//! stateful: its role-tagged triggers are assembled into one conversation
//! entry instead of being attached one by one.

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use switchyard_core::{BoxError, ConversationOptions, Declare};

/// Context handed to [`Plugin::initialize`].
#[derive(Debug, Clone)]
pub struct LoadContext {
    plugin: &'static str,
    config: Arc<Value>,
}

impl LoadContext {
    pub fn new(plugin: &'static str, config: Value) -> Self {
        Self {
            plugin,
            config: Arc::new(config),
        }
    }

    /// An empty config section.
    pub fn empty(plugin: &'static str) -> Self {
        Self::new(plugin, Value::Object(Map::new()))
    }

    pub fn plugin(&self) -> &'static str {
        self.plugin
    }

    /// The raw `plugins.<name>` config section.
    pub fn raw_config(&self) -> &Value {
        &self.config
    }

    /// Deserializes the config section, falling back to `T::default()` when
    /// it is absent or malformed.
    pub fn config<T: DeserializeOwned + Default>(&self) -> T {
        self.try_config().unwrap_or_default()
    }

    pub fn try_config<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value((*self.config).clone())
    }
}

/// A feature module the framework can discover, install and release.
#[async_trait]
pub trait Plugin: Declare {
    /// Unique name, used for logging, config lookup and the catalog.
    const NAME: &'static str;

    /// Conversation options for stateful plugins. `None` means every trigger
    /// is attached on its own and conversation roles are ignored.
    fn conversation() -> Option<ConversationOptions> {
        None
    }

    /// Runs after the plugin's entries are attached.
    async fn initialize(&self, _ctx: &LoadContext) -> Result<(), BoxError> {
        Ok(())
    }

    /// Runs after the plugin's entries are detached.
    async fn release(&self) -> Result<(), BoxError> {
        Ok(())
    }
}
