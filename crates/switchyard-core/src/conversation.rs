//! Multi-turn conversation entries.
//!
//! A [`ConversationEntry`] wraps the trigger entries of one stateful plugin
//! into a single dispatch entry with a small state machine:
//!
//! ```text
//!            entry point
//!   (idle) ──────────────▶ state A ──Goto("B")──▶ state B
//!      ▲                     │                      │
//!      └──────── End ────────┴──────── End ─────────┘
//! ```
//!
//! Exchanges are tracked per `(chat, user)` key, narrowed by
//! [`ConversationOptions::per_chat`] and [`ConversationOptions::per_user`].

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde_json::{Map, Value};
use tracing::{debug, trace, warn};

use crate::entry::{Flow, HandlerResult, TriggerEntry};
use crate::error::Skipped;
use crate::id::EntryId;
use crate::update::Update;

/// Options forwarded verbatim from a stateful plugin to its composite entry.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationOptions {
    /// Display name used in logs.
    pub name: Option<String>,
    /// Drop an exchange after this long without updates.
    pub idle_timeout: Option<Duration>,
    /// Track exchanges separately per chat.
    pub per_chat: bool,
    /// Track exchanges separately per user.
    pub per_user: bool,
    /// Check entry points even while an exchange is active.
    pub allow_reentry: bool,
    /// Whether a handled update stops propagating to later groups.
    pub block: bool,
    /// Anything else the platform SDK understands.
    pub extra: Map<String, Value>,
}

impl Default for ConversationOptions {
    fn default() -> Self {
        Self {
            name: None,
            idle_timeout: None,
            per_chat: true,
            per_user: true,
            allow_reentry: false,
            block: true,
            extra: Map::new(),
        }
    }
}

impl ConversationOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = Some(timeout);
        self
    }

    pub fn per_chat(mut self, enabled: bool) -> Self {
        self.per_chat = enabled;
        self
    }

    pub fn per_user(mut self, enabled: bool) -> Self {
        self.per_user = enabled;
        self
    }

    pub fn allow_reentry(mut self, enabled: bool) -> Self {
        self.allow_reentry = enabled;
        self
    }

    pub fn blocking(mut self, block: bool) -> Self {
        self.block = block;
        self
    }

    pub fn extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

type ExchangeKey = (Option<i64>, Option<i64>);

#[derive(Debug)]
struct Exchange {
    state: String,
    touched: Instant,
}

struct ConversationInner {
    id: EntryId,
    plugin: &'static str,
    entry_points: Vec<TriggerEntry>,
    states: Vec<(String, Vec<TriggerEntry>)>,
    fallbacks: Vec<TriggerEntry>,
    options: ConversationOptions,
    exchanges: Mutex<HashMap<ExchangeKey, Exchange>>,
}

/// Composite dispatch entry of a stateful plugin.
#[derive(Clone)]
pub struct ConversationEntry {
    inner: Arc<ConversationInner>,
}

impl fmt::Debug for ConversationEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversationEntry")
            .field("id", &self.inner.id)
            .field("plugin", &self.inner.plugin)
            .field("entry_points", &self.inner.entry_points.len())
            .field(
                "states",
                &self.inner.states.iter().map(|(k, _)| k).collect::<Vec<_>>(),
            )
            .field("fallbacks", &self.inner.fallbacks.len())
            .finish()
    }
}

fn first_match<'a>(entries: &'a [TriggerEntry], update: &Update) -> Option<&'a TriggerEntry> {
    entries.iter().find(|e| e.check(update))
}

impl ConversationEntry {
    /// Builds the composite entry. `states` keeps its given order.
    pub fn new(
        plugin: &'static str,
        entry_points: Vec<TriggerEntry>,
        states: Vec<(String, Vec<TriggerEntry>)>,
        fallbacks: Vec<TriggerEntry>,
        options: ConversationOptions,
    ) -> Self {
        Self {
            inner: Arc::new(ConversationInner {
                id: EntryId::next(),
                plugin,
                entry_points,
                states,
                fallbacks,
                options,
                exchanges: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn id(&self) -> EntryId {
        self.inner.id
    }

    pub fn plugin(&self) -> &'static str {
        self.inner.plugin
    }

    pub fn name(&self) -> &str {
        self.inner.options.name.as_deref().unwrap_or(self.inner.plugin)
    }

    pub fn options(&self) -> &ConversationOptions {
        &self.inner.options
    }

    pub fn entry_points(&self) -> &[TriggerEntry] {
        &self.inner.entry_points
    }

    /// State buckets in first-seen key order.
    pub fn states(&self) -> impl Iterator<Item = (&str, &[TriggerEntry])> {
        self.inner
            .states
            .iter()
            .map(|(key, entries)| (key.as_str(), entries.as_slice()))
    }

    /// Handlers registered for `key`, if the state exists.
    pub fn state(&self, key: &str) -> Option<&[TriggerEntry]> {
        self.inner
            .states
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, entries)| entries.as_slice())
    }

    pub fn fallbacks(&self) -> &[TriggerEntry] {
        &self.inner.fallbacks
    }

    fn key(&self, update: &Update) -> ExchangeKey {
        let opts = &self.inner.options;
        (
            opts.per_chat.then(|| update.chat_id()).flatten(),
            opts.per_user.then(|| update.sender_id()).flatten(),
        )
    }

    /// Current state of the exchange `update` belongs to, if one is active.
    pub fn active_state(&self, update: &Update) -> Option<String> {
        self.current(self.key(update))
    }

    fn current(&self, key: ExchangeKey) -> Option<String> {
        let mut exchanges = self.inner.exchanges.lock();
        let exchange = exchanges.get(&key)?;
        if let Some(timeout) = self.inner.options.idle_timeout {
            if exchange.touched.elapsed() >= timeout {
                debug!(conversation = %self.name(), state = %exchange.state, "exchange timed out");
                exchanges.remove(&key);
                return None;
            }
        }
        Some(exchange.state.clone())
    }

    fn select(&self, update: &Update) -> Option<TriggerEntry> {
        let inner = &self.inner;
        let found = match self.current(self.key(update)) {
            None => first_match(&inner.entry_points, update),
            Some(state) => inner
                .options
                .allow_reentry
                .then(|| first_match(&inner.entry_points, update))
                .flatten()
                .or_else(|| self.state(&state).and_then(|s| first_match(s, update)))
                .or_else(|| first_match(&inner.fallbacks, update)),
        };
        found.cloned()
    }

    /// Whether some handler would accept `update` in the exchange's current state.
    pub fn check(&self, update: &Update) -> bool {
        self.select(update).is_some()
    }

    /// Runs the selected handler and applies its [`Flow`].
    ///
    /// Returns [`Skipped`] when no handler accepts the update anymore.
    pub async fn handle(&self, update: Arc<Update>) -> HandlerResult {
        let Some(handler) = self.select(&update) else {
            return Err(Skipped.into());
        };
        let key = self.key(&update);
        trace!(conversation = %self.name(), method = handler.method(), "conversation handler selected");

        let flow = handler.handle(update).await?;
        self.apply(key, &flow);
        Ok(flow)
    }

    fn apply(&self, key: ExchangeKey, flow: &Flow) {
        let mut exchanges = self.inner.exchanges.lock();
        match flow {
            Flow::Continue => {
                if let Some(exchange) = exchanges.get_mut(&key) {
                    exchange.touched = Instant::now();
                }
            }
            Flow::Goto(state) => {
                if self.state(state).is_none() {
                    warn!(conversation = %self.name(), state = %state, "moving to a state with no handlers");
                }
                debug!(conversation = %self.name(), state = %state, "conversation state changed");
                exchanges.insert(
                    key,
                    Exchange {
                        state: state.clone(),
                        touched: Instant::now(),
                    },
                );
            }
            Flow::End => {
                if exchanges.remove(&key).is_some() {
                    debug!(conversation = %self.name(), "conversation ended");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BoxError;
    use crate::trigger::TriggerDescriptor;
    use tower::service_fn;

    fn entry(method: &'static str, descriptor: TriggerDescriptor, flow: Flow) -> TriggerEntry {
        TriggerEntry::new(
            "survey",
            method,
            Arc::new(descriptor),
            service_fn(move |_update: Arc<Update>| {
                let flow = flow.clone();
                async move { Ok::<_, BoxError>(flow) }
            }),
        )
        .unwrap()
    }

    fn survey(options: ConversationOptions) -> ConversationEntry {
        ConversationEntry::new(
            "survey",
            vec![entry("start", TriggerDescriptor::command("survey"), Flow::goto("name"))],
            vec![
                (
                    "name".into(),
                    vec![entry("name", TriggerDescriptor::text(r"^\w+$"), Flow::goto("age"))],
                ),
                (
                    "age".into(),
                    vec![entry("age", TriggerDescriptor::text(r"^\d+$"), Flow::End)],
                ),
            ],
            vec![entry("cancel", TriggerDescriptor::command("cancel"), Flow::End)],
            options,
        )
    }

    fn msg(text: &str) -> Arc<Update> {
        Arc::new(Update::message(text).with_sender(42, false))
    }

    #[tokio::test]
    async fn test_entry_state_end() {
        let conv = survey(ConversationOptions::new());
        assert!(!conv.check(&msg("paimon")));

        conv.handle(msg("/survey")).await.unwrap();
        assert_eq!(conv.active_state(&msg("")).as_deref(), Some("name"));

        conv.handle(msg("paimon")).await.unwrap();
        assert_eq!(conv.active_state(&msg("")).as_deref(), Some("age"));
        assert!(!conv.check(&msg("paimon")));

        assert_eq!(conv.handle(msg("17")).await.unwrap(), Flow::End);
        assert_eq!(conv.active_state(&msg("")), None);
    }

    #[tokio::test]
    async fn test_fallback_and_isolation() {
        let conv = survey(ConversationOptions::new());
        conv.handle(msg("/survey")).await.unwrap();

        let other = Arc::new(Update::message("paimon").with_sender(7, false));
        assert!(!conv.check(&other));

        conv.handle(msg("/cancel")).await.unwrap();
        assert_eq!(conv.active_state(&msg("")), None);
    }

    #[tokio::test]
    async fn test_reentry() {
        let conv = survey(ConversationOptions::new());
        conv.handle(msg("/survey")).await.unwrap();
        conv.handle(msg("paimon")).await.unwrap();
        assert!(!conv.check(&msg("/survey")));

        let conv = survey(ConversationOptions::new().allow_reentry(true));
        conv.handle(msg("/survey")).await.unwrap();
        conv.handle(msg("paimon")).await.unwrap();
        conv.handle(msg("/survey")).await.unwrap();
        assert_eq!(conv.active_state(&msg("")).as_deref(), Some("name"));
    }

    #[tokio::test]
    async fn test_idle_timeout() {
        let conv = survey(ConversationOptions::new().idle_timeout(Duration::ZERO));
        conv.handle(msg("/survey")).await.unwrap();
        assert_eq!(conv.active_state(&msg("")), None);
    }

    #[tokio::test]
    async fn test_unmatched_is_skipped() {
        let conv = survey(ConversationOptions::new());
        let err = conv.handle(msg("hello")).await.unwrap_err();
        assert!(err.is::<Skipped>());
    }
}
