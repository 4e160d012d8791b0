//! Trigger descriptors and their compiled matchers.
//!
//! A [`TriggerDescriptor`] is the metadata a marker stamps onto a method:
//! what kind of update fires it, the pattern to match, and the options the
//! resulting dispatch entry should carry. Descriptors are immutable once
//! built and are shared behind `Arc`, so the same descriptor may be marked
//! on methods of several plugin types.
//!
//! ```rust,ignore
//! TriggerDescriptor::command("bind").admin_only();
//! TriggerDescriptor::text(r"^\d{9}$").state("awaiting_uid");
//! TriggerDescriptor::callback("^sign:").blocking(false);
//! ```

use regex::Regex;
use serde_json::{Map, Value};

use crate::error::{DiscoveryError, DiscoveryResult};
use crate::update::{MembershipChange, Payload, Update};

/// Which membership changes a membership trigger reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MembershipFilter {
    Joined,
    Left,
    Any,
}

impl MembershipFilter {
    fn accepts(self, change: MembershipChange) -> bool {
        matches!(
            (self, change),
            (Self::Any, _)
                | (Self::Joined, MembershipChange::Joined)
                | (Self::Left, MembershipChange::Left)
        )
    }
}

/// The kind of update a trigger reacts to, with its match value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerKind {
    /// A `/name` command.
    Command(String),
    /// A regular expression searched in message text.
    Text(String),
    /// A regular expression searched in callback data.
    Callback(String),
    /// A membership change.
    Membership(MembershipFilter),
    /// An inline query, optionally filtered by a pattern.
    InlineQuery(Option<String>),
    /// Observes every update. Attached to the reserved catch-all group.
    Any,
}

impl TriggerKind {
    /// Short lowercase name, used in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Command(_) => "command",
            Self::Text(_) => "text",
            Self::Callback(_) => "callback",
            Self::Membership(_) => "membership",
            Self::InlineQuery(_) => "inline_query",
            Self::Any => "any",
        }
    }

    /// The textual match value, if the kind has one.
    pub fn match_value(&self) -> Option<&str> {
        match self {
            Self::Command(v) | Self::Text(v) | Self::Callback(v) => Some(v),
            Self::InlineQuery(v) => v.as_deref(),
            Self::Membership(_) | Self::Any => None,
        }
    }
}

/// Position of a trigger inside a multi-turn conversation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ConversationRole {
    /// Starts the conversation.
    Entry,
    /// Handles updates while the conversation sits in the named state.
    State(String),
    /// Handles updates no state handler accepted.
    Fallback,
}

/// Metadata describing one trigger on one method.
#[derive(Debug, Clone)]
pub struct TriggerDescriptor {
    kind: TriggerKind,
    block: bool,
    admin_only: bool,
    role: Option<ConversationRole>,
    options: Map<String, Value>,
}

impl TriggerDescriptor {
    /// Creates a descriptor of the given kind with default options:
    /// blocking, open to everyone, no conversation role.
    pub fn new(kind: TriggerKind) -> Self {
        Self {
            kind,
            block: true,
            admin_only: false,
            role: None,
            options: Map::new(),
        }
    }

    pub fn command(name: impl Into<String>) -> Self {
        Self::new(TriggerKind::Command(name.into()))
    }

    pub fn text(pattern: impl Into<String>) -> Self {
        Self::new(TriggerKind::Text(pattern.into()))
    }

    pub fn callback(pattern: impl Into<String>) -> Self {
        Self::new(TriggerKind::Callback(pattern.into()))
    }

    pub fn membership(filter: MembershipFilter) -> Self {
        Self::new(TriggerKind::Membership(filter))
    }

    pub fn inline_query(pattern: Option<String>) -> Self {
        Self::new(TriggerKind::InlineQuery(pattern))
    }

    pub fn catch_all() -> Self {
        Self::new(TriggerKind::Any)
    }

    /// Whether a handled update stops propagating to later groups.
    pub fn blocking(mut self, block: bool) -> Self {
        self.block = block;
        self
    }

    /// Restricts the trigger to admin senders.
    pub fn admin_only(mut self) -> Self {
        self.admin_only = true;
        self
    }

    /// Sets the conversation role directly.
    pub fn role(mut self, role: ConversationRole) -> Self {
        self.role = Some(role);
        self
    }

    pub fn entry(self) -> Self {
        self.role(ConversationRole::Entry)
    }

    pub fn state(self, key: impl Into<String>) -> Self {
        self.role(ConversationRole::State(key.into()))
    }

    pub fn fallback(self) -> Self {
        self.role(ConversationRole::Fallback)
    }

    /// Adds an extra option forwarded verbatim to the dispatch entry.
    pub fn option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    pub fn kind(&self) -> &TriggerKind {
        &self.kind
    }

    pub fn is_blocking(&self) -> bool {
        self.block
    }

    pub fn is_admin_only(&self) -> bool {
        self.admin_only
    }

    pub fn conversation_role(&self) -> Option<&ConversationRole> {
        self.role.as_ref()
    }

    pub fn options(&self) -> &Map<String, Value> {
        &self.options
    }

    pub fn is_catch_all(&self) -> bool {
        self.kind == TriggerKind::Any
    }
}

/// Metadata describing an error-interceptor method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorDescriptor {
    block: bool,
}

impl ErrorDescriptor {
    pub fn new() -> Self {
        Self { block: true }
    }

    /// Whether the dispatcher awaits this interceptor before moving on.
    pub fn blocking(mut self, block: bool) -> Self {
        self.block = block;
        self
    }

    pub fn is_blocking(&self) -> bool {
        self.block
    }
}

impl Default for ErrorDescriptor {
    fn default() -> Self {
        Self::new()
    }
}

/// A trigger kind with its patterns compiled, ready to test updates.
#[derive(Debug, Clone)]
pub enum TriggerMatcher {
    Command(String),
    Text(Regex),
    Callback(Regex),
    Membership(MembershipFilter),
    InlineQuery(Option<Regex>),
    Any,
}

fn compile(method: &'static str, pattern: &str) -> DiscoveryResult<Regex> {
    Regex::new(pattern).map_err(|source| DiscoveryError::InvalidPattern {
        method,
        pattern: pattern.to_string(),
        source,
    })
}

impl TriggerMatcher {
    /// Validates `kind` and compiles its patterns.
    ///
    /// `method` only feeds the error message.
    pub fn compile(method: &'static str, kind: &TriggerKind) -> DiscoveryResult<Self> {
        Ok(match kind {
            TriggerKind::Command(name) => {
                let bare = name.trim_start_matches('/');
                if bare.is_empty() || bare.chars().any(|c| c.is_whitespace() || c == '@') {
                    return Err(DiscoveryError::InvalidCommand {
                        method,
                        name: name.clone(),
                    });
                }
                Self::Command(bare.to_string())
            }
            TriggerKind::Text(pattern) => Self::Text(compile(method, pattern)?),
            TriggerKind::Callback(pattern) => Self::Callback(compile(method, pattern)?),
            TriggerKind::Membership(filter) => Self::Membership(*filter),
            TriggerKind::InlineQuery(pattern) => Self::InlineQuery(
                pattern
                    .as_deref()
                    .map(|p| compile(method, p))
                    .transpose()?,
            ),
            TriggerKind::Any => Self::Any,
        })
    }

    /// Tests whether `update` fires this trigger.
    pub fn matches(&self, update: &Update) -> bool {
        match (self, &update.payload) {
            (Self::Any, _) => true,
            (Self::Command(name), Payload::Message { .. }) => update.command() == Some(name.as_str()),
            (Self::Text(re), Payload::Message { text }) => re.is_match(text),
            (Self::Callback(re), Payload::Callback { data }) => re.is_match(data),
            (Self::Membership(filter), Payload::Membership { change }) => filter.accepts(*change),
            (Self::InlineQuery(re), Payload::InlineQuery { query }) => {
                re.as_ref().is_none_or(|re| re.is_match(query))
            }
            _ => false,
        }
    }
}
