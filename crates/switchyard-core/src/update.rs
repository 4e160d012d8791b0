//! Incoming update model.
//!
//! The chat-platform SDK owns the wire format; it converts whatever it
//! receives into an [`Update`] before handing it to the dispatch table.
//! Only the fields that trigger matching needs are modelled here.

use serde::{Deserialize, Serialize};

/// Kind of chat an update originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatKind {
    /// One-to-one conversation with the bot.
    Private,
    /// Group or supergroup.
    Group,
    /// Broadcast channel.
    Channel,
}

/// The chat an update belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Chat {
    pub id: i64,
    pub kind: ChatKind,
}

/// The user who caused the update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Sender {
    pub id: i64,
    /// Resolved by the SDK against the bot's admin list.
    #[serde(default)]
    pub is_admin: bool,
}

/// A change in chat membership.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MembershipChange {
    Joined,
    Left,
}

/// Payload of an update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Payload {
    /// A text message.
    Message { text: String },
    /// A button press carrying callback data.
    Callback { data: String },
    /// An inline query typed in the message box.
    InlineQuery { query: String },
    /// A member joined or left the chat.
    Membership { change: MembershipChange },
    /// Anything the framework has no dedicated matcher for.
    Other { raw: serde_json::Value },
}

/// One incoming update, as handed to dispatch entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Update {
    #[serde(default)]
    pub chat: Option<Chat>,
    #[serde(default)]
    pub sender: Option<Sender>,
    pub payload: Payload,
}

impl Update {
    /// Creates an update with no chat or sender attached.
    pub fn new(payload: Payload) -> Self {
        Self {
            chat: None,
            sender: None,
            payload,
        }
    }

    /// Shorthand for a text message update.
    pub fn message(text: impl Into<String>) -> Self {
        Self::new(Payload::Message { text: text.into() })
    }

    /// Shorthand for a callback update.
    pub fn callback(data: impl Into<String>) -> Self {
        Self::new(Payload::Callback { data: data.into() })
    }

    /// Shorthand for an inline query update.
    pub fn inline_query(query: impl Into<String>) -> Self {
        Self::new(Payload::InlineQuery {
            query: query.into(),
        })
    }

    /// Shorthand for a membership update.
    pub fn membership(change: MembershipChange) -> Self {
        Self::new(Payload::Membership { change })
    }

    pub fn with_chat(mut self, id: i64, kind: ChatKind) -> Self {
        self.chat = Some(Chat { id, kind });
        self
    }

    pub fn with_sender(mut self, id: i64, is_admin: bool) -> Self {
        self.sender = Some(Sender { id, is_admin });
        self
    }

    pub fn chat_id(&self) -> Option<i64> {
        self.chat.map(|c| c.id)
    }

    pub fn sender_id(&self) -> Option<i64> {
        self.sender.map(|s| s.id)
    }

    /// Whether the sender is known to be an admin.
    pub fn from_admin(&self) -> bool {
        self.sender.is_some_and(|s| s.is_admin)
    }

    /// Message text, if this is a message update.
    pub fn text(&self) -> Option<&str> {
        match &self.payload {
            Payload::Message { text } => Some(text),
            _ => None,
        }
    }

    /// Splits a `/command@bot args` message into the bare command name.
    ///
    /// Returns `None` for non-message updates and for messages that do not
    /// start with `/`.
    pub fn command(&self) -> Option<&str> {
        let head = self.text()?.split_whitespace().next()?;
        let name = head.strip_prefix('/')?;
        let name = name.split_once('@').map_or(name, |(name, _bot)| name);
        (!name.is_empty()).then_some(name)
    }

    /// Arguments following the command word, split on whitespace.
    pub fn command_args(&self) -> Vec<&str> {
        match self.command() {
            Some(_) => self
                .text()
                .map(|t| t.split_whitespace().skip(1).collect())
                .unwrap_or_default(),
            None => Vec::new(),
        }
    }
}
