//! Dispatch entries: the platform-ready objects built from descriptors.
//!
//! # Shape
//!
//! ```text
//! DispatchEntry ─┬─ Trigger(TriggerEntry)            one descriptor, one bound method
//!                └─ Conversation(ConversationEntry)   entry points / states / fallbacks
//! ErrorEntry                                          one error interceptor
//! ```
//!
//! Every entry carries an [`EntryId`]; dispatch tables compare entries by id,
//! so attaching the same entry twice under the same [`Group`] is a no-op.
//!
//! A trigger entry stores its bound method as a boxed tower service. When
//! the descriptor is admin-only, a filter layer rejects non-admin senders
//! with [`Skipped`], which dispatch treats as "not handled".

use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use tower::filter::{FilterLayer, Predicate};
use tower::util::BoxCloneSyncService;
use tower::{Service, ServiceBuilder, ServiceExt};

use crate::conversation::ConversationEntry;
use crate::error::{BoxError, DiscoveryResult, Skipped};
use crate::id::{EntryId, InstanceId};
use crate::trigger::{ErrorDescriptor, TriggerDescriptor, TriggerKind, TriggerMatcher};
use crate::update::Update;

// ─── Handler results ─────────────────────────────────────────────────────────

/// What a handler asks the framework to do next.
///
/// Only conversation entries act on `Goto` and `End`; for plain trigger
/// entries every variant means "handled".
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Flow {
    /// Stay where we are.
    #[default]
    Continue,
    /// Move the conversation to the named state.
    Goto(String),
    /// Leave the conversation.
    End,
}

impl Flow {
    pub fn goto(state: impl Into<String>) -> Self {
        Self::Goto(state.into())
    }
}

/// Return type of every trigger handler.
pub type HandlerResult = Result<Flow, BoxError>;

/// Boxed service every trigger entry calls.
pub type EntryService = BoxCloneSyncService<Arc<Update>, Flow, BoxError>;

// ─── Groups ──────────────────────────────────────────────────────────────────

/// Ordering key a dispatch table groups entries under.
///
/// Groups sort by declaration order: plugin groups in instance-creation
/// order, then [`Group::CatchAll`], which always comes last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Group {
    /// Entries owned by one plugin instance.
    Plugin(InstanceId),
    /// Reserved, lowest-priority group for entries that observe every update.
    CatchAll,
}

impl fmt::Display for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plugin(id) => write!(f, "plugin:{}", id.get()),
            Self::CatchAll => f.write_str("catch-all"),
        }
    }
}

// ─── Admin filter ────────────────────────────────────────────────────────────

/// Filter predicate passing only updates sent by an admin.
#[derive(Debug, Clone, Copy)]
pub struct AdminOnly;

impl Predicate<Arc<Update>> for AdminOnly {
    type Request = Arc<Update>;

    fn check(&mut self, update: Arc<Update>) -> Result<Self::Request, BoxError> {
        if update.from_admin() {
            Ok(update)
        } else {
            Err(Skipped.into())
        }
    }
}

// ─── TriggerEntry ────────────────────────────────────────────────────────────

struct TriggerEntryInner {
    id: EntryId,
    plugin: &'static str,
    method: &'static str,
    descriptor: Arc<TriggerDescriptor>,
    matcher: TriggerMatcher,
    service: EntryService,
}

/// A dispatch entry built from one trigger descriptor.
///
/// Cheap to clone; clones share identity.
#[derive(Clone)]
pub struct TriggerEntry {
    inner: Arc<TriggerEntryInner>,
}

impl fmt::Debug for TriggerEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TriggerEntry")
            .field("id", &self.inner.id)
            .field("plugin", &self.inner.plugin)
            .field("method", &self.inner.method)
            .field("kind", self.inner.descriptor.kind())
            .finish()
    }
}

impl TriggerEntry {
    /// Compiles `descriptor` and wraps `service` into an entry.
    ///
    /// Fails when the descriptor's pattern or command name is malformed.
    pub fn new<S>(
        plugin: &'static str,
        method: &'static str,
        descriptor: Arc<TriggerDescriptor>,
        service: S,
    ) -> DiscoveryResult<Self>
    where
        S: Service<Arc<Update>, Response = Flow, Error = BoxError> + Clone + Send + Sync + 'static,
        S::Future: Send + 'static,
    {
        let matcher = TriggerMatcher::compile(method, descriptor.kind())?;
        let service = if descriptor.is_admin_only() {
            BoxCloneSyncService::new(
                ServiceBuilder::new()
                    .layer(FilterLayer::new(AdminOnly))
                    .service(service),
            )
        } else {
            BoxCloneSyncService::new(service)
        };

        Ok(Self {
            inner: Arc::new(TriggerEntryInner {
                id: EntryId::next(),
                plugin,
                method,
                descriptor,
                matcher,
                service,
            }),
        })
    }

    pub fn id(&self) -> EntryId {
        self.inner.id
    }

    pub fn plugin(&self) -> &'static str {
        self.inner.plugin
    }

    pub fn method(&self) -> &'static str {
        self.inner.method
    }

    pub fn descriptor(&self) -> &TriggerDescriptor {
        &self.inner.descriptor
    }

    pub fn kind(&self) -> &TriggerKind {
        self.inner.descriptor.kind()
    }

    pub fn is_blocking(&self) -> bool {
        self.inner.descriptor.is_blocking()
    }

    pub fn is_catch_all(&self) -> bool {
        self.inner.descriptor.is_catch_all()
    }

    /// Whether `update` fires this entry's trigger.
    pub fn check(&self, update: &Update) -> bool {
        self.inner.matcher.matches(update)
    }

    /// Runs the bound method.
    pub async fn handle(&self, update: Arc<Update>) -> HandlerResult {
        self.inner.service.clone().oneshot(update).await
    }
}

// ─── DispatchEntry ───────────────────────────────────────────────────────────

/// One entry attached to a dispatch table.
#[derive(Debug, Clone)]
pub enum DispatchEntry {
    Trigger(TriggerEntry),
    Conversation(ConversationEntry),
}

impl DispatchEntry {
    pub fn id(&self) -> EntryId {
        match self {
            Self::Trigger(e) => e.id(),
            Self::Conversation(e) => e.id(),
        }
    }

    pub fn plugin(&self) -> &'static str {
        match self {
            Self::Trigger(e) => e.plugin(),
            Self::Conversation(e) => e.plugin(),
        }
    }

    /// Catch-all entries go to [`Group::CatchAll`] instead of the plugin group.
    pub fn is_catch_all(&self) -> bool {
        matches!(self, Self::Trigger(e) if e.is_catch_all())
    }

    pub fn is_blocking(&self) -> bool {
        match self {
            Self::Trigger(e) => e.is_blocking(),
            Self::Conversation(e) => e.options().block,
        }
    }

    pub fn check(&self, update: &Update) -> bool {
        match self {
            Self::Trigger(e) => e.check(update),
            Self::Conversation(e) => e.check(update),
        }
    }

    pub async fn handle(&self, update: Arc<Update>) -> HandlerResult {
        match self {
            Self::Trigger(e) => e.handle(update).await,
            Self::Conversation(e) => e.handle(update).await,
        }
    }

    pub fn as_trigger(&self) -> Option<&TriggerEntry> {
        match self {
            Self::Trigger(e) => Some(e),
            Self::Conversation(_) => None,
        }
    }

    pub fn as_conversation(&self) -> Option<&ConversationEntry> {
        match self {
            Self::Conversation(e) => Some(e),
            Self::Trigger(_) => None,
        }
    }
}

impl From<TriggerEntry> for DispatchEntry {
    fn from(entry: TriggerEntry) -> Self {
        Self::Trigger(entry)
    }
}

impl From<ConversationEntry> for DispatchEntry {
    fn from(entry: ConversationEntry) -> Self {
        Self::Conversation(entry)
    }
}

// ─── Error entries ───────────────────────────────────────────────────────────

/// What an error interceptor receives.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    /// The update being handled when the error happened, if any.
    pub update: Option<Arc<Update>>,
    /// Name of the plugin whose handler failed.
    pub plugin: &'static str,
    pub error: Arc<dyn std::error::Error + Send + Sync>,
}

impl ErrorReport {
    pub fn new(update: Option<Arc<Update>>, plugin: &'static str, error: BoxError) -> Self {
        Self {
            update,
            plugin,
            error: Arc::from(error),
        }
    }
}

/// An error interceptor bound to its plugin instance.
pub type ErrorCallback = Arc<dyn Fn(Arc<ErrorReport>) -> BoxFuture<'static, ()> + Send + Sync>;

struct ErrorEntryInner {
    id: EntryId,
    plugin: &'static str,
    method: &'static str,
    descriptor: ErrorDescriptor,
    callback: ErrorCallback,
}

/// An error interceptor attached to the table's global error list.
#[derive(Clone)]
pub struct ErrorEntry {
    inner: Arc<ErrorEntryInner>,
}

impl fmt::Debug for ErrorEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorEntry")
            .field("id", &self.inner.id)
            .field("plugin", &self.inner.plugin)
            .field("method", &self.inner.method)
            .finish()
    }
}

impl ErrorEntry {
    pub fn new(
        plugin: &'static str,
        method: &'static str,
        descriptor: ErrorDescriptor,
        callback: ErrorCallback,
    ) -> Self {
        Self {
            inner: Arc::new(ErrorEntryInner {
                id: EntryId::next(),
                plugin,
                method,
                descriptor,
                callback,
            }),
        }
    }

    pub fn id(&self) -> EntryId {
        self.inner.id
    }

    pub fn plugin(&self) -> &'static str {
        self.inner.plugin
    }

    pub fn method(&self) -> &'static str {
        self.inner.method
    }

    pub fn is_blocking(&self) -> bool {
        self.inner.descriptor.is_blocking()
    }

    pub async fn handle(&self, report: Arc<ErrorReport>) {
        (self.inner.callback)(report).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tower::service_fn;

    fn echo_entry(descriptor: TriggerDescriptor) -> TriggerEntry {
        TriggerEntry::new(
            "test",
            "echo",
            Arc::new(descriptor),
            service_fn(|update: Arc<Update>| async move {
                Ok::<_, BoxError>(Flow::goto(update.text().unwrap_or_default()))
            }),
        )
        .unwrap()
    }

    #[test]
    fn test_group_ordering() {
        let a = Group::Plugin(InstanceId::next());
        let b = Group::Plugin(InstanceId::next());
        assert!(a < b);
        assert!(b < Group::CatchAll);
    }

    #[tokio::test]
    async fn test_trigger_entry_handles() {
        let entry = echo_entry(TriggerDescriptor::text("^hi"));
        let update = Arc::new(Update::message("hi there"));
        assert!(entry.check(&update));
        assert_eq!(entry.handle(update).await.unwrap(), Flow::goto("hi there"));
    }

    #[tokio::test]
    async fn test_admin_only_skips_other_senders() {
        let entry = echo_entry(TriggerDescriptor::command("ban").admin_only());

        let from_user = Arc::new(Update::message("/ban").with_sender(1, false));
        let err = entry.handle(from_user).await.unwrap_err();
        assert!(err.is::<Skipped>());

        let from_admin = Arc::new(Update::message("/ban").with_sender(2, true));
        assert!(entry.handle(from_admin).await.is_ok());
    }

    #[test]
    fn test_catch_all_flag() {
        let entry: DispatchEntry = echo_entry(TriggerDescriptor::catch_all()).into();
        assert!(entry.is_catch_all());
        assert!(entry.check(&Update::callback("anything")));
    }

    #[tokio::test]
    async fn test_error_entry_receives_report() {
        let entry = ErrorEntry::new(
            "test",
            "on_error",
            ErrorDescriptor::new(),
            Arc::new(|report: Arc<ErrorReport>| {
                Box::pin(async move {
                    assert_eq!(report.plugin, "broken");
                    assert_eq!(report.error.to_string(), "boom");
                }) as BoxFuture<'static, ()>
            }),
        );
        let report = ErrorReport::new(None, "broken", "boom".into());
        entry.handle(Arc::new(report)).await;
        assert!(entry.is_blocking());
    }
}
