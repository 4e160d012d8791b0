//! Plugin lifecycle: install, uninstall and reload against the shared table.
//!
//! [`PluginHost`] owns one live plugin instance and everything derived from
//! it. The state machine is:
//!
//! ```text
//!              install()                     uninstall()
//! Uninstalled ───────────▶ Installed ───────────────────▶ Uninstalled
//!      ▲  │
//!      │  └── initialize fails: entries detached again
//!      └── reload() = uninstall() + install()
//! ```
//!
//! Transitions are serialised per instance by an async mutex held across the
//! `initialize` / `release` hooks. Entry discovery is memoised behind a
//! separate synchronous guard that is never held across an `.await`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use switchyard_core::{
    DiscoveryResult, DispatchEntry, DispatchTable, ErrorEntry, Group, InstanceId, ScheduledJob,
    Scheduler,
};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};

use crate::discovery::{discover_error_handlers, discover_handlers, discover_jobs};
use crate::error::{LifecycleError, LifecycleResult};
use crate::plugin::{LoadContext, Plugin};

/// What a host needs from the bot to be constructed.
#[derive(Clone)]
pub struct HostSetup {
    pub table: Arc<dyn DispatchTable>,
    /// The plugin's `plugins.<name>` config section.
    pub config: Value,
}

impl HostSetup {
    pub fn new(table: Arc<dyn DispatchTable>) -> Self {
        Self {
            table,
            config: Value::Object(Map::new()),
        }
    }

    pub fn with_config(mut self, config: Value) -> Self {
        self.config = config;
        self
    }
}

/// Object-safe view of a [`PluginHost`], used by bootstrap code that holds
/// hosts of many plugin types.
#[async_trait]
pub trait Lifecycle: Send + Sync {
    fn name(&self) -> &'static str;

    /// Group this instance's non-catch-all entries attach under.
    fn group(&self) -> Group;

    fn is_installed(&self) -> bool;

    /// Attaches entries and runs `initialize`. No-op when already installed.
    async fn install(&self) -> LifecycleResult;

    /// Detaches entries and runs `release`. No-op when not installed.
    async fn uninstall(&self) -> LifecycleResult;

    /// Uninstalls, then installs again.
    async fn reload(&self) -> LifecycleResult;

    /// Registers the plugin's jobs once.
    async fn install_jobs(&self, scheduler: &dyn Scheduler) -> LifecycleResult;

    /// Cancels the plugin's jobs. No-op when they are not registered.
    async fn uninstall_jobs(&self, scheduler: &dyn Scheduler);
}

#[derive(Default)]
struct HostState {
    installed: bool,
    attached: Vec<(DispatchEntry, Group)>,
    attached_errors: Vec<ErrorEntry>,
    jobs_installed: bool,
}

/// Owns one plugin instance and drives its lifecycle.
pub struct PluginHost<P: Plugin> {
    id: InstanceId,
    instance: Arc<P>,
    table: Arc<dyn DispatchTable>,
    config: Value,
    handlers: Mutex<Option<Arc<[DispatchEntry]>>>,
    error_handlers: Mutex<Option<Arc<[ErrorEntry]>>>,
    jobs: Mutex<Option<Arc<[ScheduledJob]>>>,
    state: AsyncMutex<HostState>,
    installed: AtomicBool,
}

impl<P: Plugin> std::fmt::Debug for PluginHost<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginHost")
            .field("plugin", &P::NAME)
            .field("id", &self.id)
            .field("installed", &self.is_installed())
            .finish()
    }
}

impl<P: Plugin> PluginHost<P> {
    pub fn new(instance: P, table: Arc<dyn DispatchTable>) -> Self {
        Self::from_setup(instance, HostSetup::new(table))
    }

    pub fn from_setup(instance: P, setup: HostSetup) -> Self {
        Self {
            id: InstanceId::next(),
            instance: Arc::new(instance),
            table: setup.table,
            config: setup.config,
            handlers: Mutex::new(None),
            error_handlers: Mutex::new(None),
            jobs: Mutex::new(None),
            state: AsyncMutex::new(HostState::default()),
            installed: AtomicBool::new(false),
        }
    }

    pub fn with_config(mut self, config: Value) -> Self {
        self.config = config;
        self
    }

    pub fn id(&self) -> InstanceId {
        self.id
    }

    pub fn instance(&self) -> &Arc<P> {
        &self.instance
    }

    /// The plugin's dispatch entries, built on first call.
    ///
    /// Concurrent first calls build once; a failed build leaves the cache
    /// empty so the next call tries again.
    pub fn handlers(&self) -> DiscoveryResult<Arc<[DispatchEntry]>> {
        let mut cache = self.handlers.lock();
        if let Some(entries) = cache.as_ref() {
            return Ok(Arc::clone(entries));
        }
        let entries: Arc<[DispatchEntry]> = discover_handlers(&self.instance)?.into();
        debug!(plugin = P::NAME, entries = entries.len(), "handlers discovered");
        *cache = Some(Arc::clone(&entries));
        Ok(entries)
    }

    /// The plugin's error interceptors, built on first call.
    pub fn error_handlers(&self) -> Arc<[ErrorEntry]> {
        let mut cache = self.error_handlers.lock();
        Arc::clone(cache.get_or_insert_with(|| discover_error_handlers(&self.instance).into()))
    }

    /// The plugin's scheduled jobs, built on first call.
    pub fn jobs(&self) -> DiscoveryResult<Arc<[ScheduledJob]>> {
        let mut cache = self.jobs.lock();
        if let Some(jobs) = cache.as_ref() {
            return Ok(Arc::clone(jobs));
        }
        let jobs: Arc<[ScheduledJob]> = discover_jobs(&self.instance)?.into();
        *cache = Some(Arc::clone(&jobs));
        Ok(jobs)
    }

    fn discovery_error(source: switchyard_core::DiscoveryError) -> LifecycleError {
        LifecycleError::Discovery {
            plugin: P::NAME,
            source,
        }
    }

    async fn install_locked(&self, state: &mut HostState) -> LifecycleResult {
        if state.installed {
            debug!(plugin = P::NAME, "already installed");
            return Ok(());
        }

        let handlers = self.handlers().map_err(Self::discovery_error)?;
        let error_handlers = self.error_handlers();

        for entry in handlers.iter() {
            let group = if entry.is_catch_all() {
                Group::CatchAll
            } else {
                Group::Plugin(self.id)
            };
            if self.table.attach(entry.clone(), group) {
                state.attached.push((entry.clone(), group));
            }
        }
        for entry in error_handlers.iter() {
            if self.table.attach_error(entry.clone()) {
                state.attached_errors.push(entry.clone());
            }
        }

        let ctx = LoadContext::new(P::NAME, self.config.clone());
        if let Err(source) = self.instance.initialize(&ctx).await {
            warn!(plugin = P::NAME, error = %source, "initialize failed, detaching");
            self.detach_all(state);
            return Err(LifecycleError::Initialize {
                plugin: P::NAME,
                source,
            });
        }

        state.installed = true;
        self.installed.store(true, Ordering::Release);
        info!(
            plugin = P::NAME,
            group = %Group::Plugin(self.id),
            entries = state.attached.len(),
            error_entries = state.attached_errors.len(),
            "plugin installed"
        );
        Ok(())
    }

    async fn uninstall_locked(&self, state: &mut HostState) -> LifecycleResult {
        if !state.installed {
            debug!(plugin = P::NAME, "not installed");
            return Ok(());
        }

        self.detach_all(state);
        let released = self.instance.release().await;

        state.installed = false;
        self.installed.store(false, Ordering::Release);

        match released {
            Ok(()) => {
                info!(plugin = P::NAME, "plugin uninstalled");
                Ok(())
            }
            Err(source) => {
                warn!(plugin = P::NAME, error = %source, "release failed");
                Err(LifecycleError::Release {
                    plugin: P::NAME,
                    source,
                })
            }
        }
    }

    /// Detaches exactly what this instance attached.
    fn detach_all(&self, state: &mut HostState) {
        for (entry, group) in state.attached.drain(..) {
            if !self.table.detach(&entry, group) {
                debug!(plugin = P::NAME, entry = %entry.id(), "entry was already detached");
            }
        }
        for entry in state.attached_errors.drain(..) {
            self.table.detach_error(&entry);
        }
    }
}

#[async_trait]
impl<P: Plugin> Lifecycle for PluginHost<P> {
    fn name(&self) -> &'static str {
        P::NAME
    }

    fn group(&self) -> Group {
        Group::Plugin(self.id)
    }

    fn is_installed(&self) -> bool {
        self.installed.load(Ordering::Acquire)
    }

    async fn install(&self) -> LifecycleResult {
        let mut state = self.state.lock().await;
        self.install_locked(&mut state).await
    }

    async fn uninstall(&self) -> LifecycleResult {
        let mut state = self.state.lock().await;
        self.uninstall_locked(&mut state).await
    }

    async fn reload(&self) -> LifecycleResult {
        let mut state = self.state.lock().await;
        let released = self.uninstall_locked(&mut state).await;
        self.install_locked(&mut state).await?;
        released
    }

    async fn install_jobs(&self, scheduler: &dyn Scheduler) -> LifecycleResult {
        let mut state = self.state.lock().await;
        if state.jobs_installed {
            return Ok(());
        }
        let jobs = self.jobs().map_err(Self::discovery_error)?;
        for job in jobs.iter() {
            debug!(plugin = P::NAME, job = job.name(), schedule = job.schedule().as_str(), "job registered");
            scheduler.register(job.clone());
        }
        state.jobs_installed = true;
        Ok(())
    }

    async fn uninstall_jobs(&self, scheduler: &dyn Scheduler) {
        let mut state = self.state.lock().await;
        if !state.jobs_installed {
            return;
        }
        let jobs = self.jobs.lock().clone();
        for job in jobs.iter().flat_map(|jobs| jobs.iter()) {
            scheduler.cancel(job);
        }
        state.jobs_installed = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{CountingScheduler, CountingTable};
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use switchyard_core::{
        BoxError, ConversationOptions, Declare, ErrorDescriptor, ErrorReport, Flow, HandlerResult,
        JobContext, JobDescriptor, Markers, TriggerDescriptor, Update, cancel_descriptor,
    };

    // ── Fixtures ────────────────────────────────────────────────────────────

    #[derive(Default)]
    struct Ping {
        inits: AtomicUsize,
        releases: AtomicUsize,
    }

    impl Ping {
        async fn ping(self: Arc<Self>, _update: Arc<Update>) -> HandlerResult {
            Ok(Flow::Continue)
        }
    }

    impl Declare for Ping {
        fn declare(markers: &mut Markers<Self>) {
            markers.mark("ping", Ping::ping, TriggerDescriptor::command("ping"));
        }
    }

    #[async_trait]
    impl Plugin for Ping {
        const NAME: &'static str = "ping";

        async fn initialize(&self, _ctx: &LoadContext) -> Result<(), BoxError> {
            self.inits.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn release(&self) -> Result<(), BoxError> {
            self.releases.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    /// One entry point, one state, one fallback.
    #[derive(Default)]
    struct Bind;

    impl Bind {
        async fn start(self: Arc<Self>, _update: Arc<Update>) -> HandlerResult {
            Ok(Flow::goto("UID"))
        }

        async fn uid(self: Arc<Self>, _update: Arc<Update>) -> HandlerResult {
            Ok(Flow::End)
        }

        async fn cancel(self: Arc<Self>, _update: Arc<Update>) -> HandlerResult {
            Ok(Flow::End)
        }
    }

    impl Declare for Bind {
        fn declare(markers: &mut Markers<Self>) {
            markers
                .mark("start", Bind::start, TriggerDescriptor::command("bind").entry())
                .mark("uid", Bind::uid, TriggerDescriptor::text(r"^\d{9}$").state("UID"))
                .mark_shared("cancel", Bind::cancel, cancel_descriptor());
        }
    }

    #[async_trait]
    impl Plugin for Bind {
        const NAME: &'static str = "bind";

        fn conversation() -> Option<ConversationOptions> {
            Some(ConversationOptions::new().name("bind"))
        }
    }

    /// Two methods sharing one state key, plus an unrelated plain trigger.
    #[derive(Default)]
    struct Merge;

    impl Merge {
        async fn f(self: Arc<Self>, _update: Arc<Update>) -> HandlerResult {
            Ok(Flow::Continue)
        }

        async fn g(self: Arc<Self>, _update: Arc<Update>) -> HandlerResult {
            Ok(Flow::Continue)
        }

        async fn help(self: Arc<Self>, _update: Arc<Update>) -> HandlerResult {
            Ok(Flow::Continue)
        }

        async fn cancel(self: Arc<Self>, _update: Arc<Update>) -> HandlerResult {
            Ok(Flow::End)
        }
    }

    impl Declare for Merge {
        fn declare(markers: &mut Markers<Self>) {
            markers
                .mark("f", Merge::f, TriggerDescriptor::text("^a").state("A"))
                .mark("g", Merge::g, TriggerDescriptor::text("^b").state("A"))
                .mark("help", Merge::help, TriggerDescriptor::command("help"))
                .mark_shared("cancel", Merge::cancel, cancel_descriptor());
        }
    }

    #[async_trait]
    impl Plugin for Merge {
        const NAME: &'static str = "merge";

        fn conversation() -> Option<ConversationOptions> {
            Some(ConversationOptions::new())
        }
    }

    /// Stateful plugin whose triggers carry no roles.
    #[derive(Default)]
    struct Roleless;

    impl Roleless {
        async fn a(self: Arc<Self>, _update: Arc<Update>) -> HandlerResult {
            Ok(Flow::Continue)
        }
    }

    impl Declare for Roleless {
        fn declare(markers: &mut Markers<Self>) {
            markers
                .mark("a", Roleless::a, TriggerDescriptor::command("a"))
                .mark("a", Roleless::a, TriggerDescriptor::callback("^a:"));
        }
    }

    #[async_trait]
    impl Plugin for Roleless {
        const NAME: &'static str = "roleless";

        fn conversation() -> Option<ConversationOptions> {
            Some(ConversationOptions::new())
        }
    }

    /// Catch-all observer, error interceptor and jobs.
    #[derive(Default)]
    struct Watcher;

    impl Watcher {
        async fn observe(self: Arc<Self>, _update: Arc<Update>) -> HandlerResult {
            Ok(Flow::Continue)
        }

        async fn status(self: Arc<Self>, _update: Arc<Update>) -> HandlerResult {
            Ok(Flow::Continue)
        }

        async fn on_error(self: Arc<Self>, _report: Arc<ErrorReport>) {}

        async fn refresh(self: Arc<Self>, _ctx: JobContext) -> Result<(), BoxError> {
            Ok(())
        }
    }

    impl Declare for Watcher {
        fn declare(markers: &mut Markers<Self>) {
            markers
                .mark("observe", Watcher::observe, TriggerDescriptor::catch_all().blocking(false))
                .mark("status", Watcher::status, TriggerDescriptor::command("status"))
                .mark_error("on_error", Watcher::on_error, ErrorDescriptor::new())
                .mark_job(
                    "refresh",
                    Watcher::refresh,
                    JobDescriptor::repeating(Duration::from_secs(60)),
                )
                .mark_job(
                    "refresh",
                    Watcher::refresh,
                    JobDescriptor::once_after(Duration::from_secs(5)).name("warmup"),
                );
        }
    }

    #[async_trait]
    impl Plugin for Watcher {
        const NAME: &'static str = "watcher";
    }

    #[derive(Default)]
    struct FailingInit;

    impl FailingInit {
        async fn go(self: Arc<Self>, _update: Arc<Update>) -> HandlerResult {
            Ok(Flow::Continue)
        }
    }

    impl Declare for FailingInit {
        fn declare(markers: &mut Markers<Self>) {
            markers.mark("go", FailingInit::go, TriggerDescriptor::command("go"));
        }
    }

    #[async_trait]
    impl Plugin for FailingInit {
        const NAME: &'static str = "failing_init";

        async fn initialize(&self, _ctx: &LoadContext) -> Result<(), BoxError> {
            Err("backend unreachable".into())
        }
    }

    #[derive(Default)]
    struct FailingRelease;

    impl FailingRelease {
        async fn go(self: Arc<Self>, _update: Arc<Update>) -> HandlerResult {
            Ok(Flow::Continue)
        }
    }

    impl Declare for FailingRelease {
        fn declare(markers: &mut Markers<Self>) {
            markers.mark("go", FailingRelease::go, TriggerDescriptor::command("go"));
        }
    }

    #[async_trait]
    impl Plugin for FailingRelease {
        const NAME: &'static str = "failing_release";

        async fn release(&self) -> Result<(), BoxError> {
            Err("flush failed".into())
        }
    }

    #[derive(Default)]
    struct BadPattern;

    impl BadPattern {
        async fn go(self: Arc<Self>, _update: Arc<Update>) -> HandlerResult {
            Ok(Flow::Continue)
        }
    }

    impl Declare for BadPattern {
        fn declare(markers: &mut Markers<Self>) {
            markers.mark("go", BadPattern::go, TriggerDescriptor::text("(unclosed"));
        }
    }

    #[async_trait]
    impl Plugin for BadPattern {
        const NAME: &'static str = "bad_pattern";
    }

    static TALLY_BUILDS: AtomicUsize = AtomicUsize::new(0);

    /// Three marked callables, each counting its own calls.
    #[derive(Default)]
    struct Tally {
        calls: [AtomicUsize; 3],
    }

    impl Tally {
        fn hit(&self, slot: usize) -> HandlerResult {
            self.calls[slot].fetch_add(1, Ordering::SeqCst);
            Ok(Flow::Continue)
        }

        async fn a(self: Arc<Self>, _update: Arc<Update>) -> HandlerResult {
            self.hit(0)
        }

        async fn b(self: Arc<Self>, _update: Arc<Update>) -> HandlerResult {
            self.hit(1)
        }

        async fn c(self: Arc<Self>, _update: Arc<Update>) -> HandlerResult {
            self.hit(2)
        }
    }

    impl Declare for Tally {
        fn declare(markers: &mut Markers<Self>) {
            markers
                .mark("a", Tally::a, TriggerDescriptor::command("a"))
                .mark("b", Tally::b, TriggerDescriptor::command("b"))
                .mark("c", Tally::c, TriggerDescriptor::command("c"));
        }
    }

    #[async_trait]
    impl Plugin for Tally {
        const NAME: &'static str = "tally";

        // Called once per discovery pass.
        fn conversation() -> Option<ConversationOptions> {
            TALLY_BUILDS.fetch_add(1, Ordering::SeqCst);
            None
        }
    }

    fn host<P: Plugin + Default>(table: &Arc<CountingTable>) -> PluginHost<P> {
        PluginHost::new(P::default(), Arc::clone(table) as Arc<dyn DispatchTable>)
    }

    // ── Discovery ───────────────────────────────────────────────────────────

    #[test]
    fn test_handlers_memoised() {
        let table = Arc::new(CountingTable::default());
        let host = host::<Ping>(&table);
        let first = host.handlers().unwrap();
        let second = host.handlers().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_discovery_builds_once() {
        let table = Arc::new(CountingTable::default());
        let host = Arc::new(host::<Tally>(&table));

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let host = Arc::clone(&host);
                tokio::spawn(async move {
                    let entries = host.handlers().unwrap();
                    for (entry, command) in entries.iter().zip(["/a", "/b", "/c"]) {
                        entry.handle(Arc::new(Update::message(command))).await.unwrap();
                    }
                    entries
                })
            })
            .collect();

        let mut results = Vec::new();
        for task in tasks {
            results.push(task.await.unwrap());
        }
        assert_eq!(TALLY_BUILDS.load(Ordering::SeqCst), 1);

        let first = &results[0];
        assert_eq!(first.len(), 3);
        assert!(results.iter().all(|r| Arc::ptr_eq(r, first)));

        // Every task reached the same three bound callables once each.
        let calls: Vec<_> = host.instance().calls.iter().map(|c| c.load(Ordering::SeqCst)).collect();
        assert_eq!(calls, [16, 16, 16]);
    }

    #[test]
    fn test_conversation_assembled() {
        let table = Arc::new(CountingTable::default());
        let host = host::<Bind>(&table);
        let entries = host.handlers().unwrap();
        assert_eq!(entries.len(), 1);

        let conv = entries[0].as_conversation().unwrap();
        assert_eq!(conv.entry_points().len(), 1);
        assert_eq!(conv.states().count(), 1);
        assert_eq!(conv.state("UID").unwrap().len(), 1);
        assert_eq!(conv.fallbacks().len(), 1);
        assert_eq!(conv.name(), "bind");
    }

    #[test]
    fn test_state_merge_keeps_scan_order() {
        let table = Arc::new(CountingTable::default());
        let host = host::<Merge>(&table);
        let entries = host.handlers().unwrap();

        // plain `help` first, composite last
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].as_trigger().unwrap().method(), "help");
        let conv = entries[1].as_conversation().unwrap();
        let bucket = conv.state("A").unwrap();
        let methods: Vec<_> = bucket.iter().map(|e| e.method()).collect();
        assert_eq!(methods, ["f", "g"]);
    }

    #[test]
    fn test_no_roles_means_no_composite() {
        let table = Arc::new(CountingTable::default());
        let host = host::<Roleless>(&table);
        let entries = host.handlers().unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|e| e.as_trigger().is_some()));
    }

    #[test]
    fn test_shared_cancel_descriptor_classified_everywhere() {
        let table = Arc::new(CountingTable::default());
        let bind = host::<Bind>(&table).handlers().unwrap();
        let merge = host::<Merge>(&table).handlers().unwrap();

        let bind_conv = bind[0].as_conversation().unwrap();
        let merge_conv = merge[1].as_conversation().unwrap();
        assert_eq!(bind_conv.fallbacks()[0].method(), "cancel");
        assert_eq!(merge_conv.fallbacks()[0].method(), "cancel");
        assert!(cancel_descriptor().conversation_role().is_some());
    }

    #[test]
    fn test_invalid_pattern_leaves_cache_empty() {
        let table = Arc::new(CountingTable::default());
        let host = host::<BadPattern>(&table);
        assert!(host.handlers().is_err());
        assert!(host.handlers.lock().is_none());
        assert!(host.handlers().is_err());
    }

    // ── Lifecycle ───────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_install_is_idempotent() {
        let table = Arc::new(CountingTable::default());
        let host = host::<Ping>(&table);

        host.install().await.unwrap();
        host.install().await.unwrap();

        assert!(host.is_installed());
        assert_eq!(table.attaches(), 1);
        assert_eq!(host.instance().inits.load(Ordering::SeqCst), 1);
        assert_eq!(table.group_of(&host.handlers().unwrap()[0]), Some(host.group()));
    }

    #[tokio::test]
    async fn test_uninstall_before_install_is_noop() {
        let table = Arc::new(CountingTable::default());
        let host = host::<Ping>(&table);

        host.uninstall().await.unwrap();
        assert_eq!(table.detaches(), 0);
        assert_eq!(host.instance().releases.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_install_uninstall_install() {
        let table = Arc::new(CountingTable::default());
        let host = host::<Ping>(&table);

        host.install().await.unwrap();
        host.uninstall().await.unwrap();
        host.uninstall().await.unwrap();
        assert!(!host.is_installed());
        assert_eq!(table.detaches(), 1);
        assert_eq!(table.len(), 0);

        host.install().await.unwrap();
        assert_eq!(table.attaches(), 2);
        assert_eq!(table.len(), 1);
        assert_eq!(host.instance().inits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_reload() {
        let table = Arc::new(CountingTable::default());
        let host = host::<Ping>(&table);

        host.reload().await.unwrap();
        assert!(host.is_installed());
        assert_eq!(table.detaches(), 0);

        host.reload().await.unwrap();
        assert!(host.is_installed());
        assert_eq!(table.attaches(), 2);
        assert_eq!(table.detaches(), 1);
        assert_eq!(host.instance().releases.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_conversation_install_attaches_one_entry() {
        let table = Arc::new(CountingTable::default());
        let host = host::<Bind>(&table);
        host.install().await.unwrap();
        assert_eq!(table.attaches(), 1);
    }

    #[tokio::test]
    async fn test_catch_all_goes_to_reserved_group() {
        let table = Arc::new(CountingTable::default());
        let host = host::<Watcher>(&table);
        host.install().await.unwrap();

        let entries = host.handlers().unwrap();
        assert_eq!(table.group_of(&entries[0]), Some(Group::CatchAll));
        assert_eq!(table.group_of(&entries[1]), Some(host.group()));
        assert_eq!(table.error_len(), 1);

        host.uninstall().await.unwrap();
        assert_eq!(table.len(), 0);
        assert_eq!(table.error_len(), 0);
    }

    #[tokio::test]
    async fn test_initialize_failure_detaches() {
        let table = Arc::new(CountingTable::default());
        let host = host::<FailingInit>(&table);

        let err = host.install().await.unwrap_err();
        assert!(matches!(err, LifecycleError::Initialize { plugin: "failing_init", .. }));
        assert!(!host.is_installed());
        assert_eq!(table.len(), 0);
        assert_eq!(table.attaches(), 1);
        assert_eq!(table.detaches(), 1);
    }

    #[tokio::test]
    async fn test_release_failure_still_uninstalls() {
        let table = Arc::new(CountingTable::default());
        let host = host::<FailingRelease>(&table);
        host.install().await.unwrap();

        let err = host.uninstall().await.unwrap_err();
        assert!(matches!(err, LifecycleError::Release { .. }));
        assert!(!host.is_installed());
        assert_eq!(table.len(), 0);

        // Fail-forward: a second uninstall has nothing left to do.
        host.uninstall().await.unwrap();
    }

    #[tokio::test]
    async fn test_discovery_failure_aborts_install() {
        let table = Arc::new(CountingTable::default());
        let host = host::<BadPattern>(&table);
        let err = host.install().await.unwrap_err();
        assert!(matches!(err, LifecycleError::Discovery { .. }));
        assert_eq!(table.attaches(), 0);
        assert!(!host.is_installed());
    }

    #[tokio::test]
    async fn test_jobs_registered_once() {
        let table = Arc::new(CountingTable::default());
        let scheduler = CountingScheduler::default();
        let host = host::<Watcher>(&table);

        host.install_jobs(&scheduler).await.unwrap();
        host.install_jobs(&scheduler).await.unwrap();
        assert_eq!(scheduler.registered(), 2);
        assert_eq!(scheduler.names(), ["watcher.refresh", "warmup"]);

        host.uninstall_jobs(&scheduler).await;
        host.uninstall_jobs(&scheduler).await;
        assert_eq!(scheduler.cancelled(), 2);
        assert!(scheduler.names().is_empty());
    }

    #[tokio::test]
    async fn test_hosts_of_one_type_do_not_share_entries() {
        let table = Arc::new(CountingTable::default());
        let a = host::<Ping>(&table);
        let b = host::<Ping>(&table);
        a.install().await.unwrap();
        b.install().await.unwrap();
        assert_eq!(table.attaches(), 2);
        assert_ne!(a.group(), b.group());
        assert_ne!(a.handlers().unwrap()[0].id(), b.handlers().unwrap()[0].id());
    }
}
