//! In-memory dispatch table.
//!
//! [`MemoryDispatchTable`] implements [`DispatchTable`] for tests and local
//! runs. Routing follows the usual group rules:
//!
//! 1. Groups are visited in [`Group`] order; [`Group::CatchAll`] comes last.
//! 2. Inside a group, the first entry whose check passes handles the update.
//!    An entry answering [`Skipped`] hands over to the next one.
//! 3. If the handling entry is blocking, later groups are not visited.
//!
//! Handler errors are logged and handed to every attached error entry.
//!
//! ```rust,ignore
//! let table = Arc::new(MemoryDispatchTable::new());
//! let host = PluginHost::new(Ping::default(), table.clone());
//! host.install().await?;
//! table.dispatch(Update::message("/ping")).await;
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;
use switchyard_core::{
    DispatchEntry, DispatchTable, ErrorEntry, ErrorReport, Group, Skipped, Update,
};
use tracing::{Instrument, debug, debug_span, error, trace};

/// Ordered, grouped entry store with a dispatch loop.
#[derive(Default)]
pub struct MemoryDispatchTable {
    groups: RwLock<BTreeMap<Group, Vec<DispatchEntry>>>,
    errors: RwLock<Vec<ErrorEntry>>,
}

impl MemoryDispatchTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of attached dispatch entries.
    pub fn entry_count(&self) -> usize {
        self.groups.read().values().map(Vec::len).sum()
    }

    /// Number of entries attached under `group`.
    pub fn group_len(&self, group: Group) -> usize {
        self.groups.read().get(&group).map_or(0, Vec::len)
    }

    /// Non-empty groups in dispatch order.
    pub fn groups(&self) -> Vec<Group> {
        self.groups.read().keys().copied().collect()
    }

    pub fn error_count(&self) -> usize {
        self.errors.read().len()
    }

    /// Routes `update` through the attached entries.
    ///
    /// Returns `true` if any entry handled it, failures included.
    pub async fn dispatch(&self, update: Update) -> bool {
        let span = debug_span!("dispatch", chat = ?update.chat_id());
        self.dispatch_inner(Arc::new(update)).instrument(span).await
    }

    async fn dispatch_inner(&self, update: Arc<Update>) -> bool {
        let snapshot: Vec<(Group, Vec<DispatchEntry>)> = self
            .groups
            .read()
            .iter()
            .map(|(group, entries)| (*group, entries.clone()))
            .collect();

        let mut handled = false;
        for (group, entries) in snapshot {
            let Some(entry) = self.run_group(&entries, &update).await else {
                continue;
            };
            handled = true;
            if entry.is_blocking() {
                debug!(%group, plugin = entry.plugin(), "blocking entry handled, stopping dispatch");
                break;
            }
        }
        handled
    }

    /// Runs the first entry of a group that accepts the update.
    async fn run_group(
        &self,
        entries: &[DispatchEntry],
        update: &Arc<Update>,
    ) -> Option<DispatchEntry> {
        for entry in entries {
            if !entry.check(update) {
                continue;
            }
            match entry.handle(Arc::clone(update)).await {
                Ok(flow) => {
                    trace!(entry = %entry.id(), ?flow, "entry handled update");
                    return Some(entry.clone());
                }
                Err(e) if e.is::<Skipped>() => continue,
                Err(e) => {
                    error!(plugin = entry.plugin(), entry = %entry.id(), error = %e, "handler failed");
                    let report = ErrorReport::new(Some(Arc::clone(update)), entry.plugin(), e);
                    self.report(Arc::new(report)).await;
                    return Some(entry.clone());
                }
            }
        }
        None
    }

    async fn report(&self, report: Arc<ErrorReport>) {
        let interceptors = self.errors.read().clone();
        if interceptors.is_empty() {
            debug!("no error entries attached");
        }
        for entry in interceptors {
            if entry.is_blocking() {
                entry.handle(Arc::clone(&report)).await;
            } else {
                let report = Arc::clone(&report);
                tokio::spawn(async move { entry.handle(report).await });
            }
        }
    }
}

impl std::fmt::Debug for MemoryDispatchTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryDispatchTable")
            .field("entry_count", &self.entry_count())
            .field("error_count", &self.error_count())
            .finish()
    }
}

impl DispatchTable for MemoryDispatchTable {
    fn attach(&self, entry: DispatchEntry, group: Group) -> bool {
        let mut groups = self.groups.write();
        let entries = groups.entry(group).or_default();
        if entries.iter().any(|e| e.id() == entry.id()) {
            return false;
        }
        trace!(%group, entry = %entry.id(), "entry attached");
        entries.push(entry);
        true
    }

    fn detach(&self, entry: &DispatchEntry, group: Group) -> bool {
        let mut groups = self.groups.write();
        let Some(entries) = groups.get_mut(&group) else {
            return false;
        };
        let before = entries.len();
        entries.retain(|e| e.id() != entry.id());
        let removed = entries.len() != before;
        if entries.is_empty() {
            groups.remove(&group);
        }
        removed
    }

    fn attach_error(&self, entry: ErrorEntry) -> bool {
        let mut errors = self.errors.write();
        if errors.iter().any(|e| e.id() == entry.id()) {
            return false;
        }
        errors.push(entry);
        true
    }

    fn detach_error(&self, entry: &ErrorEntry) -> bool {
        let mut errors = self.errors.write();
        let before = errors.len();
        errors.retain(|e| e.id() != entry.id());
        errors.len() != before
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use switchyard_core::{
        BoxError, ErrorCallback, Flow, InstanceId, TriggerDescriptor, TriggerEntry,
    };
    use tower::service_fn;

    fn counting(
        descriptor: TriggerDescriptor,
        hits: &Arc<AtomicUsize>,
        fail: bool,
    ) -> DispatchEntry {
        let hits = Arc::clone(hits);
        TriggerEntry::new(
            "test",
            "counting",
            Arc::new(descriptor),
            service_fn(move |_update: Arc<Update>| {
                let hits = Arc::clone(&hits);
                async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    if fail {
                        Err::<Flow, BoxError>("handler exploded".into())
                    } else {
                        Ok(Flow::Continue)
                    }
                }
            }),
        )
        .unwrap()
        .into()
    }

    #[test]
    fn test_attach_is_idempotent() {
        let table = MemoryDispatchTable::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let entry = counting(TriggerDescriptor::command("a"), &hits, false);
        let group = Group::Plugin(InstanceId::next());

        assert!(table.attach(entry.clone(), group));
        assert!(!table.attach(entry.clone(), group));
        assert_eq!(table.entry_count(), 1);

        assert!(table.detach(&entry, group));
        assert!(!table.detach(&entry, group));
        assert_eq!(table.entry_count(), 0);
        assert!(table.groups().is_empty());
    }

    #[tokio::test]
    async fn test_blocking_stops_propagation() {
        let table = MemoryDispatchTable::new();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        let observer = Arc::new(AtomicUsize::new(0));

        table.attach(
            counting(TriggerDescriptor::command("a"), &first, false),
            Group::Plugin(InstanceId::next()),
        );
        table.attach(
            counting(TriggerDescriptor::command("a"), &second, false),
            Group::Plugin(InstanceId::next()),
        );
        table.attach(
            counting(TriggerDescriptor::catch_all().blocking(false), &observer, false),
            Group::CatchAll,
        );

        assert!(table.dispatch(Update::message("/a")).await);
        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 0);
        assert_eq!(observer.load(Ordering::SeqCst), 0);

        // Nothing blocking matches; only the catch-all observer runs.
        assert!(table.dispatch(Update::message("hello")).await);
        assert_eq!(observer.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_non_blocking_propagates() {
        let table = MemoryDispatchTable::new();
        let first = Arc::new(AtomicUsize::new(0));
        let observer = Arc::new(AtomicUsize::new(0));

        table.attach(
            counting(TriggerDescriptor::command("a").blocking(false), &first, false),
            Group::Plugin(InstanceId::next()),
        );
        table.attach(
            counting(TriggerDescriptor::catch_all(), &observer, false),
            Group::CatchAll,
        );

        table.dispatch(Update::message("/a")).await;
        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(observer.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_first_match_per_group() {
        let table = MemoryDispatchTable::new();
        let a = Arc::new(AtomicUsize::new(0));
        let b = Arc::new(AtomicUsize::new(0));
        let group = Group::Plugin(InstanceId::next());

        table.attach(counting(TriggerDescriptor::text("^x"), &a, false), group);
        table.attach(counting(TriggerDescriptor::text("^x"), &b, false), group);

        table.dispatch(Update::message("xyz")).await;
        assert_eq!(a.load(Ordering::SeqCst), 1);
        assert_eq!(b.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_admin_skip_falls_through() {
        let table = MemoryDispatchTable::new();
        let admin = Arc::new(AtomicUsize::new(0));
        let public = Arc::new(AtomicUsize::new(0));
        let group = Group::Plugin(InstanceId::next());

        table.attach(
            counting(TriggerDescriptor::command("stats").admin_only(), &admin, false),
            group,
        );
        table.attach(counting(TriggerDescriptor::command("stats"), &public, false), group);

        table
            .dispatch(Update::message("/stats").with_sender(1, false))
            .await;
        assert_eq!(admin.load(Ordering::SeqCst), 0);
        assert_eq!(public.load(Ordering::SeqCst), 1);

        table
            .dispatch(Update::message("/stats").with_sender(2, true))
            .await;
        assert_eq!(admin.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_errors_reach_error_entries() {
        let table = MemoryDispatchTable::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let reports = Arc::new(AtomicUsize::new(0));

        table.attach(
            counting(TriggerDescriptor::command("boom"), &hits, true),
            Group::Plugin(InstanceId::next()),
        );

        let seen = Arc::clone(&reports);
        let callback: ErrorCallback = Arc::new(move |report: Arc<ErrorReport>| {
            let seen = Arc::clone(&seen);
            async move {
                assert_eq!(report.error.to_string(), "handler exploded");
                assert!(report.update.is_some());
                seen.fetch_add(1, Ordering::SeqCst);
            }
            .boxed()
        });
        let interceptor = ErrorEntry::new(
            "test",
            "on_error",
            switchyard_core::ErrorDescriptor::new(),
            callback,
        );
        assert!(table.attach_error(interceptor.clone()));
        assert!(!table.attach_error(interceptor.clone()));

        assert!(table.dispatch(Update::message("/boom")).await);
        assert_eq!(reports.load(Ordering::SeqCst), 1);

        assert!(table.detach_error(&interceptor));
        assert_eq!(table.error_count(), 0);
    }
}
