//! Counting fakes for the collaborator traits.

use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use switchyard_core::{
    DispatchEntry, DispatchTable, EntryId, ErrorEntry, Group, JobId, ScheduledJob, Scheduler,
};

#[derive(Default)]
pub(crate) struct CountingTable {
    entries: Mutex<Vec<(EntryId, Group)>>,
    errors: Mutex<Vec<EntryId>>,
    attaches: AtomicUsize,
    detaches: AtomicUsize,
}

impl CountingTable {
    pub(crate) fn attaches(&self) -> usize {
        self.attaches.load(Ordering::SeqCst)
    }

    pub(crate) fn detaches(&self) -> usize {
        self.detaches.load(Ordering::SeqCst)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub(crate) fn error_len(&self) -> usize {
        self.errors.lock().len()
    }

    pub(crate) fn group_of(&self, entry: &DispatchEntry) -> Option<Group> {
        self.entries
            .lock()
            .iter()
            .find(|(id, _)| *id == entry.id())
            .map(|(_, group)| *group)
    }
}

impl DispatchTable for CountingTable {
    fn attach(&self, entry: DispatchEntry, group: Group) -> bool {
        let mut entries = self.entries.lock();
        let key = (entry.id(), group);
        if entries.contains(&key) {
            return false;
        }
        entries.push(key);
        self.attaches.fetch_add(1, Ordering::SeqCst);
        true
    }

    fn detach(&self, entry: &DispatchEntry, group: Group) -> bool {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|key| *key != (entry.id(), group));
        let removed = entries.len() != before;
        if removed {
            self.detaches.fetch_add(1, Ordering::SeqCst);
        }
        removed
    }

    fn attach_error(&self, entry: ErrorEntry) -> bool {
        let mut errors = self.errors.lock();
        if errors.contains(&entry.id()) {
            return false;
        }
        errors.push(entry.id());
        true
    }

    fn detach_error(&self, entry: &ErrorEntry) -> bool {
        let mut errors = self.errors.lock();
        let before = errors.len();
        errors.retain(|id| *id != entry.id());
        errors.len() != before
    }
}

#[derive(Default)]
pub(crate) struct CountingScheduler {
    jobs: Mutex<Vec<(JobId, String)>>,
    registered: AtomicUsize,
    cancelled: AtomicUsize,
}

impl CountingScheduler {
    pub(crate) fn registered(&self) -> usize {
        self.registered.load(Ordering::SeqCst)
    }

    pub(crate) fn cancelled(&self) -> usize {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Names of the jobs currently scheduled, in registration order.
    pub(crate) fn names(&self) -> Vec<String> {
        self.jobs.lock().iter().map(|(_, name)| name.clone()).collect()
    }
}

impl Scheduler for CountingScheduler {
    fn register(&self, job: ScheduledJob) {
        self.jobs.lock().push((job.id(), job.name().to_string()));
        self.registered.fetch_add(1, Ordering::SeqCst);
    }

    fn cancel(&self, job: &ScheduledJob) -> bool {
        let mut jobs = self.jobs.lock();
        let before = jobs.len();
        jobs.retain(|(id, _)| *id != job.id());
        let removed = jobs.len() != before;
        if removed {
            self.cancelled.fetch_add(1, Ordering::SeqCst);
        }
        removed
    }
}
