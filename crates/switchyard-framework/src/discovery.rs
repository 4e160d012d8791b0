//! Turning a plugin's marker table into dispatch entries, error entries and
//! scheduled jobs.
//!
//! Each pass walks the slots of [`Markers::of`] in declaration order and,
//! inside a slot, the descriptors in mark order. One descriptor yields one
//! entry bound to the given instance. These functions do no caching; the
//! host memoises their results.

use std::sync::Arc;

use switchyard_core::{
    DiscoveryResult, DispatchEntry, ErrorCallback, ErrorEntry, ErrorReport, JobCallback,
    JobContext, Markers, ScheduledJob, TriggerDescriptor, TriggerEntry, Update,
};
use tower::service_fn;
use tracing::trace;

use crate::conversation::assemble;
use crate::plugin::Plugin;

/// Materialises one trigger entry per marked descriptor, keeping the
/// descriptor alongside for classification.
pub fn scan_triggers<P: Plugin>(
    instance: &Arc<P>,
) -> DiscoveryResult<Vec<(Arc<TriggerDescriptor>, TriggerEntry)>> {
    let markers = Markers::<P>::of();
    let mut scanned = Vec::with_capacity(markers.trigger_count());

    for slot in markers.triggers() {
        for descriptor in slot.descriptors() {
            let method = Arc::clone(slot.method());
            let this = Arc::clone(instance);
            let service = service_fn(move |update: Arc<Update>| method(Arc::clone(&this), update));
            let entry = TriggerEntry::new(P::NAME, slot.name(), Arc::clone(descriptor), service)?;
            trace!(
                plugin = P::NAME,
                method = slot.name(),
                kind = descriptor.kind().as_str(),
                entry = %entry.id(),
                "trigger entry built"
            );
            scanned.push((Arc::clone(descriptor), entry));
        }
    }
    Ok(scanned)
}

/// Builds the dispatch entries of `instance`.
///
/// Stateful plugins go through the conversation assembler; all others get
/// one plain entry per descriptor.
pub fn discover_handlers<P: Plugin>(instance: &Arc<P>) -> DiscoveryResult<Vec<DispatchEntry>> {
    let scanned = scan_triggers(instance)?;
    Ok(match P::conversation() {
        Some(options) => assemble(P::NAME, scanned, options),
        None => scanned
            .into_iter()
            .map(|(_, entry)| DispatchEntry::Trigger(entry))
            .collect(),
    })
}

/// Builds the error-interceptor entries of `instance`.
pub fn discover_error_handlers<P: Plugin>(instance: &Arc<P>) -> Vec<ErrorEntry> {
    let markers = Markers::<P>::of();
    markers
        .errors()
        .iter()
        .flat_map(|slot| {
            slot.descriptors().iter().map(move |descriptor| {
                let method = Arc::clone(slot.method());
                let this = Arc::clone(instance);
                let callback: ErrorCallback =
                    Arc::new(move |report: Arc<ErrorReport>| method(Arc::clone(&this), report));
                ErrorEntry::new(P::NAME, slot.name(), *descriptor, callback)
            })
        })
        .collect()
}

/// Builds the scheduled jobs of `instance`.
///
/// Jobs without an explicit name are called `<plugin>.<method>`, with a
/// `#n` suffix when one method carries several schedules.
pub fn discover_jobs<P: Plugin>(instance: &Arc<P>) -> DiscoveryResult<Vec<ScheduledJob>> {
    let markers = Markers::<P>::of();
    let mut jobs = Vec::new();

    for slot in markers.jobs() {
        for (i, descriptor) in slot.descriptors().iter().enumerate() {
            let method = Arc::clone(slot.method());
            let this = Arc::clone(instance);
            let callback: JobCallback =
                Arc::new(move |ctx: JobContext| method(Arc::clone(&this), ctx));
            let default_name = match i {
                0 => format!("{}.{}", P::NAME, slot.name()),
                n => format!("{}.{}#{n}", P::NAME, slot.name()),
            };
            jobs.push(ScheduledJob::new(
                slot.name(),
                default_name,
                Arc::clone(descriptor),
                callback,
            )?);
        }
    }
    Ok(jobs)
}
