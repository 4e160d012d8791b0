//! Collaborator seams owned by the chat-platform SDK.
//!
//! Plugins never touch the dispatch table or the scheduler directly; their
//! host attaches and detaches entries through these traits.

use crate::entry::{DispatchEntry, ErrorEntry, Group};
use crate::job::ScheduledJob;

/// The bot's shared routing table.
///
/// Implementations must be idempotent on `(group, entry id)`: attaching an
/// entry that is already present under the same group returns `false` and
/// changes nothing. The same goes for detaching an absent entry.
pub trait DispatchTable: Send + Sync {
    /// Adds `entry` under `group`. Returns whether it was newly added.
    fn attach(&self, entry: DispatchEntry, group: Group) -> bool;

    /// Removes `entry` from `group`. Returns whether it was present.
    fn detach(&self, entry: &DispatchEntry, group: Group) -> bool;

    /// Adds an error interceptor to the global error list.
    fn attach_error(&self, entry: ErrorEntry) -> bool;

    /// Removes an error interceptor from the global error list.
    fn detach_error(&self, entry: &ErrorEntry) -> bool;
}

/// Runs time-triggered jobs.
pub trait Scheduler: Send + Sync {
    /// Starts firing `job` according to its schedule.
    fn register(&self, job: ScheduledJob);

    /// Stops firing `job`. Returns whether it was scheduled.
    fn cancel(&self, job: &ScheduledJob) -> bool;
}
