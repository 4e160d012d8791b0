//! # Switchyard Core
//!
//! Registration vocabulary of the Switchyard bot framework.
//!
//! This crate holds everything a plugin needs to *describe* itself and
//! everything a dispatch table needs to *route* to it. It has no opinion on
//! when discovery runs or how plugins are installed; that lives in
//! `switchyard-framework`.
//!
//! ## Pieces
//!
//! - **Descriptors**: [`TriggerDescriptor`], [`JobDescriptor`], [`ErrorDescriptor`]
//! - **Markers**: per-type registration tables ([`Markers`], [`Declare`])
//! - **Entries**: materialised routing objects ([`DispatchEntry`], [`TriggerEntry`],
//!   [`ConversationEntry`], [`ErrorEntry`], [`ScheduledJob`])
//! - **Seams**: collaborator traits the platform SDK implements
//!   ([`DispatchTable`], [`Scheduler`])
//!
//! ```text
//! ┌──────────┐  declare   ┌──────────┐  discover  ┌───────────────┐  attach  ┌───────────────┐
//! │  Plugin  │───────────▶│ Markers  │───────────▶│ DispatchEntry │─────────▶│ DispatchTable │
//! └──────────┘            └──────────┘            └───────────────┘          └───────────────┘
//! ```

pub mod conversation;
pub mod entry;
pub mod error;
pub mod id;
pub mod job;
pub mod marker;
pub mod table;
pub mod trigger;
pub mod update;

pub use conversation::{ConversationEntry, ConversationOptions};
pub use entry::{
    AdminOnly, DispatchEntry, EntryService, ErrorCallback, ErrorEntry, ErrorReport, Flow, Group,
    HandlerResult, TriggerEntry,
};
pub use error::{BoxError, DiscoveryError, DiscoveryResult, Skipped};
pub use futures::future::BoxFuture;
pub use id::{EntryId, InstanceId, JobId};
pub use job::{JobCallback, JobContext, JobDescriptor, Schedule, ScheduledJob};
pub use marker::{
    Declare, ErrorMethod, ErrorSlot, JobMethod, JobSlot, Markers, Method, Slot, TriggerSlot,
    cancel_descriptor,
};
pub use table::{DispatchTable, Scheduler};
pub use trigger::{
    ConversationRole, ErrorDescriptor, MembershipFilter, TriggerDescriptor, TriggerKind,
    TriggerMatcher,
};
pub use update::{Chat, ChatKind, MembershipChange, Payload, Sender, Update};

// Schedules are expressed in chrono types; re-exported for `#[triggers]` expansions.
pub use chrono;

/// Prelude for plugin authors.
pub mod prelude {
    pub use super::{
        ConversationOptions, Declare, ErrorDescriptor, ErrorReport, Flow, HandlerResult,
        JobContext, JobDescriptor, Markers, MembershipFilter, TriggerDescriptor, Update,
        cancel_descriptor,
    };
}
