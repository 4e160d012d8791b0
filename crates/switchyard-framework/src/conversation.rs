//! Assembling a stateful plugin's triggers into one conversation entry.

use std::sync::Arc;

use switchyard_core::{
    ConversationEntry, ConversationOptions, ConversationRole, DispatchEntry, TriggerDescriptor,
    TriggerEntry,
};
use tracing::debug;

/// Entry points, state buckets and fallbacks collected during one pass.
///
/// State buckets keep first-seen key order; a key seen again appends to
/// the existing bucket.
#[derive(Debug, Default)]
pub struct ConversationAssembly {
    entry_points: Vec<TriggerEntry>,
    states: Vec<(String, Vec<TriggerEntry>)>,
    fallbacks: Vec<TriggerEntry>,
}

impl ConversationAssembly {
    pub fn new() -> Self {
        Self::default()
    }

    /// Files `entry` by the role `descriptor` carries.
    ///
    /// Reads the descriptor without touching it. Returns the entry back when
    /// the descriptor has no role, so the caller keeps it as a plain entry.
    pub fn classify(
        &mut self,
        descriptor: &TriggerDescriptor,
        entry: TriggerEntry,
    ) -> Option<TriggerEntry> {
        match descriptor.conversation_role() {
            None => return Some(entry),
            Some(ConversationRole::Entry) => self.entry_points.push(entry),
            Some(ConversationRole::Fallback) => self.fallbacks.push(entry),
            Some(ConversationRole::State(key)) => {
                match self.states.iter_mut().find(|(k, _)| k == key) {
                    Some((_, bucket)) => bucket.push(entry),
                    None => self.states.push((key.clone(), vec![entry])),
                }
            }
        }
        None
    }

    pub fn is_empty(&self) -> bool {
        self.entry_points.is_empty() && self.states.is_empty() && self.fallbacks.is_empty()
    }

    /// Consumes the assembly. `None` when nothing was collected.
    pub fn build(
        self,
        plugin: &'static str,
        options: ConversationOptions,
    ) -> Option<ConversationEntry> {
        if self.is_empty() {
            return None;
        }
        Some(ConversationEntry::new(
            plugin,
            self.entry_points,
            self.states,
            self.fallbacks,
            options,
        ))
    }
}

/// Splits scanned triggers into plain entries and, when any trigger has a
/// role, one trailing conversation entry.
pub fn assemble(
    plugin: &'static str,
    scanned: Vec<(Arc<TriggerDescriptor>, TriggerEntry)>,
    options: ConversationOptions,
) -> Vec<DispatchEntry> {
    let mut assembly = ConversationAssembly::new();
    let mut entries: Vec<DispatchEntry> = scanned
        .into_iter()
        .filter_map(|(descriptor, entry)| assembly.classify(&descriptor, entry))
        .map(DispatchEntry::Trigger)
        .collect();

    if let Some(conversation) = assembly.build(plugin, options) {
        debug!(
            plugin,
            entry_points = conversation.entry_points().len(),
            states = conversation.states().count(),
            fallbacks = conversation.fallbacks().len(),
            "conversation assembled"
        );
        entries.push(DispatchEntry::Conversation(conversation));
    }
    entries
}
