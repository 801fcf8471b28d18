//! Links mutating tool invocations to their eventual results.

use std::collections::HashMap;

use agent_relay_core::FileAction;

/// A file mutation requested by a tool invocation whose result has not
/// arrived yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingMutation {
    /// Target path, already relative to the working directory when under it.
    pub target_path: String,
    pub action: FileAction,
}

/// Per-session map from tool invocation id to pending mutation.
///
/// An entry moves from absent to pending on [`register`](Self::register) and
/// back to absent when [`take`](Self::take) consumes it, so each mutation is
/// reported at most once.
#[derive(Debug, Default)]
pub struct CorrelationTracker {
    pending: HashMap<String, PendingMutation>,
}

impl CorrelationTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a pending mutation for `tool_call_id`.
    ///
    /// Returns `false`, leaving the existing entry in place, if the id is
    /// already pending.
    pub fn register(&mut self, tool_call_id: impl Into<String>, mutation: PendingMutation) -> bool {
        let tool_call_id = tool_call_id.into();
        if self.pending.contains_key(&tool_call_id) {
            tracing::warn!(%tool_call_id, "Duplicate tool call id, keeping first mutation");
            return false;
        }
        self.pending.insert(tool_call_id, mutation);
        true
    }

    /// Consume the pending mutation for `tool_call_id`, if any.
    pub fn take(&mut self, tool_call_id: &str) -> Option<PendingMutation> {
        self.pending.remove(tool_call_id)
    }

    #[must_use]
    pub fn is_pending(&self, tool_call_id: &str) -> bool {
        self.pending.contains_key(tool_call_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
