//! Audit accumulator: an append-only log of every classified action.

use crate::types::ChangeAction;

/// Append-only, ordered log of change actions.
///
/// `log[n] = log[n-1] ++ batch[n]`. Entries are never removed or reordered.
#[derive(Debug, Clone, Default)]
pub struct AuditLog {
    entries: Vec<ChangeAction>,
    batches: u64,
}

impl AuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a batch and return the whole log.
    pub fn extend(&mut self, batch: impl IntoIterator<Item = ChangeAction>) -> &[ChangeAction] {
        self.entries.extend(batch);
        self.batches += 1;
        &self.entries
    }

    pub fn entries(&self) -> &[ChangeAction] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of batches folded in.
    pub fn batches(&self) -> u64 {
        self.batches
    }
}
