//! Sorted projection engine. Keeps a local copy of a query's result set in
//! server order, driven only by classified change batches.
//!
//! The store never sends absolute sort keys. Each added or modified document
//! carries the id of its predecessor in query order (its ordering hint), so the
//! engine reconstructs order by hint-chasing:
//!
//! - **Added**: insert right after the hinted document (at the head when the
//!   hint is `None`)
//! - **Modified**: remove, then re-insert with the fresh hint
//! - **Removed**: delete by id; a missing id is a no-op
//!
//! A batch is applied to a working copy in delivery order and swapped in only
//! once every action has been applied.

use crate::error::StreamError;
use crate::types::{ChangeAction, ChangeKind, OrderedDocument};

/// Lifecycle of a projection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectionState {
    /// No batch applied yet.
    Empty,
    /// At least one batch applied.
    Populated,
    /// Torn down; no further batches are accepted.
    Disposed,
}

impl std::fmt::Display for ProjectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "empty"),
            Self::Populated => write!(f, "populated"),
            Self::Disposed => write!(f, "disposed"),
        }
    }
}

/// Where an action landed in the working copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Placement {
    /// Inserted at the requested position.
    Resolved,
    /// The hint did not resolve and the document was appended.
    Appended,
}

/// Ordered, id-unique projection of a query's result set.
#[derive(Debug, Clone)]
pub struct SortedProjection {
    documents: Vec<OrderedDocument>,
    state: ProjectionState,
    batches_applied: u64,
    unresolved_hints: u64,
}

impl SortedProjection {
    pub fn new() -> Self {
        Self {
            documents: Vec::new(),
            state: ProjectionState::Empty,
            batches_applied: 0,
            unresolved_hints: 0,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ProjectionState {
        self.state
    }

    /// The visible, ordered documents.
    pub fn documents(&self) -> &[OrderedDocument] {
        &self.documents
    }

    /// Document ids in projection order.
    pub fn ids(&self) -> Vec<&str> {
        self.documents.iter().map(|d| d.id.as_str()).collect()
    }

    /// Look up a document by id.
    pub fn get(&self, id: &str) -> Option<&OrderedDocument> {
        self.documents.iter().find(|d| d.id == id)
    }

    /// Number of visible documents.
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    /// Returns `true` if no document is visible.
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Number of batches applied since creation.
    pub fn batches_applied(&self) -> u64 {
        self.batches_applied
    }

    /// Number of ordering hints that fell back to append-at-end.
    pub fn unresolved_hints(&self) -> u64 {
        self.unresolved_hints
    }

    /// Apply one batch atomically and return the new visible sequence.
    ///
    /// On error the visible sequence is left exactly as it was before the
    /// batch.
    pub fn apply(&mut self, batch: &[ChangeAction]) -> Result<&[OrderedDocument], StreamError> {
        if self.state == ProjectionState::Disposed {
            return Err(StreamError::Disposed);
        }

        let mut working = self.documents.clone();
        let mut unresolved = 0u64;
        for (index, action) in batch.iter().enumerate() {
            if action.document.id.is_empty() {
                return Err(StreamError::MalformedChange {
                    index,
                    reason: format!("{} action without a document id", action.kind),
                });
            }
            if apply_action(&mut working, action) == Placement::Appended {
                unresolved += 1;
            }
        }

        self.documents = working;
        self.state = ProjectionState::Populated;
        self.batches_applied += 1;
        self.unresolved_hints += unresolved;

        tracing::trace!(
            batch = self.batches_applied,
            actions = batch.len(),
            len = self.documents.len(),
            "Batch applied"
        );
        Ok(&self.documents)
    }

    /// Discard all state. Terminal.
    pub fn dispose(&mut self) {
        self.documents.clear();
        self.state = ProjectionState::Disposed;
    }
}

impl Default for SortedProjection {
    fn default() -> Self {
        Self::new()
    }
}

fn apply_action(working: &mut Vec<OrderedDocument>, action: &ChangeAction) -> Placement {
    match action.kind {
        ChangeKind::Added | ChangeKind::Modified => {
            // An Added for an id already present is handled like a move so the
            // projection stays unique by id.
            if remove_by_id(working, action.id()).is_none() && action.kind == ChangeKind::Modified {
                tracing::debug!(id = action.id(), "Modified document not in projection, inserting");
            }
            insert_after_hint(working, action)
        }
        ChangeKind::Removed => {
            if remove_by_id(working, action.id()).is_none() {
                tracing::trace!(id = action.id(), "Removed document already absent");
            }
            Placement::Resolved
        }
    }
}

fn remove_by_id(working: &mut Vec<OrderedDocument>, id: &str) -> Option<OrderedDocument> {
    let pos = working.iter().position(|d| d.id == id)?;
    Some(working.remove(pos))
}

fn insert_after_hint(working: &mut Vec<OrderedDocument>, action: &ChangeAction) -> Placement {
    let doc = action.document.clone();
    let Some(hint) = action.ordering_hint.as_deref() else {
        working.insert(0, doc);
        return Placement::Resolved;
    };

    match working.iter().position(|d| d.id == hint) {
        Some(pos) => {
            working.insert(pos + 1, doc);
            Placement::Resolved
        }
        None => {
            tracing::warn!(
                id = action.id(),
                hint,
                "Ordering hint not found in projection, appending at end"
            );
            working.push(doc);
            Placement::Appended
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DocumentData;

    fn action(kind: ChangeKind, id: &str, hint: Option<&str>) -> ChangeAction {
        ChangeAction {
            kind,
            document: OrderedDocument::new(id, DocumentData::new()),
            ordering_hint: hint.map(String::from),
            previous_index: None,
        }
    }

    fn added(id: &str, hint: Option<&str>) -> ChangeAction {
        action(ChangeKind::Added, id, hint)
    }

    fn modified(id: &str, hint: Option<&str>) -> ChangeAction {
        action(ChangeKind::Modified, id, hint)
    }

    fn removed(id: &str) -> ChangeAction {
        action(ChangeKind::Removed, id, None)
    }

    #[test]
    fn walkthrough_scenario() {
        let mut p = SortedProjection::new();
        assert_eq!(p.state(), ProjectionState::Empty);

        p.apply(&[added("A", None)]).unwrap();
        assert_eq!(p.ids(), ["A"]);
        assert_eq!(p.state(), ProjectionState::Populated);

        p.apply(&[added("B", Some("A"))]).unwrap();
        assert_eq!(p.ids(), ["A", "B"]);

        p.apply(&[modified("A", Some("B"))]).unwrap();
        assert_eq!(p.ids(), ["B", "A"]);

        p.apply(&[removed("B")]).unwrap();
        assert_eq!(p.ids(), ["A"]);
        assert_eq!(p.batches_applied(), 4);
    }

    #[test]
    fn null_hint_inserts_at_head() {
        let mut p = SortedProjection::new();
        p.apply(&[added("A", None), added("B", None)]).unwrap();
        assert_eq!(p.ids(), ["B", "A"]);
    }

    #[test]
    fn hints_may_reference_earlier_actions_in_the_same_batch() {
        let mut p = SortedProjection::new();
        p.apply(&[
            added("C", None),
            added("A", Some("C")),
            added("B", Some("A")),
        ])
        .unwrap();
        assert_eq!(p.ids(), ["C", "A", "B"]);
    }

    #[test]
    fn removal_is_idempotent() {
        let mut p = SortedProjection::new();
        p.apply(&[added("A", None), added("B", Some("A"))]).unwrap();
        p.apply(&[removed("B")]).unwrap();
        let after_first = p.documents().to_vec();
        p.apply(&[removed("B")]).unwrap();
        assert_eq!(p.documents(), after_first.as_slice());
        assert_eq!(p.ids(), ["A"]);
    }

    #[test]
    fn unresolved_hint_appends_at_end() {
        let mut p = SortedProjection::new();
        p.apply(&[added("A", None), added("B", Some("A"))]).unwrap();
        p.apply(&[added("X", Some("ghost"))]).unwrap();
        assert_eq!(p.ids(), ["A", "B", "X"]);
        assert_eq!(p.unresolved_hints(), 1);
    }

    #[test]
    fn modify_replaces_data_in_place_when_hint_unchanged() {
        let mut p = SortedProjection::new();
        p.apply(&[added("A", None), added("B", Some("A")), added("C", Some("B"))])
            .unwrap();

        let mut data = DocumentData::new();
        data.insert("votes".into(), serde_json::json!(3));
        let mut change = modified("B", Some("A"));
        change.document.data = data.clone();
        p.apply(&[change]).unwrap();

        assert_eq!(p.ids(), ["A", "B", "C"]);
        assert_eq!(p.get("B").unwrap().data, data);
    }

    #[test]
    fn modified_unknown_document_is_inserted() {
        let mut p = SortedProjection::new();
        p.apply(&[added("A", None)]).unwrap();
        p.apply(&[modified("Z", Some("A"))]).unwrap();
        assert_eq!(p.ids(), ["A", "Z"]);
    }

    #[test]
    fn duplicate_add_keeps_ids_unique() {
        let mut p = SortedProjection::new();
        p.apply(&[added("A", None), added("B", Some("A"))]).unwrap();
        p.apply(&[added("A", Some("B"))]).unwrap();
        assert_eq!(p.ids(), ["B", "A"]);
    }

    #[test]
    fn failed_batch_leaves_projection_untouched() {
        let mut p = SortedProjection::new();
        p.apply(&[added("A", None)]).unwrap();

        let err = p
            .apply(&[added("B", Some("A")), added("", Some("B"))])
            .unwrap_err();
        assert!(err.is_malformed());
        assert_eq!(p.ids(), ["A"]);
        assert_eq!(p.batches_applied(), 1);
    }

    #[test]
    fn disposed_projection_rejects_batches() {
        let mut p = SortedProjection::new();
        p.apply(&[added("A", None)]).unwrap();
        p.dispose();
        assert_eq!(p.state(), ProjectionState::Disposed);
        assert!(p.is_empty());
        assert_eq!(p.apply(&[added("B", None)]).unwrap_err(), StreamError::Disposed);
    }

    #[test]
    fn order_follows_hint_chain() {
        // Every document first lands right after d0, which reverses them;
        // the follow-up batch re-points each hint at its true predecessor.
        let mut p = SortedProjection::new();
        p.apply(&[added("d0", None)]).unwrap();
        let batch: Vec<_> = (1..10).map(|i| added(&format!("d{i}"), Some("d0"))).collect();
        p.apply(&batch).unwrap();
        assert_eq!(p.ids()[1], "d9");

        let fixes: Vec<_> = (1..10)
            .map(|i| modified(&format!("d{i}"), Some(&format!("d{}", i - 1))))
            .collect();
        p.apply(&fixes).unwrap();

        let expected: Vec<String> = (0..10).map(|i| format!("d{i}")).collect();
        assert_eq!(p.ids(), expected);
    }
}
