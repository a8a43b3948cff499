//! Change classifier. Turns native change records into [`ChangeAction`]s.
//!
//! Classification is all-or-nothing per batch: a single malformed record
//! fails the whole batch, so downstream state is never partially updated.

use crate::config::ChangeFilter;
use crate::error::StreamError;
use crate::types::{ChangeAction, ChangeKind, OrderedDocument, QuerySnapshot, RawChange};

/// Classify a single raw change record.
///
/// `index` is the record's position inside its batch and is only used for
/// error reporting.
pub fn classify(raw: &RawChange, index: usize) -> Result<ChangeAction, StreamError> {
    let kind: ChangeKind = raw.kind.parse().map_err(|_| StreamError::MalformedChange {
        index,
        reason: format!("unknown change kind '{}'", raw.kind),
    })?;

    let id = match raw.document.id.as_deref() {
        Some(id) if !id.is_empty() => id.to_string(),
        _ => {
            return Err(StreamError::MalformedChange {
                index,
                reason: format!("{kind} change without a document id"),
            })
        }
    };

    Ok(ChangeAction {
        kind,
        document: OrderedDocument::new(id, raw.document.data.clone()),
        ordering_hint: raw.previous_id.clone().filter(|hint| !hint.is_empty()),
        previous_index: raw.old_index,
    })
}

/// Classify every change of a snapshot, in delivery order.
pub fn classify_all(snapshot: &QuerySnapshot) -> Result<Vec<ChangeAction>, StreamError> {
    snapshot
        .changes
        .iter()
        .enumerate()
        .map(|(index, raw)| classify(raw, index))
        .collect()
}

/// Classify a snapshot's changes and keep only the kinds `filter` lets through.
///
/// Returns `Ok(None)` when nothing survives the filter: such a batch must not
/// be emitted at all.
pub fn classify_batch(
    snapshot: &QuerySnapshot,
    filter: &ChangeFilter,
) -> Result<Option<Vec<ChangeAction>>, StreamError> {
    let mut actions = classify_all(snapshot)?;
    actions.retain(|action| filter.matches(action.kind));
    if actions.is_empty() {
        tracing::trace!(
            delivered = snapshot.changes.len(),
            "Batch empty after filtering, suppressed"
        );
        return Ok(None);
    }
    Ok(Some(actions))
}
