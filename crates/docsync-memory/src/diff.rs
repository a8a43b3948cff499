//! Diffing two ordered result sets into native change records.
//!
//! Output order matches what a realtime store delivers: removals first (in
//! old order, each carrying its old index), then additions and modifications
//! in new order. Each added or modified record's hint is the id that precedes
//! it in the new order.
//!
//! Documents that keep their relative order are left alone unless their data
//! changed. The kept set is a longest run of surviving documents whose old
//! positions increase along the new order, so a single move produces a single
//! record.

use std::collections::{HashMap, HashSet};

use docsync_core::{ChangeKind, DocumentSnapshot, RawChange};

/// Changes that turn `before` into `after`. Both slices must be in query
/// order; documents without an id are skipped.
pub fn diff_ordered(before: &[DocumentSnapshot], after: &[DocumentSnapshot]) -> Vec<RawChange> {
    let old: HashMap<&str, (usize, &DocumentSnapshot)> = before
        .iter()
        .enumerate()
        .filter_map(|(i, doc)| doc.id.as_deref().map(|id| (id, (i, doc))))
        .collect();
    let new_ids: HashSet<&str> = after.iter().filter_map(|doc| doc.id.as_deref()).collect();

    let mut changes = Vec::new();

    for (index, doc) in before.iter().enumerate() {
        let Some(id) = doc.id.as_deref() else { continue };
        if !new_ids.contains(id) {
            changes.push(RawChange::new(ChangeKind::Removed, doc.clone(), None).with_old_index(index));
        }
    }

    // Surviving documents in new order, with their old positions.
    let survivors: Vec<(&str, usize)> = after
        .iter()
        .filter_map(|doc| doc.id.as_deref())
        .filter_map(|id| old.get(id).map(|(index, _)| (id, *index)))
        .collect();
    let positions: Vec<usize> = survivors.iter().map(|(_, index)| *index).collect();
    let stable: HashSet<&str> = longest_increasing(&positions)
        .into_iter()
        .map(|i| survivors[i].0)
        .collect();

    let mut previous: Option<&str> = None;
    for doc in after {
        let Some(id) = doc.id.as_deref() else { continue };
        let hint = previous.map(String::from);
        match old.get(id) {
            None => changes.push(RawChange::new(ChangeKind::Added, doc.clone(), hint)),
            Some((old_index, old_doc)) => {
                if !stable.contains(id) || old_doc.data != doc.data {
                    changes.push(
                        RawChange::new(ChangeKind::Modified, doc.clone(), hint)
                            .with_old_index(*old_index),
                    );
                }
            }
        }
        previous = Some(id);
    }

    changes
}

/// Indexes into `seq` of one longest strictly increasing subsequence.
fn longest_increasing(seq: &[usize]) -> Vec<usize> {
    let mut tails: Vec<usize> = Vec::new();
    let mut parent: Vec<Option<usize>> = vec![None; seq.len()];
    for (i, &value) in seq.iter().enumerate() {
        let pos = tails.partition_point(|&t| seq[t] < value);
        if pos > 0 {
            parent[i] = Some(tails[pos - 1]);
        }
        if pos == tails.len() {
            tails.push(i);
        } else {
            tails[pos] = i;
        }
    }

    let mut out = Vec::with_capacity(tails.len());
    let mut cursor = tails.last().copied();
    while let Some(i) = cursor {
        out.push(i);
        cursor = parent[i];
    }
    out.reverse();
    out
}
