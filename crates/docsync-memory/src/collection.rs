//! In-memory document collection with realtime listeners.
//!
//! Every committed write produces exactly one tick per listener, carrying the
//! full ordered result set and the diff from the previous one. Writes that do
//! not change anything produce no tick.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use docsync_core::{
    ChangeCallback, CollectionWriter, DocumentData, DocumentRef, DocumentSnapshot, ErrorCallback,
    ListenEvent, ListenableQuery, ListenerHandle, QuerySnapshot, SourceError, StoreCapabilities,
    WriteError,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::diff::diff_ordered;

// ─── Ordering ─────────────────────────────────────────────────────────────────

/// Query order for a [`MemoryCollection`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBy {
    /// Field to sort on. `None` sorts by document id only.
    #[serde(default)]
    pub field: Option<String>,
    /// Reverse the order (ties by id are reversed too).
    #[serde(default)]
    pub descending: bool,
}

impl OrderBy {
    /// Order by document id.
    pub fn id() -> Self {
        Self::default()
    }

    /// Order by a top-level field, ascending.
    pub fn field(name: impl Into<String>) -> Self {
        Self {
            field: Some(name.into()),
            descending: false,
        }
    }

    pub fn descending(mut self) -> Self {
        self.descending = true;
        self
    }

    fn compare(&self, a: (&str, &DocumentData), b: (&str, &DocumentData)) -> Ordering {
        let by_value = match &self.field {
            Some(field) => compare_values(a.1.get(field), b.1.get(field)),
            None => Ordering::Equal,
        };
        let ordering = by_value.then_with(|| a.0.cmp(b.0));
        if self.descending {
            ordering.reverse()
        } else {
            ordering
        }
    }
}

/// Missing and null sort first, then booleans, numbers, strings, arrays and
/// maps. Arrays and maps compare equal among themselves.
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    fn rank(v: Option<&Value>) -> u8 {
        match v {
            None | Some(Value::Null) => 0,
            Some(Value::Bool(_)) => 1,
            Some(Value::Number(_)) => 2,
            Some(Value::String(_)) => 3,
            Some(Value::Array(_)) => 4,
            Some(Value::Object(_)) => 5,
        }
    }
    match (a, b) {
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}

// ─── Write operations ─────────────────────────────────────────────────────────

/// One write inside an atomic batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum WriteOp {
    /// Create or overwrite.
    Set {
        id: String,
        #[serde(default)]
        data: DocumentData,
    },
    /// Merge fields into an existing document.
    Update {
        id: String,
        #[serde(default)]
        data: DocumentData,
    },
    /// Delete; missing documents are ignored.
    Delete { id: String },
}

impl WriteOp {
    pub fn set(id: impl Into<String>, data: DocumentData) -> Self {
        Self::Set {
            id: id.into(),
            data,
        }
    }

    pub fn update(id: impl Into<String>, data: DocumentData) -> Self {
        Self::Update {
            id: id.into(),
            data,
        }
    }

    pub fn delete(id: impl Into<String>) -> Self {
        Self::Delete { id: id.into() }
    }

    pub fn id(&self) -> &str {
        match self {
            Self::Set { id, .. } | Self::Update { id, .. } | Self::Delete { id } => id,
        }
    }

    fn apply(&self, docs: &mut BTreeMap<String, DocumentData>) -> Result<(), WriteError> {
        match self {
            Self::Set { id, data } => {
                docs.insert(id.clone(), data.clone());
            }
            Self::Update { id, data } => {
                let doc = docs
                    .get_mut(id)
                    .ok_or_else(|| WriteError::NotFound { id: id.clone() })?;
                for (key, value) in data {
                    doc.insert(key.clone(), value.clone());
                }
            }
            Self::Delete { id } => {
                docs.remove(id);
            }
        }
        Ok(())
    }
}

// ─── Listener statistics ──────────────────────────────────────────────────────

/// Counters describing listener traffic on a [`MemoryCollection`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListenerStats {
    /// `listen` calls.
    pub registrations: u64,
    /// `stop_listening` calls, including ones for unknown handles.
    pub deregistrations: u64,
    /// `once` calls.
    pub one_shot_reads: u64,
    /// Listeners currently registered.
    pub active: usize,
}

// ─── MemoryCollection ─────────────────────────────────────────────────────────

struct Listener {
    event: ListenEvent,
    on_change: ChangeCallback,
    on_error: ErrorCallback,
}

#[derive(Default)]
struct State {
    docs: BTreeMap<String, DocumentData>,
    listeners: HashMap<u64, Listener>,
    next_handle: u64,
    next_auto_id: u64,
    stats: ListenerStats,
}

/// A query-ordered collection held in RAM.
///
/// All data is lost when the value is dropped. Listener callbacks run on the
/// writer's thread after the write is committed; they must not write back
/// into the same collection.
pub struct MemoryCollection {
    path: String,
    order: OrderBy,
    capabilities: StoreCapabilities,
    state: Mutex<State>,
    // Held from commit through delivery so ticks reach listeners in commit
    // order.
    delivery: Mutex<()>,
}

impl MemoryCollection {
    pub fn new(path: impl Into<String>, order: OrderBy) -> Self {
        Self {
            path: path.into(),
            order,
            capabilities: StoreCapabilities::full(),
            state: Mutex::new(State::default()),
            delivery: Mutex::new(()),
        }
    }

    /// Advertise different capabilities (e.g. one-shot only).
    pub fn with_capabilities(mut self, capabilities: StoreCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Documents in query order.
    pub fn documents(&self) -> Vec<DocumentSnapshot> {
        let state = self.state.lock().unwrap();
        self.ordered(&state.docs)
    }

    pub fn len(&self) -> usize {
        self.state.lock().unwrap().docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn listener_stats(&self) -> ListenerStats {
        let state = self.state.lock().unwrap();
        ListenerStats {
            active: state.listeners.len(),
            ..state.stats
        }
    }

    /// Commit several writes as one tick. Either every write applies or none
    /// does.
    pub fn write_batch(&self, ops: &[WriteOp]) -> Result<(), WriteError> {
        let _delivery = self.delivery.lock().unwrap();
        let (snapshot, targets) = {
            let mut state = self.state.lock().unwrap();
            let mut working = state.docs.clone();
            for op in ops {
                op.apply(&mut working)?;
            }

            let before = self.ordered(&state.docs);
            let after = self.ordered(&working);
            let changes = diff_ordered(&before, &after);
            state.docs = working;
            if changes.is_empty() {
                tracing::trace!(path = %self.path, ops = ops.len(), "Write changed nothing");
                return Ok(());
            }
            tracing::debug!(
                path = %self.path,
                ops = ops.len(),
                changes = changes.len(),
                "Batch committed"
            );
            let snapshot = QuerySnapshot {
                documents: after,
                changes,
            };
            (snapshot, Self::change_callbacks(&state))
        };

        for on_change in targets {
            on_change(snapshot.clone());
        }
        Ok(())
    }

    /// Deliver `snapshot` to every listener as-is, without touching stored
    /// documents.
    pub fn deliver_raw(&self, snapshot: QuerySnapshot) {
        let _delivery = self.delivery.lock().unwrap();
        let targets = Self::change_callbacks(&self.state.lock().unwrap());
        tracing::debug!(path = %self.path, listeners = targets.len(), "Delivering raw snapshot");
        for on_change in targets {
            on_change(snapshot.clone());
        }
    }

    /// Fail every registered listener with `err`. Failed listeners are
    /// dropped; their handles become unknown.
    pub fn fail_listeners(&self, err: SourceError) {
        let _delivery = self.delivery.lock().unwrap();
        let failed: Vec<Listener> = {
            let mut state = self.state.lock().unwrap();
            state.listeners.drain().map(|(_, l)| l).collect()
        };
        tracing::debug!(path = %self.path, listeners = failed.len(), error = %err, "Failing listeners");
        for listener in failed {
            (listener.on_error)(err.clone());
        }
    }

    fn ordered(&self, docs: &BTreeMap<String, DocumentData>) -> Vec<DocumentSnapshot> {
        let mut entries: Vec<(&String, &DocumentData)> = docs.iter().collect();
        entries.sort_by(|a, b| self.order.compare((a.0.as_str(), a.1), (b.0.as_str(), b.1)));
        entries
            .into_iter()
            .map(|(id, data)| DocumentSnapshot::new(id.clone(), data.clone()))
            .collect()
    }

    fn change_callbacks(state: &State) -> Vec<ChangeCallback> {
        state
            .listeners
            .values()
            .map(|l| l.on_change.clone())
            .collect()
    }

    /// The full result set as an initial tick: every document added.
    fn initial_snapshot(&self, state: &State) -> QuerySnapshot {
        let documents = self.ordered(&state.docs);
        let changes = diff_ordered(&[], &documents);
        QuerySnapshot { documents, changes }
    }
}

impl ListenableQuery for MemoryCollection {
    fn capabilities(&self) -> StoreCapabilities {
        self.capabilities
    }

    fn listen(
        &self,
        event: ListenEvent,
        on_change: ChangeCallback,
        on_error: ErrorCallback,
    ) -> ListenerHandle {
        let _delivery = self.delivery.lock().unwrap();
        let (handle, initial) = {
            let mut state = self.state.lock().unwrap();
            state.stats.registrations += 1;
            let handle = state.next_handle;
            state.next_handle += 1;

            if !self.capabilities.realtime {
                (handle, None)
            } else {
                state.listeners.insert(
                    handle,
                    Listener {
                        event,
                        on_change: on_change.clone(),
                        on_error: on_error.clone(),
                    },
                );
                (handle, Some(self.initial_snapshot(&state)))
            }
        };

        match initial {
            Some(snapshot) => {
                tracing::debug!(path = %self.path, %event, handle, "Listener registered");
                on_change(snapshot);
            }
            None => on_error(SourceError::Other(format!(
                "collection '{}' does not support realtime listeners",
                self.path
            ))),
        }
        ListenerHandle(handle)
    }

    fn once(&self, event: ListenEvent, on_change: ChangeCallback, _on_error: ErrorCallback) {
        let snapshot = {
            let mut state = self.state.lock().unwrap();
            state.stats.one_shot_reads += 1;
            self.initial_snapshot(&state)
        };
        tracing::debug!(path = %self.path, %event, docs = snapshot.documents.len(), "One-shot read");
        on_change(snapshot);
    }

    fn stop_listening(&self, event: ListenEvent, handle: ListenerHandle) {
        let mut state = self.state.lock().unwrap();
        state.stats.deregistrations += 1;
        let known = state
            .listeners
            .get(&handle.0)
            .is_some_and(|listener| listener.event == event);
        if known {
            state.listeners.remove(&handle.0);
            tracing::debug!(path = %self.path, %event, handle = handle.0, "Listener removed");
        } else {
            tracing::trace!(path = %self.path, handle = handle.0, "Unknown listener handle ignored");
        }
    }
}

#[async_trait]
impl CollectionWriter for MemoryCollection {
    fn path(&self) -> &str {
        &self.path
    }

    async fn add(&self, data: DocumentData) -> Result<DocumentRef, WriteError> {
        let id = {
            let mut state = self.state.lock().unwrap();
            state.next_auto_id += 1;
            format!("auto-{:06}", state.next_auto_id)
        };
        self.write_batch(&[WriteOp::set(id.clone(), data)])?;
        Ok(DocumentRef::new(self.path.clone(), id))
    }

    async fn set(&self, id: &str, data: DocumentData) -> Result<(), WriteError> {
        self.write_batch(&[WriteOp::set(id, data)])
    }

    async fn update(&self, id: &str, data: DocumentData) -> Result<(), WriteError> {
        self.write_batch(&[WriteOp::update(id, data)])
    }

    async fn delete(&self, id: &str) -> Result<(), WriteError> {
        self.write_batch(&[WriteOp::delete(id)])
    }

    async fn clear(&self) -> Result<(), WriteError> {
        let ops: Vec<WriteOp> = {
            let state = self.state.lock().unwrap();
            state.docs.keys().map(WriteOp::delete).collect()
        };
        self.write_batch(&ops)
    }
}
