//! End-to-end pipeline tests against the in-memory backend.
//!
//! Registration runs on `ImmediateScheduler` (or `ManualScheduler` where the
//! timing matters) and streams are polled with `now_or_never`, so every test
//! is deterministic and single-threaded.

use std::sync::Arc;

use docsync_core::{
    ChangeKind, DocumentData, DocumentRef, DocumentSnapshot, ImmediateScheduler, ListenConfig,
    ListenMode, ManualScheduler, OrderedDocument, QuerySnapshot, RawChange, SourceError,
    StoreCapabilities, StreamError, UsageError, WriteError,
};
use docsync_memory::{MemoryCollection, OrderBy, WriteOp};
use docsync_stream::{Collection, LazyCollection, Subscription};
use futures::{FutureExt, StreamExt};
use serde_json::{json, Value};

// ─── Helpers ──────────────────────────────────────────────────────────────────

fn data(value: Value) -> DocumentData {
    match value {
        Value::Object(map) => map,
        _ => DocumentData::new(),
    }
}

fn ranked(rank: i64) -> DocumentData {
    data(json!({ "rank": rank }))
}

fn store() -> Arc<MemoryCollection> {
    Arc::new(MemoryCollection::new("animals", OrderBy::field("rank")))
}

fn collection(store: &Arc<MemoryCollection>) -> Collection {
    Collection::from_store(Arc::clone(store)).with_scheduler(Arc::new(ImmediateScheduler))
}

fn ids(docs: &[OrderedDocument]) -> Vec<&str> {
    docs.iter().map(|d| d.id.as_str()).collect()
}

/// `None` while pending, `Some(None)` once ended.
fn poll<T: Clone + Send + 'static>(
    sub: &mut Subscription<T>,
) -> Option<Option<Result<T, StreamError>>> {
    sub.next().now_or_never()
}

fn value<T: Clone + Send + 'static>(sub: &mut Subscription<T>) -> T {
    match poll(sub) {
        Some(Some(Ok(value))) => value,
        other => panic!("expected a value, got {:?}", other.map(|o| o.map(|r| r.err()))),
    }
}

fn raw(kind: &str, id: &str, prev: Option<&str>) -> RawChange {
    RawChange {
        kind: kind.to_string(),
        document: DocumentSnapshot::new(id, DocumentData::new()),
        previous_id: prev.map(String::from),
        old_index: None,
    }
}

fn tick(changes: Vec<RawChange>) -> QuerySnapshot {
    QuerySnapshot {
        documents: vec![],
        changes,
    }
}

// ─── Sorted projection ────────────────────────────────────────────────────────

#[test]
fn walkthrough_scenario() {
    let store = store();
    let animals = collection(&store);
    let mut sub = animals.snapshot_changes(ListenConfig::new()).unwrap().subscribe();
    assert!(value(&mut sub).is_empty());

    store.deliver_raw(tick(vec![raw("added", "A", None)]));
    assert_eq!(ids(&value(&mut sub)), ["A"]);

    store.deliver_raw(tick(vec![raw("added", "B", Some("A"))]));
    assert_eq!(ids(&value(&mut sub)), ["A", "B"]);

    store.deliver_raw(tick(vec![raw("modified", "A", Some("B"))]));
    assert_eq!(ids(&value(&mut sub)), ["B", "A"]);

    store.deliver_raw(tick(vec![raw("removed", "B", None)]));
    assert_eq!(ids(&value(&mut sub)), ["A"]);
}

#[test]
fn projection_tracks_store_order_through_writes() {
    let store = store();
    store
        .write_batch(&[WriteOp::set("cat", ranked(3)), WriteOp::set("ant", ranked(1))])
        .unwrap();
    let animals = collection(&store);
    let mut sub = animals.snapshot_changes(ListenConfig::new()).unwrap().subscribe();
    assert_eq!(ids(&value(&mut sub)), ["ant", "cat"]);

    store.write_batch(&[WriteOp::set("bee", ranked(2))]).unwrap();
    assert_eq!(ids(&value(&mut sub)), ["ant", "bee", "cat"]);

    store.write_batch(&[WriteOp::update("ant", ranked(9))]).unwrap();
    assert_eq!(ids(&value(&mut sub)), ["bee", "cat", "ant"]);

    store.write_batch(&[WriteOp::delete("cat")]).unwrap();
    let docs = value(&mut sub);
    assert_eq!(ids(&docs), ["bee", "ant"]);
    assert_eq!(docs[1].data["rank"], json!(9));
}

#[test]
fn batch_is_applied_atomically() {
    let store = store();
    let animals = collection(&store);
    let mut sub = animals.snapshot_changes(ListenConfig::new()).unwrap().subscribe();
    assert!(value(&mut sub).is_empty());

    store
        .write_batch(&[
            WriteOp::set("a", ranked(1)),
            WriteOp::set("b", ranked(2)),
            WriteOp::set("c", ranked(3)),
        ])
        .unwrap();
    assert_eq!(ids(&value(&mut sub)), ["a", "b", "c"]);
    assert!(poll(&mut sub).is_none());
}

#[test]
fn unresolved_hint_appends_at_end() {
    let store = store();
    store
        .write_batch(&[WriteOp::set("a", ranked(1)), WriteOp::set("b", ranked(2))])
        .unwrap();
    let animals = collection(&store);
    let mut sub = animals.snapshot_changes(ListenConfig::new()).unwrap().subscribe();
    value(&mut sub);

    store.deliver_raw(tick(vec![raw("added", "x", Some("ghost"))]));
    assert_eq!(ids(&value(&mut sub)), ["a", "b", "x"]);
}

#[test]
fn malformed_change_terminates_every_observer() {
    let store = store();
    let animals = collection(&store);
    let shared = animals.snapshot_changes(ListenConfig::new()).unwrap();
    let mut a = shared.subscribe();
    let mut b = shared.subscribe();
    value(&mut a);
    assert!(poll(&mut b).is_none());

    store.deliver_raw(tick(vec![raw("renamed", "a", None)]));
    assert!(matches!(poll(&mut a), Some(Some(Err(e))) if e.is_malformed()));
    assert!(matches!(poll(&mut b), Some(Some(Err(e))) if e.is_malformed()));
    assert_eq!(poll(&mut a), Some(None));
    assert_eq!(store.listener_stats().active, 0);
}

// ─── Multicast and lifecycle ──────────────────────────────────────────────────

#[test]
fn two_observers_share_one_registration() {
    let store = store();
    let animals = collection(&store);
    let shared = animals.snapshot_changes(ListenConfig::new()).unwrap();
    let mut a = shared.subscribe();
    let mut b = shared.subscribe();
    value(&mut a);
    assert!(poll(&mut b).is_none());
    assert_eq!(store.listener_stats().registrations, 1);

    store.write_batch(&[WriteOp::set("a", ranked(1))]).unwrap();
    assert_eq!(value(&mut a), value(&mut b));
    assert_eq!(store.listener_stats().registrations, 1);
}

#[test]
fn late_observer_sees_only_later_values() {
    let store = store();
    let animals = collection(&store);
    let shared = animals.state_changes(ListenConfig::new()).unwrap();
    let mut early = shared.subscribe();
    assert!(poll(&mut early).is_none());

    store.write_batch(&[WriteOp::set("a", ranked(1))]).unwrap();
    assert_eq!(value(&mut early).len(), 1);

    let mut late = shared.subscribe();
    assert!(poll(&mut late).is_none());
    store.write_batch(&[WriteOp::set("b", ranked(2))]).unwrap();
    let batch = value(&mut late);
    assert_eq!(batch[0].id(), "b");
    assert_eq!(value(&mut early), batch);
}

#[test]
fn subscribe_then_unsubscribe_before_registration_never_registers() {
    let store = store();
    let scheduler = Arc::new(ManualScheduler::new());
    let animals = Collection::from_store(Arc::clone(&store)).with_scheduler(scheduler.clone());
    let shared = animals.snapshot_changes(ListenConfig::new()).unwrap();

    let mut sub = shared.subscribe();
    assert!(poll(&mut sub).is_none());
    drop(sub);
    scheduler.run_pending();

    let stats = store.listener_stats();
    assert_eq!(stats.registrations, 0);
    assert_eq!(stats.deregistrations, 0);
}

#[test]
fn last_observer_leaving_tears_down_and_resubscribe_resyncs() {
    let store = store();
    store.write_batch(&[WriteOp::set("a", ranked(1))]).unwrap();
    let animals = collection(&store);
    let shared = animals.snapshot_changes(ListenConfig::new()).unwrap();

    let mut a = shared.subscribe();
    let mut b = shared.subscribe();
    value(&mut a);
    assert!(poll(&mut b).is_none());
    drop(a);
    assert_eq!(store.listener_stats().active, 1);
    drop(b);
    let stats = store.listener_stats();
    assert_eq!(stats.active, 0);
    assert_eq!(stats.deregistrations, 1);

    store.write_batch(&[WriteOp::set("b", ranked(2))]).unwrap();
    let mut c = shared.subscribe();
    assert_eq!(ids(&value(&mut c)), ["a", "b"]);
    assert_eq!(store.listener_stats().registrations, 2);
}

#[test]
fn source_error_reaches_all_observers_once() {
    let store = store();
    let animals = collection(&store);
    let shared = animals.state_changes(ListenConfig::new()).unwrap();
    let mut a = shared.subscribe();
    let mut b = shared.subscribe();
    assert!(poll(&mut a).is_none());
    assert!(poll(&mut b).is_none());

    store.fail_listeners(SourceError::PermissionDenied("rules".into()));
    let expected = StreamError::Source(SourceError::PermissionDenied("rules".into()));
    assert_eq!(poll(&mut a), Some(Some(Err(expected.clone()))));
    assert_eq!(poll(&mut b), Some(Some(Err(expected))));
    assert_eq!(poll(&mut b), Some(None));

    drop(a);
    drop(b);
    assert_eq!(store.listener_stats().deregistrations, 1);
}

// ─── Filtering and accumulation ───────────────────────────────────────────────

#[test]
fn removed_only_filter_suppresses_other_batches() {
    let store = store();
    let animals = collection(&store);
    let config = ListenConfig::new().with_kinds([ChangeKind::Removed]);
    let mut sub = animals.state_changes(config).unwrap().subscribe();
    assert!(poll(&mut sub).is_none());

    store.write_batch(&[WriteOp::set("a", ranked(1))]).unwrap();
    store.write_batch(&[WriteOp::update("a", ranked(5))]).unwrap();
    assert!(poll(&mut sub).is_none());

    store.write_batch(&[WriteOp::delete("a")]).unwrap();
    let batch = value(&mut sub);
    assert_eq!(batch.len(), 1);
    assert_eq!(batch[0].kind, ChangeKind::Removed);
}

#[test]
fn audit_trail_grows_monotonically() {
    let store = store();
    let animals = collection(&store);
    let mut sub = animals.audit_trail(ListenConfig::new()).unwrap().subscribe();
    assert!(poll(&mut sub).is_none());

    store.write_batch(&[WriteOp::set("a", ranked(1))]).unwrap();
    store.write_batch(&[WriteOp::set("b", ranked(2)), WriteOp::delete("a")]).unwrap();

    let first = value(&mut sub);
    let second = value(&mut sub);
    assert_eq!(first.len(), 1);
    assert_eq!(&second[..1], &first[..]);
    let kinds: Vec<_> = second.iter().map(|a| a.kind).collect();
    assert_eq!(kinds, [ChangeKind::Added, ChangeKind::Removed, ChangeKind::Added]);
}

#[test]
fn doc_changes_report_every_tick() {
    let store = store();
    let animals = collection(&store);
    let mut sub = animals.doc_changes(ListenConfig::new()).unwrap().subscribe();
    assert!(value(&mut sub).is_empty());

    store.write_batch(&[WriteOp::set("a", ranked(1))]).unwrap();
    let batch = value(&mut sub);
    assert_eq!(batch[0].kind, ChangeKind::Added);
    assert_eq!(batch[0].ordering_hint, None);
}

#[test]
fn value_changes_emit_data_in_order() {
    let store = store();
    store
        .write_batch(&[WriteOp::set("b", ranked(2)), WriteOp::set("a", ranked(1))])
        .unwrap();
    let animals = collection(&store);
    let mut sub = animals.value_changes(ListenConfig::new()).unwrap().subscribe();
    assert_eq!(value(&mut sub), vec![ranked(1), ranked(2)]);
}

// ─── One-shot reads and capabilities ──────────────────────────────────────────

#[tokio::test]
async fn get_once_reads_without_registering() {
    let store = store();
    store
        .write_batch(&[WriteOp::set("b", ranked(2)), WriteOp::set("a", ranked(1))])
        .unwrap();
    let animals = collection(&store);

    let docs = animals.get_once().await.unwrap();
    assert_eq!(ids(&docs), ["a", "b"]);
    let stats = store.listener_stats();
    assert_eq!(stats.one_shot_reads, 1);
    assert_eq!(stats.registrations, 0);
    assert_eq!(stats.deregistrations, 0);
}

#[test]
fn one_shot_stream_completes_after_one_emission() {
    let store = store();
    store.write_batch(&[WriteOp::set("a", ranked(1))]).unwrap();
    let animals = collection(&store);
    let mut sub = animals
        .snapshot_changes(ListenConfig::new().mode(ListenMode::OneShot))
        .unwrap()
        .subscribe();
    assert_eq!(ids(&value(&mut sub)), ["a"]);
    assert_eq!(poll(&mut sub), Some(None));
}

#[test]
fn unsupported_mode_is_a_synchronous_usage_error() {
    let store = Arc::new(
        MemoryCollection::new("animals", OrderBy::id())
            .with_capabilities(StoreCapabilities::one_shot_only()),
    );
    let animals = collection(&store);
    let err = animals.snapshot_changes(ListenConfig::new()).err();
    assert_eq!(
        err,
        Some(UsageError::UnsupportedMode {
            mode: "continuous".into()
        })
    );
    assert!(animals.state_changes(ListenConfig::once()).is_ok());
}

// ─── Writes ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn writes_accept_every_target_kind() {
    let store = store();
    let animals = collection(&store);

    let pushed = animals.push(ranked(1)).await.unwrap();
    animals.set("b", ranked(2)).await.unwrap();
    animals.update(pushed.clone(), ranked(3)).await.unwrap();
    animals
        .update(DocumentSnapshot::new("b", DocumentData::new()), data(json!({"legs": 6})))
        .await
        .unwrap();

    let docs = store.documents();
    assert_eq!(docs[0].id.as_deref(), Some("b"));
    assert_eq!(docs[0].data["legs"], json!(6));
    assert_eq!(docs[1].data["rank"], json!(3));

    let foreign = DocumentRef::new("plants", "b");
    assert_eq!(
        animals.remove(Some(foreign.into())).await,
        Err(WriteError::ForeignReference {
            path: "plants".into(),
            id: "b".into(),
            collection: "animals".into(),
        })
    );

    animals.remove(Some(animals.doc("b").into())).await.unwrap();
    assert_eq!(store.len(), 1);
    animals.remove(None).await.unwrap();
    assert!(store.is_empty());
}

// ─── Lazy initialisation ──────────────────────────────────────────────────────

#[test]
fn lazy_collection_initialises_on_first_poll() {
    let store = store();
    store.write_batch(&[WriteOp::set("a", ranked(1))]).unwrap();
    let backing = Arc::clone(&store);
    let lazy = LazyCollection::new(move || {
        let backing = Arc::clone(&backing);
        async move { Ok::<_, std::convert::Infallible>(collection(&backing)) }
    });

    let shared = lazy.snapshot_changes(ListenConfig::new());
    let mut sub = shared.subscribe();
    assert!(!lazy.is_initialized());

    assert_eq!(ids(&value(&mut sub)), ["a"]);
    assert!(lazy.is_initialized());
    assert_eq!(store.listener_stats().registrations, 1);
}

#[test]
fn lazy_collection_reports_init_failure_through_the_stream() {
    let lazy = LazyCollection::new(|| async { Err::<Collection, _>("no credentials") });
    let mut sub = lazy.state_changes(ListenConfig::new()).subscribe();
    assert_eq!(
        poll(&mut sub),
        Some(Some(Err(StreamError::Initialization("no credentials".into()))))
    );
    assert_eq!(poll(&mut sub), Some(None));
    assert!(!lazy.is_initialized());
}
