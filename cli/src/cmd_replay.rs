//! `docsync replay` — run a write scenario and print stream emissions.
//!
//! Scenario format (JSON):
//! ```json
//! {
//!   "description": "Scores ordered descending",
//!   "collection": "players",
//!   "order_by": { "field": "score", "descending": true },
//!   "ticks": [
//!     [{ "op": "set", "id": "alice", "data": { "score": 10 } }],
//!     [{ "op": "update", "id": "alice", "data": { "score": 30 } }],
//!     [{ "op": "delete", "id": "alice" }]
//!   ]
//! }
//! ```

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::ValueEnum;
use docsync_core::{
    ChangeAction, ChangeFilter, DocumentData, ImmediateScheduler, ListenConfig, OrderedDocument,
};
use docsync_memory::Scenario;
use docsync_stream::{Collection, Multicast, Subscription};
use futures::{FutureExt, StreamExt};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum View {
    /// Sorted collection snapshots
    Snapshot,
    /// Filtered change batches
    State,
    /// Accumulated change log
    Audit,
    /// Document data in query order
    Values,
    /// Unfiltered change batches
    Changes,
}

/// One stream emission, whatever the view.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
enum Emission {
    Documents(Vec<OrderedDocument>),
    Actions(Vec<ChangeAction>),
    Values(Vec<DocumentData>),
}

pub async fn run(file: &Path, view: View, kinds: Option<&str>, as_json: bool) -> Result<()> {
    let json = std::fs::read_to_string(file)
        .with_context(|| format!("cannot read scenario '{}'", file.display()))?;
    let scenario = Scenario::from_json(&json)
        .with_context(|| format!("invalid scenario '{}'", file.display()))?;

    let filter = match kinds {
        Some(list) => ChangeFilter::parse_list(list)?,
        None => ChangeFilter::all(),
    };
    let config = ListenConfig::new().with_filter(filter);

    let store = Arc::new(scenario.collection());
    let collection =
        Collection::from_store(Arc::clone(&store)).with_scheduler(Arc::new(ImmediateScheduler));
    let stream = open(&collection, view, config)?;
    let mut sub = stream.subscribe();

    tracing::info!(
        collection = %scenario.collection,
        ticks = scenario.ticks.len(),
        ?view,
        "Replaying scenario"
    );
    if !as_json {
        if let Some(description) = &scenario.description {
            println!("# {description}");
        }
    }

    drain(&mut sub, None, as_json)?;
    for (i, ops) in scenario.ticks.iter().enumerate() {
        store
            .write_batch(ops)
            .with_context(|| format!("tick {} failed", i + 1))?;
        drain(&mut sub, Some(i + 1), as_json)?;
    }
    drop(sub);

    let stats = store.listener_stats();
    tracing::info!(
        registrations = stats.registrations,
        deregistrations = stats.deregistrations,
        active = stats.active,
        "Replay finished"
    );

    if !as_json {
        let fin = collection.get_once().await?;
        println!("final: {} document(s)", fin.len());
    }
    Ok(())
}

fn open(collection: &Collection, view: View, config: ListenConfig) -> Result<Multicast<Emission>> {
    let stream = match view {
        View::Snapshot => collection.snapshot_changes(config)?.map(Emission::Documents),
        View::State => collection.state_changes(config)?.map(Emission::Actions),
        View::Audit => collection.audit_trail(config)?.map(Emission::Actions),
        View::Values => collection.value_changes(config)?.map(Emission::Values),
        View::Changes => collection.doc_changes(config)?.map(Emission::Actions),
    };
    Ok(stream)
}

/// Print everything the stream has ready after a tick.
fn drain(sub: &mut Subscription<Emission>, tick: Option<usize>, as_json: bool) -> Result<()> {
    while let Some(Some(item)) = sub.next().now_or_never() {
        let emission = item?;
        if as_json {
            let line = serde_json::json!({ "tick": tick.unwrap_or(0), "emission": emission });
            println!("{}", serde_json::to_string(&line)?);
        } else {
            print_human(&emission, tick);
        }
    }
    Ok(())
}

fn print_human(emission: &Emission, tick: Option<usize>) {
    match tick {
        Some(n) => println!("tick {n}:"),
        None => println!("initial:"),
    }
    match emission {
        Emission::Documents(docs) => {
            for (i, doc) in docs.iter().enumerate() {
                println!("  {:>3}. {:<16} {}", i + 1, doc.id, serde_json::Value::Object(doc.data.clone()));
            }
        }
        Emission::Actions(actions) => {
            for action in actions {
                let after = action.ordering_hint.as_deref().unwrap_or("-");
                println!("  {:<9} {:<16} after={after}", action.kind.as_str(), action.id());
            }
        }
        Emission::Values(values) => {
            for value in values {
                println!("  {}", serde_json::Value::Object(value.clone()));
            }
        }
    }
}
