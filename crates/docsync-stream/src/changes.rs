//! Change pipelines: the stages between raw snapshots and what consumers see.
//!
//! Every pipeline takes a stream of [`QuerySnapshot`]s (one item per native
//! tick) and folds it through some per-run state. State lives inside the
//! returned stream, so it is created when the stream starts and discarded
//! when the stream is dropped. The first error ends the pipeline.

use docsync_core::{
    classify_all, classify_batch, AuditLog, ChangeAction, ChangeFilter, DocumentData,
    OrderedDocument, ProjectionState, QuerySnapshot, SortedProjection, StreamError,
};
use futures::future;
use futures::stream::BoxStream;
use futures::{Stream, StreamExt};

/// Result of one pipeline step: `Ok(None)` means "nothing to emit this tick".
type Step<T> = Result<Option<T>, StreamError>;

/// Fold `source` through `state`, dropping suppressed ticks and ending after
/// the first error.
fn pipeline<S, St, T, F>(source: S, state: St, mut step: F) -> BoxStream<'static, Result<T, StreamError>>
where
    S: Stream<Item = Result<QuerySnapshot, StreamError>> + Send + 'static,
    St: Send + 'static,
    T: Send + 'static,
    F: FnMut(&mut St, Result<QuerySnapshot, StreamError>) -> Step<T> + Send + 'static,
{
    source
        .scan((state, false), move |(state, failed), item| {
            if *failed {
                return future::ready(None);
            }
            let out = match step(state, item) {
                Ok(emit) => Some(emit.map(Ok)),
                Err(err) => {
                    *failed = true;
                    Some(Some(Err(err)))
                }
            };
            future::ready(out)
        })
        .filter_map(future::ready)
        .boxed()
}

/// Every tick as classified actions, unfiltered and unsorted.
pub fn doc_changes<S>(source: S) -> BoxStream<'static, Result<Vec<ChangeAction>, StreamError>>
where
    S: Stream<Item = Result<QuerySnapshot, StreamError>> + Send + 'static,
{
    pipeline(source, (), |_, item| Ok(Some(classify_all(&item?)?)))
}

/// Classified actions restricted to `filter`. Ticks with nothing left after
/// filtering are not emitted.
pub fn state_changes<S>(
    source: S,
    filter: ChangeFilter,
) -> BoxStream<'static, Result<Vec<ChangeAction>, StreamError>>
where
    S: Stream<Item = Result<QuerySnapshot, StreamError>> + Send + 'static,
{
    pipeline(source, filter, |filter, item| classify_batch(&item?, filter))
}

/// The accumulated history of [`state_changes`]: each emission is every
/// action seen so far, in arrival order.
pub fn audit_trail<S>(
    source: S,
    filter: ChangeFilter,
) -> BoxStream<'static, Result<Vec<ChangeAction>, StreamError>>
where
    S: Stream<Item = Result<QuerySnapshot, StreamError>> + Send + 'static,
{
    pipeline(source, (filter, AuditLog::new()), |(filter, log), item| {
        let batch = classify_batch(&item?, filter)?;
        Ok(batch.map(|actions| log.extend(actions).to_vec()))
    })
}

struct Sorted {
    projection: SortedProjection,
    filter: ChangeFilter,
}

impl Sorted {
    fn step(&mut self, item: Result<QuerySnapshot, StreamError>) -> Step<Vec<OrderedDocument>> {
        let result = item.and_then(|snapshot| self.apply(&snapshot));
        if result.is_err() {
            self.projection.dispose();
        }
        result
    }

    fn apply(&mut self, snapshot: &QuerySnapshot) -> Step<Vec<OrderedDocument>> {
        let initial = self.projection.state() == ProjectionState::Empty;
        let mut actions = classify_all(snapshot)?;
        actions.retain(|action| self.filter.matches(action.kind));

        // The initial tick is always emitted so consumers learn the starting
        // state, even when it is empty.
        if actions.is_empty() && !initial {
            return Ok(None);
        }
        Ok(Some(self.projection.apply(&actions)?.to_vec()))
    }
}

/// The collection in query order, re-emitted in full after every tick that
/// changed it.
pub fn sorted_changes<S>(
    source: S,
    filter: ChangeFilter,
) -> BoxStream<'static, Result<Vec<OrderedDocument>, StreamError>>
where
    S: Stream<Item = Result<QuerySnapshot, StreamError>> + Send + 'static,
{
    let state = Sorted {
        projection: SortedProjection::new(),
        filter,
    };
    pipeline(source, state, Sorted::step)
}

/// [`sorted_changes`] without document ids.
pub fn value_changes<S>(
    source: S,
    filter: ChangeFilter,
) -> BoxStream<'static, Result<Vec<DocumentData>, StreamError>>
where
    S: Stream<Item = Result<QuerySnapshot, StreamError>> + Send + 'static,
{
    sorted_changes(source, filter)
        .map(|item| item.map(|docs| docs.into_iter().map(|doc| doc.data).collect()))
        .boxed()
}
