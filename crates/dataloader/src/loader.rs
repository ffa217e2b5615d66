use std::{
    fmt,
    future::{Future, IntoFuture},
    mem,
    pin::Pin,
    sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError},
    task::{Context, Poll},
    time::Duration,
};

use futures::future::BoxFuture;
use futures_util::lock::Mutex as AsyncMutex;
use serde_json::Value;
use web_time::Instant;

use crate::{
    error::{LoadError, LoadResult},
    fetch::Fetcher,
    request::{LoadId, LoadRequest},
};

type Slot = Arc<OnceLock<LoadResult<Value>>>;

struct QueuedLoad {
    identifier: LoadId,
    slot: Slot,
}

struct LoaderState {
    queued: Vec<QueuedLoad>,
    batch_settled: bool,
    load_durations: Vec<Duration>,
}

struct Inner {
    fetcher: Fetcher,
    key_field: String,
    state: Mutex<LoaderState>,
    // Serializes flushes. Held across the fetch itself, which is what keeps
    // the fetch-exactly-once guarantee for concurrent awaiters: whoever
    // loses the race finds its slot already filled.
    flush: AsyncMutex<()>,
}

/// Per-request batching loader.
///
/// `load` queues an identifier and returns a deferred [`LoadFuture`]; the
/// first handle of a batch to be awaited takes everything queued so far,
/// invokes the fetcher exactly once with that set and distributes the
/// results into every queued handle. Once a batch has settled, the next
/// `load` starts a fresh batch, so one loader instance can be reused across
/// the layers of a query tree without cross-layer contamination.
///
/// Clones share the same queue and batch state.
///
/// The fetcher must not call `load` on its own loader: flushes are
/// serialized, so a re-entrant load would wait on its own batch forever.
#[derive(Clone)]
pub struct BatchLoader {
    inner: Arc<Inner>,
}

impl BatchLoader {
    pub fn new(fetcher: Fetcher) -> Self {
        Self::with_key_field(fetcher, "id")
    }

    /// `key_field` names the identifier field extracted from structured
    /// items queued into this loader.
    pub fn with_key_field(fetcher: Fetcher, key_field: impl Into<String>) -> Self {
        BatchLoader {
            inner: Arc::new(Inner {
                fetcher,
                key_field: key_field.into(),
                state: Mutex::new(LoaderState {
                    queued: Vec::new(),
                    batch_settled: false,
                    load_durations: Vec::new(),
                }),
                flush: AsyncMutex::new(()),
            }),
        }
    }

    /// Queues one identifier for the current batch and returns its deferred
    /// handle. Fails fast, before queuing anything, when a structured item
    /// carries no usable identifier.
    pub fn load(&self, request: impl Into<LoadRequest>) -> LoadResult<LoadFuture> {
        let identifier = request.into().into_id(&self.inner.key_field)?;
        let mut state = self.inner.state();
        if state.batch_settled {
            // A settled batch can't accept identifiers anymore; start a
            // fresh one.
            state.queued.clear();
            state.batch_settled = false;
        }
        let slot: Slot = Arc::new(OnceLock::new());
        state.queued.push(QueuedLoad {
            identifier: identifier.clone(),
            slot: Arc::clone(&slot),
        });
        Ok(LoadFuture {
            loader: Arc::clone(&self.inner),
            identifier,
            slot,
        })
    }

    /// `load` mapped over every request, failing fast on the first bad one.
    pub fn load_many<I>(&self, requests: I) -> LoadResult<Vec<LoadFuture>>
    where
        I: IntoIterator,
        I::Item: Into<LoadRequest>,
    {
        requests.into_iter().map(|request| self.load(request)).collect()
    }

    /// Durations of every flush this loader performed.
    pub fn load_durations(&self) -> Vec<Duration> {
        self.inner.state().load_durations.clone()
    }
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, LoaderState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn flush_batch(&self) {
        let batch = {
            let mut state = self.state();
            state.batch_settled = true;
            mem::take(&mut state.queued)
        };
        if batch.is_empty() {
            return;
        }
        let identifiers: Vec<LoadId> = batch
            .iter()
            .map(|queued| queued.identifier.clone())
            .collect();
        let started = Instant::now();
        let outcome = self.fetcher.run(identifiers).await;
        let elapsed = started.elapsed();
        self.state().load_durations.push(elapsed);
        #[cfg(feature = "tracing")]
        tracing::debug!(
            batch_size = batch.len(),
            duration_ms = elapsed.as_millis() as u64,
            failed = outcome.is_err(),
            "flushed batch"
        );
        match outcome {
            Ok(results) => {
                for queued in batch {
                    let value = results
                        .get(&queued.identifier)
                        .or_else(|| {
                            queued
                                .identifier
                                .alternate()
                                .and_then(|alternate| results.get(&alternate))
                        })
                        .cloned()
                        // No entry for this identifier resolves to the
                        // loader default.
                        .unwrap_or(Ok(Value::Null));
                    let _ = queued.slot.set(value);
                }
            }
            Err(error) => {
                for queued in batch {
                    let _ = queued.slot.set(Err(error.clone()));
                }
            }
        }
    }
}

/// Deferred handle to one queued identifier.
///
/// Awaiting the first handle of a batch flushes the whole batch; every
/// other handle of that batch resolves from the stored result without
/// another fetch.
pub struct LoadFuture {
    loader: Arc<Inner>,
    identifier: LoadId,
    slot: Slot,
}

impl fmt::Debug for LoadFuture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadFuture")
            .field("identifier", &self.identifier)
            .finish_non_exhaustive()
    }
}

impl LoadFuture {
    pub fn identifier(&self) -> &LoadId {
        &self.identifier
    }

    async fn resolve(self) -> LoadResult<Value> {
        if let Some(outcome) = self.slot.get() {
            return outcome.clone();
        }
        // Yield once so every sibling scheduled in the same round gets to
        // enqueue its identifier before the batch is taken.
        YieldOnce::default().await;
        if let Some(outcome) = self.slot.get() {
            return outcome.clone();
        }
        let _flush = self.loader.flush.lock().await;
        if let Some(outcome) = self.slot.get() {
            // Another handle of this batch flushed while we waited.
            return outcome.clone();
        }
        self.loader.flush_batch().await;
        match self.slot.get() {
            Some(outcome) => outcome.clone(),
            // Every slot queued at take time is filled by the flush we just
            // ran, so this handle was no longer part of any batch.
            None => Err(LoadError::batch_fetch(format!(
                "identifier `{}` was not part of the flushed batch",
                self.identifier
            ))),
        }
    }
}

impl IntoFuture for LoadFuture {
    type Output = LoadResult<Value>;
    type IntoFuture = BoxFuture<'static, Self::Output>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(self.resolve())
    }
}

#[derive(Default)]
struct YieldOnce(bool);

impl Future for YieldOnce {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.0 {
            Poll::Ready(())
        } else {
            self.0 = true;
            cx.waker().wake_by_ref();
            Poll::Pending
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering::Relaxed};

    use futures::future::join_all;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::fetch::BatchExecutor;
    use std::collections::HashMap;

    fn counting_fetcher(calls: Arc<AtomicUsize>) -> Fetcher {
        Fetcher::function(move |_ids| {
            calls.fetch_add(1, Relaxed);
            async { Ok(json!({"1": "test", "2": "other"})) }
        })
    }

    fn recording_fetcher(calls: Arc<Mutex<Vec<Vec<LoadId>>>>) -> Fetcher {
        Fetcher::function(move |ids| {
            calls.lock().unwrap().push(ids.clone());
            async move {
                let mut entries = serde_json::Map::new();
                for id in ids {
                    entries.insert(id.to_string(), json!(format!("value-{id}")));
                }
                Ok(Value::Object(entries))
            }
        })
    }

    #[tokio::test]
    async fn duplicate_identifiers_share_one_fetch() {
        let calls = Arc::new(AtomicUsize::new(0));
        let loader = BatchLoader::new(counting_fetcher(Arc::clone(&calls)));

        let first = loader.load(2).unwrap();
        let second = loader.load(2).unwrap();
        assert_eq!(first.await.unwrap(), json!("other"));
        assert_eq!(calls.load(Relaxed), 1);

        // The second handle of the settled batch resolves from the stored
        // result.
        assert_eq!(second.await.unwrap(), json!("other"));
        assert_eq!(calls.load(Relaxed), 1);
    }

    #[tokio::test]
    async fn load_after_settled_batch_fetches_again() {
        let calls = Arc::new(AtomicUsize::new(0));
        let loader = BatchLoader::new(counting_fetcher(Arc::clone(&calls)));

        assert_eq!(loader.load(2).unwrap().await.unwrap(), json!("other"));
        assert_eq!(calls.load(Relaxed), 1);

        assert_eq!(loader.load(2).unwrap().await.unwrap(), json!("other"));
        assert_eq!(calls.load(Relaxed), 2);
    }

    #[tokio::test]
    async fn concurrent_awaits_collapse_into_one_fetch() {
        let calls = Arc::new(AtomicUsize::new(0));
        let loader = BatchLoader::new(counting_fetcher(Arc::clone(&calls)));

        let handles = loader.load_many([1, 2, 1, 2, 1]).unwrap();
        let values = join_all(handles.into_iter().map(IntoFuture::into_future)).await;

        assert_eq!(calls.load(Relaxed), 1);
        assert_eq!(
            values.into_iter().collect::<LoadResult<Vec<_>>>().unwrap(),
            vec![
                json!("test"),
                json!("other"),
                json!("test"),
                json!("other"),
                json!("test")
            ]
        );
    }

    #[tokio::test]
    async fn fresh_batch_only_fetches_its_own_identifiers() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let loader = BatchLoader::new(recording_fetcher(Arc::clone(&calls)));

        let first = loader.load_many([1, 2, 3]).unwrap();
        join_all(first.into_iter().map(IntoFuture::into_future)).await;

        let second = loader.load_many([1, 4]).unwrap();
        join_all(second.into_iter().map(IntoFuture::into_future)).await;

        let recorded = calls.lock().unwrap().clone();
        assert_eq!(
            recorded,
            vec![
                vec![LoadId::Int(1), LoadId::Int(2), LoadId::Int(3)],
                vec![LoadId::Int(1), LoadId::Int(4)],
            ]
        );
    }

    #[tokio::test]
    async fn missing_entry_resolves_to_null() {
        let loader = BatchLoader::new(counting_fetcher(Arc::new(AtomicUsize::new(0))));
        assert_eq!(loader.load(99).unwrap().await.unwrap(), Value::Null);
    }

    #[tokio::test]
    async fn batch_failure_reaches_every_consumer() {
        let loader = BatchLoader::new(Fetcher::function(|_ids| async {
            Err(LoadError::batch_fetch("backend unreachable"))
        }));

        let handles = loader.load_many([1, 2]).unwrap();
        for handle in handles {
            assert_eq!(
                handle.await.unwrap_err(),
                LoadError::batch_fetch("backend unreachable")
            );
        }
    }

    #[tokio::test]
    async fn null_batch_result_is_a_hard_failure() {
        let loader = BatchLoader::new(Fetcher::function(|_ids| async { Ok(Value::Null) }));

        let handles = loader.load_many([1, 2]).unwrap();
        for handle in handles {
            assert_eq!(handle.await.unwrap_err(), LoadError::NullBatchResult);
        }
    }

    #[tokio::test]
    async fn per_item_errors_only_fail_their_own_consumer() {
        struct FlakyBackend;

        #[async_trait::async_trait]
        impl BatchExecutor for FlakyBackend {
            async fn fetch(
                &self,
                identifiers: Vec<LoadId>,
            ) -> LoadResult<HashMap<LoadId, LoadResult<Value>>> {
                Ok(identifiers
                    .into_iter()
                    .map(|id| match id {
                        LoadId::Int(2) => (id, Err(LoadError::item("row 2 is corrupted"))),
                        _ => (id, Ok(json!("test"))),
                    })
                    .collect())
            }
        }

        let loader = BatchLoader::new(Fetcher::executor(FlakyBackend));
        let handles = loader.load_many([1, 2]).unwrap();
        let mut values = join_all(handles.into_iter().map(IntoFuture::into_future)).await;

        assert_eq!(values.remove(0).unwrap(), json!("test"));
        assert_eq!(values.remove(0).unwrap_err(), LoadError::item("row 2 is corrupted"));
    }

    #[tokio::test]
    async fn missing_identifier_does_not_queue() {
        let calls = Arc::new(AtomicUsize::new(0));
        let loader = BatchLoader::new(counting_fetcher(Arc::clone(&calls)));

        assert_eq!(
            loader.load(json!({"name": "no id here"})).unwrap_err(),
            LoadError::MissingIdentifier { key: "id".to_string() }
        );

        // The failed request left nothing behind for the next flush.
        assert_eq!(loader.load(1).unwrap().await.unwrap(), json!("test"));
        assert_eq!(calls.load(Relaxed), 1);
    }

    #[tokio::test]
    async fn structured_items_use_the_configured_key_field() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let loader =
            BatchLoader::with_key_field(recording_fetcher(Arc::clone(&calls)), "slug");

        let handle = loader.load(json!({"slug": "dog", "id": 1})).unwrap();
        assert_eq!(handle.await.unwrap(), json!("value-dog"));
        assert_eq!(
            calls.lock().unwrap().clone(),
            vec![vec![LoadId::String("dog".to_string())]]
        );
    }

    #[tokio::test]
    async fn flush_durations_are_recorded() {
        let loader = BatchLoader::new(counting_fetcher(Arc::new(AtomicUsize::new(0))));
        assert!(loader.load_durations().is_empty());

        loader.load(1).unwrap().await.unwrap();
        loader.load(2).unwrap().await.unwrap();
        assert_eq!(loader.load_durations().len(), 2);
    }
}
