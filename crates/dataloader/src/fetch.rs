use std::collections::HashMap;

use futures::future::BoxFuture;
use serde_json::Value;

use crate::{
    error::{LoadError, LoadResult},
    request::LoadId,
};

/// Dynamic fetch function: receives the whole batch and returns a JSON
/// object mapping each identifier to its value.
pub type FetchFn =
    Box<dyn Fn(Vec<LoadId>) -> BoxFuture<'static, LoadResult<Value>> + Send + Sync>;

/// Typed batch executor capability.
///
/// Entries mapped to an `Err` fail only their own consumers; identifiers
/// absent from the map resolve to the loader default.
#[async_trait::async_trait]
pub trait BatchExecutor: Send + Sync {
    async fn fetch(
        &self,
        identifiers: Vec<LoadId>,
    ) -> LoadResult<HashMap<LoadId, LoadResult<Value>>>;
}

/// How a loader turns a batch of identifiers into values, fixed at loader
/// construction.
pub enum Fetcher {
    Function(FetchFn),
    Executor(Box<dyn BatchExecutor>),
}

impl Fetcher {
    pub fn function<F, Fut>(fetch: F) -> Self
    where
        F: Fn(Vec<LoadId>) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = LoadResult<Value>> + Send + 'static,
    {
        Fetcher::Function(Box::new(move |identifiers| Box::pin(fetch(identifiers))))
    }

    pub fn executor(executor: impl BatchExecutor + 'static) -> Self {
        Fetcher::Executor(Box::new(executor))
    }

    /// Runs one batch. A [`Fetcher::Function`] must hand back a JSON object;
    /// `null` or any other shape means the batch produced no result set at
    /// all, which is a hard failure distinct from an object that is merely
    /// missing some keys.
    pub(crate) async fn run(
        &self,
        identifiers: Vec<LoadId>,
    ) -> LoadResult<HashMap<LoadId, LoadResult<Value>>> {
        match self {
            Fetcher::Function(fetch) => match fetch(identifiers).await? {
                Value::Object(entries) => Ok(entries
                    .into_iter()
                    .map(|(key, value)| (object_key_to_id(key), Ok(value)))
                    .collect()),
                _ => Err(LoadError::NullBatchResult),
            },
            Fetcher::Executor(executor) => executor.fetch(identifiers).await,
        }
    }
}

fn object_key_to_id(key: String) -> LoadId {
    key.parse().map(LoadId::Int).unwrap_or(LoadId::String(key))
}
