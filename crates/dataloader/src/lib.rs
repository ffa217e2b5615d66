//! Batching strategy explained here.
//!
//! A [`BatchLoader`] collects the identifiers requested by the resolvers of
//! one request and fetches them in a single round-trip. `load` only queues an
//! identifier and hands back a deferred handle; the first handle to be
//! awaited flushes everything queued so far through the fetch function and
//! distributes the results, so sibling fields asking for `user(id: 1)` and
//! `user(id: 2)` cost one fetch instead of two.
//!
//! Loaders are strictly per-request state. The [`LoaderRegistry`] keys them
//! by name so that the same loader instance is reused across the depths of
//! one query tree, never across requests.

mod error;
mod fetch;
mod loader;
mod registry;
mod request;

pub use error::{LoadError, LoadResult};
pub use fetch::{BatchExecutor, FetchFn, Fetcher};
pub use loader::{BatchLoader, LoadFuture};
pub use registry::LoaderRegistry;
pub use request::{Identifiable, LoadId, LoadRequest};
