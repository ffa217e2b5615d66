mod context;
mod result_cache;

pub use context::{DeferredField, OperationContext};
pub use result_cache::ResultCache;
