//! A helper layer for GraphQL execution engines: every field resolution goes
//! through the [`ProxyResolver`], which consults the per-request
//! [`OperationContext`] for deferred fields and previous-pass results,
//! dispatches [`extensions`] around the real resolver and cooperates with
//! the `dataloader` crate for batched data access.

mod clock;
mod error;
mod execution;
pub mod extensions;
mod resolver;
mod response;

pub use clock::Clock;
pub use error::{ExecutionError, ExecutionResult, GraphqlError};
pub use execution::{DeferredField, OperationContext, ResultCache};
pub use resolver::{
    DirectiveInvocation, FieldInfo, FieldResolution, FieldResolver, ProxyResolver, ResolverFn,
    ResolverInput,
};
pub use response::{ResponsePath, ResponsePathSegment, SourceValue};
