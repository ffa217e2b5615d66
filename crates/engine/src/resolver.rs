//! Field resolution is proxied: the host executor never calls a user
//! resolver directly, it hands every field to [`ProxyResolver::resolve_field`]
//! which decides between replaying a cached value, postponing the field to a
//! later pass and actually running the resolver, with extension hooks
//! wrapped around the real work.

mod defer;
mod proxy;

use std::{future::Future, sync::Arc};

use dataloader::LoaderRegistry;
use futures::future::BoxFuture;
use serde_json::Value;

pub use proxy::ProxyResolver;

use crate::{
    error::GraphqlError,
    response::{ResponsePath, SourceValue},
};

/// One directive attached to the field at its use site, as handed over by
/// the schema layer.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct DirectiveInvocation {
    pub name: String,
    pub arguments: serde_json::Map<String, Value>,
}

impl DirectiveInvocation {
    pub fn new(name: impl Into<String>) -> Self {
        DirectiveInvocation {
            name: name.into(),
            arguments: serde_json::Map::new(),
        }
    }

    pub fn with_argument(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.arguments.insert(key.into(), value.into());
        self
    }
}

/// Static description of the field invocation being resolved.
#[derive(Debug, Clone)]
pub struct FieldInfo {
    pub path: ResponsePath,
    pub field_name: String,
    pub parent_type: String,
    pub return_type: String,
    pub directives: Vec<DirectiveInvocation>,
    pub deprecation_reason: Option<String>,
    /// Whether this invocation may be postponed to a later pass at all,
    /// e.g. false when the transport cannot deliver incremental results.
    pub deferrable: bool,
}

impl FieldInfo {
    pub fn new(
        path: ResponsePath,
        field_name: impl Into<String>,
        parent_type: impl Into<String>,
        return_type: impl Into<String>,
    ) -> Self {
        FieldInfo {
            path,
            field_name: field_name.into(),
            parent_type: parent_type.into(),
            return_type: return_type.into(),
            directives: Vec::new(),
            deprecation_reason: None,
            deferrable: true,
        }
    }

    pub fn with_directive(mut self, directive: DirectiveInvocation) -> Self {
        self.directives.push(directive);
        self
    }

    pub fn with_deprecation(mut self, reason: impl Into<String>) -> Self {
        self.deprecation_reason = Some(reason.into());
        self
    }

    pub fn not_deferrable(mut self) -> Self {
        self.deferrable = false;
        self
    }
}

/// Input handed to a user resolver function.
pub struct ResolverInput {
    pub source: SourceValue,
    pub arguments: serde_json::Map<String, Value>,
    pub path: ResponsePath,
    pub field_name: String,
    /// The request's loader registry, for resolvers that batch their data
    /// access.
    pub loaders: Arc<LoaderRegistry>,
}

pub type ResolverFn =
    Box<dyn Fn(ResolverInput) -> BoxFuture<'static, Result<Value, GraphqlError>> + Send + Sync>;

/// How a field's value is produced.
pub enum FieldResolver {
    /// Structural default: read the field straight off the parent object,
    /// null when absent.
    Property,
    /// User-supplied resolver.
    Function(ResolverFn),
}

impl FieldResolver {
    pub fn function<F, Fut>(resolver: F) -> Self
    where
        F: Fn(ResolverInput) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, GraphqlError>> + Send + 'static,
    {
        FieldResolver::Function(Box::new(move |input| Box::pin(resolver(input))))
    }
}

/// Outcome of proxying one field.
///
/// Planning a field is synchronous; only fields whose resolver actually
/// suspends hand back a future. The host executor plans every sibling first
/// and then awaits the pending ones together, which is what lets one batch
/// collect identifiers across sibling fields.
pub enum FieldResolution {
    /// Settled without suspension.
    Ready(Result<Value, GraphqlError>),
    /// Suspended on a deferred value; await it to settle the field.
    Pending(BoxFuture<'static, Result<Value, GraphqlError>>),
}

impl FieldResolution {
    /// Convenience for callers resolving one field at a time.
    pub async fn into_value(self) -> Result<Value, GraphqlError> {
        match self {
            FieldResolution::Ready(outcome) => outcome,
            FieldResolution::Pending(future) => future.await,
        }
    }
}
