use std::sync::Arc;

use serde_json::{Map, Value};

use super::{defer, FieldInfo, FieldResolution, FieldResolver, ResolverInput};
use crate::{
    error::GraphqlError,
    execution::OperationContext,
    extensions::{Extensions, FieldVisit},
    response::SourceValue,
};

/// The field-resolution interceptor.
///
/// Owns the request's extension set; the host executor routes every field
/// through [`Self::resolve_field`] instead of invoking resolvers directly.
pub struct ProxyResolver {
    extensions: Extensions,
}

impl ProxyResolver {
    pub fn new(extensions: Extensions) -> Self {
        ProxyResolver { extensions }
    }

    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    /// Proxies one field resolution.
    ///
    /// A field deferred by an earlier pass is resumed with the source data
    /// captured back then. A field already present in the result tree is
    /// replayed as-is: no resolver runs and no extension hook fires, so
    /// replays never double-count. Everything else goes through the
    /// extension pre-hooks, the defer decision and finally the resolver
    /// itself; the collected post-resolution callbacks run once the field
    /// settles, last-registered first.
    pub fn resolve_field(
        &self,
        ctx: &mut OperationContext,
        info: &FieldInfo,
        resolver: &FieldResolver,
        source: SourceValue,
        arguments: Option<Map<String, Value>>,
    ) -> FieldResolution {
        let resumed = ctx.pop_deferred(&info.path);
        let is_resumed = resumed.is_some();
        let source = match resumed {
            Some(deferred) => deferred.source,
            None => {
                if ctx.is_in_result(&info.path) {
                    let value = ctx
                        .get_from_result(&info.path)
                        .cloned()
                        .unwrap_or(Value::Null);
                    return FieldResolution::Ready(Ok(value));
                }
                source
            }
        };

        let arguments = arguments.unwrap_or_default();
        let guard = self.extensions.will_resolve_field(&FieldVisit {
            path: &info.path,
            field_name: &info.field_name,
            parent_type: &info.parent_type,
            return_type: &info.return_type,
            deprecation_reason: info.deprecation_reason.as_deref(),
            directives: &info.directives,
            pass: ctx.current_pass(),
        });

        // A resumed field resolves now no matter what its directives say,
        // otherwise it would postpone itself forever.
        if !is_resumed {
            let decision = defer::evaluate(&info.directives);
            if decision.should_defer && info.deferrable && ctx.can_defer() {
                return match ctx.defer_field(info.path.clone(), decision.label, source) {
                    Ok(()) => {
                        guard.settle(Ok(&Value::Null));
                        FieldResolution::Ready(Ok(Value::Null))
                    }
                    Err(error) => {
                        let error = GraphqlError::from(error).or_path(info.path.clone());
                        guard.settle(Err(&error));
                        FieldResolution::Ready(Err(error))
                    }
                };
            }
        }

        match resolver {
            FieldResolver::Property => {
                let value = source
                    .get_field(&info.field_name)
                    .map(SourceValue::take)
                    .unwrap_or(Value::Null);
                guard.settle(Ok(&value));
                FieldResolution::Ready(Ok(value))
            }
            FieldResolver::Function(function) => {
                let future = function(ResolverInput {
                    source,
                    arguments,
                    path: info.path.clone(),
                    field_name: info.field_name.clone(),
                    loaders: Arc::clone(ctx.loaders()),
                });
                let path = info.path.clone();
                FieldResolution::Pending(Box::pin(async move {
                    let outcome = future.await;
                    match &outcome {
                        Ok(value) => guard.settle(Ok(value)),
                        Err(error) => guard.settle(Err(error)),
                    }
                    outcome.map_err(|error| error.or_path(path))
                }))
            }
        }
    }
}
