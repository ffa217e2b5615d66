//! Cross-cutting observers of one execution.
//!
//! Extensions are constructed fresh for every request from long-lived
//! factories, ordered by ascending priority and invoked at three lifecycle
//! points: once at `start`, once per resolved field and once at `end`.
//! Whatever they collected is serialized into the response's `extensions`
//! map at the end.

mod deprecation;
mod query_cost;
mod trace;

use std::{sync::Arc, time::Duration};

use serde_json::Value;

pub use deprecation::DeprecationExtension;
pub use query_cost::QueryCostExtension;
pub use trace::TracingExtension;

use crate::{
    clock::Clock, error::GraphqlError, resolver::DirectiveInvocation, response::ResponsePath,
};

/// Observer returned by a `visit_field` hook, invoked once the field
/// settles. Callbacks run in reverse extension order, so the
/// first-registered extension wraps everything the later ones do.
pub type ResolveCallback = Box<dyn FnOnce(Result<&Value, &GraphqlError>) + Send>;

/// Failure raised by an extension hook.
///
/// Hook failures are isolated: the dispatcher logs them and carries on, so
/// one broken extension never costs the others their lifecycle calls.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{0}")]
pub struct ExtensionError(pub String);

impl From<String> for ExtensionError {
    fn from(message: String) -> Self {
        ExtensionError(message)
    }
}

impl From<&str> for ExtensionError {
    fn from(message: &str) -> Self {
        ExtensionError(message.to_string())
    }
}

/// Event handed to `on_start`.
pub struct ExecutionStart<'a> {
    pub operation_name: Option<&'a str>,
    /// The request clock; extensions that stamp time keep a clone of it.
    pub clock: &'a Clock,
}

/// Event handed to `on_end`.
pub struct ExecutionEnd<'a> {
    pub operation_name: Option<&'a str>,
    pub duration: Duration,
}

/// Event handed to `visit_field`, once per proxied field resolution.
pub struct FieldVisit<'a> {
    pub path: &'a ResponsePath,
    pub field_name: &'a str,
    pub parent_type: &'a str,
    pub return_type: &'a str,
    pub deprecation_reason: Option<&'a str>,
    pub directives: &'a [DirectiveInvocation],
    pub pass: u32,
}

/// Context for deciding and producing the serialized result entry.
pub struct SerializeContext<'a> {
    pub operation_name: Option<&'a str>,
    /// Whether diagnostic output (e.g. traces) was requested for this
    /// response.
    pub include_diagnostics: bool,
}

/// A cross-cutting observer of one execution.
///
/// Every hook has a no-op default, so an extension only overrides the
/// lifecycle points it cares about. Extensions are stateful and never shared
/// across requests; state consulted from settle callbacks lives behind a
/// mutex inside the extension.
pub trait Extension: Send + Sync {
    /// Key under which this extension appears in the response `extensions`
    /// map.
    fn key(&self) -> &str;

    /// Dispatch position: ascending order, stable for ties.
    fn priority(&self) -> i32 {
        0
    }

    fn is_enabled(&self) -> bool {
        true
    }

    fn on_start(&self, _event: &ExecutionStart<'_>) -> Result<(), ExtensionError> {
        Ok(())
    }

    fn on_end(&self, _event: &ExecutionEnd<'_>) -> Result<(), ExtensionError> {
        Ok(())
    }

    fn visit_field(
        &self,
        _event: &FieldVisit<'_>,
    ) -> Result<Option<ResolveCallback>, ExtensionError> {
        Ok(None)
    }

    fn is_visible_in_result(&self, _ctx: &SerializeContext<'_>) -> bool {
        true
    }

    fn serialize(&self) -> Result<Value, serde_json::Error>;
}

/// Builds a fresh extension instance for each execution.
pub trait ExtensionFactory: Send + Sync {
    fn create(&self) -> Box<dyn Extension>;
}

impl<F> ExtensionFactory for F
where
    F: Fn() -> Box<dyn Extension> + Send + Sync,
{
    fn create(&self) -> Box<dyn Extension> {
        self()
    }
}

/// The ordered, per-request extension set.
pub struct Extensions {
    extensions: Vec<Box<dyn Extension>>,
}

impl Default for Extensions {
    fn default() -> Self {
        Self::empty()
    }
}

impl Extensions {
    pub fn empty() -> Self {
        Extensions {
            extensions: Vec::new(),
        }
    }

    /// Instantiates every factory, drops instances that report themselves
    /// disabled and orders the rest by ascending priority. The sort is
    /// stable: equal priorities keep factory order.
    pub fn from_factories(factories: &[Arc<dyn ExtensionFactory>]) -> Self {
        let mut extensions: Vec<_> = factories
            .iter()
            .map(|factory| factory.create())
            .filter(|extension| extension.is_enabled())
            .collect();
        extensions.sort_by_key(|extension| extension.priority());
        Extensions { extensions }
    }

    pub fn len(&self) -> usize {
        self.extensions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.extensions.is_empty()
    }

    pub fn dispatch_start(&self, event: &ExecutionStart<'_>) {
        for extension in &self.extensions {
            if let Err(error) = extension.on_start(event) {
                tracing::warn!(extension = extension.key(), %error, "extension start hook failed");
            }
        }
    }

    pub fn dispatch_end(&self, event: &ExecutionEnd<'_>) {
        for extension in &self.extensions {
            if let Err(error) = extension.on_end(event) {
                tracing::warn!(extension = extension.key(), %error, "extension end hook failed");
            }
        }
    }

    /// Runs the `visit_field` pre-hooks in priority order and collects the
    /// callbacks they return into one guard for the field.
    pub fn will_resolve_field(&self, event: &FieldVisit<'_>) -> FieldGuard {
        let mut callbacks = Vec::new();
        for extension in &self.extensions {
            match extension.visit_field(event) {
                Ok(Some(callback)) => callbacks.push(callback),
                Ok(None) => {}
                Err(error) => {
                    tracing::warn!(extension = extension.key(), %error, "extension field hook failed");
                }
            }
        }
        FieldGuard { callbacks }
    }

    /// One entry per visible extension. A serialization failure degrades to
    /// a placeholder string for that key only, it never fails the response.
    pub fn serialize_for_result(&self, ctx: &SerializeContext<'_>) -> serde_json::Map<String, Value> {
        let mut output = serde_json::Map::new();
        for extension in &self.extensions {
            if !extension.is_visible_in_result(ctx) {
                continue;
            }
            let value = match extension.serialize() {
                Ok(value) => value,
                Err(error) => {
                    tracing::warn!(extension = extension.key(), %error, "extension serialization failed");
                    Value::String(format!("extension failed to serialize: {error}"))
                }
            };
            output.insert(extension.key().to_string(), value);
        }
        output
    }
}

/// Post-resolution callbacks collected for one field, settled exactly once.
pub struct FieldGuard {
    callbacks: Vec<ResolveCallback>,
}

impl FieldGuard {
    /// Runs the callbacks in reverse collection order: the first-registered
    /// extension observes the settled field last, wrapping the others.
    pub fn settle(self, outcome: Result<&Value, &GraphqlError>) {
        for callback in self.callbacks.into_iter().rev() {
            callback(outcome);
        }
    }
}
