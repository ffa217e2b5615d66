use std::collections::HashMap;

use serde_json::Value;

use crate::response::ResponsePath;

/// Per-request cache of already computed response values, addressed by
/// response path, plus a scratch store for cross-pass memoization that is
/// unrelated to the response shape.
///
/// The result tree is replaced between passes, never mutated while one is
/// running; [`super::OperationContext::set_result_data`] enforces that.
#[derive(Debug, Default)]
pub struct ResultCache {
    result: Option<Value>,
    scratch: HashMap<(ResponsePath, String), Value>,
}

impl ResultCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn set_result(&mut self, tree: Value) {
        self.result = Some(tree);
    }

    pub fn result(&self) -> Option<&Value> {
        self.result.as_ref()
    }

    /// True iff a result tree is set and `path` resolves to a defined value
    /// within it. An explicit null counts as defined; a missing key does
    /// not.
    pub fn contains(&self, path: &ResponsePath) -> bool {
        self.get(path).is_some()
    }

    pub fn get(&self, path: &ResponsePath) -> Option<&Value> {
        self.result.as_ref().and_then(|tree| path.lookup(tree))
    }

    /// Stores `value` under `(path, key)` and returns it for chaining.
    pub fn set_scratch(
        &mut self,
        path: &ResponsePath,
        key: impl Into<String>,
        value: Value,
    ) -> &Value {
        let slot = self
            .scratch
            .entry((path.clone(), key.into()))
            .or_insert(Value::Null);
        *slot = value;
        slot
    }

    pub fn get_scratch(&self, path: &ResponsePath, key: &str) -> Option<&Value> {
        self.scratch.get(&(path.clone(), key.to_string()))
    }
}
