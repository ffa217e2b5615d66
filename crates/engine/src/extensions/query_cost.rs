use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use indexmap::IndexMap;
use serde_json::Value;

use super::{Extension, ExtensionError, ExtensionFactory, FieldVisit, ResolveCallback};

const COST_DIRECTIVE: &str = "cost";
const WEIGHT_ARGUMENT: &str = "weight";
const DEFAULT_FIELD_COST: u64 = 1;

/// Accumulates a cost figure for the executed query.
///
/// Each visited field contributes the `weight` argument of its `cost`
/// directive, one when the field carries no directive. The extension only
/// observes and reports; enforcing a budget is the caller's business.
pub struct QueryCostExtension {
    maximum: Option<u64>,
    state: Mutex<CostState>,
}

#[derive(Default)]
struct CostState {
    total: u64,
    by_parent_type: IndexMap<String, u64>,
}

impl QueryCostExtension {
    pub const KEY: &'static str = "cost";

    pub fn new() -> Self {
        QueryCostExtension {
            maximum: None,
            state: Mutex::new(CostState::default()),
        }
    }

    /// Reports `maximum` alongside the accumulated cost.
    pub fn with_maximum(maximum: u64) -> Self {
        QueryCostExtension {
            maximum: Some(maximum),
            state: Mutex::new(CostState::default()),
        }
    }

    pub fn factory() -> Arc<dyn ExtensionFactory> {
        Arc::new(|| Box::new(QueryCostExtension::new()) as Box<dyn Extension>)
    }

    pub fn total(&self) -> u64 {
        self.state().total
    }

    fn state(&self) -> MutexGuard<'_, CostState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for QueryCostExtension {
    fn default() -> Self {
        Self::new()
    }
}

fn field_weight(event: &FieldVisit<'_>) -> u64 {
    event
        .directives
        .iter()
        .find(|directive| directive.name == COST_DIRECTIVE)
        .and_then(|directive| directive.arguments.get(WEIGHT_ARGUMENT))
        .and_then(Value::as_u64)
        .unwrap_or(DEFAULT_FIELD_COST)
}

impl Extension for QueryCostExtension {
    fn key(&self) -> &str {
        Self::KEY
    }

    fn visit_field(
        &self,
        event: &FieldVisit<'_>,
    ) -> Result<Option<ResolveCallback>, ExtensionError> {
        let weight = field_weight(event);
        let mut state = self.state();
        state.total += weight;
        *state
            .by_parent_type
            .entry(event.parent_type.to_string())
            .or_insert(0) += weight;
        Ok(None)
    }

    fn serialize(&self) -> Result<Value, serde_json::Error> {
        let state = self.state();
        let mut output = serde_json::Map::new();
        output.insert("total".to_string(), state.total.into());
        if let Some(maximum) = self.maximum {
            output.insert("maximum".to_string(), maximum.into());
        }
        let by_parent_type: serde_json::Map<String, Value> = state
            .by_parent_type
            .iter()
            .map(|(parent_type, weight)| (parent_type.clone(), Value::from(*weight)))
            .collect();
        output.insert("byParentType".to_string(), Value::Object(by_parent_type));
        Ok(Value::Object(output))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::{resolver::DirectiveInvocation, response::ResponsePath};

    fn visit<'a>(
        path: &'a ResponsePath,
        parent_type: &'a str,
        directives: &'a [DirectiveInvocation],
    ) -> FieldVisit<'a> {
        FieldVisit {
            path,
            field_name: "field",
            parent_type,
            return_type: "String",
            deprecation_reason: None,
            directives,
            pass: 1,
        }
    }

    #[test]
    fn plain_fields_cost_one() {
        let extension = QueryCostExtension::new();
        let path = ResponsePath::root().child("a");

        extension.visit_field(&visit(&path, "Query", &[])).unwrap();
        extension.visit_field(&visit(&path, "Query", &[])).unwrap();
        assert_eq!(extension.total(), 2);
    }

    #[test]
    fn weighted_fields_use_their_directive() {
        let extension = QueryCostExtension::new();
        let path = ResponsePath::root().child("search");
        let directives = vec![DirectiveInvocation::new("cost").with_argument("weight", 10)];

        extension
            .visit_field(&visit(&path, "Query", &directives))
            .unwrap();
        assert_eq!(extension.total(), 10);
    }

    #[test]
    fn serializes_totals_by_parent_type() {
        let extension = QueryCostExtension::with_maximum(100);
        let path = ResponsePath::root().child("a");

        extension.visit_field(&visit(&path, "Query", &[])).unwrap();
        extension.visit_field(&visit(&path, "User", &[])).unwrap();
        extension.visit_field(&visit(&path, "User", &[])).unwrap();

        assert_eq!(
            extension.serialize().unwrap(),
            json!({
                "total": 3,
                "maximum": 100,
                "byParentType": {"Query": 1, "User": 2},
            })
        );
    }
}
