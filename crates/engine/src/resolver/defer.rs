use serde_json::Value;

use super::DirectiveInvocation;

const DEFER_DIRECTIVE: &str = "defer";

/// Deferral decision derived from the field's directives.
#[derive(Debug, Default, PartialEq, Eq)]
pub(super) struct DeferDecision {
    pub should_defer: bool,
    pub label: Option<String>,
}

/// A `defer` directive postpones the field unless its `if` argument is
/// explicitly false; `label` tags the deferral for the client.
pub(super) fn evaluate(directives: &[DirectiveInvocation]) -> DeferDecision {
    let Some(directive) = directives
        .iter()
        .find(|directive| directive.name == DEFER_DIRECTIVE)
    else {
        return DeferDecision::default();
    };

    let enabled = match directive.arguments.get("if") {
        Some(Value::Bool(enabled)) => *enabled,
        _ => true,
    };
    let label = directive
        .arguments
        .get("label")
        .and_then(Value::as_str)
        .map(str::to_string);

    DeferDecision {
        should_defer: enabled,
        label,
    }
}
