use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::Value;

use super::{
    ExecutionEnd, ExecutionStart, Extension, ExtensionError, ExtensionFactory, FieldVisit,
    ResolveCallback, SerializeContext,
};
use crate::{clock::Clock, response::ResponsePath};

/// Execution trace in the Apollo tracing shape: wall start of the request,
/// total duration and one record per resolved field with its start offset
/// and duration in nanoseconds.
///
/// Runs outermost (lowest priority), so its field durations include the
/// post-processing every other extension performs.
pub struct TracingExtension {
    state: Arc<Mutex<TraceState>>,
}

#[derive(Default)]
struct TraceState {
    clock: Option<Clock>,
    total_duration_nanos: Option<u64>,
    resolvers: Vec<ResolverTrace>,
}

#[derive(serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct ResolverTrace {
    path: ResponsePath,
    parent_type: String,
    field_name: String,
    return_type: String,
    start_offset: u64,
    duration: u64,
}

impl TracingExtension {
    pub const KEY: &'static str = "tracing";

    pub fn new() -> Self {
        TracingExtension {
            state: Arc::new(Mutex::new(TraceState::default())),
        }
    }

    pub fn factory() -> Arc<dyn ExtensionFactory> {
        Arc::new(|| Box::new(TracingExtension::new()) as Box<dyn Extension>)
    }

    fn state(&self) -> MutexGuard<'_, TraceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for TracingExtension {
    fn default() -> Self {
        Self::new()
    }
}

impl Extension for TracingExtension {
    fn key(&self) -> &str {
        Self::KEY
    }

    fn priority(&self) -> i32 {
        -100
    }

    fn on_start(&self, event: &ExecutionStart<'_>) -> Result<(), ExtensionError> {
        self.state().clock = Some(event.clock.clone());
        Ok(())
    }

    fn on_end(&self, event: &ExecutionEnd<'_>) -> Result<(), ExtensionError> {
        self.state().total_duration_nanos = Some(event.duration.as_nanos() as u64);
        Ok(())
    }

    fn visit_field(
        &self,
        event: &FieldVisit<'_>,
    ) -> Result<Option<ResolveCallback>, ExtensionError> {
        let Some(clock) = self.state().clock.clone() else {
            // No start event was dispatched; nothing to anchor offsets to.
            return Ok(None);
        };
        let start_offset = clock.elapsed_nanos();
        let mut record = ResolverTrace {
            path: event.path.clone(),
            parent_type: event.parent_type.to_string(),
            field_name: event.field_name.to_string(),
            return_type: event.return_type.to_string(),
            start_offset,
            duration: 0,
        };
        let state = Arc::clone(&self.state);
        Ok(Some(Box::new(move |_outcome| {
            record.duration = clock.elapsed_nanos().saturating_sub(start_offset);
            state
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .resolvers
                .push(record);
        })))
    }

    fn is_visible_in_result(&self, ctx: &SerializeContext<'_>) -> bool {
        ctx.include_diagnostics
    }

    fn serialize(&self) -> Result<Value, serde_json::Error> {
        let state = self.state();
        let start_time = state
            .clock
            .as_ref()
            .map(Clock::started_at_unix_nanos)
            .unwrap_or_default();
        let duration = state.total_duration_nanos.unwrap_or_default();
        let resolvers = serde_json::to_value(&state.resolvers)?;
        Ok(serde_json::json!({
            "version": 1,
            "startTime": start_time,
            "endTime": start_time + duration,
            "duration": duration,
            "execution": {
                "resolvers": resolvers,
            },
        }))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    fn visit<'a>(path: &'a ResponsePath, field_name: &'a str) -> FieldVisit<'a> {
        FieldVisit {
            path,
            field_name,
            parent_type: "Query",
            return_type: "String",
            deprecation_reason: None,
            directives: &[],
            pass: 1,
        }
    }

    fn started_extension() -> (TracingExtension, Clock) {
        let extension = TracingExtension::new();
        let clock = Clock::start();
        extension
            .on_start(&ExecutionStart {
                operation_name: None,
                clock: &clock,
            })
            .unwrap();
        (extension, clock)
    }

    #[test]
    fn records_one_entry_per_settled_field() {
        let (extension, _clock) = started_extension();

        let user = ResponsePath::root().child("user");
        let name = user.child("name");
        for (path, field) in [(&user, "user"), (&name, "name")] {
            let callback = extension.visit_field(&visit(path, field)).unwrap().unwrap();
            callback(Ok(&json!("ignored")));
        }

        extension
            .on_end(&ExecutionEnd {
                operation_name: None,
                duration: Duration::from_micros(10),
            })
            .unwrap();

        let trace = extension.serialize().unwrap();
        assert_eq!(trace["version"], json!(1));
        assert_eq!(trace["duration"], json!(10_000));
        assert_eq!(
            trace["endTime"].as_u64().unwrap() - trace["startTime"].as_u64().unwrap(),
            10_000
        );

        let resolvers = trace["execution"]["resolvers"].as_array().unwrap();
        assert_eq!(resolvers.len(), 2);
        assert_eq!(resolvers[0]["path"], json!(["user"]));
        assert_eq!(resolvers[0]["fieldName"], json!("user"));
        assert_eq!(resolvers[1]["path"], json!(["user", "name"]));
        assert_eq!(resolvers[1]["parentType"], json!("Query"));
    }

    #[test]
    fn offsets_do_not_run_backwards() {
        let (extension, _clock) = started_extension();

        let first_path = ResponsePath::root().child("a");
        let second_path = ResponsePath::root().child("b");

        let first = extension.visit_field(&visit(&first_path, "a")).unwrap().unwrap();
        first(Ok(&json!(1)));
        let second = extension.visit_field(&visit(&second_path, "b")).unwrap().unwrap();
        second(Ok(&json!(2)));

        let trace = extension.serialize().unwrap();
        let resolvers = trace["execution"]["resolvers"].as_array().unwrap();
        let first_offset = resolvers[0]["startOffset"].as_u64().unwrap();
        let second_offset = resolvers[1]["startOffset"].as_u64().unwrap();
        assert!(second_offset >= first_offset);
    }

    #[test]
    fn without_a_start_event_no_fields_are_recorded() {
        let extension = TracingExtension::new();
        let path = ResponsePath::root().child("a");
        assert!(extension.visit_field(&visit(&path, "a")).unwrap().is_none());
    }

    #[test]
    fn only_visible_when_diagnostics_are_requested() {
        let (extension, _clock) = started_extension();
        assert!(!extension.is_visible_in_result(&SerializeContext {
            operation_name: None,
            include_diagnostics: false,
        }));
        assert!(extension.is_visible_in_result(&SerializeContext {
            operation_name: None,
            include_diagnostics: true,
        }));
    }
}
