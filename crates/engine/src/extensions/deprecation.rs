use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::Value;

use super::{Extension, ExtensionError, ExtensionFactory, FieldVisit, ResolveCallback, SerializeContext};
use crate::response::ResponsePath;

/// Collects a notice for every deprecated field the execution touched, so
/// clients learn which parts of their query are on the way out.
///
/// Stays out of the response entirely when the query touched nothing
/// deprecated.
pub struct DeprecationExtension {
    state: Mutex<Vec<DeprecationNotice>>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeprecationNotice {
    pub path: ResponsePath,
    pub parent_type: String,
    pub field_name: String,
    pub reason: String,
}

impl DeprecationExtension {
    pub const KEY: &'static str = "deprecationNotices";

    pub fn new() -> Self {
        DeprecationExtension {
            state: Mutex::new(Vec::new()),
        }
    }

    pub fn factory() -> Arc<dyn ExtensionFactory> {
        Arc::new(|| Box::new(DeprecationExtension::new()) as Box<dyn Extension>)
    }

    fn state(&self) -> MutexGuard<'_, Vec<DeprecationNotice>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for DeprecationExtension {
    fn default() -> Self {
        Self::new()
    }
}

impl Extension for DeprecationExtension {
    fn key(&self) -> &str {
        Self::KEY
    }

    fn visit_field(
        &self,
        event: &FieldVisit<'_>,
    ) -> Result<Option<ResolveCallback>, ExtensionError> {
        if let Some(reason) = event.deprecation_reason {
            self.state().push(DeprecationNotice {
                path: event.path.clone(),
                parent_type: event.parent_type.to_string(),
                field_name: event.field_name.to_string(),
                reason: reason.to_string(),
            });
        }
        Ok(None)
    }

    fn is_visible_in_result(&self, _ctx: &SerializeContext<'_>) -> bool {
        !self.state().is_empty()
    }

    fn serialize(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(&*self.state())
    }
}
