use std::borrow::Cow;

use serde_json::Value;

use crate::response::ResponsePath;

pub type ExecutionResult<T> = Result<T, ExecutionError>;

/// Pass bracketing and deferral bookkeeping misuse.
///
/// These indicate an integration bug in the caller, not a data problem, and
/// are surfaced as hard failures rather than per-field errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExecutionError {
    #[error("a resolution pass is already running")]
    AlreadyRunning,
    #[error("no resolution pass is running")]
    NotRunning,
    #[error("cannot defer any further, the pass budget of {max_passes} is exhausted")]
    DeferralExhausted { max_passes: u32 },
    #[error("the result tree cannot be replaced while a pass is running")]
    ResultLocked,
}

impl ExecutionError {
    fn code(&self) -> &'static str {
        match self {
            ExecutionError::AlreadyRunning => "PASS_ALREADY_RUNNING",
            ExecutionError::NotRunning => "PASS_NOT_RUNNING",
            ExecutionError::DeferralExhausted { .. } => "DEFERRAL_EXHAUSTED",
            ExecutionError::ResultLocked => "RESULT_LOCKED",
        }
    }
}

/// A field-level error: rendered into the response alongside a null value at
/// its path, never aborting sibling resolution.
#[derive(Debug, Clone, PartialEq, thiserror::Error, serde::Serialize)]
#[error("{message}")]
pub struct GraphqlError {
    pub message: Cow<'static, str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<ResponsePath>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extensions: Option<serde_json::Map<String, Value>>,
}

impl GraphqlError {
    pub fn new(message: impl Into<Cow<'static, str>>) -> Self {
        GraphqlError {
            message: message.into(),
            path: None,
            extensions: None,
        }
    }

    pub fn with_path(mut self, path: ResponsePath) -> Self {
        self.path = Some(path);
        self
    }

    pub fn with_extension(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extensions
            .get_or_insert_with(Default::default)
            .insert(key.into(), value.into());
        self
    }

    /// Attaches `path` unless the error already carries one.
    pub(crate) fn or_path(mut self, path: ResponsePath) -> Self {
        if self.path.is_none() {
            self.path = Some(path);
        }
        self
    }
}

impl From<ExecutionError> for GraphqlError {
    fn from(error: ExecutionError) -> Self {
        let code = error.code();
        GraphqlError::new(error.to_string()).with_extension("code", code)
    }
}

impl From<dataloader::LoadError> for GraphqlError {
    fn from(error: dataloader::LoadError) -> Self {
        GraphqlError::new(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn deferral_exhaustion_becomes_a_field_error() {
        let error: GraphqlError = ExecutionError::DeferralExhausted { max_passes: 3 }.into();
        assert_eq!(
            error.message,
            "cannot defer any further, the pass budget of 3 is exhausted"
        );
        assert_eq!(
            error.extensions.unwrap().get("code"),
            Some(&json!("DEFERRAL_EXHAUSTED"))
        );
    }

    #[test]
    fn serializes_with_its_path() {
        let error = GraphqlError::new("boom").with_path(ResponsePath::root().child("user"));
        assert_eq!(
            serde_json::to_value(&error).unwrap(),
            json!({"message": "boom", "path": ["user"]})
        );
    }
}
