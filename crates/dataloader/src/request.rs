use std::fmt;

use serde_json::Value;

use crate::error::LoadError;

/// Identifier of a single entry within a batch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LoadId {
    String(String),
    Int(i64),
}

impl LoadId {
    pub(crate) fn from_scalar(value: &Value) -> Option<LoadId> {
        match value {
            Value::String(s) => Some(LoadId::String(s.clone())),
            Value::Number(n) => n.as_i64().map(LoadId::Int),
            _ => None,
        }
    }

    /// JSON object keys are strings, so a numeric identifier also matches
    /// its rendered form and vice versa.
    pub(crate) fn alternate(&self) -> Option<LoadId> {
        match self {
            LoadId::String(s) => s.parse().ok().map(LoadId::Int),
            LoadId::Int(n) => Some(LoadId::String(n.to_string())),
        }
    }
}

impl fmt::Display for LoadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadId::String(s) => f.write_str(s),
            LoadId::Int(n) => write!(f, "{n}"),
        }
    }
}

impl From<&str> for LoadId {
    fn from(value: &str) -> Self {
        LoadId::String(value.to_string())
    }
}

impl From<String> for LoadId {
    fn from(value: String) -> Self {
        LoadId::String(value)
    }
}

impl From<i64> for LoadId {
    fn from(value: i64) -> Self {
        LoadId::Int(value)
    }
}

impl From<i32> for LoadId {
    fn from(value: i32) -> Self {
        LoadId::Int(i64::from(value))
    }
}

impl From<LoadId> for Value {
    fn from(id: LoadId) -> Value {
        match id {
            LoadId::String(s) => Value::String(s),
            LoadId::Int(n) => Value::Number(n.into()),
        }
    }
}

/// Types that know their own batch identifier.
pub trait Identifiable {
    fn load_id(&self) -> LoadId;
}

/// What [`crate::BatchLoader::load`] accepts: a raw identifier, or a
/// structured item the identifier is extracted from.
#[derive(Debug, Clone)]
pub enum LoadRequest {
    Id(LoadId),
    Item(Value),
}

impl LoadRequest {
    pub fn identifiable<T: Identifiable + ?Sized>(entity: &T) -> Self {
        LoadRequest::Id(entity.load_id())
    }

    pub(crate) fn into_id(self, key_field: &str) -> Result<LoadId, LoadError> {
        let missing = || LoadError::MissingIdentifier {
            key: key_field.to_string(),
        };
        match self {
            LoadRequest::Id(id) => Ok(id),
            LoadRequest::Item(Value::Object(item)) => item
                .get(key_field)
                .and_then(LoadId::from_scalar)
                .ok_or_else(missing),
            LoadRequest::Item(scalar) => LoadId::from_scalar(&scalar).ok_or_else(missing),
        }
    }
}

impl From<LoadId> for LoadRequest {
    fn from(id: LoadId) -> Self {
        LoadRequest::Id(id)
    }
}

impl From<&str> for LoadRequest {
    fn from(value: &str) -> Self {
        LoadRequest::Id(value.into())
    }
}

impl From<String> for LoadRequest {
    fn from(value: String) -> Self {
        LoadRequest::Id(value.into())
    }
}

impl From<i64> for LoadRequest {
    fn from(value: i64) -> Self {
        LoadRequest::Id(value.into())
    }
}

impl From<i32> for LoadRequest {
    fn from(value: i32) -> Self {
        LoadRequest::Id(value.into())
    }
}

impl From<Value> for LoadRequest {
    fn from(value: Value) -> Self {
        LoadRequest::Item(value)
    }
}
