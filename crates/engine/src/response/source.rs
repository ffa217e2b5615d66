use std::sync::Arc;

use serde_json::Value;

use super::path::ResponsePathSegment;

/// Parent data flowing between resolvers.
///
/// Cheap to clone and to take sub-values of: the JSON root is shared behind
/// an `Arc` and a sub-value only extends an interior path into it.
#[derive(Debug, Clone)]
pub struct SourceValue {
    root: Arc<Value>,
    path: Vec<ResponsePathSegment>,
}

impl SourceValue {
    pub fn new(value: Value) -> Self {
        SourceValue {
            root: Arc::new(value),
            path: Vec::new(),
        }
    }

    pub fn null() -> Self {
        Self::new(Value::Null)
    }

    pub fn as_value(&self) -> &Value {
        self.path.iter().fold(self.root.as_ref(), |value, segment| {
            match segment {
                ResponsePathSegment::Field(name) => value.get(name.as_ref()),
                ResponsePathSegment::Index(index) => value.get(index),
            }
            .expect("interior path is validated on construction")
        })
    }

    pub fn is_null(&self) -> bool {
        self.as_value().is_null()
    }

    /// Sub-value at `name`, assuming this is an object and the field exists.
    pub fn get_field(&self, name: &str) -> Option<SourceValue> {
        self.as_value().get(name)?;

        let mut path = self.path.clone();
        path.push(ResponsePathSegment::Field(Arc::from(name)));
        Some(SourceValue {
            root: Arc::clone(&self.root),
            path,
        })
    }

    /// Sub-value at `index`, assuming this is an array and the index exists.
    pub fn get_index(&self, index: usize) -> Option<SourceValue> {
        self.as_value().get(index)?;

        let mut path = self.path.clone();
        path.push(ResponsePathSegment::Index(index));
        Some(SourceValue {
            root: Arc::clone(&self.root),
            path,
        })
    }

    /// Takes the inner value, cloning only when the root is still shared.
    pub fn take(mut self) -> Value {
        match Arc::try_unwrap(self.root) {
            Ok(value) => self.path.iter().fold(value, |mut value, segment| {
                match segment {
                    ResponsePathSegment::Field(name) => value.get_mut(name.as_ref()),
                    ResponsePathSegment::Index(index) => value.get_mut(index),
                }
                .expect("interior path is validated on construction")
                .take()
            }),
            Err(root) => {
                self.root = root;
                self.as_value().clone()
            }
        }
    }
}

impl Default for SourceValue {
    fn default() -> Self {
        Self::null()
    }
}

impl From<Value> for SourceValue {
    fn from(value: Value) -> Self {
        Self::new(value)
    }
}
