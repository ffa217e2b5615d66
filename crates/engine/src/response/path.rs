use std::{fmt, sync::Arc};

use serde_json::Value;

/// A segment of a response path: an output field name or a list index.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResponsePathSegment {
    Field(Arc<str>),
    Index(usize),
}

impl fmt::Display for ResponsePathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponsePathSegment::Field(name) => f.write_str(name),
            ResponsePathSegment::Index(index) => write!(f, "{index}"),
        }
    }
}

impl From<&str> for ResponsePathSegment {
    fn from(name: &str) -> Self {
        ResponsePathSegment::Field(Arc::from(name))
    }
}

impl From<String> for ResponsePathSegment {
    fn from(name: String) -> Self {
        ResponsePathSegment::Field(Arc::from(name.as_str()))
    }
}

impl From<usize> for ResponsePathSegment {
    fn from(index: usize) -> Self {
        ResponsePathSegment::Index(index)
    }
}

/// Path of one node within the response tree, the addressing key for result
/// caching and field deferral.
///
/// Built on a persistent vector so `child` hands out an extended copy
/// without cloning the whole path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ResponsePath(im::Vector<ResponsePathSegment>);

impl ResponsePath {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn child(&self, segment: impl Into<ResponsePathSegment>) -> ResponsePath {
        let mut path = self.0.clone();
        path.push_back(segment.into());
        ResponsePath(path)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResponsePathSegment> {
        self.0.iter()
    }

    pub fn last(&self) -> Option<&ResponsePathSegment> {
        self.0.last()
    }

    /// Walks `root` along this path. `None` when any segment is missing; an
    /// explicit JSON null at the path is a defined value.
    pub fn lookup<'v>(&self, root: &'v Value) -> Option<&'v Value> {
        self.0.iter().try_fold(root, |value, segment| match segment {
            ResponsePathSegment::Field(name) => value.get(name.as_ref()),
            ResponsePathSegment::Index(index) => value.get(index),
        })
    }
}

impl fmt::Display for ResponsePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (position, segment) in self.0.iter().enumerate() {
            if position > 0 {
                f.write_str(".")?;
            }
            segment.fmt(f)?;
        }
        Ok(())
    }
}

impl<S: Into<ResponsePathSegment>> FromIterator<S> for ResponsePath {
    fn from_iter<I: IntoIterator<Item = S>>(segments: I) -> Self {
        ResponsePath(segments.into_iter().map(Into::into).collect())
    }
}

impl serde::Serialize for ResponsePath {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeSeq;

        let mut seq = serializer.serialize_seq(Some(self.0.len()))?;
        for segment in &self.0 {
            match segment {
                ResponsePathSegment::Field(name) => seq.serialize_element(name.as_ref())?,
                ResponsePathSegment::Index(index) => seq.serialize_element(index)?,
            }
        }
        seq.end()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn child_extends_without_touching_the_parent() {
        let root = ResponsePath::root();
        let user = root.child("user");
        let name = user.child("name");

        assert!(root.is_empty());
        assert_eq!(user.len(), 1);
        assert_eq!(name.to_string(), "user.name");
    }

    #[test]
    fn display_renders_indices_inline() {
        let path: ResponsePath = ResponsePath::root()
            .child("users")
            .child(0usize)
            .child("name");
        assert_eq!(path.to_string(), "users.0.name");
    }

    #[test]
    fn lookup_walks_objects_and_arrays() {
        let tree = json!({"users": [{"name": "Alice"}, {"name": "Bob"}]});

        let path = ResponsePath::root().child("users").child(1usize).child("name");
        assert_eq!(path.lookup(&tree), Some(&json!("Bob")));

        let missing = ResponsePath::root().child("users").child(2usize);
        assert_eq!(missing.lookup(&tree), None);
    }

    #[test]
    fn lookup_treats_explicit_null_as_defined() {
        let tree = json!({"user": null});
        let path = ResponsePath::root().child("user");
        assert_eq!(path.lookup(&tree), Some(&Value::Null));
    }

    #[test]
    fn serializes_as_the_wire_path_shape() {
        let path = ResponsePath::root().child("users").child(0usize).child("name");
        assert_eq!(
            serde_json::to_value(&path).unwrap(),
            json!(["users", 0, "name"])
        );
    }
}
