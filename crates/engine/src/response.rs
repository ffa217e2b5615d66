mod path;
mod source;

pub use path::{ResponsePath, ResponsePathSegment};
pub use source::SourceValue;
