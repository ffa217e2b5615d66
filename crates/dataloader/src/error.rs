pub type LoadResult<T> = Result<T, LoadError>;

/// Errors surfaced to consumers of a [`crate::BatchLoader`].
///
/// A batch-level failure fans out to every handle queued in that batch, so
/// the type is cheap to clone.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoadError {
    #[error("batch fetch failed: {message}")]
    BatchFetch { message: String },
    #[error("the batch fetch returned no result set")]
    NullBatchResult,
    #[error("queued item has no usable `{key}` identifier")]
    MissingIdentifier { key: String },
    #[error("{message}")]
    Item { message: String },
}

impl LoadError {
    pub fn batch_fetch(message: impl Into<String>) -> Self {
        LoadError::BatchFetch {
            message: message.into(),
        }
    }

    pub fn item(message: impl Into<String>) -> Self {
        LoadError::Item {
            message: message.into(),
        }
    }
}
