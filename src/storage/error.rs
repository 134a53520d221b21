use thiserror::Error;

/// Errors that can occur when interacting with the persistent store.
#[derive(Debug, Clone, Error)]
pub enum StorageError {
    /// Failed to serialize or deserialize a persisted value.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// An I/O error from the backing store.
    #[error("I/O error: {0}")]
    Io(String),

    /// The backing store is unavailable or rejected the operation.
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

impl StorageError {
    /// Returns a helpful suggestion for resolving this error.
    #[must_use]
    pub const fn suggestion(&self) -> &'static str {
        match self {
            Self::Serialization(_) => {
                "A persisted value could not be encoded or decoded. This usually \
                 indicates corrupted data in the store or a schema mismatch; \
                 `reset()` the label to start from a clean slate."
            }
            Self::Io(_) => {
                "The backing store could not be read or written. Check that the \
                 storage location exists and is writable."
            }
            Self::Unavailable(_) => {
                "The storage backend rejected the operation. Pending items were \
                 not persisted; the caller should treat the operation as failed."
            }
        }
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
