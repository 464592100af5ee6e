/// Errors raised by the message store and the directory store.
///
/// # Examples
///
/// ```rust
/// use solfeo_storage::error::StorageError;
///
/// let err = StorageError::VersionConflict {
///     entity: "message",
///     id: "42".to_string(),
///     expected: 3,
/// };
/// assert!(err.to_string().contains("version 3"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// A required record was not found.
    #[error("Storage: {entity} not found (id={id})")]
    NotFound { entity: &'static str, id: String },

    /// A conditional update lost against a concurrent writer.
    #[error("Storage: {entity} {id} was modified concurrently (expected version {expected})")]
    VersionConflict {
        entity: &'static str,
        id: String,
        expected: i64,
    },

    /// The record exists but is not in a state that allows the operation.
    #[error("Storage: {entity} {id} is in an invalid state: {reason}")]
    InvalidState {
        entity: &'static str,
        id: String,
        reason: String,
    },

    /// A column held a value that does not parse into its domain type.
    #[error("Storage: unexpected value '{value}' in column '{column}'")]
    UnexpectedValue { column: &'static str, value: String },

    #[error("Storage: SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Storage: JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Storage: I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, StorageError>;
