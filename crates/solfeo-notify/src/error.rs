use solfeo_storage::StorageError;

/// Errors raised by the notification subsystem.
///
/// Transports themselves return `anyhow::Result`; a failed channel for one
/// recipient never surfaces as a `NotifyError` past the dispatcher, it is
/// recorded in the recipient's outcome instead.
///
/// # Examples
///
/// ```rust
/// use solfeo_notify::error::NotifyError;
///
/// let err = NotifyError::InvalidConfig("missing smtp_host".to_string());
/// assert!(err.to_string().contains("smtp_host"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    /// The recipient rule could not be expanded (e.g. the class lookup failed).
    #[error("Notify: could not resolve recipients: {0}")]
    Resolution(String),

    #[error("Notify: {entity} not found (id={id})")]
    NotFound { entity: &'static str, id: String },

    /// Caller input failed validation.
    #[error("Notify: invalid input: {0}")]
    InvalidInput(String),

    /// The message is not in a state that allows the operation.
    #[error("Notify: invalid state: {0}")]
    InvalidState(String),

    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Transport configuration is missing a required field or is malformed.
    #[error("Notify: invalid transport configuration: {0}")]
    InvalidConfig(String),

    /// The transport type is not registered in the plugin registry.
    #[error("Notify: unknown transport type '{0}'")]
    UnknownTransportType(String),

    /// Every transport of a chain failed; carries the last reason.
    #[error("{0}")]
    Delivery(String),

    /// The caller cancelled the operation.
    #[error("Notify: operation cancelled")]
    Cancelled,

    #[error("Notify: HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Notify: JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Notify: {0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, NotifyError>;
