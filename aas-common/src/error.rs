/// Errors surfaced by the adapter/reconciler/event layers.
///
/// `is_temporary()` stands in for a retry policy check: callers on the
/// event-driven fast path use it to decide between a bounded backoff retry
/// and an immediate permanent-error/DLQ path.
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("upstream API returned status {status}: {body}")]
    Api { status: u16, body: String },

    #[error("directory user not found: {0}")]
    UserNotFound(String),

    #[error("upstream denied the request (403): {0}")]
    Forbidden(String),

    #[error("capability has no context configured")]
    NoContext,

    #[error("required data path is not configured: {0}")]
    DataPathNotConfigured(String),

    #[error("transient network error: {0}")]
    Transient(#[from] reqwest::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl AdapterError {
    pub fn is_temporary(&self) -> bool {
        match self {
            AdapterError::Transient(_) => true,
            AdapterError::Api { status, .. } => *status >= 500 || *status == 429,
            AdapterError::Auth(_)
            | AdapterError::UserNotFound(_)
            | AdapterError::Forbidden(_)
            | AdapterError::NoContext
            | AdapterError::DataPathNotConfigured(_)
            | AdapterError::Other(_) => false,
        }
    }
}
