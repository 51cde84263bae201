use thiserror::Error;

/// Failure talking to the thread service.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("invalid base URL {url}: {reason}")]
    BaseUrl { url: String, reason: String },

    #[error("{endpoint} failed: {source}")]
    Transport {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{endpoint} returned {status}: {body}")]
    Status {
        endpoint: String,
        status: u16,
        body: String,
    },

    #[error("{endpoint} returned an unreadable body: {source}")]
    Decode {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("attachment {filename} has an invalid content type: {source}")]
    Attachment {
        filename: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("reply stream interrupted: {0}")]
    Stream(#[source] reqwest::Error),

    #[error("reply stream idle for {secs}s")]
    StreamIdle { secs: u64 },
}

impl BackendError {
    /// HTTP status for `Status` errors.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            BackendError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}
