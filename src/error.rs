use thiserror::Error;

/// Failure to fetch one listing page. Ends pagination for the current cycle.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} timed out")]
    Timeout { url: String },

    #[error("HTTP {status} for {url}")]
    Status { status: u16, url: String },

    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),
}

/// Failure to deliver a notification. Logged, never fatal.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("sink rejected message with HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("sink request error: {0}")]
    Request(#[from] reqwest::Error),
}

impl NotifyError {
    /// Rejections by the sink are not worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            NotifyError::Rejected { status, .. } => *status == 429 || *status >= 500,
            NotifyError::Request(_) => true,
        }
    }
}
