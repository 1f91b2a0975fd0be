use thiserror::Error;

pub type Result<T> = std::result::Result<T, BackendError>;

/// Every failure the backend client can report. The client never decides
/// whether a failure is worth retrying; callers own that policy.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("{method} returned status={status} body={body}")]
    Status {
        method: &'static str,
        status: u16,
        body: String,
    },

    #[error("{method} rejected by backend: {description}")]
    Rejected {
        method: &'static str,
        description: String,
    },

    #[error("unexpected response format: {0}")]
    Decode(String),
}

impl BackendError {
    pub fn is_decode(&self) -> bool {
        matches!(self, Self::Decode(_))
    }
}

impl From<reqwest::Error> for BackendError {
    fn from(e: reqwest::Error) -> Self {
        // Request URLs embed the bot token.
        Self::Transport(e.without_url().to_string())
    }
}

impl From<serde_json::Error> for BackendError {
    fn from(e: serde_json::Error) -> Self {
        Self::Decode(e.to_string())
    }
}
