use thiserror::Error;

/// Failures surfaced by a remote state client.
///
/// `NotFound` is an expected outcome (e.g. a branch without a descriptor
/// file) and is kept apart from every other failure.
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("Not Found")]
    NotFound,
    #[error("HTTP {0}")]
    Status(u16),
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("invalid response body: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("invalid file encoding: {0}")]
    Encoding(#[from] base64::DecodeError),
    #[error("{0}")]
    Other(String),
}

impl RemoteError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, RemoteError::NotFound)
    }
}

pub type RemoteResult<T> = std::result::Result<T, RemoteError>;
