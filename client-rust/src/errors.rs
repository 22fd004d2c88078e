use crate::conversation::ConversationState;
use thiserror::Error;

/// Broad classification of a retrieval failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetrievalErrorKind {
    Network,
    ServerRejected,
    Malformed,
}

#[derive(Error, Debug)]
pub enum RetrievalError {
    /// The request could not be sent, timed out, or the body could not be
    /// read.
    #[error("Network error: {0}")]
    Network(String),
    /// The search endpoint answered with a non-success status.
    #[error("Search rejected: {message} (Status {status})")]
    ServerRejected { status: u16, message: String },
    /// The response body was not the expected JSON array of results.
    #[error("Malformed search response: {0}")]
    Malformed(String),
}

impl RetrievalError {
    #[must_use]
    pub fn kind(&self) -> RetrievalErrorKind {
        match self {
            Self::Network(_) => RetrievalErrorKind::Network,
            Self::ServerRejected { .. } => RetrievalErrorKind::ServerRejected,
            Self::Malformed(_) => RetrievalErrorKind::Malformed,
        }
    }
}

impl From<reqwest::Error> for RetrievalError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_decode() {
            Self::Malformed(error.to_string())
        } else {
            Self::Network(error.to_string())
        }
    }
}

/// Broad classification of a stream failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamErrorKind {
    Network,
    ServerSignaled,
    DecodeFailure,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StreamError {
    /// The connection failed, dropped, idled out or closed before the
    /// completion sentinel.
    #[error("Network error: {0}")]
    Network(String),
    /// The chat endpoint answered with a non-success status.
    #[error("Status error: {message} (Status {status})")]
    Status { status: u16, message: String },
    /// The server sent an `{"error": ...}` event.
    #[error("Server error: {0}")]
    ServerSignaled(String),
    /// The event stream could not be decoded.
    #[error("Decode error: {0}")]
    Decode(String),
}

impl StreamError {
    #[must_use]
    pub fn kind(&self) -> StreamErrorKind {
        match self {
            Self::Network(_) | Self::Status { .. } => StreamErrorKind::Network,
            Self::ServerSignaled(_) => StreamErrorKind::ServerSignaled,
            Self::Decode(_) => StreamErrorKind::DecodeFailure,
        }
    }
}

impl From<reqwest::Error> for StreamError {
    fn from(error: reqwest::Error) -> Self {
        Self::Network(error.to_string())
    }
}

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Upload transport error: {0}")]
    Transport(#[from] reqwest::Error),
    /// The upload endpoint answered with `{"error": ...}` or a non-success
    /// status.
    #[error("Upload rejected: {message} (Status {status})")]
    Rejected { status: u16, message: String },
}

/// Invalid HTTP client configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid header: {0}")]
    Header(String),
    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Errors returned by a send. Stream failures never surface here; they are
/// recorded in the conversation history instead.
#[derive(Error, Debug)]
pub enum ChatError {
    #[error("Retrieval failed: {0}")]
    Retrieval(#[from] RetrievalError),
    #[error("A send is already in progress (state: {0:?})")]
    ConcurrencyViolation(ConversationState),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

pub type RetrievalResult<T> = Result<T, RetrievalError>;
pub type StreamResult<T> = Result<T, StreamError>;
pub type ChatResult<T> = Result<T, ChatError>;
