//! Error handling for the recipe streaming client

use crate::parser::SyntaxError;
use thiserror::Error;

/// Result type alias for library operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the recipe streaming client
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP request error
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON serialization/deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    /// API error response
    #[error("API error (status: {status}): {message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Error message
        message: String,
        /// Additional error details
        details: Option<serde_json::Value>,
    },

    /// Configuration error
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Text that is not a prefix of any JSON document
    #[error("Malformed JSON prefix: {0}")]
    Syntax(#[from] SyntaxError),

    /// Streaming operation error
    #[error("Streaming error: {0}")]
    Streaming(String),

    /// Complete response that does not have the envelope shape
    #[error("Invalid response format: {0}")]
    InvalidResponse(String),

    /// Chat requested before any response delivered a thread id
    #[error("No chat thread: extract a recipe first")]
    MissingThread,

    /// Cycle abandoned by the caller
    #[error("Request cancelled")]
    Cancelled,
}

impl Error {
    /// Check whether the error fails a whole request cycle.
    ///
    /// Transport failures and terminal parse failures both count; syntax
    /// rejections of a partial prefix are absorbed per chunk and never
    /// reach the caller through a cycle.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Error::Http(_)
                | Error::Api { .. }
                | Error::Streaming(_)
                | Error::Json(_)
                | Error::InvalidResponse(_)
        )
    }

    /// Get the HTTP status code, if the backend produced one
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Api { status, .. } => Some(*status),
            Error::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}
