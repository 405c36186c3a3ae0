//! Crate-wide error type and transient-failure classification.
//!
//! Every outbound call funnels failures into [`Error`] so the retry layer can
//! decide whether an attempt is worth repeating. Timeouts, connection drops,
//! rate limiting (429), and server-side errors (5xx) are transient; everything
//! else propagates immediately.

use reqwest::StatusCode;
use thiserror::Error;

/// HTTP statuses worth retrying besides the 5xx range.
const RETRYABLE_STATUS: [u16; 4] = [408, 409, 425, 429];

#[derive(Error, Debug)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("allowlist error: {0}")]
    Allowlist(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("feed parse error: {0}")]
    Feed(String),

    #[error("{service} returned {status}: {message}")]
    Api {
        service: &'static str,
        status: StatusCode,
        message: String,
    },

    #[error("completion response contained no text")]
    EmptyCompletion,

    #[error("prompt not found: {0}")]
    Prompt(String),

    #[error("no successful summaries to compose")]
    NoSummaries,
}

impl Error {
    /// Whether the failure is safe to retry.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Http(e) => {
                e.is_timeout()
                    || e.is_connect()
                    || e.status().is_some_and(is_retryable_status)
            }
            Error::Api { status, .. } => is_retryable_status(*status),
            _ => false,
        }
    }
}

fn is_retryable_status(status: StatusCode) -> bool {
    status.is_server_error() || RETRYABLE_STATUS.contains(&status.as_u16())
}

pub type Result<T> = std::result::Result<T, Error>;
