use std::time::Duration;

use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;

use crate::transport::TransportError;

/// Message used when an error body can't be parsed at all.
pub const UNKNOWN_ERROR_MESSAGE: &str = "An unknown error occurred";

/// Message used when an error body parses but carries no `message`.
pub const GENERIC_ERROR_MESSAGE: &str = "API request failed";

/// Maximum length for error response bodies in log output
const MAX_ERROR_BODY_LENGTH: usize = 500;

/// Why a session renewal did not produce a credential.
///
/// Cloneable because one failure is fanned out to every queued waiter.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RefreshError {
    #[error("Session renewal rejected with status {status}")]
    Rejected { status: StatusCode },

    #[error("Session renewal failed: {0}")]
    Transport(#[from] TransportError),

    #[error("Session renewal returned an unusable response: {0}")]
    MalformedResponse(String),

    #[error("Session renewal timed out after {0:?}")]
    TimedOut(Duration),

    #[error("Session renewal was abandoned before it completed")]
    Abandoned,
}

#[derive(Error, Debug)]
pub enum RequestError {
    #[error("Network error: {0}")]
    Transport(#[from] TransportError),

    #[error("Session expired - please sign in again: {0}")]
    RefreshFailed(#[from] RefreshError),

    #[error("{message}")]
    Api { status: StatusCode, message: String },

    #[error("Invalid response from {endpoint}: {source}")]
    Decode {
        endpoint: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid header value: {0}")]
    InvalidHeader(#[from] reqwest::header::InvalidHeaderValue),
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

impl RequestError {
    /// Build an `Api` error from a non-success response.
    ///
    /// The server's `message` field is used when the body is JSON that carries
    /// one. Any parse failure degrades to a generic message instead of becoming
    /// an error of its own.
    pub fn from_status(status: StatusCode, body: &str) -> Self {
        let message = match serde_json::from_str::<ErrorBody>(body) {
            Ok(ErrorBody {
                message: Some(message),
            }) if !message.is_empty() => message,
            Ok(_) => GENERIC_ERROR_MESSAGE.to_string(),
            Err(_) => UNKNOWN_ERROR_MESSAGE.to_string(),
        };
        RequestError::Api { status, message }
    }

    /// HTTP status for errors that came from a response.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            RequestError::Api { status, .. } => Some(*status),
            RequestError::RefreshFailed(RefreshError::Rejected { status }) => Some(*status),
            _ => None,
        }
    }

    /// True when the session is gone and the user has to sign in again.
    pub fn is_session_expired(&self) -> bool {
        matches!(self, RequestError::RefreshFailed(_))
    }
}

/// Truncate a response body to avoid logging excessive data
pub(crate) fn truncate_body(body: &str) -> String {
    if body.len() <= MAX_ERROR_BODY_LENGTH {
        body.to_string()
    } else {
        let mut end = MAX_ERROR_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
    }
}
