//! Network transport seam.
//!
//! The gateway never talks to `reqwest` directly. It hands a fully shaped
//! `TransportRequest` to a `Transport` and gets back the status and raw body.
//! `HttpTransport` is the production implementation; tests script their own.

pub mod http;
#[cfg(test)]
pub(crate) mod scripted;

use async_trait::async_trait;
use reqwest::{header::HeaderMap, Method, StatusCode};
use serde::de::DeserializeOwned;
use thiserror::Error;

pub use http::HttpTransport;

/// Underlying network call could not complete.
///
/// Cloneable so a single failure can be handed to every renewal waiter.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct TransportError {
    message: String,
    timed_out: bool,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            timed_out: false,
        }
    }

    pub fn timed_out(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            timed_out: true,
        }
    }

    pub fn is_timeout(&self) -> bool {
        self.timed_out
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        let url = err
            .url()
            .map(|u| format!(" ({})", u))
            .unwrap_or_default();
        Self {
            message: format!("{}{}", err, url),
            timed_out: err.is_timeout(),
        }
    }
}

/// A single outgoing call, already carrying every header it needs.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Option<String>,
    /// Send the ambient session cookie. Only renewal and the session probe
    /// set this.
    pub include_ambient_credentials: bool,
}

impl TransportRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HeaderMap::new(),
            body: None,
            include_ambient_credentials: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: StatusCode,
    pub body: String,
}

impl TransportResponse {
    pub fn new(status: StatusCode, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_str(&self.body)
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError>;
}
