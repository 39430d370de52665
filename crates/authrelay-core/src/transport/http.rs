//! `reqwest`-backed transport.
//!
//! Two clients are kept: one with a shared cookie jar for calls that must carry
//! the HTTP-only session cookie, and one without any cookie store for ordinary
//! API calls. Clone is cheap - both clients and the jar are reference counted.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{cookie::Jar, Client, Url};
use tracing::debug;

use super::{Transport, TransportError, TransportRequest, TransportResponse};

/// Default HTTP request timeout in seconds.
/// 30s allows for slow API responses while failing fast enough for good UX.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Clone)]
pub struct HttpTransport {
    plain: Client,
    ambient: Client,
    jar: Arc<Jar>,
}

impl HttpTransport {
    pub fn new() -> Result<Self, TransportError> {
        Self::with_timeout(Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS))
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, TransportError> {
        let jar = Arc::new(Jar::default());

        let plain = Client::builder().timeout(timeout).build()?;
        let ambient = Client::builder()
            .timeout(timeout)
            .cookie_provider(Arc::clone(&jar))
            .build()?;

        Ok(Self {
            plain,
            ambient,
            jar,
        })
    }

    /// Seed the ambient jar with a `Set-Cookie` style string scoped to `url`.
    ///
    /// Normally the server sets the session cookie itself on login; this is
    /// for picking up a session established elsewhere.
    pub fn with_session_cookie(self, cookie: &str, url: &str) -> Result<Self, TransportError> {
        let url = Url::parse(url)
            .map_err(|e| TransportError::new(format!("Invalid cookie URL {}: {}", url, e)))?;
        self.jar.add_cookie_str(cookie, &url);
        Ok(self)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
        let client = if request.include_ambient_credentials {
            &self.ambient
        } else {
            &self.plain
        };

        debug!(
            method = %request.method,
            url = %request.url,
            ambient = request.include_ambient_credentials,
            "Sending request"
        );

        let mut builder = client
            .request(request.method, &request.url)
            .headers(request.headers);
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let body = response.text().await?;

        Ok(TransportResponse { status, body })
    }
}
