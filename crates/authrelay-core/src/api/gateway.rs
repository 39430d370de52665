//! Authenticated request gateway.
//!
//! Every API call goes through `Gateway::request`, which attaches the current
//! bearer credential and, when the server answers 401, renews the session
//! through the refresh cookie and replays the call. Concurrent 401s share a
//! single renewal round-trip; see `refresh.rs` for the coordination.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{self, HeaderValue};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::error::truncate_body;
use super::refresh::{RefreshCoordinator, Role};
use super::{RefreshError, RequestError, RequestOptions};
use crate::auth::{Credential, SessionStore};
use crate::redirect::LoginRedirect;
use crate::transport::{Transport, TransportRequest, TransportResponse};

// ============================================================================
// Constants
// ============================================================================

/// Base URL used when nothing is configured (local API server)
pub const DEFAULT_API_URL: &str = "http://localhost:3000";

/// Renewal endpoint; authenticates with the HTTP-only session cookie
pub const DEFAULT_REFRESH_PATH: &str = "/auth/refresh";

/// Session probe endpoint; also authenticated by cookie
pub const DEFAULT_CURRENT_USER_PATH: &str = "/users/me";

/// Upper bound on a single renewal round-trip, in seconds.
/// Every queued caller is stuck until renewal concludes, so this is kept
/// well below the ordinary request timeout.
pub const DEFAULT_REFRESH_TIMEOUT_SECS: u64 = 10;

fn json_content_type() -> HeaderValue {
    HeaderValue::from_static("application/json")
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub api_url: String,
    pub refresh_path: String,
    pub current_user_path: String,
    pub refresh_timeout: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            refresh_path: DEFAULT_REFRESH_PATH.to_string(),
            current_user_path: DEFAULT_CURRENT_USER_PATH.to_string(),
            refresh_timeout: Duration::from_secs(DEFAULT_REFRESH_TIMEOUT_SECS),
        }
    }
}

impl GatewayConfig {
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            ..Self::default()
        }
    }

    fn url(&self, endpoint: &str) -> String {
        let base = self.api_url.trim_end_matches('/');
        if endpoint.starts_with('/') {
            format!("{}{}", base, endpoint)
        } else {
            format!("{}/{}", base, endpoint)
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RenewalResponse {
    access_token: String,
    user_email: Option<String>,
}

/// Authenticated API gateway.
/// Clone is cheap - all state lives behind a shared `Arc`.
#[derive(Clone)]
pub struct Gateway {
    inner: Arc<GatewayInner>,
}

struct GatewayInner {
    config: GatewayConfig,
    session: Arc<SessionStore>,
    transport: Arc<dyn Transport>,
    redirect: Arc<dyn LoginRedirect>,
    refresh: RefreshCoordinator,
}

impl Gateway {
    pub fn new(
        config: GatewayConfig,
        session: Arc<SessionStore>,
        transport: Arc<dyn Transport>,
        redirect: Arc<dyn LoginRedirect>,
    ) -> Self {
        Self {
            inner: Arc::new(GatewayInner {
                config,
                session,
                transport,
                redirect,
                refresh: RefreshCoordinator::new(),
            }),
        }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.inner.config
    }

    pub fn session(&self) -> &Arc<SessionStore> {
        &self.inner.session
    }

    /// Store a credential obtained by signing in.
    pub fn login(&self, credential: Credential, identity: Option<String>) {
        self.inner.session.login(credential, identity);
    }

    pub fn logout(&self) {
        self.inner.session.logout();
    }

    /// True while a renewal round-trip is outstanding.
    pub fn is_renewing(&self) -> bool {
        self.inner.refresh.is_in_progress()
    }

    /// Number of callers parked behind the outstanding renewal.
    pub fn pending_renewal_waiters(&self) -> usize {
        self.inner.refresh.pending_waiters()
    }

    /// Perform an authenticated API call and deserialize the JSON response.
    ///
    /// A 401 renews the session (once, shared with every other caller that hit
    /// a 401 meanwhile) and replays the call with the new credential. If the
    /// renewal fails the session is cleared, the login redirect fires and the
    /// call fails with `RequestError::RefreshFailed`.
    pub async fn request<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        options: RequestOptions,
    ) -> Result<T, RequestError> {
        let credential = self.inner.session.credential();
        let response = self.dispatch(endpoint, &options, credential.as_ref()).await?;

        if response.status != StatusCode::UNAUTHORIZED {
            return Self::interpret(endpoint, response);
        }

        debug!(endpoint, "Credential rejected, renewing session");
        let credential = self.renew_shared(true).await?;

        // The replay is final: a second 401 is reported, not renewed again
        let retry = self.dispatch(endpoint, &options, Some(&credential)).await?;
        Self::interpret(endpoint, retry)
    }

    /// Silent renewal on application start.
    ///
    /// Returns the identity marker on success. Failure clears the session but
    /// does not fire the login redirect on its own account; `request` calls
    /// that queued behind it still get theirs. Callers normally just log it.
    pub async fn restore_session(&self) -> Result<Option<String>, RefreshError> {
        self.renew_shared(false).await?;
        Ok(self.inner.session.identity())
    }

    /// Ask the server who the cookie session belongs to.
    ///
    /// Any non-success answer means "nobody" and yields `Ok(None)`.
    pub async fn current_user<T: DeserializeOwned>(&self) -> Result<Option<T>, RequestError> {
        let endpoint = self.inner.config.current_user_path.as_str();
        let mut request = TransportRequest::new(Method::GET, self.inner.config.url(endpoint));
        request.include_ambient_credentials = true;

        let response = self.inner.transport.send(request).await?;
        if !response.status.is_success() {
            debug!(status = %response.status, "No active session");
            return Ok(None);
        }
        Self::decode(endpoint, &response).map(Some)
    }

    /// Join the outstanding renewal, or start one if none is running.
    ///
    /// A failure redirects to login once if any caller sharing the renewal
    /// asked for it, even when the caller that started it did not.
    async fn renew_shared(&self, redirect_on_failure: bool) -> Result<Credential, RefreshError> {
        let lease = match self.inner.refresh.enter(redirect_on_failure) {
            Role::Waiter(waiter) => return waiter.wait().await,
            Role::Leader(lease) => lease,
        };

        match self.renew().await {
            Ok(renewed) => {
                let credential = Credential::from(renewed.access_token);
                let session = &self.inner.session;
                session.set_credential(Some(credential.clone()));
                if renewed.user_email.is_some() {
                    session.set_identity(renewed.user_email);
                }

                let released = lease.conclude(&Ok(credential.clone()));
                info!(waiters = released.waiters, "Session renewed");
                Ok(credential)
            }
            Err(err) => {
                // Session must be empty before the flag clears
                self.inner.session.logout();
                let released = lease.conclude(&Err(err.clone()));
                warn!(error = %err, waiters = released.waiters, "Session renewal failed");

                if released.redirect_requested {
                    self.inner.redirect.redirect_to_login();
                }
                Err(err)
            }
        }
    }

    /// One renewal round-trip. Carries the session cookie, never a bearer.
    async fn renew(&self) -> Result<RenewalResponse, RefreshError> {
        let config = &self.inner.config;
        let mut request = TransportRequest::new(Method::POST, config.url(&config.refresh_path));
        request.headers.insert(header::CONTENT_TYPE, json_content_type());
        request.include_ambient_credentials = true;

        let response = tokio::time::timeout(config.refresh_timeout, self.inner.transport.send(request))
            .await
            .map_err(|_| RefreshError::TimedOut(config.refresh_timeout))??;

        if !response.status.is_success() {
            debug!(
                status = %response.status,
                body = %truncate_body(&response.body),
                "Renewal endpoint refused the session"
            );
            return Err(RefreshError::Rejected {
                status: response.status,
            });
        }

        let renewed: RenewalResponse = response
            .json()
            .map_err(|e| RefreshError::MalformedResponse(e.to_string()))?;
        if renewed.access_token.is_empty() {
            return Err(RefreshError::MalformedResponse(
                "empty access token".to_string(),
            ));
        }
        Ok(renewed)
    }

    async fn dispatch(
        &self,
        endpoint: &str,
        options: &RequestOptions,
        credential: Option<&Credential>,
    ) -> Result<TransportResponse, RequestError> {
        let mut request = TransportRequest::new(options.method.clone(), self.inner.config.url(endpoint));
        request.headers = options.headers.clone();
        if let Some(credential) = credential {
            request
                .headers
                .insert(header::AUTHORIZATION, credential.bearer_header()?);
        }
        request.headers.insert(header::CONTENT_TYPE, json_content_type());
        request.body = options.body.clone();

        Ok(self.inner.transport.send(request).await?)
    }

    fn interpret<T: DeserializeOwned>(
        endpoint: &str,
        response: TransportResponse,
    ) -> Result<T, RequestError> {
        if response.status.is_success() {
            return Self::decode(endpoint, &response);
        }

        warn!(
            endpoint,
            status = %response.status,
            body = %truncate_body(&response.body),
            "API request failed"
        );
        Err(RequestError::from_status(response.status, &response.body))
    }

    fn decode<T: DeserializeOwned>(
        endpoint: &str,
        response: &TransportResponse,
    ) -> Result<T, RequestError> {
        // No body (204 and friends) reads as JSON null
        let body = if response.body.trim().is_empty() {
            "null"
        } else {
            response.body.as_str()
        };
        serde_json::from_str(body).map_err(|source| RequestError::Decode {
            endpoint: endpoint.to_string(),
            source,
        })
    }
}
