//! In-memory transport standing in for the API server in unit tests.
//!
//! Routes:
//! - `/auth/refresh`: answers per the current `RenewalScript`, optionally
//!   parked until the test releases it
//! - `/users/me`: 200 while the cookie session is alive and the call is ambient
//! - `/teapot`, `/broken`, `/empty`, `/offline`, `/always-401`: fixed answers
//! - anything else: 200 `{"path", "token"}` for the accepted bearer, else 401

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use reqwest::{header, StatusCode};
use serde_json::json;
use tokio::sync::Semaphore;

use super::{Transport, TransportError, TransportRequest, TransportResponse};

pub(crate) const BASE_URL: &str = "http://api.test";

#[derive(Debug, Clone)]
pub(crate) enum RenewalScript {
    Grant {
        token: String,
        identity: Option<String>,
    },
    Reject(StatusCode),
    Unreachable,
    Garbage,
}

impl RenewalScript {
    pub(crate) fn grant(token: &str) -> Self {
        RenewalScript::Grant {
            token: token.to_string(),
            identity: None,
        }
    }

    pub(crate) fn with_identity(self, who: &str) -> Self {
        match self {
            RenewalScript::Grant { token, .. } => RenewalScript::Grant {
                token,
                identity: Some(who.to_string()),
            },
            other => other,
        }
    }
}

struct ScriptState {
    accepted_token: Option<String>,
    renewal: RenewalScript,
    cookie_session: bool,
    requests: Vec<TransportRequest>,
}

pub(crate) struct ScriptedTransport {
    state: Mutex<ScriptState>,
    hold: AtomicBool,
    gate: Semaphore,
}

impl ScriptedTransport {
    pub(crate) fn accepting(token: &str) -> Self {
        Self {
            state: Mutex::new(ScriptState {
                accepted_token: Some(token.to_string()),
                renewal: RenewalScript::Reject(StatusCode::UNAUTHORIZED),
                cookie_session: true,
                requests: Vec::new(),
            }),
            hold: AtomicBool::new(false),
            gate: Semaphore::new(0),
        }
    }

    pub(crate) fn set_renewal(&self, script: RenewalScript) {
        self.lock().renewal = script;
    }

    /// Server forgets every bearer it issued.
    pub(crate) fn expire_sessions(&self) {
        self.lock().accepted_token = None;
    }

    pub(crate) fn end_cookie_session(&self) {
        self.lock().cookie_session = false;
    }

    /// Park renewal calls until `release_renewal`.
    pub(crate) fn hold_renewals(&self) {
        self.hold.store(true, Ordering::SeqCst);
    }

    pub(crate) fn release_renewal(&self) {
        self.gate.add_permits(1);
    }

    pub(crate) fn renewal_calls(&self) -> usize {
        self.requests_to("/auth/refresh").len()
    }

    pub(crate) fn requests_to(&self, path: &str) -> Vec<TransportRequest> {
        let url = format!("{}{}", BASE_URL, path);
        self.lock()
            .requests
            .iter()
            .filter(|r| r.url == url)
            .cloned()
            .collect()
    }

    /// `Authorization` header of each call to `path`, in send order.
    pub(crate) fn bearers_for(&self, path: &str) -> Vec<String> {
        self.requests_to(path)
            .iter()
            .filter_map(|r| r.headers.get(header::AUTHORIZATION))
            .filter_map(|v| v.to_str().ok().map(str::to_string))
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, ScriptState> {
        self.state.lock().expect("script state lock")
    }

    async fn renew(&self) -> Result<TransportResponse, TransportError> {
        if self.hold.load(Ordering::SeqCst) {
            if let Ok(permit) = self.gate.acquire().await {
                permit.forget();
            }
        }

        let mut state = self.lock();
        match state.renewal.clone() {
            RenewalScript::Grant { token, identity } => {
                state.accepted_token = Some(token.clone());
                let body = json!({"accessToken": token, "userEmail": identity});
                Ok(TransportResponse::new(StatusCode::OK, body.to_string()))
            }
            RenewalScript::Reject(status) => Ok(TransportResponse::new(
                status,
                r#"{"message": "Refresh token expired"}"#,
            )),
            RenewalScript::Unreachable => Err(TransportError::new("connection refused")),
            RenewalScript::Garbage => Ok(TransportResponse::new(StatusCode::OK, r#"{"token": 7}"#)),
        }
    }

    fn route(&self, path: &str, request: &TransportRequest) -> Result<TransportResponse, TransportError> {
        let state = self.lock();
        let response = match path {
            "/users/me" if request.include_ambient_credentials && state.cookie_session => {
                TransportResponse::new(StatusCode::OK, r#"{"email": "alex@example.com"}"#)
            }
            "/users/me" => TransportResponse::new(StatusCode::UNAUTHORIZED, ""),
            "/teapot" => TransportResponse::new(
                StatusCode::IM_A_TEAPOT,
                r#"{"message": "short and stout"}"#,
            ),
            "/broken" => TransportResponse::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "<html>upstream exploded</html>",
            ),
            "/empty" => TransportResponse::new(StatusCode::NO_CONTENT, ""),
            "/offline" => return Err(TransportError::new("dns error: no such host")),
            "/always-401" => TransportResponse::new(
                StatusCode::UNAUTHORIZED,
                r#"{"message": "nope"}"#,
            ),
            _ => {
                let presented = request
                    .headers
                    .get(header::AUTHORIZATION)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.strip_prefix("Bearer "));
                match (presented, state.accepted_token.as_deref()) {
                    (Some(presented), Some(accepted)) if presented == accepted => {
                        let body = json!({"path": path, "token": presented});
                        TransportResponse::new(StatusCode::OK, body.to_string())
                    }
                    _ => TransportResponse::new(
                        StatusCode::UNAUTHORIZED,
                        r#"{"message": "Token expired"}"#,
                    ),
                }
            }
        };
        Ok(response)
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
        self.lock().requests.push(request.clone());

        let path = request
            .url
            .strip_prefix(BASE_URL)
            .unwrap_or(&request.url)
            .to_string();

        if path == "/auth/refresh" {
            return self.renew().await;
        }
        self.route(&path, &request)
    }
}
