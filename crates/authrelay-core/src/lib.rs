//! Client-side session manager with single-flight token renewal.
//!
//! A short-lived access credential lives only in memory (`SessionStore`).
//! Every API call goes through the `Gateway`, which attaches the credential,
//! and when the server answers 401, exchanges the long-lived session cookie for
//! a new credential and replays the call. However many calls fail at once,
//! exactly one renewal round-trip is made.

pub mod api;
pub mod auth;
pub mod config;
pub mod redirect;
pub mod transport;

pub use api::{Gateway, GatewayConfig, RefreshError, RequestError, RequestOptions};
pub use auth::{Credential, SessionSnapshot, SessionStore};
pub use config::Config;
pub use redirect::{LogRedirect, LoginRedirect};
pub use transport::{HttpTransport, Transport, TransportError, TransportRequest, TransportResponse};
