//! Authentication state for the current process.
//!
//! This module provides:
//! - `Credential`: The short-lived bearer token, redacted in debug output
//! - `SessionStore`: Shared in-memory slot for the credential and identity
//!
//! Nothing here is persisted. A restart always begins signed out until a
//! renewal succeeds.

pub mod credential;
pub mod session;

pub use credential::Credential;
pub use session::{SessionSnapshot, SessionStore};
