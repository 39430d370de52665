//! Authenticated API access.
//!
//! This module provides the `Gateway` that every API call goes through. The
//! gateway attaches the in-memory bearer credential and, when the server
//! rejects it, renews the session using the HTTP-only refresh cookie.
//!
//! Concurrent calls that fail while a renewal is already running queue behind
//! it instead of starting their own.

pub mod error;
pub mod gateway;
pub mod options;
mod refresh;

pub use error::{RefreshError, RequestError};
pub use gateway::{Gateway, GatewayConfig};
pub use options::RequestOptions;
