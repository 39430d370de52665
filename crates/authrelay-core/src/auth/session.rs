use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use tracing::debug;

use super::Credential;

/// Point-in-time copy of the session, safe to hand to display code.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub credential: Option<Credential>,
    pub identity: Option<String>,
    pub renewed_at: Option<DateTime<Utc>>,
}

impl SessionSnapshot {
    pub fn is_authenticated(&self) -> bool {
        self.credential.is_some()
    }
}

/// In-memory session slot shared between the gateway and the rest of the app.
///
/// Every accessor is synchronous and infallible: reads and writes never
/// suspend and are visible to all holders of the store as soon as they return.
/// The store performs no I/O and knows nothing about renewal.
#[derive(Debug, Default)]
pub struct SessionStore {
    state: RwLock<SessionSnapshot>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current credential, if signed in.
    pub fn credential(&self) -> Option<Credential> {
        self.read().credential.clone()
    }

    /// Replace the current credential. `None` signs the session out but keeps
    /// the identity marker; use [`SessionStore::logout`] to drop both.
    pub fn set_credential(&self, credential: Option<Credential>) {
        let mut state = self.write();
        state.renewed_at = credential.as_ref().map(|_| Utc::now());
        state.credential = credential;
    }

    pub fn identity(&self) -> Option<String> {
        self.read().identity.clone()
    }

    pub fn set_identity(&self, identity: Option<String>) {
        self.write().identity = identity;
    }

    pub fn is_authenticated(&self) -> bool {
        self.read().credential.is_some()
    }

    /// Timestamp of the last credential write. Display only.
    pub fn renewed_at(&self) -> Option<DateTime<Utc>> {
        self.read().renewed_at
    }

    /// Store a freshly issued credential together with who it belongs to.
    pub fn login(&self, credential: Credential, identity: Option<String>) {
        let mut state = self.write();
        state.credential = Some(credential);
        state.identity = identity;
        state.renewed_at = Some(Utc::now());
        debug!(identity = ?state.identity, "Session established");
    }

    /// Forget the credential and identity.
    pub fn logout(&self) {
        *self.write() = SessionSnapshot::default();
        debug!("Session cleared");
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.read().clone()
    }

    // A panic while holding the lock can't leave a half-written snapshot
    // behind, so poisoning is ignored.
    fn read(&self) -> RwLockReadGuard<'_, SessionSnapshot> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, SessionSnapshot> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}
