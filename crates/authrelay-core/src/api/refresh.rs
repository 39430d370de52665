//! Single-flight coordination for session renewal.
//!
//! The first caller to hit a 401 becomes the leader and performs the renewal;
//! everyone who hits a 401 while that renewal is outstanding gets a `Waiter`
//! and is released with the leader's result. The in-progress flag and the
//! waiter queue sit behind one lock, and the lock is never held across an
//! `.await`, so deciding between "lead" and "wait" is a single step.
//!
//! Callers also say whether a failed renewal should send the user to the
//! login page. The leader learns on conclusion whether anyone sharing the
//! renewal asked for that, so the redirect fires once per renewal no matter
//! which caller started it.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;
use tracing::{debug, warn};

use super::RefreshError;
use crate::auth::Credential;

pub(crate) type RenewalResult = Result<Credential, RefreshError>;

#[derive(Default)]
struct RenewalState {
    in_progress: bool,
    redirect_requested: bool,
    waiters: VecDeque<oneshot::Sender<RenewalResult>>,
}

/// Outcome of concluding a renewal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Released {
    pub(crate) waiters: usize,
    /// Some caller sharing this renewal wants a failure to redirect to login
    pub(crate) redirect_requested: bool,
}

#[derive(Default)]
pub(crate) struct RefreshCoordinator {
    state: Mutex<RenewalState>,
}

/// What a caller that just received a 401 should do next.
pub(crate) enum Role<'a> {
    Leader(RenewalLease<'a>),
    Waiter(Waiter),
}

/// Held by the one caller performing the renewal.
///
/// Dropping the lease without concluding it (the leader's future was
/// cancelled) releases every waiter with `RefreshError::Abandoned` and clears
/// the in-progress flag.
pub(crate) struct RenewalLease<'a> {
    coordinator: &'a RefreshCoordinator,
    concluded: bool,
}

pub(crate) struct Waiter(oneshot::Receiver<RenewalResult>);

impl RefreshCoordinator {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Check the flag and either take the lease or join the queue.
    pub(crate) fn enter(&self, redirect_on_failure: bool) -> Role<'_> {
        let mut state = self.lock();
        if state.in_progress {
            state.redirect_requested |= redirect_on_failure;
            let (tx, rx) = oneshot::channel();
            state.waiters.push_back(tx);
            debug!(position = state.waiters.len(), "Renewal in flight, queued behind it");
            Role::Waiter(Waiter(rx))
        } else {
            state.in_progress = true;
            state.redirect_requested = redirect_on_failure;
            Role::Leader(RenewalLease {
                coordinator: self,
                concluded: false,
            })
        }
    }

    pub(crate) fn is_in_progress(&self) -> bool {
        self.lock().in_progress
    }

    pub(crate) fn pending_waiters(&self) -> usize {
        self.lock().waiters.len()
    }

    /// Clear the flag and take the queue in one critical section, then hand
    /// the result to each waiter in the order they queued.
    fn conclude(&self, result: &RenewalResult) -> Released {
        let (waiters, redirect_requested) = {
            let mut state = self.lock();
            state.in_progress = false;
            let redirect = std::mem::take(&mut state.redirect_requested);
            (std::mem::take(&mut state.waiters), redirect)
        };

        let count = waiters.len();
        for waiter in waiters {
            // A waiter whose caller went away has nothing left to resume
            let _ = waiter.send(result.clone());
        }
        Released {
            waiters: count,
            redirect_requested,
        }
    }

    fn lock(&self) -> MutexGuard<'_, RenewalState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl RenewalLease<'_> {
    /// Release every waiter with `result`.
    pub(crate) fn conclude(mut self, result: &RenewalResult) -> Released {
        self.concluded = true;
        self.coordinator.conclude(result)
    }
}

impl Drop for RenewalLease<'_> {
    fn drop(&mut self) {
        if !self.concluded {
            let released = self.coordinator.conclude(&Err(RefreshError::Abandoned));
            warn!(waiters = released.waiters, "Renewal abandoned before completion");
        }
    }
}

impl Waiter {
    pub(crate) async fn wait(self) -> RenewalResult {
        self.0.await.unwrap_or(Err(RefreshError::Abandoned))
    }
}
