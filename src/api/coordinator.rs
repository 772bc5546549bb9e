//! One-at-a-time access-token refresh.
//!
//! The first caller to hit an expired token becomes the leader and performs
//! the refresh; everyone arriving while it is outstanding is queued and
//! released with the leader's outcome. The queue only exists while the
//! coordinator is `Refreshing` and is emptied in one step when it settles.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::oneshot;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("token refresh failed: {reason}")]
pub struct RefreshRejected {
    pub reason: String,
}

impl RefreshRejected {
    pub fn new<S: Into<String>>(reason: S) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// What every queued caller receives: the new access token or the rejection.
pub type RefreshOutcome = Result<String, RefreshRejected>;

enum State {
    Idle,
    Refreshing {
        waiters: Vec<oneshot::Sender<RefreshOutcome>>,
    },
}

pub struct RefreshCoordinator {
    state: Mutex<State>,
}

/// Result of [`RefreshCoordinator::begin`].
pub enum Ticket {
    /// Caller must perform the refresh and settle the leader.
    Leader(RefreshLeader),
    /// A refresh is already running; wait for it.
    Waiter(RefreshWaiter),
}

impl RefreshCoordinator {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::Idle),
        }
    }

    /// `Idle -> Refreshing` for the first caller, enqueue for the rest.
    pub fn begin(self: &Arc<Self>) -> Ticket {
        let mut state = self.state.lock();
        match &mut *state {
            State::Idle => {
                *state = State::Refreshing {
                    waiters: Vec::new(),
                };
                Ticket::Leader(RefreshLeader {
                    coordinator: Arc::clone(self),
                    settled: false,
                })
            }
            State::Refreshing { waiters } => {
                let (tx, rx) = oneshot::channel();
                waiters.push(tx);
                Ticket::Waiter(RefreshWaiter { rx })
            }
        }
    }

    /// Queues a waiter behind the running refresh. `None` when idle.
    pub fn enqueue(&self) -> Option<RefreshWaiter> {
        let mut state = self.state.lock();
        match &mut *state {
            State::Idle => None,
            State::Refreshing { waiters } => {
                let (tx, rx) = oneshot::channel();
                waiters.push(tx);
                Some(RefreshWaiter { rx })
            }
        }
    }

    /// Releases every waiter with `token` and returns to idle.
    pub fn resolve(&self, token: &str) -> usize {
        self.settle(Ok(token.to_string()))
    }

    /// Releases every waiter with the failure and returns to idle.
    pub fn reject(&self, err: RefreshRejected) -> usize {
        self.settle(Err(err))
    }

    pub fn is_refreshing(&self) -> bool {
        matches!(*self.state.lock(), State::Refreshing { .. })
    }

    /// Number of queued waiters.
    pub fn pending(&self) -> usize {
        match &*self.state.lock() {
            State::Idle => 0,
            State::Refreshing { waiters } => waiters.len(),
        }
    }

    fn settle(&self, outcome: RefreshOutcome) -> usize {
        let waiters = {
            let mut state = self.state.lock();
            match std::mem::replace(&mut *state, State::Idle) {
                State::Idle => Vec::new(),
                State::Refreshing { waiters } => waiters,
            }
        };
        let n = waiters.len();
        for tx in waiters {
            // A waiter whose caller went away is simply skipped.
            let _ = tx.send(outcome.clone());
        }
        n
    }
}

impl Default for RefreshCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// Held by the caller performing the refresh. Dropping it unsettled rejects
/// all waiters so nobody is left suspended.
pub struct RefreshLeader {
    coordinator: Arc<RefreshCoordinator>,
    settled: bool,
}

impl RefreshLeader {
    pub fn resolve(mut self, token: &str) -> usize {
        self.settled = true;
        self.coordinator.resolve(token)
    }

    pub fn reject(mut self, err: RefreshRejected) -> usize {
        self.settled = true;
        self.coordinator.reject(err)
    }
}

impl Drop for RefreshLeader {
    fn drop(&mut self) {
        if !self.settled {
            let n = self
                .coordinator
                .reject(RefreshRejected::new("refresh abandoned"));
            log::warn!("api.refresh.abandoned waiters={}", n);
        }
    }
}

pub struct RefreshWaiter {
    rx: oneshot::Receiver<RefreshOutcome>,
}

impl RefreshWaiter {
    pub async fn wait(self) -> RefreshOutcome {
        self.rx
            .await
            .unwrap_or_else(|_| Err(RefreshRejected::new("refresh coordinator dropped")))
    }
}
