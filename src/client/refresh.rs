//! Single-flight coordination of token refreshes.
//!
//! The coordinator is an explicit two-state machine. The first caller that
//! observes an expired token while [`RefreshState::Idle`] becomes the leader and
//! performs the refresh; everyone arriving while [`RefreshState::Refreshing`]
//! becomes a waiter and receives the leader's outcome through a oneshot
//! channel when [`RefreshCoordinator::settle`] drains the queue.

use std::sync::{Mutex, MutexGuard};

use reqwest::StatusCode;
use tokio::sync::oneshot;

/// Why a refresh did not produce a new access token.
///
/// Cloneable so the same failure can be handed to every waiter.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RefreshError {
    #[error("no refresh token is stored")]
    MissingRefreshToken,

    #[error("refresh endpoint rejected the token with {status}: {body}")]
    Rejected { status: StatusCode, body: String },

    #[error("refresh request failed: {0}")]
    Transport(String),

    #[error("refresh response was malformed: {0}")]
    Malformed(String),

    #[error("refreshed tokens could not be stored: {0}")]
    Storage(String),

    #[error("the refresh this request was waiting on was abandoned")]
    Abandoned,
}

/// Outcome delivered to the leader and every waiter.
pub type RefreshOutcome = Result<String, RefreshError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshState {
    Idle,
    Refreshing,
}

/// A caller parked until the in-flight refresh settles.
#[derive(Debug)]
pub struct Waiter {
    sender: oneshot::Sender<RefreshOutcome>,
}

/// What a caller must do after observing an expired token.
#[derive(Debug)]
pub enum Begin {
    /// Perform the refresh, then call [`RefreshCoordinator::settle`].
    Leader,
    /// Await the in-flight refresh.
    Follower(PendingRefresh),
    /// A refresh already completed since the caller's token was issued; retry with this token.
    Rotated(String),
}

/// Receiving half of a waiter.
#[derive(Debug)]
pub struct PendingRefresh {
    receiver: oneshot::Receiver<RefreshOutcome>,
}

impl PendingRefresh {
    pub async fn wait(self) -> RefreshOutcome {
        self.receiver
            .await
            .unwrap_or(Err(RefreshError::Abandoned))
    }
}

#[derive(Debug)]
struct Inner {
    state: RefreshState,
    waiters: Vec<Waiter>,
    completed: u64,
}

/// Owns the refresh state and the waiter queue of one client.
#[derive(Debug)]
pub struct RefreshCoordinator {
    inner: Mutex<Inner>,
}

impl Default for RefreshCoordinator {
    fn default() -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: RefreshState::Idle,
                waiters: Vec::new(),
                completed: 0,
            }),
        }
    }
}

impl RefreshCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn state(&self) -> RefreshState {
        self.lock().state
    }

    /// Number of callers currently parked on the in-flight refresh.
    pub fn waiting(&self) -> usize {
        self.lock().waiters.len()
    }

    /// Number of refreshes that have settled over the coordinator's lifetime.
    pub fn completed(&self) -> u64 {
        self.lock().completed
    }

    /// Registers a caller that has just seen an expired token.
    ///
    /// `rotated` is consulted only while idle, under the coordinator lock; when
    /// it yields a token the caller skips the refresh and retries with it.
    pub fn begin<F>(&self, rotated: F) -> Begin
    where
        F: FnOnce() -> Option<String>,
    {
        let mut inner = self.lock();
        match inner.state {
            RefreshState::Refreshing => {
                let (sender, receiver) = oneshot::channel();
                inner.waiters.push(Waiter { sender });
                Begin::Follower(PendingRefresh { receiver })
            }
            RefreshState::Idle => match rotated() {
                Some(token) => Begin::Rotated(token),
                None => {
                    inner.state = RefreshState::Refreshing;
                    Begin::Leader
                }
            },
        }
    }

    /// Returns to idle and hands `outcome` to every waiter.
    ///
    /// Returns the number of waiters drained. Settling while idle does nothing.
    pub fn settle(&self, outcome: &RefreshOutcome) -> usize {
        let waiters = {
            let mut inner = self.lock();
            if inner.state == RefreshState::Idle {
                return 0;
            }
            inner.state = RefreshState::Idle;
            inner.completed += 1;
            std::mem::take(&mut inner.waiters)
        };

        let drained = waiters.len();
        for waiter in waiters {
            // A dropped receiver means the caller went away; nothing to deliver.
            let _ = waiter.sender.send(outcome.clone());
        }
        drained
    }
}
