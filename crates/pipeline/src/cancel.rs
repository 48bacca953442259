//! Cooperative cancellation flags, one per job.
//!
//! A flag is only observed at batch boundaries. Every job token is a child
//! of the registry's root token, so cancelling the root (on shutdown)
//! stops all running jobs at their next boundary.
//!
//! Running jobs hold a token; a cancel that arrives before its job starts
//! is parked as a pending request and handed to the token when the runner
//! registers the job. Both are dropped by [`CancellationRegistry::remove`].

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use catalog_core::types::DbId;
use tokio_util::sync::CancellationToken;

/// What a cancel request hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelTarget {
    /// The job's token was registered and is now cancelled.
    Running,
    /// The job has not registered yet; the request is parked.
    NotStarted,
}

#[derive(Default)]
struct Flags {
    running: HashMap<DbId, CancellationToken>,
    requested: HashSet<DbId>,
}

#[derive(Default)]
pub struct CancellationRegistry {
    root: CancellationToken,
    flags: Mutex<Flags>,
}

impl CancellationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `job_id` as running and return its token. A parked cancel
    /// request is applied to the new token.
    pub fn token(&self, job_id: DbId) -> CancellationToken {
        let Ok(mut flags) = self.flags.lock() else {
            return self.root.child_token();
        };
        let requested = flags.requested.remove(&job_id);
        let token = flags
            .running
            .entry(job_id)
            .or_insert_with(|| self.root.child_token())
            .clone();
        if requested {
            token.cancel();
        }
        token
    }

    /// Raise the flag for `job_id`.
    pub fn cancel(&self, job_id: DbId) -> CancelTarget {
        let Ok(mut flags) = self.flags.lock() else {
            return CancelTarget::NotStarted;
        };
        match flags.running.get(&job_id) {
            Some(token) => {
                token.cancel();
                CancelTarget::Running
            }
            None => {
                flags.requested.insert(job_id);
                CancelTarget::NotStarted
            }
        }
    }

    pub fn is_cancelled(&self, job_id: DbId) -> bool {
        if self.root.is_cancelled() {
            return true;
        }
        self.flags.lock().is_ok_and(|flags| {
            flags.requested.contains(&job_id)
                || flags
                    .running
                    .get(&job_id)
                    .is_some_and(CancellationToken::is_cancelled)
        })
    }

    /// Forget `job_id`'s token and any parked request.
    pub fn remove(&self, job_id: DbId) {
        if let Ok(mut flags) = self.flags.lock() {
            flags.running.remove(&job_id);
            flags.requested.remove(&job_id);
        }
    }

    /// Cancel every current and future job token. Parked requests are
    /// covered by the root and dropped.
    pub fn cancel_all(&self) {
        self.root.cancel();
        if let Ok(mut flags) = self.flags.lock() {
            flags.requested.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.flags
            .lock()
            .map(|flags| flags.running.len() + flags.requested.len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
