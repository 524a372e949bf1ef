//! Single-producer/single-consumer hand-off over a named semaphore
//!
//! The producer finishes all writes to the paired segment, then calls
//! [`SyncGate::signal`]. The consumer blocks in [`SyncGate::wait`] until the
//! signal arrives or the timeout elapses, reads, and signals back to return
//! the turn. Excess posts are harmless (the count absorbs them); a missing
//! post surfaces as a timeout, never a hang.

use crate::error::ExchangeResult;
use crate::platform::{self, RawSemaphore};
use std::time::Duration;
use tracing::{debug, warn};

/// Default hand-off wait budget
///
/// Short on purpose: a crashed peer should surface as a timeout in seconds,
/// not an indefinite hang.
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Result of a gate wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The peer signaled within the budget
    Signaled,
    /// The budget elapsed with no signal
    TimedOut,
}

/// Named synchronization gate pairing 1:1 with a segment
pub struct SyncGate {
    name: String,
    sem: RawSemaphore,
}

impl SyncGate {
    /// Open the named gate, creating the semaphore (count 0) if absent
    pub fn open_or_create(name: &str) -> ExchangeResult<Self> {
        let sem = RawSemaphore::open_or_create(name)?;
        Ok(Self {
            name: name.to_string(),
            sem,
        })
    }

    /// Gate name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Signal the peer that data is ready (or consumed); non-blocking
    pub fn signal(&self) -> ExchangeResult<()> {
        debug!(gate = %self.name, "signal");
        self.sem.post()
    }

    /// Block until signaled or until `timeout` elapses
    ///
    /// A timeout is an ordinary outcome, not an error: callers decide whether
    /// to retry or fail the exchange. No resource is leaked either way.
    pub fn wait(&self, timeout: Duration) -> ExchangeResult<WaitOutcome> {
        debug!(gate = %self.name, timeout_ms = timeout.as_millis() as u64, "wait");
        if self.sem.timed_wait(timeout)? {
            Ok(WaitOutcome::Signaled)
        } else {
            warn!(gate = %self.name, "wait timed out");
            Ok(WaitOutcome::TimedOut)
        }
    }

    /// Remove the kernel semaphore backing `name`; idempotent
    pub fn unlink(name: &str) -> ExchangeResult<()> {
        platform::sem_unlink(name)
    }
}
