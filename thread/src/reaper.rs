//! Deferred joining of independently owned threads.
//!
//! A [`Reaper`] takes ownership of [`TrackedThread`]s from a fire-and-forget
//! dispatcher, joins them as they exit, and brings them all down on shutdown.
//! Threads are addressed by [`ThreadKey`]; keys are never reused, so a key
//! that is no longer tracked belongs to a thread that was already reaped.

use std::collections::BTreeMap;
use std::fmt;

use courier_types::{CancelOutcome, SignalOutcome, ThreadOutcome};

use crate::error::{EINVAL, ESRCH, ThreadError};
use crate::handle::TrackedThread;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ThreadKey(u64);

impl ThreadKey {
    /// Rebuild a key from its numeric value, e.g. one read from an admin
    /// command.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ThreadKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

pub type Reaped<T> = (ThreadKey, Result<ThreadOutcome<T>, ThreadError>);

#[derive(Debug)]
pub struct Reaper<T> {
    threads: BTreeMap<ThreadKey, TrackedThread<T>>,
    next_key: u64,
}

impl<T> Default for Reaper<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Reaper<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            threads: BTreeMap::new(),
            next_key: 1,
        }
    }

    pub fn adopt(&mut self, thread: TrackedThread<T>) -> ThreadKey {
        let key = ThreadKey(self.next_key);
        self.next_key += 1;
        tracing::trace!(%key, thread = thread.name(), "Adopted thread");
        self.threads.insert(key, thread);
        key
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.threads.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.threads.is_empty()
    }

    #[must_use]
    pub fn contains(&self, key: ThreadKey) -> bool {
        self.threads.contains_key(&key)
    }

    #[must_use]
    pub fn get(&self, key: ThreadKey) -> Option<&TrackedThread<T>> {
        self.threads.get(&key)
    }

    fn was_issued(&self, key: ThreadKey) -> bool {
        key.0 != 0 && key.0 < self.next_key
    }

    /// Join every thread that has already exited. Never blocks on a running
    /// thread.
    pub fn reap_finished(&mut self) -> Vec<Reaped<T>> {
        let finished: Vec<ThreadKey> = self
            .threads
            .iter()
            .filter(|(_, thread)| thread.is_finished())
            .map(|(key, _)| *key)
            .collect();
        finished
            .into_iter()
            .filter_map(|key| self.threads.remove(&key).map(|thread| (key, thread)))
            .map(|(key, mut thread)| (key, thread.join_with_result()))
            .collect()
    }

    pub fn cancel(&self, key: ThreadKey) -> Result<CancelOutcome, ThreadError> {
        match self.threads.get(&key) {
            Some(thread) => thread.cancel(),
            None if self.was_issued(key) => Ok(CancelOutcome::AlreadyExited),
            None => {
                tracing::warn!(op = "thread_cancel", code = EINVAL, %key, "Could not cancel the requested thread");
                Err(ThreadError::Cancel {
                    code: EINVAL,
                    reason: "no thread was ever tracked under this key",
                })
            }
        }
    }

    pub fn signal(&self, key: ThreadKey, signal: i32) -> Result<SignalOutcome, ThreadError> {
        match self.threads.get(&key) {
            Some(thread) => thread.signal(signal),
            None if self.was_issued(key) => Ok(SignalOutcome::AlreadyExited),
            None => {
                tracing::warn!(op = "thread_signal", code = EINVAL, %key, signal, "Could not signal the requested thread");
                Err(ThreadError::Signal {
                    signal,
                    code: EINVAL,
                })
            }
        }
    }

    /// Block until the thread under `key` exits and stop tracking it.
    pub fn join(&mut self, key: ThreadKey) -> Result<ThreadOutcome<T>, ThreadError> {
        match self.threads.remove(&key) {
            Some(mut thread) => thread.join_with_result(),
            None => {
                let err = if self.was_issued(key) {
                    ThreadError::Join {
                        code: ESRCH,
                        reason: "thread was already reaped",
                    }
                } else {
                    ThreadError::Join {
                        code: EINVAL,
                        reason: "no thread was ever tracked under this key",
                    }
                };
                tracing::warn!(op = "thread_join", code = err.code(), %key, "Could not join to the requested thread");
                Err(err)
            }
        }
    }

    /// Latch a cancel request on every tracked thread. Returns how many were
    /// still running.
    pub fn cancel_all(&self) -> usize {
        self.threads
            .values()
            .filter_map(|thread| thread.cancel().ok())
            .filter(|outcome| *outcome == CancelOutcome::Requested)
            .count()
    }

    /// Cancel every tracked thread, then join them all.
    ///
    /// Threads running with cancellation disabled are waited for until they
    /// re-enable it and reach a cancellation point, or return.
    pub fn shutdown(&mut self) -> Vec<Reaped<T>> {
        let requested = self.cancel_all();
        tracing::info!(
            tracked = self.threads.len(),
            requested,
            "Shutting down tracked threads"
        );
        std::mem::take(&mut self.threads)
            .into_iter()
            .map(|(key, mut thread)| (key, thread.join_with_result()))
            .collect()
    }
}
