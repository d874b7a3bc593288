//! Ownership-typed handles to launched threads.
//!
//! - [`ThreadHandle`]: single owner; `join` and `detach` consume it, so a
//!   second join does not compile.
//! - [`ScopedThreadHandle`]: lives inside a launch scope and may borrow from
//!   the enclosing frame.
//! - [`TrackedThread`]: independently owned record for reapers; joins through
//!   `&mut self` and rejects a second join at run time.
//!
//! ```compile_fail
//! use courier_thread::ThreadManager;
//! use courier_types::ThreadConfig;
//!
//! let manager = ThreadManager::new(ThreadConfig::default());
//! let handle = manager.launch(|| 1).unwrap();
//! handle.join().unwrap();
//! handle.join().unwrap(); // use of moved value
//! ```

use std::sync::Arc;
use std::thread::{self, JoinHandle, ScopedJoinHandle, Thread};

use courier_types::{CancelOutcome, SignalOutcome, ThreadOutcome, ThreadState};

use crate::control::ThreadControl;
use crate::error::{EINVAL, ThreadError};
use crate::signal;
use crate::slots::Slot;
use crate::trampoline::panic_message;

fn finish_join<T>(control: &ThreadControl, joined: thread::Result<ThreadOutcome<T>>) -> ThreadOutcome<T> {
    control.set_joining(false);
    match joined {
        Ok(outcome) => outcome,
        Err(payload) => ThreadOutcome::Panicked(panic_message(payload.as_ref())),
    }
}

/// Handle returned by [`ThreadManager::launch`](crate::ThreadManager::launch).
///
/// Dropping it without joining detaches the thread and logs a warning.
#[must_use = "a launched thread must be joined or detached"]
#[derive(Debug)]
pub struct ThreadHandle<T> {
    inner: Option<JoinHandle<ThreadOutcome<T>>>,
    control: Arc<ThreadControl>,
}

impl<T> ThreadHandle<T> {
    pub(crate) fn new(inner: JoinHandle<ThreadOutcome<T>>, control: Arc<ThreadControl>) -> Self {
        Self {
            inner: Some(inner),
            control,
        }
    }

    fn join_handle(&self) -> &JoinHandle<ThreadOutcome<T>> {
        self.inner
            .as_ref()
            .expect("join handle present until the ThreadHandle is consumed")
    }

    /// Creation sequence number, unique per manager.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.control.id()
    }

    #[must_use]
    pub fn name(&self) -> &str {
        self.control.name()
    }

    #[must_use]
    pub fn thread(&self) -> &Thread {
        self.join_handle().thread()
    }

    #[must_use]
    pub fn state(&self) -> ThreadState {
        self.control.observed_state()
    }

    /// True once the OS thread has finished running.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.join_handle().is_finished()
    }

    /// Block until the thread terminates, discarding its result.
    pub fn join(self) -> Result<(), ThreadError> {
        self.join_with_result().map(drop)
    }

    /// Block until the thread terminates and return how it ended.
    pub fn join_with_result(mut self) -> Result<ThreadOutcome<T>, ThreadError> {
        let inner = self
            .inner
            .take()
            .expect("join handle present until the ThreadHandle is consumed");
        self.control.set_joining(true);
        let joined = inner.join();
        Ok(finish_join(&self.control, joined))
    }

    /// Release interest in the thread; the OS reclaims it when it exits.
    pub fn detach(mut self) {
        self.inner.take();
    }

    /// Latch a cancel request. An already-exited thread is not an error.
    pub fn cancel(&self) -> Result<CancelOutcome, ThreadError> {
        Ok(self.control.request_cancel())
    }

    /// Deliver `signal` to the thread. The target must have a handler
    /// installed for anything but `0`, or the default action applies to the
    /// whole process.
    pub fn signal(&self, signal: i32) -> Result<SignalOutcome, ThreadError> {
        signal::deliver(
            signal::raw_thread(self.join_handle()),
            &self.control,
            signal,
        )
    }
}

impl<T> Drop for ThreadHandle<T> {
    fn drop(&mut self) {
        if self.inner.take().is_some() {
            tracing::warn!(
                thread = self.control.name(),
                "Thread handle dropped without join or detach; detaching"
            );
        }
    }
}

/// Handle to a thread launched inside [`ThreadManager::scope`](crate::ThreadManager::scope).
///
/// The scope joins the thread when it ends if the handle was not joined first.
#[derive(Debug)]
pub struct ScopedThreadHandle<'scope, T> {
    inner: ScopedJoinHandle<'scope, ThreadOutcome<T>>,
    control: Arc<ThreadControl>,
}

impl<'scope, T> ScopedThreadHandle<'scope, T> {
    pub(crate) fn new(
        inner: ScopedJoinHandle<'scope, ThreadOutcome<T>>,
        control: Arc<ThreadControl>,
    ) -> Self {
        Self { inner, control }
    }

    #[must_use]
    pub fn id(&self) -> u64 {
        self.control.id()
    }

    #[must_use]
    pub fn name(&self) -> &str {
        self.control.name()
    }

    #[must_use]
    pub fn state(&self) -> ThreadState {
        self.control.observed_state()
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.inner.is_finished()
    }

    pub fn join(self) -> Result<(), ThreadError> {
        self.join_with_result().map(drop)
    }

    pub fn join_with_result(self) -> Result<ThreadOutcome<T>, ThreadError> {
        self.control.set_joining(true);
        let joined = self.inner.join();
        Ok(finish_join(&self.control, joined))
    }

    pub fn cancel(&self) -> Result<CancelOutcome, ThreadError> {
        Ok(self.control.request_cancel())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Disposition {
    Owned,
    Reaped,
    Detached,
}

/// Independently owned handle returned by
/// [`ThreadManager::launch_allocated`](crate::ThreadManager::launch_allocated).
///
/// Holds one tracked-record slot until dropped.
#[derive(Debug)]
pub struct TrackedThread<T> {
    inner: Option<JoinHandle<ThreadOutcome<T>>>,
    control: Arc<ThreadControl>,
    disposition: Disposition,
    _slot: Slot,
}

impl<T> TrackedThread<T> {
    pub(crate) fn new(
        inner: JoinHandle<ThreadOutcome<T>>,
        control: Arc<ThreadControl>,
        slot: Slot,
    ) -> Self {
        Self {
            inner: Some(inner),
            control,
            disposition: Disposition::Owned,
            _slot: slot,
        }
    }

    #[must_use]
    pub fn id(&self) -> u64 {
        self.control.id()
    }

    #[must_use]
    pub fn name(&self) -> &str {
        self.control.name()
    }

    #[must_use]
    pub fn state(&self) -> ThreadState {
        match self.disposition {
            Disposition::Owned => self.control.observed_state(),
            Disposition::Reaped => ThreadState::Reaped,
            Disposition::Detached => ThreadState::Detached,
        }
    }

    /// True once the thread can be joined without blocking, or is gone.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        match (&self.inner, self.disposition) {
            (Some(inner), _) => inner.is_finished(),
            (None, Disposition::Detached) => self.control.has_exited(),
            (None, _) => true,
        }
    }

    pub fn join(&mut self) -> Result<(), ThreadError> {
        self.join_with_result().map(drop)
    }

    /// Block until the thread terminates and return how it ended.
    ///
    /// Joining twice, or joining a detached thread, is reported as an error.
    pub fn join_with_result(&mut self) -> Result<ThreadOutcome<T>, ThreadError> {
        let inner = match (self.inner.take(), self.disposition) {
            (Some(inner), _) => inner,
            (None, Disposition::Detached) => return Err(self.join_refused(ThreadError::detached())),
            (None, _) => return Err(self.join_refused(ThreadError::already_joined())),
        };
        self.control.set_joining(true);
        let joined = inner.join();
        self.disposition = Disposition::Reaped;
        Ok(finish_join(&self.control, joined))
    }

    fn join_refused(&self, err: ThreadError) -> ThreadError {
        tracing::warn!(
            op = err.operation(),
            code = err.code(),
            thread = self.control.name(),
            "Could not join to the requested thread: {err}"
        );
        err
    }

    /// Release interest in the thread. Cancel keeps working; join and signal
    /// no longer do.
    pub fn detach(&mut self) -> Result<(), ThreadError> {
        match self.disposition {
            Disposition::Owned => {
                self.inner.take();
                self.disposition = Disposition::Detached;
                Ok(())
            }
            Disposition::Reaped => Err(self.join_refused(ThreadError::already_joined())),
            Disposition::Detached => Err(self.join_refused(ThreadError::detached())),
        }
    }

    pub fn cancel(&self) -> Result<CancelOutcome, ThreadError> {
        if self.disposition == Disposition::Reaped {
            return Ok(CancelOutcome::AlreadyExited);
        }
        Ok(self.control.request_cancel())
    }

    pub fn signal(&self, signal: i32) -> Result<SignalOutcome, ThreadError> {
        match (&self.inner, self.disposition) {
            (Some(inner), _) => signal::deliver(signal::raw_thread(inner), &self.control, signal),
            (None, Disposition::Detached) if !self.control.has_exited() => {
                tracing::warn!(
                    op = "pthread_kill",
                    code = EINVAL,
                    signal,
                    thread = self.control.name(),
                    "Cannot signal a detached thread"
                );
                Err(ThreadError::Signal {
                    signal,
                    code: EINVAL,
                })
            }
            (None, _) => Ok(SignalOutcome::AlreadyExited),
        }
    }
}

impl<T> Drop for TrackedThread<T> {
    fn drop(&mut self) {
        if self.inner.take().is_some() {
            tracing::warn!(
                thread = self.control.name(),
                "Tracked thread dropped without join or detach; detaching"
            );
        }
    }
}
