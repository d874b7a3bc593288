//! Shared control block between a worker thread and its handle.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Condvar, Mutex, PoisonError};
use std::time::Duration;

use courier_types::{CancelOutcome, ThreadState};

/// One per launched thread. The handle and the thread itself each hold an
/// `Arc` to it; it outlives both the handle and the OS thread as needed.
#[derive(Debug)]
pub(crate) struct ThreadControl {
    id: u64,
    name: String,
    /// Execution state written by the thread: Created, Running, Exited, Cancelled.
    exec: AtomicU8,
    joining: AtomicBool,
    cancel_requested: AtomicBool,
    /// Set when the thread observed a pending cancel through `checkpoint`.
    cancel_acted: AtomicBool,
    wake: Mutex<bool>,
    wake_cv: Condvar,
}

impl ThreadControl {
    pub(crate) fn new(id: u64, name: String) -> Self {
        Self {
            id,
            name,
            exec: AtomicU8::new(ThreadState::Created.to_u8()),
            joining: AtomicBool::new(false),
            cancel_requested: AtomicBool::new(false),
            cancel_acted: AtomicBool::new(false),
            wake: Mutex::new(false),
            wake_cv: Condvar::new(),
        }
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn exec_state(&self) -> ThreadState {
        ThreadState::from_u8(self.exec.load(Ordering::Acquire)).unwrap_or(ThreadState::Created)
    }

    /// State as seen by an owner that has not reaped or detached the thread.
    pub(crate) fn observed_state(&self) -> ThreadState {
        let exec = self.exec_state();
        if !exec.has_terminated() && self.joining.load(Ordering::Acquire) {
            ThreadState::JoinRequested
        } else {
            exec
        }
    }

    pub(crate) fn has_exited(&self) -> bool {
        self.exec_state().has_terminated()
    }

    pub(crate) fn mark_running(&self) {
        self.exec
            .store(ThreadState::Running.to_u8(), Ordering::Release);
    }

    pub(crate) fn mark_exited(&self, cancelled: bool) {
        let state = if cancelled {
            ThreadState::Cancelled
        } else {
            ThreadState::Exited
        };
        self.exec.store(state.to_u8(), Ordering::Release);
    }

    pub(crate) fn set_joining(&self, joining: bool) {
        self.joining.store(joining, Ordering::Release);
    }

    /// Latch a cancel request. Never blocks beyond waking a sleeper.
    pub(crate) fn request_cancel(&self) -> CancelOutcome {
        if self.has_exited() {
            return CancelOutcome::AlreadyExited;
        }
        self.cancel_requested.store(true, Ordering::Release);
        let mut flag = self.wake.lock().unwrap_or_else(PoisonError::into_inner);
        *flag = true;
        self.wake_cv.notify_all();
        CancelOutcome::Requested
    }

    pub(crate) fn cancel_requested(&self) -> bool {
        self.cancel_requested.load(Ordering::Acquire)
    }

    pub(crate) fn mark_cancel_acted(&self) {
        self.cancel_acted.store(true, Ordering::Release);
    }

    pub(crate) fn cancel_acted(&self) -> bool {
        self.cancel_acted.load(Ordering::Acquire)
    }

    /// Park for up to `timeout`, returning early once a cancel is latched.
    pub(crate) fn wait_for_cancel(&self, timeout: Duration) {
        let guard = self.wake.lock().unwrap_or_else(PoisonError::into_inner);
        let _ = self
            .wake_cv
            .wait_timeout_while(guard, timeout, |requested| !*requested)
            .unwrap_or_else(PoisonError::into_inner);
    }
}
