//! Asynchronous signal delivery to a single worker thread.
//!
//! Callers must only address threads whose `pthread_t` is still owned by a
//! live join handle; a joined or detached thread's identifier may be reused.

use std::thread::JoinHandle;

use courier_types::SignalOutcome;

use crate::control::ThreadControl;
use crate::error::{ESRCH, ThreadError};

#[cfg(unix)]
pub(crate) type RawThread = libc::pthread_t;
#[cfg(not(unix))]
pub(crate) type RawThread = ();

#[cfg(unix)]
pub(crate) fn raw_thread<T>(handle: &JoinHandle<T>) -> RawThread {
    use std::os::unix::thread::JoinHandleExt;

    handle.as_pthread_t() as RawThread
}

#[cfg(not(unix))]
pub(crate) fn raw_thread<T>(_handle: &JoinHandle<T>) -> RawThread {}

/// Deliver `signal` to the thread, treating an already-exited target as
/// success the same way cancel does. Signal `0` only probes for existence.
pub(crate) fn deliver(
    raw: RawThread,
    control: &ThreadControl,
    signal: i32,
) -> Result<SignalOutcome, ThreadError> {
    if control.has_exited() {
        return Ok(SignalOutcome::AlreadyExited);
    }
    match kill(raw, signal) {
        0 => Ok(SignalOutcome::Delivered),
        code if code == ESRCH => Ok(SignalOutcome::AlreadyExited),
        code => {
            tracing::warn!(
                op = "pthread_kill",
                code,
                signal,
                thread = control.name(),
                "Could not signal the requested thread"
            );
            Err(ThreadError::Signal { signal, code })
        }
    }
}

#[cfg(unix)]
fn kill(raw: RawThread, signal: i32) -> i32 {
    // SAFETY: `raw` comes from a join handle that is still held by the caller,
    // so the thread has not been joined or detached and the id is valid.
    unsafe { libc::pthread_kill(raw, signal) }
}

#[cfg(not(unix))]
fn kill(_raw: RawThread, _signal: i32) -> i32 {
    crate::error::EINVAL
}
