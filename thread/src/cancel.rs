//! Cooperative, point-based cancellation for worker threads.
//!
//! A cancel request against a thread only latches a flag. The thread acts on
//! it at a cancellation point ([`testcancel`], [`checkpoint`], [`sleep`]) and
//! only while cancellation is enabled for that thread. Handlers bracket
//! sections that must not be interrupted with [`set_cancelable`] or the
//! [`disable`] guard, and re-enable before any long blocking wait.
//!
//! Threads not launched by a [`ThreadManager`](crate::ThreadManager) have no
//! control block, so every cancellation point is a no-op for them.

use std::cell::{Cell, RefCell};
use std::panic;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use thiserror::Error;

use crate::control::ThreadControl;

thread_local! {
    static CURRENT: RefCell<Option<Arc<ThreadControl>>> = const { RefCell::new(None) };
    static ENABLED: Cell<bool> = const { Cell::new(true) };
}

/// Returned by [`checkpoint`] when the calling thread must stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("thread cancellation requested")]
pub struct Cancelled;

/// Unwind payload used by [`testcancel`]; recognised by the thread trampoline.
pub(crate) struct CancelUnwind;

pub(crate) fn install(control: Arc<ThreadControl>) {
    CURRENT.with(|current| *current.borrow_mut() = Some(control));
    ENABLED.with(|enabled| enabled.set(true));
}

pub(crate) fn uninstall() {
    CURRENT.with(|current| current.borrow_mut().take());
}

fn with_current<R>(f: impl FnOnce(&ThreadControl) -> R) -> Option<R> {
    CURRENT.with(|current| current.borrow().as_deref().map(f))
}

/// Toggle whether the calling thread may currently be cancelled.
///
/// Re-enabling is not itself a cancellation point: a latched request acts at
/// the next one.
pub fn set_cancelable(enabled: bool) {
    ENABLED.with(|state| state.set(enabled));
}

#[must_use]
pub fn is_cancelable() -> bool {
    ENABLED.with(Cell::get)
}

/// True if a cancel request is latched for the calling thread, whether or not
/// cancellation is enabled.
#[must_use]
pub fn is_requested() -> bool {
    with_current(ThreadControl::cancel_requested).unwrap_or(false)
}

/// Never true while the thread is already unwinding: a second unwind out of
/// drop glue aborts the process.
fn should_act() -> bool {
    !thread::panicking() && is_cancelable() && is_requested()
}

/// Disables cancellation until dropped, then restores the previous state.
#[must_use = "cancellation is re-enabled as soon as the guard is dropped"]
pub struct CancelGuard {
    previous: bool,
}

impl Drop for CancelGuard {
    fn drop(&mut self) {
        set_cancelable(self.previous);
    }
}

/// Disable cancellation for the lifetime of the returned guard.
pub fn disable() -> CancelGuard {
    let previous = is_cancelable();
    set_cancelable(false);
    CancelGuard { previous }
}

/// Cancellation point that unwinds out of the handler.
///
/// The unwind is stopped at the thread boundary and the join reports
/// [`ThreadOutcome::Cancelled`](courier_types::ThreadOutcome::Cancelled).
/// Destructors on the handler's stack run on the way out, so locks are
/// released. Cancellation is disabled once acted on, so cancellation points
/// reached from those destructors are no-ops. A handler that wraps this call
/// in its own `catch_unwind` swallows the cancellation.
pub fn testcancel() {
    if should_act() {
        with_current(ThreadControl::mark_cancel_acted);
        set_cancelable(false);
        tracing::debug!(
            thread = thread::current().name().unwrap_or("<unnamed>"),
            "Acting on cancel request"
        );
        panic::resume_unwind(Box::new(CancelUnwind));
    }
}

/// Cancellation point that reports instead of unwinding.
///
/// Once this returns `Err`, the thread counts as cancelled: its join reports
/// `Cancelled` whatever the handler returns afterwards.
pub fn checkpoint() -> Result<(), Cancelled> {
    if should_act() {
        with_current(ThreadControl::mark_cancel_acted);
        return Err(Cancelled);
    }
    Ok(())
}

/// Blocking wait that is also a cancellation point.
///
/// With cancellation enabled, the wait ends early when a cancel request
/// arrives and then unwinds like [`testcancel`]. With cancellation disabled it
/// sleeps for the full duration.
pub fn sleep(duration: Duration) {
    testcancel();
    if !is_cancelable() {
        thread::sleep(duration);
        return;
    }
    match CURRENT.with(|current| current.borrow().clone()) {
        Some(control) => control.wait_for_cancel(duration),
        None => thread::sleep(duration),
    }
    testcancel();
}
