//! Entry point wrapped around every handler.
//!
//! Installs the cancellation state, stops any unwind at the thread boundary
//! and records how the thread ended.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use courier_types::ThreadOutcome;

use crate::cancel::{self, CancelUnwind};
use crate::control::ThreadControl;
use crate::slots::Slot;

pub(crate) fn run<F, T>(control: Arc<ThreadControl>, live: Slot, body: F) -> ThreadOutcome<T>
where
    F: FnOnce() -> T,
{
    control.mark_running();
    cancel::install(Arc::clone(&control));

    let result = panic::catch_unwind(AssertUnwindSafe(body));
    cancel::uninstall();

    let outcome = match result {
        Ok(_) if control.cancel_acted() => ThreadOutcome::Cancelled,
        Ok(value) => ThreadOutcome::Finished(value),
        Err(payload) if payload.is::<CancelUnwind>() => ThreadOutcome::Cancelled,
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            tracing::error!(
                thread = control.name(),
                "Handler panicked; unwind stopped at thread boundary: {message}"
            );
            ThreadOutcome::Panicked(message)
        }
    };

    control.mark_exited(outcome.is_cancelled());
    drop(live);
    outcome
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
