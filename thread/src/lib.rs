//! Thread lifecycle management for Courier.
//!
//! One OS thread per connection handler, launched with a configured stack
//! budget and tracked until joined or detached.
//!
//! ```text
//! ThreadManager::launch / launch_allocated / scope
//!        |
//!        v
//! ThreadAttributes (name + stack size, released on every path)
//!        |
//!        v
//! trampoline: install cancel state -> handler -> record outcome
//!        |
//!        v
//! ThreadHandle / TrackedThread / ScopedThreadHandle -> join | detach
//! ```
//!
//! Cancellation is cooperative: [`cancel`] explains the points at which a
//! latched request takes effect.

mod attributes;
pub mod cancel;
mod control;
mod error;
mod handle;
mod manager;
mod reaper;
mod signal;
mod slots;
mod trampoline;

pub use attributes::{AttributeStats, ThreadAttributes};
pub use error::ThreadError;
pub use handle::{ScopedThreadHandle, ThreadHandle, TrackedThread};
pub use manager::{Handler, LaunchScope, ThreadManager};
pub use reaper::{Reaped, Reaper, ThreadKey};

pub use courier_types::{CancelOutcome, SignalOutcome, ThreadOutcome, ThreadState};

/// Identity of the calling thread.
#[must_use]
pub fn current_id() -> std::thread::ThreadId {
    std::thread::current().id()
}
