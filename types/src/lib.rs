//! Core domain types for Courier.
//!
//! This crate contains pure domain types with no IO and minimal dependencies.
//! The thread lifecycle manager, the dispatcher and the configuration loader
//! all speak in these types.

// Pedantic lint configuration - these are intentional design choices
#![allow(clippy::missing_errors_doc)] // Result-returning functions are self-explanatory

mod route;
mod stack;
mod state;
mod thread_config;

pub use route::{Route, UnknownRouteError};
pub use stack::{StackSize, StackSizeError};
pub use state::{CancelOutcome, SignalOutcome, ThreadOutcome, ThreadState};
pub use thread_config::ThreadConfig;
