//! Thread lifecycle states and operation outcomes.

use std::fmt;

/// Lifecycle of one worker thread as observed through the manager.
///
/// ```text
/// Created -> Running -> (Exited | Cancelled) -> Reaped | Detached
///                  \-> JoinRequested (owner is parked in join)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ThreadState {
    Created,
    Running,
    /// An owner is blocked joining the thread.
    JoinRequested,
    Exited,
    /// The thread stopped at a cancellation point.
    Cancelled,
    /// Joined and the result consumed.
    Reaped,
    /// Owner released interest; the OS reclaims the thread on exit.
    Detached,
}

impl ThreadState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Running => "running",
            Self::JoinRequested => "join-requested",
            Self::Exited => "exited",
            Self::Cancelled => "cancelled",
            Self::Reaped => "reaped",
            Self::Detached => "detached",
        }
    }

    /// True once the thread's own execution has finished.
    #[must_use]
    pub const fn has_terminated(self) -> bool {
        matches!(self, Self::Exited | Self::Cancelled | Self::Reaped)
    }

    /// Encoding used by the shared control block.
    #[must_use]
    pub const fn to_u8(self) -> u8 {
        match self {
            Self::Created => 0,
            Self::Running => 1,
            Self::JoinRequested => 2,
            Self::Exited => 3,
            Self::Cancelled => 4,
            Self::Reaped => 5,
            Self::Detached => 6,
        }
    }

    #[must_use]
    pub const fn from_u8(raw: u8) -> Option<Self> {
        Some(match raw {
            0 => Self::Created,
            1 => Self::Running,
            2 => Self::JoinRequested,
            3 => Self::Exited,
            4 => Self::Cancelled,
            5 => Self::Reaped,
            6 => Self::Detached,
            _ => return None,
        })
    }
}

impl fmt::Display for ThreadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a joined thread ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThreadOutcome<T> {
    /// The handler returned normally with this value.
    Finished(T),
    /// A cancellation request was acted on at a cancellation point.
    Cancelled,
    /// The handler panicked; the unwind was stopped at the thread boundary.
    Panicked(String),
}

impl<T> ThreadOutcome<T> {
    #[must_use]
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Finished(_))
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// The handler's value, if it ran to completion.
    #[must_use]
    pub fn finished(self) -> Option<T> {
        match self {
            Self::Finished(value) => Some(value),
            Self::Cancelled | Self::Panicked(_) => None,
        }
    }

    #[must_use]
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ThreadOutcome<U> {
        match self {
            Self::Finished(value) => ThreadOutcome::Finished(f(value)),
            Self::Cancelled => ThreadOutcome::Cancelled,
            Self::Panicked(message) => ThreadOutcome::Panicked(message),
        }
    }
}

/// Result of a successful cancel request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// The request was latched and will act at the next cancellation point.
    Requested,
    /// The target had already exited. Expected when cancel races natural exit.
    AlreadyExited,
}

/// Result of a successful signal delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalOutcome {
    Delivered,
    AlreadyExited,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_encoding_round_trips() {
        for state in [
            ThreadState::Created,
            ThreadState::Running,
            ThreadState::JoinRequested,
            ThreadState::Exited,
            ThreadState::Cancelled,
            ThreadState::Reaped,
            ThreadState::Detached,
        ] {
            assert_eq!(ThreadState::from_u8(state.to_u8()), Some(state));
        }
        assert_eq!(ThreadState::from_u8(42), None);
    }

    #[test]
    fn terminated_states() {
        assert!(!ThreadState::Running.has_terminated());
        assert!(!ThreadState::Detached.has_terminated());
        assert!(ThreadState::Cancelled.has_terminated());
        assert!(ThreadState::Reaped.has_terminated());
    }

    #[test]
    fn outcome_map_preserves_variant() {
        assert_eq!(
            ThreadOutcome::Finished(2).map(|v| v * 10),
            ThreadOutcome::Finished(20)
        );
        assert_eq!(
            ThreadOutcome::<i32>::Cancelled.map(|v| v * 10),
            ThreadOutcome::Cancelled
        );
        assert_eq!(ThreadOutcome::<i32>::Panicked("x".into()).finished(), None);
    }
}
