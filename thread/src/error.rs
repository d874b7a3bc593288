//! Failure outcomes of the lifecycle operations.
//!
//! Every variant carries the errno-style code of the underlying failure so
//! callers can log or map it without parsing messages.

use std::io;

use thiserror::Error;

#[cfg(unix)]
pub(crate) use libc::{EAGAIN, EINVAL, ENOMEM, ESRCH};

#[cfg(not(unix))]
pub(crate) const ESRCH: i32 = 3;
#[cfg(not(unix))]
pub(crate) const EAGAIN: i32 = 11;
#[cfg(not(unix))]
pub(crate) const ENOMEM: i32 = 12;
#[cfg(not(unix))]
pub(crate) const EINVAL: i32 = 22;

#[derive(Debug, Error)]
pub enum ThreadError {
    #[error("could not initialize thread attributes: {reason} (errno {code})")]
    AttributeInit { code: i32, reason: &'static str },
    #[error("could not set the thread stack size to {requested} bytes (errno {code})")]
    StackSizeConfig { requested: usize, code: i32 },
    #[error("could not create a new thread (errno {code}): {source}")]
    Creation {
        code: i32,
        #[source]
        source: io::Error,
    },
    #[error("could not allocate a tracked thread record; all {capacity} slots in use (errno {code})")]
    Allocation { code: i32, capacity: usize },
    #[error("could not join the requested thread: {reason} (errno {code})")]
    Join { code: i32, reason: &'static str },
    #[error("could not deliver signal {signal} to the requested thread (errno {code})")]
    Signal { signal: i32, code: i32 },
    #[error("could not cancel the requested thread: {reason} (errno {code})")]
    Cancel { code: i32, reason: &'static str },
}

impl ThreadError {
    /// The errno-style code of the underlying failure.
    #[must_use]
    pub fn code(&self) -> i32 {
        match self {
            Self::AttributeInit { code, .. }
            | Self::StackSizeConfig { code, .. }
            | Self::Creation { code, .. }
            | Self::Allocation { code, .. }
            | Self::Join { code, .. }
            | Self::Signal { code, .. }
            | Self::Cancel { code, .. } => *code,
        }
    }

    /// Name of the failing step, for log fields.
    #[must_use]
    pub const fn operation(&self) -> &'static str {
        match self {
            Self::AttributeInit { .. } => "attr_init",
            Self::StackSizeConfig { .. } => "attr_setstacksize",
            Self::Creation { .. } => "thread_create",
            Self::Allocation { .. } => "thread_alloc",
            Self::Join { .. } => "thread_join",
            Self::Signal { .. } => "thread_signal",
            Self::Cancel { .. } => "thread_cancel",
        }
    }

    /// True for failures to bring a thread into existence.
    #[must_use]
    pub const fn is_launch_failure(&self) -> bool {
        matches!(
            self,
            Self::AttributeInit { .. }
                | Self::StackSizeConfig { .. }
                | Self::Creation { .. }
                | Self::Allocation { .. }
        )
    }

    pub(crate) fn creation(source: io::Error) -> Self {
        let code = source.raw_os_error().unwrap_or(EAGAIN);
        Self::Creation { code, source }
    }

    pub(crate) fn already_joined() -> Self {
        Self::Join {
            code: ESRCH,
            reason: "thread was already joined",
        }
    }

    pub(crate) fn detached() -> Self {
        Self::Join {
            code: EINVAL,
            reason: "thread is detached",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creation_keeps_os_code() {
        let err = ThreadError::creation(io::Error::from_raw_os_error(EAGAIN));
        assert_eq!(err.code(), EAGAIN);
        assert_eq!(err.operation(), "thread_create");
        assert!(err.is_launch_failure());
    }

    #[test]
    fn creation_without_os_code_reports_eagain() {
        let err = ThreadError::creation(io::Error::other("no code"));
        assert_eq!(err.code(), EAGAIN);
    }

    #[test]
    fn join_errors_are_not_launch_failures() {
        let err = ThreadError::already_joined();
        assert_eq!(err.code(), ESRCH);
        assert!(!err.is_launch_failure());
        assert!(err.to_string().contains("already joined"));
    }
}
