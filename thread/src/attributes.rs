//! Scoped thread creation attributes.
//!
//! A [`ThreadAttributes`] lives for exactly one creation call. It is counted
//! as acquired once initialization succeeds and as released when dropped, so
//! every early return after initialization releases it.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::{Builder, JoinHandle, Scope, ScopedJoinHandle};

use courier_types::StackSize;

use crate::error::{EINVAL, ThreadError};

/// Acquire/release counters for attribute objects.
///
/// After every launch call returns, `acquired() == released()`.
#[derive(Debug, Default)]
pub struct AttributeStats {
    acquired: AtomicUsize,
    released: AtomicUsize,
}

impl AttributeStats {
    #[must_use]
    pub fn acquired(&self) -> usize {
        self.acquired.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn released(&self) -> usize {
        self.released.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn outstanding(&self) -> usize {
        self.acquired().saturating_sub(self.released())
    }
}

#[derive(Debug)]
pub struct ThreadAttributes<'a> {
    builder: Option<Builder>,
    stack_size: Option<StackSize>,
    stats: &'a AttributeStats,
}

impl<'a> ThreadAttributes<'a> {
    /// Initialize attributes for a thread named `name`.
    ///
    /// Fails without acquiring anything when the name cannot be handed to the
    /// OS.
    pub fn init(stats: &'a AttributeStats, name: impl Into<String>) -> Result<Self, ThreadError> {
        let name = name.into();
        let reason = if name.is_empty() {
            Some("thread name is empty")
        } else if name.contains('\0') {
            Some("thread name contains a NUL byte")
        } else {
            None
        };
        if let Some(reason) = reason {
            tracing::warn!(
                op = "attr_init",
                code = EINVAL,
                "Could not initialize the thread attribute structure: {reason}"
            );
            return Err(ThreadError::AttributeInit {
                code: EINVAL,
                reason,
            });
        }

        stats.acquired.fetch_add(1, Ordering::AcqRel);
        Ok(Self {
            builder: Some(Builder::new().name(name)),
            stack_size: None,
            stats,
        })
    }

    /// Request a stack of `bytes` for the new thread.
    ///
    /// Out-of-range values are rejected; there is no fallback to the platform
    /// default.
    pub fn set_stack_size(&mut self, bytes: usize) -> Result<(), ThreadError> {
        let size = StackSize::new(bytes).map_err(|err| {
            tracing::warn!(
                op = "attr_setstacksize",
                code = EINVAL,
                requested = bytes,
                "Could not set the stack size correctly: {err}"
            );
            ThreadError::StackSizeConfig {
                requested: bytes,
                code: EINVAL,
            }
        })?;
        self.builder = self.builder.take().map(|builder| builder.stack_size(size.bytes()));
        self.stack_size = Some(size);
        Ok(())
    }

    #[must_use]
    pub fn stack_size(&self) -> Option<StackSize> {
        self.stack_size
    }

    fn take_builder(&mut self) -> Result<Builder, ThreadError> {
        self.builder.take().ok_or(ThreadError::AttributeInit {
            code: EINVAL,
            reason: "attributes were already used for a thread",
        })
    }

    pub(crate) fn spawn<F, T>(&mut self, body: F) -> Result<JoinHandle<T>, ThreadError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        self.take_builder()?.spawn(body).map_err(|err| {
            let err = ThreadError::creation(err);
            log_creation_failure(&err);
            err
        })
    }

    pub(crate) fn spawn_scoped<'scope, 'env, F, T>(
        &mut self,
        scope: &'scope Scope<'scope, 'env>,
        body: F,
    ) -> Result<ScopedJoinHandle<'scope, T>, ThreadError>
    where
        F: FnOnce() -> T + Send + 'scope,
        T: Send + 'scope,
    {
        self.take_builder()?
            .spawn_scoped(scope, body)
            .map_err(|err| {
                let err = ThreadError::creation(err);
                log_creation_failure(&err);
                err
            })
    }
}

fn log_creation_failure(err: &ThreadError) {
    tracing::warn!(
        op = err.operation(),
        code = err.code(),
        "Could not initialize a new thread: {err}"
    );
}

impl Drop for ThreadAttributes<'_> {
    fn drop(&mut self) {
        self.stats.released.fetch_add(1, Ordering::AcqRel);
    }
}
