//! The thread lifecycle manager.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, Scope};

use courier_types::ThreadConfig;

use crate::attributes::{AttributeStats, ThreadAttributes};
use crate::control::ThreadControl;
use crate::error::{EAGAIN, ENOMEM, ThreadError};
use crate::handle::{ScopedThreadHandle, ThreadHandle, TrackedThread};
use crate::slots::{Slot, SlotCounter};
use crate::trampoline;

/// A handler: one mutable connection context in, nothing out.
///
/// Outcomes are reported by mutating the context.
pub type Handler<C> = fn(&mut C);

/// Launches worker threads with a fixed stack budget and tracks their
/// resources.
///
/// Shared by `Arc` across the acceptor and reaper; every method takes `&self`.
#[derive(Debug)]
pub struct ThreadManager {
    config: ThreadConfig,
    next_id: AtomicU64,
    live: Arc<SlotCounter>,
    tracked: Arc<SlotCounter>,
    attributes: AttributeStats,
}

struct Prepared<'a> {
    attributes: ThreadAttributes<'a>,
    control: Arc<ThreadControl>,
    live: Slot,
}

impl ThreadManager {
    #[must_use]
    pub fn new(config: ThreadConfig) -> Self {
        tracing::debug!(
            stack_size = %config.stack_size,
            max_tracked = config.max_tracked,
            max_live = ?config.max_live,
            "Thread manager initialized"
        );
        Self {
            config,
            next_id: AtomicU64::new(1),
            live: Arc::new(SlotCounter::default()),
            tracked: Arc::new(SlotCounter::default()),
            attributes: AttributeStats::default(),
        }
    }

    #[must_use]
    pub fn config(&self) -> &ThreadConfig {
        &self.config
    }

    #[must_use]
    pub fn attribute_stats(&self) -> &AttributeStats {
        &self.attributes
    }

    /// Threads launched by this manager whose handler has not yet returned.
    #[must_use]
    pub fn live_threads(&self) -> usize {
        self.live.in_use()
    }

    /// Tracked handle records currently held.
    #[must_use]
    pub fn tracked_threads(&self) -> usize {
        self.tracked.in_use()
    }

    /// Attributes, control block and live slot for one creation call.
    ///
    /// The returned attributes are released when the `Prepared` is dropped,
    /// whatever happens to the spawn.
    fn prepare(&self) -> Result<Prepared<'_>, ThreadError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let name = format!("{}-{id}", self.config.name_prefix);

        let mut attributes = ThreadAttributes::init(&self.attributes, name.clone())?;
        attributes.set_stack_size(self.config.stack_size.bytes())?;

        let Some(live) = self.live.try_acquire(self.config.max_live) else {
            let err = ThreadError::creation(io::Error::from_raw_os_error(EAGAIN));
            tracing::warn!(
                op = err.operation(),
                code = err.code(),
                live = self.live.in_use(),
                "Could not initialize a new thread: live thread limit reached"
            );
            return Err(err);
        };

        Ok(Prepared {
            attributes,
            control: Arc::new(ThreadControl::new(id, name)),
            live,
        })
    }

    /// Launch `body` on a new thread.
    ///
    /// On error no thread was created and nothing was retained.
    pub fn launch<F, T>(&self, body: F) -> Result<ThreadHandle<T>, ThreadError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let Prepared {
            mut attributes,
            control,
            live,
        } = self.prepare()?;
        let thread_control = Arc::clone(&control);
        let inner = attributes.spawn(move || trampoline::run(thread_control, live, body))?;
        Ok(ThreadHandle::new(inner, control))
    }

    /// Launch `handler` against an owned connection context. The context comes
    /// back through the join once the handler has written its response.
    pub fn launch_handler<C>(
        &self,
        handler: Handler<C>,
        mut context: C,
    ) -> Result<ThreadHandle<C>, ThreadError>
    where
        C: Send + 'static,
    {
        self.launch(move || {
            handler(&mut context);
            context
        })
    }

    /// Launch `body` with its handle placed in an independently owned record.
    ///
    /// The record slot is reserved first; when the table is full this fails
    /// with [`ThreadError::Allocation`] and no creation is attempted.
    pub fn launch_allocated<F, T>(&self, body: F) -> Result<TrackedThread<T>, ThreadError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let Some(slot) = self.tracked.try_acquire(Some(self.config.max_tracked)) else {
            let err = ThreadError::Allocation {
                code: ENOMEM,
                capacity: self.config.max_tracked,
            };
            tracing::warn!(
                op = err.operation(),
                code = err.code(),
                "Could not allocate a record to hold the thread handle"
            );
            return Err(err);
        };

        let Prepared {
            mut attributes,
            control,
            live,
        } = self.prepare().inspect_err(|err| {
            tracing::warn!(
                code = err.code(),
                "An error occurred while attempting to spawn the thread"
            );
        })?;
        let thread_control = Arc::clone(&control);
        let inner = attributes.spawn(move || trampoline::run(thread_control, live, body))?;
        Ok(TrackedThread::new(inner, control, slot))
    }

    pub fn launch_handler_allocated<C>(
        &self,
        handler: Handler<C>,
        mut context: C,
    ) -> Result<TrackedThread<C>, ThreadError>
    where
        C: Send + 'static,
    {
        self.launch_allocated(move || {
            handler(&mut context);
            context
        })
    }

    /// Run `f` with a launcher whose threads may borrow from the caller's
    /// stack. Every thread launched through it is joined before this returns.
    pub fn scope<'env, F, R>(&'env self, f: F) -> R
    where
        F: for<'scope> FnOnce(&LaunchScope<'scope, 'env>) -> R,
    {
        thread::scope(|scope| {
            let launcher = LaunchScope {
                manager: self,
                scope,
            };
            f(&launcher)
        })
    }
}

/// Launcher handed out by [`ThreadManager::scope`].
#[derive(Debug)]
pub struct LaunchScope<'scope, 'env: 'scope> {
    manager: &'env ThreadManager,
    scope: &'scope Scope<'scope, 'env>,
}

impl<'scope, 'env> LaunchScope<'scope, 'env> {
    pub fn launch<F, T>(&self, body: F) -> Result<ScopedThreadHandle<'scope, T>, ThreadError>
    where
        F: FnOnce() -> T + Send + 'scope,
        T: Send + 'scope,
    {
        let Prepared {
            mut attributes,
            control,
            live,
        } = self.manager.prepare()?;
        let thread_control = Arc::clone(&control);
        let inner = attributes.spawn_scoped(self.scope, move || {
            trampoline::run(thread_control, live, body)
        })?;
        Ok(ScopedThreadHandle::new(inner, control))
    }

    /// Launch `handler` against a context borrowed for the handler's run.
    pub fn launch_handler<C>(
        &self,
        handler: Handler<C>,
        context: &'scope mut C,
    ) -> Result<ScopedThreadHandle<'scope, ()>, ThreadError>
    where
        C: Send,
    {
        self.launch(move || handler(context))
    }
}
