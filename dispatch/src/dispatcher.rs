//! Routes a request verb to its handler and launches it on a worker thread.

use std::sync::Arc;

use courier_thread::{
    Handler, LaunchScope, ScopedThreadHandle, ThreadError, ThreadHandle, ThreadManager,
    TrackedThread,
};
use courier_types::Route;

use crate::error::DispatchError;
use crate::table::HandlerTable;

/// Launches one handler thread per request.
///
/// Dispatch imposes no timeout; a caller that needs one pairs the returned
/// handle with its own deadline and cancels or signals the thread.
#[derive(Debug)]
pub struct Dispatcher<C> {
    manager: Arc<ThreadManager>,
    table: HandlerTable<C>,
}

impl<C> Clone for Dispatcher<C> {
    fn clone(&self) -> Self {
        Self {
            manager: Arc::clone(&self.manager),
            table: self.table,
        }
    }
}

impl<C> Dispatcher<C> {
    pub fn new(manager: Arc<ThreadManager>, table: HandlerTable<C>) -> Self {
        Self { manager, table }
    }

    #[must_use]
    pub fn manager(&self) -> &Arc<ThreadManager> {
        &self.manager
    }

    #[must_use]
    pub fn table(&self) -> &HandlerTable<C> {
        &self.table
    }

    /// Resolve `verb` to its handler without launching anything.
    pub fn resolve(&self, verb: &str) -> Result<(Route, Handler<C>), DispatchError> {
        match Route::parse(verb) {
            Ok(route) => Ok((route, self.table.resolve(route))),
            Err(err) => {
                tracing::warn!(verb = %verb.escape_debug(), "Dispatch failed: unknown route");
                Err(err.into())
            }
        }
    }

    fn launch_failed(route: Route, err: ThreadError) -> DispatchError {
        tracing::error!(
            %route,
            op = err.operation(),
            code = err.code(),
            "Could not launch handler thread: {err}"
        );
        DispatchError::Launch(err)
    }
}

impl<C: Send + 'static> Dispatcher<C> {
    /// Launch the handler for `verb` against an owned context. The context is
    /// handed back through the join.
    pub fn dispatch(&self, verb: &str, context: C) -> Result<ThreadHandle<C>, DispatchError> {
        let (route, handler) = self.resolve(verb)?;
        tracing::debug!(%route, "Dispatching");
        self.manager
            .launch_handler(handler, context)
            .map_err(|err| Self::launch_failed(route, err))
    }

    /// Like [`dispatch`](Self::dispatch), but the handle is an independently
    /// owned record for a reaper.
    pub fn dispatch_tracked(
        &self,
        verb: &str,
        context: C,
    ) -> Result<TrackedThread<C>, DispatchError> {
        let (route, handler) = self.resolve(verb)?;
        tracing::debug!(%route, "Dispatching tracked");
        self.manager
            .launch_handler_allocated(handler, context)
            .map_err(|err| Self::launch_failed(route, err))
    }
}

impl<C: Send> Dispatcher<C> {
    /// Launch the handler for `verb` inside `scope`, lending it `context`
    /// until the returned handle is joined or the scope ends.
    pub fn dispatch_scoped<'scope, 'env>(
        &self,
        scope: &LaunchScope<'scope, 'env>,
        verb: &str,
        context: &'scope mut C,
    ) -> Result<ScopedThreadHandle<'scope, ()>, DispatchError> {
        let (route, handler) = self.resolve(verb)?;
        tracing::debug!(%route, "Dispatching scoped");
        scope
            .launch_handler(handler, context)
            .map_err(|err| Self::launch_failed(route, err))
    }
}
