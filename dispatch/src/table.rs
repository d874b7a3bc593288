//! Static route to handler mapping.

use std::fmt;

use courier_thread::Handler;
use courier_types::Route;

use crate::context::ConnectionContext;
use crate::endpoints::{
    api_endpoint_auth, api_endpoint_change_password, api_endpoint_delete_user,
    api_endpoint_register,
};

/// One handler per [`Route`], fixed at construction.
///
/// There is no way to add or replace a route after the table is built, and
/// no fallback handler: every route resolves to exactly the handler it was
/// given.
pub struct HandlerTable<C> {
    authenticate: Handler<C>,
    register: Handler<C>,
    delete_account: Handler<C>,
    change_password: Handler<C>,
}

impl<C> HandlerTable<C> {
    pub fn new(
        authenticate: Handler<C>,
        register: Handler<C>,
        delete_account: Handler<C>,
        change_password: Handler<C>,
    ) -> Self {
        Self {
            authenticate,
            register,
            delete_account,
            change_password,
        }
    }

    #[must_use]
    pub fn resolve(&self, route: Route) -> Handler<C> {
        match route {
            Route::Authenticate => self.authenticate,
            Route::Register => self.register,
            Route::DeleteAccount => self.delete_account,
            Route::ChangePassword => self.change_password,
        }
    }
}

impl<C: ConnectionContext> HandlerTable<C> {
    /// The account API endpoints.
    #[must_use]
    pub fn account_api() -> Self {
        Self::new(
            api_endpoint_auth::<C>,
            api_endpoint_register::<C>,
            api_endpoint_delete_user::<C>,
            api_endpoint_change_password::<C>,
        )
    }
}

impl<C> Clone for HandlerTable<C> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<C> Copy for HandlerTable<C> {}

impl<C> fmt::Debug for HandlerTable<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(Route::ALL.iter().map(|route| route.verb()))
            .finish()
    }
}
