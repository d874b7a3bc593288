//! Connection dispatch for Courier.
//!
//! A request verb is parsed into a [`Route`](courier_types::Route), resolved
//! through a fixed [`HandlerTable`], and the handler is launched on its own
//! thread by the [`Dispatcher`]. Handlers see one [`ConnectionContext`] and
//! report back only by writing an [`ApiResponse`] into it.

mod context;
mod dispatcher;
mod endpoints;
mod error;
mod message;
mod store;
mod table;

pub use context::{BufferedConnection, ConnectionContext};
pub use dispatcher::Dispatcher;
pub use endpoints::{
    api_endpoint_auth, api_endpoint_change_password, api_endpoint_delete_user,
    api_endpoint_register,
};
pub use error::DispatchError;
pub use message::{ApiRequest, ApiResponse, status};
pub use store::{AccountStore, MemoryAccountStore, StoreError};
pub use table::HandlerTable;
