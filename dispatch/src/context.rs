//! The per-connection state a handler runs against.

use std::fmt;
use std::sync::Arc;

use crate::message::{ApiRequest, ApiResponse};
use crate::store::AccountStore;

/// One session as seen by a handler.
///
/// A handler learns what was asked through [`request`](Self::request) and
/// reports back only through [`respond`](Self::respond); it has no other
/// channel to whoever launched it.
pub trait ConnectionContext: Send {
    fn request(&self) -> &ApiRequest;

    fn respond(&mut self, response: ApiResponse);

    fn accounts(&self) -> &dyn AccountStore;

    /// Peer description for logs.
    fn peer(&self) -> &str {
        "local"
    }
}

/// A connection whose response is kept in memory until the launcher reads it
/// back after the join.
#[derive(Clone)]
pub struct BufferedConnection {
    request: ApiRequest,
    response: Option<ApiResponse>,
    accounts: Arc<dyn AccountStore>,
}

impl BufferedConnection {
    pub fn new(request: ApiRequest, accounts: Arc<dyn AccountStore>) -> Self {
        Self {
            request,
            response: None,
            accounts,
        }
    }

    #[must_use]
    pub fn response(&self) -> Option<&ApiResponse> {
        self.response.as_ref()
    }

    pub fn take_response(&mut self) -> Option<ApiResponse> {
        self.response.take()
    }
}

impl fmt::Debug for BufferedConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferedConnection")
            .field("request", &self.request.method)
            .field("response", &self.response)
            .finish_non_exhaustive()
    }
}

impl ConnectionContext for BufferedConnection {
    fn request(&self) -> &ApiRequest {
        &self.request
    }

    fn respond(&mut self, response: ApiResponse) {
        self.response = Some(response);
    }

    fn accounts(&self) -> &dyn AccountStore {
        self.accounts.as_ref()
    }
}
