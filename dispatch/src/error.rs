use courier_thread::ThreadError;
use courier_types::UnknownRouteError;
use thiserror::Error;

use crate::message::status;

#[derive(Debug, Error)]
pub enum DispatchError {
    /// The verb names no route. No handler ran.
    #[error("unknown route '{0}'")]
    UnknownRoute(String),
    /// The route resolved but its handler thread could not be started.
    #[error("could not launch handler: {0}")]
    Launch(#[from] ThreadError),
}

impl DispatchError {
    /// Status to answer the connection with when dispatch fails.
    #[must_use]
    pub fn status(&self) -> u16 {
        match self {
            Self::UnknownRoute(_) => status::NOT_FOUND,
            Self::Launch(_) => status::SERVICE_UNAVAILABLE,
        }
    }
}

impl From<UnknownRouteError> for DispatchError {
    fn from(err: UnknownRouteError) -> Self {
        Self::UnknownRoute(err.0)
    }
}
