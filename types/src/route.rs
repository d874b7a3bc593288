//! Request verbs understood by the account API dispatcher.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The closed set of account-management requests.
///
/// Verbs on the wire are `AUTH`, `REGISTER`, `DELETE_USER` and
/// `CHANGE_PASSWORD`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Route {
    Authenticate,
    Register,
    DeleteAccount,
    ChangePassword,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown request verb '{0}'")]
pub struct UnknownRouteError(pub String);

impl Route {
    pub const ALL: [Route; 4] = [
        Route::Authenticate,
        Route::Register,
        Route::DeleteAccount,
        Route::ChangePassword,
    ];

    #[must_use]
    pub const fn verb(self) -> &'static str {
        match self {
            Self::Authenticate => "AUTH",
            Self::Register => "REGISTER",
            Self::DeleteAccount => "DELETE_USER",
            Self::ChangePassword => "CHANGE_PASSWORD",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, UnknownRouteError> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "AUTH" => Ok(Self::Authenticate),
            "REGISTER" => Ok(Self::Register),
            "DELETE_USER" => Ok(Self::DeleteAccount),
            "CHANGE_PASSWORD" => Ok(Self::ChangePassword),
            _ => Err(UnknownRouteError(raw.to_string())),
        }
    }
}

impl FromStr for Route {
    type Err = UnknownRouteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Route {
    type Error = UnknownRouteError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Route> for String {
    fn from(value: Route) -> Self {
        value.verb().to_string()
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.verb())
    }
}
