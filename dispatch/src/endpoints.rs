//! Account API handlers.
//!
//! Each endpoint satisfies [`Handler`](courier_thread::Handler): it reads the
//! request from the connection, talks to the account store, and writes exactly
//! one [`ApiResponse`] back.

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;

use crate::context::ConnectionContext;
use crate::message::{ApiResponse, status};
use crate::store::StoreError;

const MAX_USERNAME_LEN: usize = 64;
const MIN_PASSWORD_LEN: usize = 8;
const MAX_PASSWORD_LEN: usize = 1024;

#[derive(Debug, Deserialize)]
struct Credentials {
    username: String,
    password: String,
}

#[derive(Debug, Deserialize)]
struct PasswordChange {
    username: String,
    password: String,
    new_password: String,
}

fn params<C: ConnectionContext, P: DeserializeOwned>(con: &C) -> Result<P, ApiResponse> {
    P::deserialize(&con.request().params).map_err(|err| {
        tracing::debug!(peer = con.peer(), method = %con.request().method, "Malformed params: {err}");
        ApiResponse::error(status::BAD_REQUEST, format!("malformed params: {err}"))
    })
}

fn check_username(username: &str) -> Result<(), ApiResponse> {
    let username = username.trim();
    if username.is_empty() || username.len() > MAX_USERNAME_LEN {
        return Err(ApiResponse::error(
            status::BAD_REQUEST,
            format!("username must be 1 to {MAX_USERNAME_LEN} bytes"),
        ));
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-' | '@'))
    {
        return Err(ApiResponse::error(
            status::BAD_REQUEST,
            "username contains unsupported characters",
        ));
    }
    Ok(())
}

fn check_new_password(password: &str) -> Result<(), ApiResponse> {
    if (MIN_PASSWORD_LEN..=MAX_PASSWORD_LEN).contains(&password.len()) {
        Ok(())
    } else {
        Err(ApiResponse::error(
            status::BAD_REQUEST,
            format!("password must be {MIN_PASSWORD_LEN} to {MAX_PASSWORD_LEN} bytes"),
        ))
    }
}

fn store_failure<C: ConnectionContext>(con: &C, err: &StoreError) -> ApiResponse {
    match err {
        StoreError::Backend(_) => {
            tracing::error!(peer = con.peer(), method = %con.request().method, "Account store failure: {err}");
        }
        _ => tracing::info!(peer = con.peer(), method = %con.request().method, "Request refused: {err}"),
    }
    ApiResponse::error(err.status(), err.to_string())
}

/// Run `body` and write whatever it produced, success or refusal.
fn serve<C, F>(con: &mut C, body: F)
where
    C: ConnectionContext,
    F: FnOnce(&C) -> Result<ApiResponse, ApiResponse>,
{
    let response = body(&*con).unwrap_or_else(|refusal| refusal);
    con.respond(response);
}

/// `AUTH {username, password}`.
pub fn api_endpoint_auth<C: ConnectionContext>(con: &mut C) {
    serve(con, |con| {
        let creds: Credentials = params(con)?;
        con.accounts()
            .verify(&creds.username, &creds.password)
            .map_err(|err| store_failure(con, &err))?;
        tracing::debug!(peer = con.peer(), user = %creds.username, "Authenticated");
        Ok(ApiResponse::ok(json!({
            "authenticated": true,
            "username": creds.username.trim().to_ascii_lowercase(),
        })))
    });
}

/// `REGISTER {username, password}`.
pub fn api_endpoint_register<C: ConnectionContext>(con: &mut C) {
    serve(con, |con| {
        let creds: Credentials = params(con)?;
        check_username(&creds.username)?;
        check_new_password(&creds.password)?;
        con.accounts()
            .create(&creds.username, &creds.password)
            .map_err(|err| store_failure(con, &err))?;
        tracing::info!(peer = con.peer(), user = %creds.username, "Account registered");
        Ok(ApiResponse::new(
            status::CREATED,
            json!({ "registered": creds.username.trim().to_ascii_lowercase() }),
        ))
    });
}

/// `DELETE_USER {username, password}`.
pub fn api_endpoint_delete_user<C: ConnectionContext>(con: &mut C) {
    serve(con, |con| {
        let creds: Credentials = params(con)?;
        con.accounts()
            .remove(&creds.username, &creds.password)
            .map_err(|err| store_failure(con, &err))?;
        tracing::info!(peer = con.peer(), user = %creds.username, "Account deleted");
        Ok(ApiResponse::ok(
            json!({ "deleted": creds.username.trim().to_ascii_lowercase() }),
        ))
    });
}

/// `CHANGE_PASSWORD {username, password, new_password}`.
pub fn api_endpoint_change_password<C: ConnectionContext>(con: &mut C) {
    serve(con, |con| {
        let change: PasswordChange = params(con)?;
        check_new_password(&change.new_password)?;
        con.accounts()
            .change_password(&change.username, &change.password, &change.new_password)
            .map_err(|err| store_failure(con, &err))?;
        tracing::info!(peer = con.peer(), user = %change.username, "Password changed");
        Ok(ApiResponse::ok(json!({ "changed": true })))
    });
}
