//! The log-in route handler. The lower level cookie logic lives in [crate::auth::cookie].

use std::sync::{Arc, Mutex};

use axum::{
    Form, Json,
    extract::{FromRef, State},
};
use axum_extra::extract::{PrivateCookieJar, cookie::Key};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use time::Duration;

use crate::{
    AppState, Error,
    auth::{Role, UserID, get_user_by_username, set_auth_cookie},
};

/// The state needed to perform a login.
#[derive(Debug, Clone)]
pub struct LoginState {
    /// The key to be used for signing and encrypting private cookies.
    pub cookie_key: Key,
    /// The duration for which cookies used for authentication are valid.
    pub cookie_duration: Duration,
    pub db_connection: Arc<Mutex<Connection>>,
}

impl FromRef<AppState> for LoginState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            cookie_key: state.cookie_key.clone(),
            cookie_duration: state.cookie_duration,
            db_connection: state.db_connection.clone(),
        }
    }
}

// this impl tells `PrivateCookieJar` how to access the key from our state
impl FromRef<LoginState> for Key {
    fn from_ref(state: &LoginState) -> Self {
        state.cookie_key.clone()
    }
}

/// The credentials submitted to the log-in endpoint.
///
/// The password is a plain string, it is only compared against the stored hash.
#[derive(Clone, Serialize, Deserialize)]
pub struct LogInData {
    pub username: String,
    pub password: String,
}

/// Who was logged in.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct LogInResponse {
    pub user_id: UserID,
    pub username: String,
    pub role: Role,
}

/// Handler for log-in requests via the POST method.
///
/// On success the session cookie is set and the user's details are returned.
///
/// # Errors
///
/// Returns [Error::InvalidCredentials] if the username is unknown or the
/// password does not match, so the two cases cannot be told apart.
pub async fn post_log_in(
    State(state): State<LoginState>,
    jar: PrivateCookieJar,
    Form(user_data): Form<LogInData>,
) -> Result<(PrivateCookieJar, Json<LogInResponse>), Error> {
    let user = {
        let connection = state
            .db_connection
            .lock()
            .inspect_err(|error| tracing::error!("could not acquire database lock: {error}"))
            .map_err(|_| Error::DatabaseLockError)?;

        match get_user_by_username(&user_data.username, &connection) {
            Ok(user) => user,
            Err(Error::NotFound(_)) => return Err(Error::InvalidCredentials),
            Err(error) => return Err(error),
        }
    };

    if !user.password_hash.verify(&user_data.password)? {
        tracing::info!("failed log-in attempt for {}", user.username);
        return Err(Error::InvalidCredentials);
    }

    let jar = set_auth_cookie(jar, user.id, state.cookie_duration)?;
    tracing::info!("{} logged in", user.username);

    Ok((
        jar,
        Json(LogInResponse {
            user_id: user.id,
            username: user.username,
            role: user.role,
        }),
    ))
}
