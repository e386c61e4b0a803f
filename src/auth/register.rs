//! The registration route handler.
//!
//! The first user to register becomes an admin. After that anyone may register
//! themselves with the `user` role, and admins may create users with any role.

use axum::{
    Form, Json,
    extract::{Query, State},
    http::StatusCode,
};
use axum_extra::extract::PrivateCookieJar;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::{
    Error,
    auth::{
        AccountState, Caller, PasswordHash, Role, UserResponse, ValidatedPassword, create_user,
        get_token_from_cookies, get_user_by_id, get_user_by_username, user::count_users,
    },
};

/// How a user is being registered.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct RegisterQuery {
    /// Set when an admin creates the user and picks its role.
    #[serde(default)]
    pub created_by_admin: bool,
}

/// The registration form.
#[derive(Clone, Serialize, Deserialize)]
pub struct RegisterData {
    pub username: String,
    pub password: String,
    /// Defaults to `user`.
    #[serde(default)]
    pub role: Option<Role>,
}

/// The role a new user gets.
///
/// `requester` is the signed-in caller, if the request carried a session.
fn assign_role(
    requested: Role,
    created_by_admin: bool,
    requester: Option<Caller>,
    existing_users: usize,
) -> Result<Role, Error> {
    if existing_users == 0 {
        return Ok(Role::Admin);
    }

    if created_by_admin {
        let caller = requester.ok_or(Error::Unauthorized)?;
        caller.require_admin()?;
        return Ok(requested);
    }

    match requested {
        Role::User => Ok(Role::User),
        role => Err(Error::Forbidden(format!("Cannot register as {role}"))),
    }
}

fn session_caller(jar: &PrivateCookieJar, connection: &Connection) -> Option<Caller> {
    let token = get_token_from_cookies(jar).ok()?;

    get_user_by_id(token.user_id, connection)
        .ok()
        .map(|user| Caller {
            user_id: user.id,
            role: user.role,
        })
}

/// Handler for registering a user via the POST method.
///
/// # Errors
///
/// - [Error::InvalidInput] if the username is blank or already taken.
/// - [Error::TooWeak] if the password fails the strength check.
/// - [Error::Unauthorized] if `created_by_admin` is set without a session.
/// - [Error::Forbidden] if a non-admin asks for `created_by_admin` or
///   registers themselves with a role other than `user`.
pub async fn post_register(
    State(state): State<AccountState>,
    Query(query): Query<RegisterQuery>,
    jar: PrivateCookieJar,
    Form(data): Form<RegisterData>,
) -> Result<(StatusCode, Json<UserResponse>), Error> {
    let username = data.username.trim();

    if username.is_empty() {
        return Err(Error::InvalidInput("Username is required".to_owned()));
    }

    let validated_password = ValidatedPassword::new(&data.password, &[username])?;
    let password_hash = PasswordHash::new(validated_password, state.password_cost)?;

    let connection = state
        .db_connection
        .lock()
        .inspect_err(|error| tracing::error!("could not acquire database lock: {error}"))
        .map_err(|_| Error::DatabaseLockError)?;

    let role = assign_role(
        data.role.unwrap_or(Role::User),
        query.created_by_admin,
        session_caller(&jar, &connection),
        count_users(&connection)?,
    )?;

    if get_user_by_username(username, &connection).is_ok() {
        return Err(Error::InvalidInput("Username already taken".to_owned()));
    }

    let user = create_user(username, password_hash, role, &connection)?;
    tracing::info!("registered {} user {}", user.role, user.username);

    Ok((StatusCode::CREATED, Json(user.into())))
}

#[cfg(test)]
mod assign_role_tests {
    use crate::{
        Error,
        auth::{Caller, Role, UserID},
    };

    use super::assign_role;

    fn caller(role: Role) -> Option<Caller> {
        Some(Caller {
            user_id: UserID::new(1),
            role,
        })
    }

    #[test]
    fn first_user_is_always_an_admin() {
        assert_eq!(assign_role(Role::User, false, None, 0), Ok(Role::Admin));
        assert_eq!(assign_role(Role::Hr, true, None, 0), Ok(Role::Admin));
    }

    #[test]
    fn self_registration_only_grants_user() {
        assert_eq!(assign_role(Role::User, false, None, 3), Ok(Role::User));
        assert_eq!(
            assign_role(Role::Admin, false, None, 3),
            Err(Error::Forbidden("Cannot register as admin".to_owned()))
        );
        assert_eq!(
            assign_role(Role::Hr, false, caller(Role::Hr), 3),
            Err(Error::Forbidden("Cannot register as hr".to_owned()))
        );
    }

    #[test]
    fn admins_pick_any_role() {
        assert_eq!(assign_role(Role::Hr, true, caller(Role::Admin), 3), Ok(Role::Hr));
        assert_eq!(assign_role(Role::Admin, true, caller(Role::Admin), 3), Ok(Role::Admin));
        assert_eq!(assign_role(Role::Hr, true, None, 3), Err(Error::Unauthorized));
        assert!(matches!(
            assign_role(Role::Hr, true, caller(Role::Hr), 3),
            Err(Error::Forbidden(_))
        ));
    }
}
