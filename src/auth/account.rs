//! Route handlers for the signed-in user's own account and the admin user list.

use std::sync::{Arc, Mutex};

use axum::{
    Extension, Form, Json,
    extract::{FromRef, State},
};
use axum_extra::extract::cookie::Key;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::{
    AppState, Error,
    auth::{
        Caller, PasswordHash, Role, User, UserID, ValidatedPassword, get_user_by_id,
        user::{get_all_users, update_password},
    },
};

/// The state needed to register users and manage accounts.
#[derive(Debug, Clone)]
pub struct AccountState {
    /// The key to be used for signing and encrypting private cookies.
    pub cookie_key: Key,
    pub db_connection: Arc<Mutex<Connection>>,
    /// The bcrypt cost that new password hashes are created with.
    pub password_cost: u32,
}

impl FromRef<AppState> for AccountState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            cookie_key: state.cookie_key.clone(),
            db_connection: state.db_connection.clone(),
            password_cost: PasswordHash::DEFAULT_COST,
        }
    }
}

// this impl tells `PrivateCookieJar` how to access the key from our state
impl FromRef<AccountState> for Key {
    fn from_ref(state: &AccountState) -> Self {
        state.cookie_key.clone()
    }
}

/// A user as shown to clients, without the password hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: UserID,
    pub username: String,
    pub role: Role,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            role: user.role,
        }
    }
}

/// An entry of the user list, used to label records by owner.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserSummary {
    pub id: UserID,
    pub name: String,
}

/// The form for changing the caller's own password.
#[derive(Clone, Serialize, Deserialize)]
pub struct ChangePasswordData {
    pub current_password: String,
    pub new_password: String,
}

/// Get the signed-in user.
pub async fn get_current_user(
    State(state): State<AccountState>,
    Extension(caller): Extension<Caller>,
) -> Result<Json<UserResponse>, Error> {
    let connection = state
        .db_connection
        .lock()
        .inspect_err(|error| tracing::error!("could not acquire database lock: {error}"))
        .map_err(|_| Error::DatabaseLockError)?;

    get_user_by_id(caller.user_id, &connection).map(|user| Json(user.into()))
}

/// Change the signed-in user's password.
///
/// # Errors
///
/// - [Error::InvalidInput] if the current password does not match.
/// - [Error::TooWeak] if the new password fails the strength check.
pub async fn put_change_password(
    State(state): State<AccountState>,
    Extension(caller): Extension<Caller>,
    Form(data): Form<ChangePasswordData>,
) -> Result<Json<Value>, Error> {
    let user = {
        let connection = state
            .db_connection
            .lock()
            .inspect_err(|error| tracing::error!("could not acquire database lock: {error}"))
            .map_err(|_| Error::DatabaseLockError)?;

        get_user_by_id(caller.user_id, &connection)?
    };

    if !user.password_hash.verify(&data.current_password)? {
        tracing::info!("{} entered the wrong current password", user.username);
        return Err(Error::InvalidInput(
            "Current password is incorrect".to_owned(),
        ));
    }

    let validated_password = ValidatedPassword::new(&data.new_password, &[&user.username])?;
    let password_hash = PasswordHash::new(validated_password, state.password_cost)?;

    {
        let connection = state
            .db_connection
            .lock()
            .inspect_err(|error| tracing::error!("could not acquire database lock: {error}"))
            .map_err(|_| Error::DatabaseLockError)?;

        update_password(user.id, &password_hash, &connection)?;
    }

    tracing::info!("{} changed their password", user.username);

    Ok(Json(json!({"message": "Password changed successfully"})))
}

/// List every user. Only admins may do this.
pub async fn get_users(
    State(state): State<AccountState>,
    Extension(caller): Extension<Caller>,
) -> Result<Json<Vec<UserSummary>>, Error> {
    caller.require_admin()?;

    let connection = state
        .db_connection
        .lock()
        .inspect_err(|error| tracing::error!("could not acquire database lock: {error}"))
        .map_err(|_| Error::DatabaseLockError)?;

    let users = get_all_users(&connection)?
        .into_iter()
        .map(|user| UserSummary {
            id: user.id,
            name: user.username,
        })
        .collect();

    Ok(Json(users))
}

#[cfg(test)]
mod account_tests {
    use std::sync::{Arc, Mutex};

    use axum::{
        Extension, Router,
        routing::{get, put},
    };
    use axum_extra::extract::cookie::Key;
    use axum_test::TestServer;
    use rusqlite::Connection;
    use serde_json::json;
    use sha2::{Digest, Sha512};

    use crate::{
        auth::{
            Caller, PasswordHash, Role, User, ValidatedPassword, create_user, create_user_table,
            get_user_by_id,
        },
        endpoints,
    };

    use super::{AccountState, ChangePasswordData, get_current_user, get_users, put_change_password};

    const PASSWORD: &str = "monthly statutory remittance";

    struct Fixture {
        state: AccountState,
        admin: User,
        hr: User,
    }

    fn fixture() -> Fixture {
        let connection = Connection::open_in_memory().unwrap();
        create_user_table(&connection).unwrap();
        let password_hash =
            PasswordHash::new(ValidatedPassword::new(PASSWORD, &[]).unwrap(), 4).unwrap();
        let admin = create_user("meena", password_hash.clone(), Role::Admin, &connection).unwrap();
        let hr = create_user("priya", password_hash, Role::Hr, &connection).unwrap();

        Fixture {
            state: AccountState {
                cookie_key: Key::from(&Sha512::digest("account tests")),
                db_connection: Arc::new(Mutex::new(connection)),
                password_cost: 4,
            },
            admin,
            hr,
        }
    }

    fn server(state: &AccountState, user: &User) -> TestServer {
        let app = Router::new()
            .route(endpoints::CURRENT_USER, get(get_current_user))
            .route(endpoints::CHANGE_PASSWORD, put(put_change_password))
            .route(endpoints::USERS, get(get_users))
            .layer(Extension(Caller {
                user_id: user.id,
                role: user.role,
            }))
            .with_state(state.clone());

        TestServer::try_new(app).expect("Could not create test server.")
    }

    #[tokio::test]
    async fn current_user_returns_own_details() {
        let fixture = fixture();
        let server = server(&fixture.state, &fixture.hr);

        let response = server.get(endpoints::CURRENT_USER).await;

        response.assert_status_ok();
        response.assert_json(&json!({"id": 2, "username": "priya", "role": "hr"}));
    }

    #[tokio::test]
    async fn change_password_replaces_the_hash() {
        let fixture = fixture();
        let server = server(&fixture.state, &fixture.hr);

        let response = server
            .put(endpoints::CHANGE_PASSWORD)
            .form(&ChangePasswordData {
                current_password: PASSWORD.to_owned(),
                new_password: "quarterly provident ledger audit".to_owned(),
            })
            .await;

        response.assert_status_ok();
        response.assert_json(&json!({"message": "Password changed successfully"}));
        let connection = fixture.state.db_connection.lock().unwrap();
        let user = get_user_by_id(fixture.hr.id, &connection).unwrap();
        assert!(
            user.password_hash
                .verify("quarterly provident ledger audit")
                .unwrap()
        );
        assert!(!user.password_hash.verify(PASSWORD).unwrap());
    }

    #[tokio::test]
    async fn change_password_requires_the_current_password() {
        let fixture = fixture();
        let server = server(&fixture.state, &fixture.hr);

        let response = server
            .put(endpoints::CHANGE_PASSWORD)
            .form(&ChangePasswordData {
                current_password: "not my password at all".to_owned(),
                new_password: "quarterly provident ledger audit".to_owned(),
            })
            .await;

        response.assert_status_bad_request();
        response.assert_json(&json!({"detail": "Current password is incorrect"}));
        let connection = fixture.state.db_connection.lock().unwrap();
        let user = get_user_by_id(fixture.hr.id, &connection).unwrap();
        assert!(user.password_hash.verify(PASSWORD).unwrap());
    }

    #[tokio::test]
    async fn change_password_rejects_weak_passwords() {
        let fixture = fixture();
        let server = server(&fixture.state, &fixture.hr);

        let response = server
            .put(endpoints::CHANGE_PASSWORD)
            .form(&ChangePasswordData {
                current_password: PASSWORD.to_owned(),
                new_password: "priya123".to_owned(),
            })
            .await;

        response.assert_status_bad_request();
        let connection = fixture.state.db_connection.lock().unwrap();
        let user = get_user_by_id(fixture.hr.id, &connection).unwrap();
        assert!(user.password_hash.verify(PASSWORD).unwrap());
    }

    #[tokio::test]
    async fn admins_list_every_user() {
        let fixture = fixture();
        let server = server(&fixture.state, &fixture.admin);

        let response = server.get(endpoints::USERS).await;

        response.assert_status_ok();
        response.assert_json(&json!([
            {"id": 1, "name": "meena"},
            {"id": 2, "name": "priya"},
        ]));
    }

    #[tokio::test]
    async fn only_admins_list_users() {
        let fixture = fixture();
        let server = server(&fixture.state, &fixture.hr);

        let response = server.get(endpoints::USERS).await;

        response.assert_status_forbidden();
        response.assert_json(
            &json!({"detail": "You do not have permission to perform this action"}),
        );
    }
}
