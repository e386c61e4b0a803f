//! Users, roles, passwords and the cookie session that identifies the caller.

mod account;
mod caller;
mod cookie;
mod log_in;
mod log_out;
mod middleware;
mod password;
mod register;
mod token;
mod user;

pub use account::{
    AccountState, UserResponse, get_current_user, get_users, put_change_password,
};
pub use caller::{Caller, Scope};
pub use cookie::{
    COOKIE_TOKEN, DEFAULT_COOKIE_DURATION, get_token_from_cookies, invalidate_auth_cookie,
    set_auth_cookie,
};
pub use log_in::{LogInData, LogInResponse, LoginState, post_log_in};
pub use log_out::get_log_out;
pub use middleware::{AuthState, auth_guard};
pub use password::{PasswordHash, ValidatedPassword};
pub use register::post_register;
pub(crate) use token::Token;
pub use user::{
    Role, User, UserID, create_user, create_user_table, get_user_by_id, get_user_by_username,
};
