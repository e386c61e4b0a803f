//! Log-out route handler that invalidates the session cookie.

use axum::{Json, response::IntoResponse};
use axum_extra::extract::PrivateCookieJar;
use serde_json::json;

use crate::auth::invalidate_auth_cookie;

/// Invalidate the session cookie.
pub async fn get_log_out(jar: PrivateCookieJar) -> impl IntoResponse {
    let jar = invalidate_auth_cookie(jar);

    (jar, Json(json!({"status": "success", "message": "Logged out"})))
}
