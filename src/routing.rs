//! Application router configuration with protected and unprotected route definitions.

use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::Uri,
    middleware,
    routing::{get, post, put},
};

use crate::{
    AppState, Error,
    auth::{
        auth_guard, get_current_user, get_log_out, get_users, post_log_in, post_register,
        put_change_password,
    },
    dashboard::{
        get_delayed_submissions, get_monthly_amounts, get_remittance_days, get_submissions_data,
        get_summary_stats, get_year_list,
    },
    endpoints,
    normalize::process_folder_endpoint,
    processed_file::{
        get_batch_download_endpoint, get_download_endpoint, get_processed_files_endpoint,
    },
    remittance::{get_remittance_challan_endpoint, submit_remittance_endpoint},
};

/// Return a router with all the app's routes.
///
/// Every route except log-in, log-out and registration requires a valid
/// session. Request bodies are limited to the configured upload size.
pub fn build_router(state: AppState) -> Router {
    let unprotected_routes = Router::new()
        .route(endpoints::LOG_IN_API, post(post_log_in))
        .route(endpoints::LOG_OUT, get(get_log_out))
        .route(endpoints::REGISTER, post(post_register));

    let protected_routes = Router::new()
        .route(endpoints::CURRENT_USER, get(get_current_user))
        .route(endpoints::CHANGE_PASSWORD, put(put_change_password))
        .route(endpoints::USERS, get(get_users))
        .route(endpoints::PROCESS_FOLDER, post(process_folder_endpoint))
        .route(endpoints::PROCESSED_FILES, get(get_processed_files_endpoint))
        .route(endpoints::DOWNLOAD_FILE, get(get_download_endpoint))
        .route(endpoints::BATCH_DOWNLOAD, get(get_batch_download_endpoint))
        .route(endpoints::SUBMIT_REMITTANCE, post(submit_remittance_endpoint))
        .route(
            endpoints::REMITTANCE_CHALLAN,
            get(get_remittance_challan_endpoint),
        )
        .route(endpoints::MONTHLY_AMOUNTS, get(get_monthly_amounts))
        .route(endpoints::SUMMARY_STATS, get(get_summary_stats))
        .route(endpoints::SUBMISSIONS_DATA, get(get_submissions_data))
        .route(
            endpoints::DELAYED_SUBMISSIONS,
            get(get_delayed_submissions),
        )
        .route(endpoints::YEAR_LIST, get(get_year_list))
        .route(endpoints::REMITTANCE_DAYS, get(get_remittance_days))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth_guard));

    protected_routes
        .merge(unprotected_routes)
        .fallback(get_404_not_found)
        .layer(DefaultBodyLimit::max(state.max_upload_bytes))
        .with_state(state)
}

async fn get_404_not_found(uri: Uri) -> Error {
    Error::NotFound(format!("No route for {}", uri.path()))
}

#[cfg(test)]
mod routing_tests {
    use axum_test::TestServer;
    use rusqlite::Connection;
    use serde_json::json;

    use crate::{
        AppState, build_router,
        config::{AppConfig, StorageConfig},
        endpoints,
    };

    fn get_test_server() -> TestServer {
        let dir = std::env::temp_dir();
        let config = AppConfig::new("secret", StorageConfig::new(dir).unwrap());
        let state = AppState::new(Connection::open_in_memory().unwrap(), config).unwrap();

        TestServer::try_new(build_router(state)).expect("Could not create test server.")
    }

    #[tokio::test]
    async fn api_routes_require_a_session() {
        let server = get_test_server();

        let response = server.get(endpoints::YEAR_LIST).await;

        response.assert_status_unauthorized();
    }

    #[tokio::test]
    async fn log_out_is_public() {
        let server = get_test_server();

        let response = server.get(endpoints::LOG_OUT).await;

        response.assert_status_success();
    }

    #[tokio::test]
    async fn registration_is_public_and_account_routes_are_not() {
        let server = get_test_server();

        let response = server
            .post(endpoints::REGISTER)
            .form(&[
                ("username", "meena"),
                ("password", "monthly statutory remittance"),
            ])
            .await;
        response.assert_status(axum::http::StatusCode::CREATED);

        server
            .get(endpoints::CURRENT_USER)
            .await
            .assert_status_unauthorized();
        server.get(endpoints::USERS).await.assert_status_unauthorized();
    }

    #[tokio::test]
    async fn unknown_route_is_json_not_found() {
        let server = get_test_server();

        let response = server.get("/api/nothing_here").await;

        response.assert_status_not_found();
        response.assert_json(&json!({"detail": "No route for /api/nothing_here"}));
    }
}
